//! Property tests for the reference SPMD runtime: partitioning, chunk
//! addressing, collectives and the derived cumulative sum.

use hdlower::runtime::{
    cumulative_sum, get_end, get_item_pointer, get_node_portion, get_start, ChunkView, World,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_chunks_tile_the_range(total in 0i64..10_000, workers in 1i32..64) {
        let chunks = i64::from(workers);
        let mut next = 0;
        for w in 0..workers {
            let start = get_start(total, chunks, w, workers);
            let end = get_end(total, chunks, w, workers);
            let portion = get_node_portion(total, chunks, w, workers);
            prop_assert_eq!(start, next);
            prop_assert_eq!(end - start, portion);
            let q = total / chunks;
            prop_assert!(portion == q || portion == q + 1);
            next = end;
        }
        prop_assert_eq!(next, total);
    }

    #[test]
    fn prop_surplus_workers_get_empty_tail(
        total in 0i64..10_000,
        (chunks, workers) in (1i32..32).prop_flat_map(|c| (Just(c), c..64)),
    ) {
        let mut next = 0;
        for w in 0..workers {
            let start = get_start(total, i64::from(chunks), w, workers);
            let end = get_end(total, i64::from(chunks), w, workers);
            let portion = get_node_portion(total, i64::from(chunks), w, workers);
            prop_assert_eq!(end - start, portion);
            if w < chunks {
                prop_assert_eq!(start, next);
                next = end;
            } else {
                prop_assert_eq!((start, end), (total, total));
            }
        }
        prop_assert_eq!(next, total);
    }

    #[test]
    fn prop_item_pointer_is_in_chunk_iff_owned(
        i in -100i64..1_000,
        start in 0i64..500,
        count in 0i64..500,
    ) {
        let local = get_item_pointer(i, start, count);
        let owned = start <= i && i < start + count;
        if owned {
            prop_assert!((0..count).contains(&local));
            prop_assert_eq!(local, i - start);
        } else {
            prop_assert_eq!(local, -1);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_cumsum_matches_serial_prefix_sum(
        procs in 1usize..=6,
        data in proptest::collection::vec(0i64..1_000, 0..60),
    ) {
        let total = data.len() as i64;
        let chunks: Vec<Vec<i64>> = World::run(procs, |comm| {
            let start = get_start(total, i64::from(comm.size()), comm.rank(), comm.size()) as usize;
            let end = get_end(total, i64::from(comm.size()), comm.rank(), comm.size()) as usize;
            let input = &data[start..end];
            let mut output = vec![0; input.len()];
            cumulative_sum(&comm, input, &mut output).unwrap();
            output
        });

        let serial: Vec<i64> = data
            .iter()
            .scan(0, |acc, &v| {
                *acc += v;
                Some(*acc)
            })
            .collect();
        prop_assert_eq!(chunks.concat(), serial);
    }

    #[test]
    fn prop_reduce_and_exscan(procs in 1usize..=8) {
        let results = World::run(procs, |comm| {
            let n = comm.reduce(1i32).unwrap();
            let before = comm.exscan(comm.rank() + 1).unwrap();
            (n, before)
        });
        for (rank, (n, before)) in results.into_iter().enumerate() {
            prop_assert_eq!(n, procs as i32);
            let r = rank as i32;
            prop_assert_eq!(before, r * (r + 1) / 2);
        }
    }

    #[test]
    fn prop_distributed_writes_land_once(rows in 1i64..40, procs in 1usize..=5) {
        // Every rank writes every global row; only the owner keeps it.
        let chunks: Vec<(Vec<f64>, usize)> = World::run(procs, |comm| {
            let size = comm.size();
            let start = get_start(rows, i64::from(size), comm.rank(), size);
            let count = get_node_portion(rows, i64::from(size), comm.rank(), size);
            let mut local = vec![0.0; count as usize * 2];
            let mut view = ChunkView::new(&mut local, 2, start, count);
            for row in 0..rows {
                view.set(row, 1, row as f64);
            }
            let dropped = view.dropped();
            (local, dropped)
        });

        let mut seen = Vec::new();
        let mut dropped_total = 0;
        for (local, dropped) in chunks {
            dropped_total += dropped;
            seen.extend(local.chunks(2).map(|r| r[1]));
        }
        let expected: Vec<f64> = (0..rows).map(|r| r as f64).collect();
        prop_assert_eq!(seen, expected);
        prop_assert_eq!(dropped_total as i64, rows * (procs as i64 - 1));
    }
}

#[test]
fn arr_reduce_sums_elementwise() {
    let out = World::run(3, |comm| {
        let mut data = vec![comm.rank() as f64; 4];
        data[0] = 1.0;
        comm.arr_reduce(&mut data).unwrap();
        data
    });
    for data in out {
        assert_eq!(data, vec![3.0, 3.0, 3.0, 3.0]);
    }
}

#[test]
fn clock_is_monotonic() {
    let times = World::run(2, |comm| {
        let a = comm.get_time();
        comm.barrier();
        let b = comm.get_time();
        (a, b)
    });
    for (a, b) in times {
        assert!(a >= 0.0 && b >= a);
    }
}
