//! Balanced block partitioning and chunk-relative addressing.
//!
//! `total` items are split into `num_chunks` contiguous chunks; the first
//! `total % num_chunks` chunks get one extra item. Chunk `w` starts at
//! `w * q + min(w, r)` with `q = total / num_chunks`, `r = total % num_chunks`.
//! A worker with no chunk (`w >= num_chunks`) gets the empty range at `total`.
//! `num_chunks` below one is treated as one.

fn split(total: i64, num_chunks: i64, worker: i32) -> (i64, i64) {
    let chunks = num_chunks.max(1);
    let w = i64::from(worker.max(0));
    if w >= chunks {
        return (total, total);
    }
    let q = total / chunks;
    let r = total % chunks;
    let start = w * q + w.min(r);
    let len = q + i64::from(w < r);
    (start, start + len)
}

/// First item of `worker`'s chunk.
pub fn get_start(total: i64, num_chunks: i64, worker: i32, _num_workers: i32) -> i64 {
    split(total, num_chunks, worker).0
}

/// One past the last item of `worker`'s chunk.
pub fn get_end(total: i64, num_chunks: i64, worker: i32, _num_workers: i32) -> i64 {
    split(total, num_chunks, worker).1
}

/// Number of items in `worker`'s chunk.
pub fn get_node_portion(total: i64, num_chunks: i64, worker: i32, _num_workers: i32) -> i64 {
    let (start, end) = split(total, num_chunks, worker);
    end - start
}

/// Chunk-relative offset of global `index`, or `-1` when the chunk
/// `[start, start + count)` does not hold it.
pub fn get_item_pointer(index: i64, start: i64, count: i64) -> i64 {
    if index >= start && index - start < count {
        index - start
    } else {
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remainder_goes_to_leading_chunks() {
        let portions: Vec<i64> = (0..3).map(|w| get_node_portion(10, 3, w, 3)).collect();
        assert_eq!(portions, vec![4, 3, 3]);
        assert_eq!(get_start(10, 3, 1, 3), 4);
        assert_eq!(get_end(10, 3, 2, 3), 10);
    }

    #[test]
    fn surplus_workers_get_empty_chunks() {
        assert_eq!(get_node_portion(2, 4, 3, 4), 0);
        assert_eq!(get_end(0, 4, 0, 4), 0);
        assert_eq!(get_node_portion(5, 2, 3, 4), 0);
        assert_eq!(get_start(5, 2, 3, 4), 5);
    }

    #[test]
    fn item_pointer_is_chunk_relative() {
        assert_eq!(get_item_pointer(7, 5, 3), 2);
        assert_eq!(get_item_pointer(8, 5, 3), -1);
        assert_eq!(get_item_pointer(4, 5, 3), -1);
    }
}
