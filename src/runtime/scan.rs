//! Derived collectives built from the primitive ones.

use crate::error::RuntimeError;
use crate::runtime::partition::get_item_pointer;
use crate::runtime::world::{Comm, Element};

/// Global inclusive prefix sum of the rank-ordered concatenation of every
/// rank's `input`, written into this rank's `output`. Returns status 0.
///
/// Two passes: a local total, an exclusive scan of the totals for this
/// rank's offset, then a running sum from that offset.
pub fn cumulative_sum<T: Element>(
    comm: &Comm<'_>,
    input: &[T],
    output: &mut [T],
) -> Result<i32, RuntimeError> {
    if output.len() < input.len() {
        return Err(RuntimeError::TypeError(format!(
            "cumulative sum of {} elements into {}",
            input.len(),
            output.len()
        )));
    }
    let total = input.iter().fold(T::default(), |acc, &v| acc + v);
    let mut running = comm.exscan(total)?;
    for (out, &v) in output.iter_mut().zip(input) {
        running = running + v;
        *out = running;
    }
    Ok(0)
}

/// The local chunk of a distributed C-contiguous array.
///
/// Writes addressed by global row go to the chunk when this rank owns the
/// row and to a private dummy slot otherwise.
pub struct ChunkView<'a, T> {
    data: &'a mut [T],
    row_len: usize,
    start: i64,
    count: i64,
    dummy: T,
    dropped: usize,
}

impl<'a, T: Element> ChunkView<'a, T> {
    /// `data` holds rows `[start, start + count)`, `row_len` elements each.
    pub fn new(data: &'a mut [T], row_len: usize, start: i64, count: i64) -> Self {
        Self {
            data,
            row_len: row_len.max(1),
            start,
            count,
            dummy: T::default(),
            dropped: 0,
        }
    }

    /// Stores `value` at global row `row`, column offset `col`.
    pub fn set(&mut self, row: i64, col: usize, value: T) {
        let local = get_item_pointer(row, self.start, self.count);
        let slot = usize::try_from(local)
            .ok()
            .filter(|_| col < self.row_len)
            .map(|r| r * self.row_len + col)
            .and_then(|i| self.data.get_mut(i));
        match slot {
            Some(slot) => *slot = value,
            None => {
                self.dummy = value;
                self.dropped += 1;
            }
        }
    }

    /// Writes that landed in the dummy slot.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::world::World;

    #[test]
    fn out_of_chunk_writes_are_dropped() {
        let mut rows = [0i32; 4];
        let mut view = ChunkView::new(&mut rows, 2, 10, 2);
        view.set(11, 1, 9);
        view.set(12, 0, 5);
        view.set(9, 0, 5);
        assert_eq!(view.dropped(), 2);
        assert_eq!(rows, [0, 0, 0, 9]);
    }

    #[test]
    fn cumsum_on_two_ranks() {
        let out = World::run(2, |comm| {
            let input = if comm.rank() == 0 { vec![1i64, 2] } else { vec![3, 4] };
            let mut output = vec![0; 2];
            cumulative_sum(&comm, &input, &mut output).unwrap();
            output
        });
        assert_eq!(out, vec![vec![1, 3], vec![6, 10]]);
    }
}
