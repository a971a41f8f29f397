/// Fixed-capacity circular buffer. Once full, each push evicts the oldest
/// retained element.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    end: usize,
    cycled: bool,
    slots: Vec<Option<T>>,
}

impl<T> RingBuffer<T> {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// A capacity of zero is bumped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            end: 0,
            cycled: false,
            slots,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Appends `batch` in order. A batch larger than the capacity is cut down
    /// to its newest `capacity` elements first.
    pub fn push(&mut self, batch: Vec<T>) {
        let capacity = self.capacity();
        let skip = batch.len().saturating_sub(capacity);

        for item in batch.into_iter().skip(skip) {
            self.slots[self.end] = Some(item);
            self.end = (self.end + 1) % capacity;
            if self.end == 0 {
                self.cycled = true;
            }
        }
    }

    /// Raw slot at physical index `i`. Only meaningful in insertion order
    /// before the first wrap; use `first`/`last`/`iter` otherwise.
    pub fn get(&self, i: usize) -> Option<&T> {
        self.slots.get(i).and_then(Option::as_ref)
    }

    /// Oldest retained element.
    pub fn first(&self) -> Option<&T> {
        if self.cycled {
            self.slots[self.end].as_ref()
        } else {
            self.slots[0].as_ref()
        }
    }

    /// Most recently pushed element.
    pub fn last(&self) -> Option<&T> {
        if self.end == 0 {
            if self.cycled {
                return self.slots[self.capacity() - 1].as_ref();
            }
            return None;
        }
        self.slots[self.end - 1].as_ref()
    }

    pub fn len(&self) -> usize {
        if self.cycled {
            self.capacity()
        } else {
            self.end
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retained elements, oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let (older, newer) = if self.cycled {
            (&self.slots[self.end..], &self.slots[..self.end])
        } else {
            (&self.slots[..self.end], &self.slots[..0])
        };
        older.iter().chain(newer.iter()).filter_map(Option::as_ref)
    }
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(range: std::ops::RangeInclusive<u32>) -> Vec<u32> {
        range.collect()
    }

    #[test]
    fn push_into_empty_buffer_keeps_order() {
        let mut ring = RingBuffer::new();
        ring.push(vec!["A", "B", "C"]);

        assert_eq!(ring.len(), 3);
        assert_eq!(ring.first(), Some(&"A"));
        assert_eq!(ring.last(), Some(&"C"));
        assert_eq!(ring.get(1), Some(&"B"));
    }

    #[test]
    fn empty_buffer_has_no_first_or_last() {
        let mut ring: RingBuffer<u32> = RingBuffer::new();
        assert!(ring.is_empty());
        assert_eq!(ring.first(), None);
        assert_eq!(ring.last(), None);

        ring.push(Vec::new());
        assert!(ring.is_empty());
        assert_eq!(ring.last(), None);
    }

    #[test]
    fn len_is_bounded_by_capacity() {
        let mut ring = RingBuffer::new();
        let mut pushed = 0usize;
        for chunk in [1usize, 99, 400, 500, 1, 250, 1000, 3] {
            ring.push(vec![0u8; chunk]);
            pushed += chunk;
            assert_eq!(ring.len(), pushed.min(1000));
        }
    }

    #[test]
    fn exactly_full_buffer_reports_full_len() {
        let mut ring = RingBuffer::new();
        ring.push(numbered(1..=1000));

        assert_eq!(ring.len(), 1000);
        assert_eq!(ring.first(), Some(&1));
        assert_eq!(ring.last(), Some(&1000));
    }

    #[test]
    fn overwrite_evicts_oldest_first() {
        let mut ring = RingBuffer::new();
        for m in 1..=1001u32 {
            ring.push(vec![m]);
        }

        assert_eq!(ring.len(), 1000);
        assert_eq!(ring.first(), Some(&2));
        assert_eq!(ring.last(), Some(&1001));
    }

    #[test]
    fn oversized_batch_keeps_newest_capacity_records() {
        let mut ring = RingBuffer::new();
        ring.push(vec![0u32; 10]);
        ring.push(numbered(1..=2500));

        assert_eq!(ring.len(), 1000);
        assert_eq!(ring.first(), Some(&1501));
        assert_eq!(ring.last(), Some(&2500));
        assert!(ring.iter().copied().eq(1501..=2500));
    }

    #[test]
    fn oversized_batch_into_fresh_buffer() {
        let mut ring = RingBuffer::with_capacity(4);
        ring.push(numbered(1..=6));

        assert_eq!(ring.len(), 4);
        assert_eq!(ring.first(), Some(&3));
        assert_eq!(ring.last(), Some(&6));
    }

    #[test]
    fn iter_follows_insertion_order_across_wraps() {
        let mut ring = RingBuffer::with_capacity(5);
        let mut all = Vec::new();
        for batch in [vec![1, 2], vec![3, 4, 5, 6], vec![7], vec![8, 9, 10, 11, 12, 13]] {
            all.extend(batch.iter().copied());
            ring.push(batch);

            let retained: Vec<i32> = ring.iter().copied().collect();
            let expected = &all[all.len().saturating_sub(5)..];
            assert_eq!(retained, expected);
            assert_eq!(ring.first(), expected.first());
            assert_eq!(ring.last(), expected.last());
        }
    }

    #[test]
    fn get_out_of_range_is_none() {
        let mut ring = RingBuffer::with_capacity(3);
        ring.push(vec![1]);
        assert_eq!(ring.get(2), None);
        assert_eq!(ring.get(10), None);
    }
}
