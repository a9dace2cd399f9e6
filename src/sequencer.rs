use std::collections::BTreeMap;

/// Reorder buffer between parallel frame workers and the in-order consumer.
///
/// Workers finish in any order; `push` hands back every item that is now
/// contiguous with what was already released, lowest index first.
#[derive(Debug)]
pub struct FrameSequencer<T> {
	next: u64,
	pending: BTreeMap<u64, T>,
}

impl<T> Default for FrameSequencer<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> FrameSequencer<T> {
	pub fn new() -> Self {
		Self::starting_at(0)
	}

	pub fn starting_at(first: u64) -> Self {
		Self {
			next: first,
			pending: BTreeMap::new(),
		}
	}

	/// Index of the next item to be released.
	pub fn next_index(&self) -> u64 {
		self.next
	}

	/// Items buffered while waiting for an earlier index.
	pub fn pending(&self) -> usize {
		self.pending.len()
	}

	pub fn push(&mut self, index: u64, item: T) -> Vec<(u64, T)> {
		if index < self.next || self.pending.contains_key(&index) {
			tracing::warn!(index, next = self.next, "Ignoring duplicate frame result");
			return Vec::new();
		}
		self.pending.insert(index, item);

		let mut ready = Vec::new();
		while let Some(item) = self.pending.remove(&self.next) {
			ready.push((self.next, item));
			self.next += 1;
		}
		ready
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn in_order_items_flow_straight_through() {
		let mut seq = FrameSequencer::new();
		assert_eq!(seq.push(0, 'a'), vec![(0, 'a')]);
		assert_eq!(seq.push(1, 'b'), vec![(1, 'b')]);
		assert_eq!(seq.pending(), 0);
	}

	#[test]
	fn out_of_order_items_wait_for_the_gap() {
		let mut seq = FrameSequencer::new();
		assert!(seq.push(2, "c").is_empty());
		assert!(seq.push(1, "b").is_empty());
		assert_eq!(seq.pending(), 2);
		assert_eq!(seq.push(0, "a"), vec![(0, "a"), (1, "b"), (2, "c")]);
		assert_eq!(seq.next_index(), 3);
	}

	#[test]
	fn duplicates_and_stale_indices_are_dropped() {
		let mut seq = FrameSequencer::starting_at(5);
		assert!(seq.push(4, 0).is_empty());
		assert!(seq.push(7, 1).is_empty());
		assert!(seq.push(7, 2).is_empty());
		assert_eq!(seq.push(5, 3), vec![(5, 3)]);
		assert_eq!(seq.push(6, 4), vec![(6, 4), (7, 1)]);
	}
}
