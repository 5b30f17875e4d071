//! Segment management for the Z80-family syntaxes (`CSEG`/`DSEG`/`ASEG`/`COMMON`).

use std::collections::BTreeMap;

use flexstr::SharedStr;

use crate::common::MemoryAddress;

/// The segment kinds of the Z80-family assemblers.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum SegmentType {
	/// `CSEG`: the code segment.
	Code,
	/// `DSEG`: the data segment.
	Data,
	/// `ASEG`: the absolute segment.
	Absolute,
	/// `COMMON /name/`: a named common block.
	Common,
}

#[derive(Clone, Copy, Debug, Default)]
struct SegmentState {
	address:    MemoryAddress,
	has_origin: bool,
}

/// Tracks independent address counters for each segment and named common block.
///
/// Switching segments preserves the departed segment's counter; returning to it continues where
/// it left off. A fresh segment starts at address 0 until an `ORG` gives it an origin.
#[derive(Clone, Debug)]
pub struct SegmentManager {
	current:        SegmentType,
	current_common: SharedStr,
	segments:       BTreeMap<SegmentType, SegmentState>,
	common_blocks:  BTreeMap<SharedStr, SegmentState>,
}

impl Default for SegmentManager {
	fn default() -> Self {
		Self {
			current:        SegmentType::Code,
			current_common: SharedStr::default(),
			segments:       BTreeMap::new(),
			common_blocks:  BTreeMap::new(),
		}
	}
}

impl SegmentManager {
	/// Creates a manager starting in the code segment at address 0.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&mut self) -> &mut SegmentState {
		if self.current == SegmentType::Common {
			self.common_blocks.entry(self.current_common.clone()).or_default()
		} else {
			self.segments.entry(self.current).or_default()
		}
	}

	fn state_ref(&self) -> SegmentState {
		if self.current == SegmentType::Common {
			self.common_blocks.get(&self.current_common).copied().unwrap_or_default()
		} else {
			self.segments.get(&self.current).copied().unwrap_or_default()
		}
	}

	/// Switches to `CSEG`, `DSEG` or `ASEG`.
	pub fn switch_to(&mut self, segment: SegmentType) {
		self.current = segment;
		if segment != SegmentType::Common {
			self.current_common = SharedStr::default();
		}
	}

	/// Switches to the named common block (the name may be empty for the anonymous block).
	pub fn switch_to_common(&mut self, name: &str) {
		self.current = SegmentType::Common;
		self.current_common = SharedStr::from(name);
	}

	/// Sets the current segment's address counter, typically after `ORG`.
	pub fn set_origin(&mut self, address: MemoryAddress) {
		let state = self.state();
		state.address = address;
		state.has_origin = true;
	}

	/// The current segment's address counter.
	#[must_use]
	pub fn current_address(&self) -> MemoryAddress {
		self.state_ref().address
	}

	/// Whether the current segment has seen an `ORG`.
	#[must_use]
	pub fn has_origin(&self) -> bool {
		self.state_ref().has_origin
	}

	/// Advances the current segment's counter past assembled bytes.
	pub fn advance(&mut self, bytes: usize) {
		self.state().address += bytes as MemoryAddress;
	}

	/// Records the current segment's address without marking an origin; used when the parser
	/// leaves a segment and wants to resume it later where it stopped.
	pub fn record_address(&mut self, address: MemoryAddress) {
		self.state().address = address;
	}

	/// The currently active segment kind.
	#[must_use]
	pub const fn current_segment_type(&self) -> SegmentType {
		self.current
	}

	/// The current common block's name, empty when not in a common block.
	#[must_use]
	pub fn current_common_name(&self) -> &str {
		&self.current_common
	}

	/// Resets all counters and returns to the code segment.
	pub fn reset(&mut self) {
		*self = Self::default();
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn counters_are_independent() {
		let mut manager = SegmentManager::new();
		manager.set_origin(0x1000);
		manager.advance(10);
		assert_eq!(manager.current_address(), 0x100A);

		manager.switch_to(SegmentType::Data);
		assert_eq!(manager.current_address(), 0);
		manager.set_origin(0x2000);
		manager.advance(5);
		assert_eq!(manager.current_address(), 0x2005);

		manager.switch_to(SegmentType::Code);
		assert_eq!(manager.current_address(), 0x100A);
	}

	#[test]
	fn common_blocks_by_name() {
		let mut manager = SegmentManager::new();
		manager.switch_to_common("SHARED");
		manager.advance(8);
		manager.switch_to_common("OTHER");
		assert_eq!(manager.current_address(), 0);
		manager.switch_to_common("SHARED");
		assert_eq!(manager.current_address(), 8);
		assert_eq!(manager.current_common_name(), "SHARED");
		assert_eq!(manager.current_segment_type(), SegmentType::Common);
	}

	#[test]
	fn reset() {
		let mut manager = SegmentManager::new();
		manager.set_origin(0x4000);
		manager.reset();
		assert_eq!(manager.current_address(), 0);
		assert_eq!(manager.current_segment_type(), SegmentType::Code);
	}
}
