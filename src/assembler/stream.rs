//! Flattening the addressed byte stream into contiguous images for output writers.

use crate::common::MemoryAddress;
use crate::section::Section;

/// Combines the byte streams of all sections into one contiguous image starting at the lowest
/// emitted address. Gaps (reserved space, holes between sections) are zero-filled, which is what
/// raw binary writers want. Returns [`None`] when nothing is emitted at all.
#[must_use]
pub fn program_image(sections: &[Section]) -> Option<(MemoryAddress, Vec<u8>)> {
	let mut pairs: Vec<(MemoryAddress, u8)> =
		sections.iter().flat_map(|section| section.byte_stream()).collect();
	if pairs.is_empty() {
		return None;
	}
	pairs.sort_by_key(|&(address, _)| address);
	let start = pairs.first().map(|&(address, _)| address)?;
	let end = pairs.last().map(|&(address, _)| address)?;
	let mut image = vec![0_u8; usize::try_from(end - start).ok()? + 1];
	for (address, byte) in pairs {
		image[usize::try_from(address - start).ok()?] = byte;
	}
	Some((start, image))
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::atom::{Atom, AtomKind, DataAtom};
	use crate::common::AssemblyCode;
	use crate::section::SectionAttributes;

	#[test]
	fn image_merges_sections_and_fills_gaps() {
		let source = AssemblyCode::new("", "<test>");
		let mut first = Section::new("A", SectionAttributes::CODE, 0x100);
		first.add_atom(Atom::new(
			AtomKind::Data(DataAtom::from_bytes(vec![0x11])),
			(0, 0).into(),
			source.clone(),
		));
		let mut second = Section::new("B", SectionAttributes::DATA, 0x104);
		second.add_atom(Atom::new(AtomKind::Data(DataAtom::from_bytes(vec![0x22])), (0, 0).into(), source));

		let (start, image) = program_image(&[first, second]).unwrap();
		assert_eq!(start, 0x100);
		assert_eq!(image, [0x11, 0, 0, 0, 0x22]);
	}

	#[test]
	fn empty_input() {
		assert!(program_image(&[]).is_none());
	}
}
