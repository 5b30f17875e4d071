//! Sections: named, attributed containers of atoms, and the addressed byte stream.

use bitflags::bitflags;
use flexstr::SharedStr;

use crate::atom::{Atom, AtomKind};
use crate::common::MemoryAddress;

bitflags! {
	/// Attributes of a section.
	#[derive(Clone, Copy, Debug, Eq, PartialEq)]
	pub struct SectionAttributes: u8 {
		/// Contains code.
		const CODE    = 0x01;
		/// Contains initialized data.
		const DATA    = 0x02;
		/// Contains uninitialized data.
		const BSS     = 0x04;
		/// Readable.
		const READ    = 0x08;
		/// Writable.
		const WRITE   = 0x10;
		/// Executable.
		const EXECUTE = 0x20;
	}
}

/// A named ordered sequence of atoms with an origin address.
#[derive(Clone, Debug)]
pub struct Section {
	/// The section name.
	pub name:           SharedStr,
	/// Attribute flags.
	pub attributes:     SectionAttributes,
	/// The origin address; an `Org` atom overrides it from its position onward.
	pub origin:         MemoryAddress,
	/// The atoms, in source order.
	pub atoms:          Vec<Atom>,
	/// Parse-time running offset estimate; the engine recomputes real addresses.
	pub current_offset: usize,
}

impl Section {
	/// Creates an empty section.
	#[must_use]
	pub fn new(name: &str, attributes: SectionAttributes, origin: MemoryAddress) -> Self {
		Self { name: SharedStr::from(name), attributes, origin, atoms: Vec::new(), current_offset: 0 }
	}

	/// Appends an atom, keeping the parse-time offset estimate current.
	pub fn add_atom(&mut self, atom: Atom) {
		if let AtomKind::Org { address } = atom.kind {
			if self.atoms.iter().all(|existing| existing.size == 0) {
				self.origin = address;
			}
		}
		self.current_offset += atom.size;
		self.atoms.push(atom);
	}

	/// The `(address, byte)` stream this section emits after assembly.
	///
	/// Space atoms produce address gaps (reserved but uninitialized); alignment padding emits
	/// zeros; labels, phase markers and listing controls emit nothing. For each emitted byte the
	/// address is correct, and no address is emitted twice.
	#[must_use]
	pub fn byte_stream(&self) -> AddressedByteStream<'_> {
		AddressedByteStream { section: self, atom_index: 0, byte_index: 0, address: self.origin }
	}

	/// Flattens the byte stream into a contiguous image starting at the lowest emitted address,
	/// zero-filling gaps. Returns `None` for a section that emits nothing.
	#[must_use]
	pub fn image(&self) -> Option<(MemoryAddress, Vec<u8>)> {
		let mut start = None;
		let mut bytes: Vec<u8> = Vec::new();
		for (address, byte) in self.byte_stream() {
			let base = *start.get_or_insert(address);
			let offset = usize::try_from(address - base).ok()?;
			if offset >= bytes.len() {
				bytes.resize(offset + 1, 0);
			}
			bytes[offset] = byte;
		}
		start.map(|base| (base, bytes))
	}
}

/// Iterator over the `(address, byte)` pairs of a section. See [`Section::byte_stream`].
#[derive(Clone, Debug)]
pub struct AddressedByteStream<'a> {
	section:    &'a Section,
	atom_index: usize,
	byte_index: usize,
	address:    MemoryAddress,
}

impl Iterator for AddressedByteStream<'_> {
	type Item = (MemoryAddress, u8);

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			let atom = self.section.atoms.get(self.atom_index)?;
			match &atom.kind {
				AtomKind::Org { address } => {
					self.address = *address;
					self.atom_index += 1;
				},
				AtomKind::Space { count } => {
					self.address += *count as MemoryAddress;
					self.atom_index += 1;
				},
				AtomKind::Align { alignment } => {
					let modulus = *alignment as MemoryAddress;
					let padding =
						if modulus == 0 { 0 } else { ((modulus - self.address.rem_euclid(modulus)) % modulus) as usize };
					if self.byte_index < padding {
						let address = self.address + self.byte_index as MemoryAddress;
						self.byte_index += 1;
						return Some((address, 0));
					}
					self.address += padding as MemoryAddress;
					self.byte_index = 0;
					self.atom_index += 1;
				},
				AtomKind::Label { .. }
				| AtomKind::Phase { .. }
				| AtomKind::Dephase
				| AtomKind::ListingControl(_) => {
					self.atom_index += 1;
				},
				AtomKind::Instruction { .. } | AtomKind::Data(_) => {
					let bytes = atom.bytes().unwrap_or(&[]);
					if self.byte_index < bytes.len() {
						let address = self.address + self.byte_index as MemoryAddress;
						let byte = bytes[self.byte_index];
						self.byte_index += 1;
						return Some((address, byte));
					}
					self.address += bytes.len() as MemoryAddress;
					self.byte_index = 0;
					self.atom_index += 1;
				},
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::atom::DataAtom;
	use crate::common::AssemblyCode;

	fn atom(kind: AtomKind) -> Atom {
		Atom::new(kind, (0, 0).into(), AssemblyCode::new("", "<test>"))
	}

	#[test]
	fn stream_addresses_and_gaps() {
		let mut section = Section::new("CODE", SectionAttributes::CODE, 0);
		section.add_atom(atom(AtomKind::Org { address: 0x1000 }));
		section.add_atom(atom(AtomKind::Data(DataAtom::from_bytes(vec![0xAA, 0xBB]))));
		section.add_atom(atom(AtomKind::Space { count: 4 }));
		section.add_atom(atom(AtomKind::Data(DataAtom::from_bytes(vec![0xCC]))));

		let pairs: Vec<_> = section.byte_stream().collect();
		assert_eq!(pairs, [(0x1000, 0xAA), (0x1001, 0xBB), (0x1006, 0xCC)]);

		// No address is emitted twice.
		let mut addresses: Vec<_> = pairs.iter().map(|&(address, _)| address).collect();
		addresses.dedup();
		assert_eq!(addresses.len(), pairs.len());
	}

	#[test]
	fn alignment_emits_zeros() {
		let mut section = Section::new("CODE", SectionAttributes::CODE, 0x1001);
		section.add_atom(atom(AtomKind::Data(DataAtom::from_bytes(vec![0x01]))));
		section.add_atom(atom(AtomKind::Align { alignment: 4 }));
		section.add_atom(atom(AtomKind::Data(DataAtom::from_bytes(vec![0x02]))));

		let pairs: Vec<_> = section.byte_stream().collect();
		assert_eq!(pairs, [(0x1001, 0x01), (0x1002, 0), (0x1003, 0), (0x1004, 0x02)]);
	}

	#[test]
	fn image_zero_fills_gaps() {
		let mut section = Section::new("CODE", SectionAttributes::CODE, 0);
		section.add_atom(atom(AtomKind::Org { address: 0x80 }));
		section.add_atom(atom(AtomKind::Data(DataAtom::from_bytes(vec![0x11]))));
		section.add_atom(atom(AtomKind::Space { count: 2 }));
		section.add_atom(atom(AtomKind::Data(DataAtom::from_bytes(vec![0x22]))));

		let (start, image) = section.image().unwrap();
		assert_eq!(start, 0x80);
		assert_eq!(image, [0x11, 0x00, 0x00, 0x22]);
	}

	#[test]
	fn origin_follows_leading_org() {
		let mut section = Section::new("CODE", SectionAttributes::CODE, 0);
		section.add_atom(atom(AtomKind::Org { address: 0x2000 }));
		assert_eq!(section.origin, 0x2000);
	}
}
