//! The intermediate representation: a section is an ordered list of atoms.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flexstr::SharedStr;
use miette::SourceSpan;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::ToPrimitive;

use crate::common::{AssemblyCode, MemoryAddress};
use crate::expression::{EvaluationError, Expression};
use crate::symbol::SymbolTable;

/// Element width of deferred data, in bytes.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq, ToPrimitive)]
pub enum DataWidth {
	/// One byte (`DB`).
	Byte    = 1,
	/// Two bytes (`DW`).
	Word    = 2,
	/// Three bytes (`DEF3`).
	Tribyte = 3,
	/// Four bytes (`DEFD`).
	Dword   = 4,
}

/// Byte order for multi-byte data.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Endianness {
	/// Least significant byte first (6502, Z80).
	Little,
	/// Most significant byte first (6809).
	Big,
}

/// Payload of a data atom.
///
/// Data arrives either fully materialized (string directives, `HEX`) or as expressions that the
/// engine re-evaluates on every pass, so forward references settle together with label addresses.
#[derive(Clone, Debug)]
pub struct DataAtom {
	/// Deferred expressions with their element width and byte order; [`None`] for data that was
	/// materialized by the parser.
	pub deferred: Option<(Vec<Expression>, DataWidth, Endianness)>,
	/// The materialized bytes. For deferred data the engine refills this on every pass.
	pub bytes:    Vec<u8>,
}

impl DataAtom {
	/// Data that is already bytes.
	#[must_use]
	pub const fn from_bytes(bytes: Vec<u8>) -> Self {
		Self { deferred: None, bytes }
	}

	/// Data whose values are only known once symbols resolve.
	#[must_use]
	pub const fn from_expressions(expressions: Vec<Expression>, width: DataWidth, endianness: Endianness) -> Self {
		Self { deferred: Some((expressions, width, endianness)), bytes: Vec::new() }
	}

	/// The size this data will occupy, independent of whether values have resolved yet.
	#[must_use]
	pub fn expected_size(&self) -> usize {
		match &self.deferred {
			Some((expressions, width, _)) => expressions.len() * width.to_usize().unwrap_or(1),
			None => self.bytes.len(),
		}
	}

	/// Re-evaluates deferred expressions and rebuilds the byte buffer.
	///
	/// With `use_placeholders`, undefined symbols evaluate to 0 so early passes can proceed;
	/// without it, the first unresolved expression aborts with its evaluation error.
	///
	/// # Errors
	/// Evaluation errors of the deferred expressions (see above for the undefined-symbol rule).
	pub fn materialize(&mut self, symbols: &SymbolTable, use_placeholders: bool) -> Result<(), EvaluationError> {
		let Some((expressions, width, endianness)) = &self.deferred else {
			return Ok(());
		};
		let width_bytes = width.to_usize().unwrap_or(1);
		let mut bytes = Vec::with_capacity(expressions.len() * width_bytes);
		for expression in expressions {
			let value = match expression.evaluate(symbols) {
				Ok(value) => value,
				Err(EvaluationError::UndefinedSymbol(_)) if use_placeholders => 0,
				Err(error) => return Err(error),
			};
			let mut buffer = [0_u8; 8];
			let masked = (value as u64) & (u64::MAX >> (64 - width_bytes * 8));
			match endianness {
				Endianness::Little => LittleEndian::write_uint(&mut buffer, masked, width_bytes),
				Endianness::Big => BigEndian::write_uint(&mut buffer, masked, width_bytes),
			}
			bytes.extend_from_slice(&buffer[.. width_bytes]);
		}
		self.bytes = bytes;
		Ok(())
	}
}

/// Listing-control requests, passed through to a listing writer. Zero-size.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ListingControl {
	/// `TITLE` / `.TI`.
	Title(SharedStr),
	/// `SUBTTL`.
	Subtitle(SharedStr),
	/// `PAGE` / `EJECT` / `.PG`.
	Page,
	/// `SPACE n`.
	Space(usize),
	/// `.LIST` / `.XLIST` / `LST ON` / `LST OFF`.
	List(bool),
	/// `.LALL`: list full macro expansions.
	ListAllMacroLines,
	/// `.SALL`: suppress macro expansion listing.
	SuppressMacroLines,
	/// `.XALL`: list only macro lines that generate code.
	ListGeneratingMacroLines,
	/// `NAME modname`.
	ModuleName(SharedStr),
}

/// The kinds of atoms and their payloads.
#[derive(Clone, Debug)]
pub enum AtomKind {
	/// A symbol definition; the engine fills in the address on every pass. Zero-size.
	Label {
		/// The (scope-qualified) symbol name.
		name:    SharedStr,
		/// The address, valid after the pass that computed it.
		address: MemoryAddress,
	},
	/// A CPU instruction; the back-end fills in the encoding.
	Instruction {
		/// Canonical upper-case mnemonic.
		mnemonic: SharedStr,
		/// Unparsed operand text; the CPU back-end derives the addressing mode from it.
		operand:  String,
		/// Encoded bytes, filled by the CPU back-end each pass.
		encoding: Vec<u8>,
	},
	/// Data bytes, possibly deferred until symbols resolve.
	Data(DataAtom),
	/// Reserved space; consumes addresses, emits no bytes.
	Space {
		/// Number of reserved bytes.
		count: usize,
	},
	/// Alignment padding; size depends on the current address, so it varies across passes.
	Align {
		/// The alignment modulus.
		alignment: usize,
	},
	/// Sets the absolute assembly address. Zero-size.
	Org {
		/// The new address.
		address: MemoryAddress,
	},
	/// Starts phased assembly: labels and `$` take addresses from here on, layout continues
	/// physically. Zero-size.
	Phase {
		/// The logical address the phased block runs at.
		address: MemoryAddress,
	},
	/// Ends phased assembly. Zero-size.
	Dephase,
	/// Listing control. Zero-size.
	ListingControl(ListingControl),
}

/// One intermediate-representation element.
///
/// Atoms are created by the syntax parsers in source order. The engine mutates sizes and encoded
/// bytes across passes but never reorders, inserts or removes atoms.
#[derive(Clone, Debug)]
pub struct Atom {
	/// The atom kind and payload.
	pub kind:        AtomKind,
	/// The source span this atom came from.
	pub span:        SourceSpan,
	/// The source file this atom came from (include files differ from the root file).
	pub source:      Arc<AssemblyCode>,
	/// Current size in bytes.
	pub size:        usize,
	/// The size computed in the previous pass.
	pub last_size:   usize,
	/// How often the size changed between passes; used for oscillation diagnostics.
	pub changes:     u32,
	/// The original source line, preserved for listings.
	pub source_line: Option<String>,
}

impl Atom {
	/// Creates an atom with the initial size its kind implies.
	#[must_use]
	pub fn new(kind: AtomKind, span: SourceSpan, source: Arc<AssemblyCode>) -> Self {
		let size = match &kind {
			AtomKind::Data(data) => match &data.deferred {
				Some((expressions, width, _)) => expressions.len() * width.to_usize().unwrap_or(1),
				None => data.bytes.len(),
			},
			AtomKind::Space { count } => *count,
			_ => 0,
		};
		Self { kind, span, source, size, last_size: size, changes: 0, source_line: None }
	}

	/// Records the size computed by the current pass, tracking changes for convergence
	/// diagnostics.
	pub fn record_size(&mut self, new_size: usize) {
		self.last_size = self.size;
		if new_size != self.size {
			self.changes += 1;
			self.size = new_size;
		}
	}

	/// The bytes this atom emits, if any.
	#[must_use]
	pub fn bytes(&self) -> Option<&[u8]> {
		match &self.kind {
			AtomKind::Instruction { encoding, .. } => Some(encoding),
			AtomKind::Data(data) => Some(&data.bytes),
			_ => None,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::expression::Expression;

	fn dummy_source() -> Arc<AssemblyCode> {
		AssemblyCode::new("", "<test>")
	}

	#[test]
	fn initial_sizes() {
		let source = dummy_source();
		let label = Atom::new(AtomKind::Label { name: SharedStr::from("x"), address: 0 }, (0, 0).into(), source.clone());
		assert_eq!(label.size, 0);
		let space = Atom::new(AtomKind::Space { count: 200 }, (0, 0).into(), source.clone());
		assert_eq!(space.size, 200);
		let data = Atom::new(
			AtomKind::Data(DataAtom::from_expressions(
				vec![Expression::Literal(1), Expression::Literal(2)],
				DataWidth::Word,
				Endianness::Little,
			)),
			(0, 0).into(),
			source,
		);
		assert_eq!(data.size, 4);
	}

	#[test]
	fn size_change_tracking() {
		let mut atom = Atom::new(AtomKind::Space { count: 2 }, (0, 0).into(), dummy_source());
		atom.record_size(2);
		assert_eq!(atom.changes, 0);
		atom.record_size(5);
		assert_eq!(atom.changes, 1);
		assert_eq!(atom.last_size, 2);
		assert_eq!(atom.size, 5);
		atom.record_size(5);
		assert_eq!(atom.changes, 1);
		assert_eq!(atom.last_size, 5);
	}

	#[test]
	fn endianness_of_deferred_data() {
		let mut little = DataAtom::from_expressions(vec![Expression::Literal(0x1234)], DataWidth::Word, Endianness::Little);
		let symbols = SymbolTable::new(true);
		little.materialize(&symbols, false).unwrap();
		assert_eq!(little.bytes, [0x34, 0x12]);

		let mut big = DataAtom::from_expressions(vec![Expression::Literal(0x1234)], DataWidth::Word, Endianness::Big);
		big.materialize(&symbols, false).unwrap();
		assert_eq!(big.bytes, [0x12, 0x34]);
	}

	#[test]
	fn placeholder_materialization() {
		let mut data = DataAtom::from_expressions(
			vec![crate::expression::parse("missing", &crate::expression::GenericNumberFormat).unwrap()],
			DataWidth::Byte,
			Endianness::Little,
		);
		let symbols = SymbolTable::new(true);
		data.materialize(&symbols, true).unwrap();
		assert_eq!(data.bytes, [0]);
		assert!(data.materialize(&symbols, false).is_err());
	}
}
