//! MOS 6502 family back-end: 6502, 65C02, Rockwell 65C02 and 65816.

use std::cell::Cell;

use flexstr::SharedStr;

use super::{parse_resolved_number, split_operands, CpuBackend, CpuType, EncodeError};
use crate::common::MemoryAddress;

/// The family variants, ordered by capability.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Variant {
	Nmos,
	Cmos,
	Rockwell,
	W65816,
}

/// The addressing modes of the family.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
	Implied,
	Immediate,
	ZeroPage,
	ZeroPageX,
	ZeroPageY,
	Absolute,
	AbsoluteX,
	AbsoluteY,
	Indirect,
	IndirectX,
	IndirectY,
	IndirectZeroPage,
	AbsoluteIndexedIndirect,
	AbsoluteLong,
	AbsoluteLongX,
	IndirectLong,
	IndirectLongY,
	StackRelative,
	StackRelativeIndirectY,
}

macro_rules! modes {
	($mode:expr; $($name:ident => $opcode:expr),+ $(,)?) => {
		match $mode { $(Mode::$name => Some($opcode),)+ _ => None }
	};
}

/// The 6502-family encoder.
///
/// The variant and the 65816 immediate widths live in cells because Merlin's `XC` and `MX`
/// directives flip them mid-source while the rest of the pipeline holds a shared reference.
#[derive(Debug)]
pub struct Mos6502 {
	variant: Cell<Variant>,
	long_m:  Cell<bool>,
	long_x:  Cell<bool>,
}

impl Mos6502 {
	/// Creates a back-end for the given family member.
	#[must_use]
	pub fn new(cpu: CpuType) -> Self {
		let variant = match cpu {
			CpuType::Mos65C02 => Variant::Cmos,
			CpuType::Mos65C02Rockwell => Variant::Rockwell,
			CpuType::Mos65816 => Variant::W65816,
			_ => Variant::Nmos,
		};
		Self { variant: Cell::new(variant), long_m: Cell::new(false), long_x: Cell::new(false) }
	}

	fn at_least_cmos(&self) -> bool {
		self.variant.get() >= Variant::Cmos
	}

	fn is_65816(&self) -> bool {
		self.variant.get() == Variant::W65816
	}

	fn variant_name(&self) -> &'static str {
		match self.variant.get() {
			Variant::Nmos => "6502",
			Variant::Cmos => "65C02",
			Variant::Rockwell => "65C02 (Rockwell)",
			Variant::W65816 => "65816",
		}
	}

	fn mode_supported(&self, mode: Mode) -> bool {
		match mode {
			Mode::IndirectZeroPage | Mode::AbsoluteIndexedIndirect => self.at_least_cmos(),
			Mode::AbsoluteLong
			| Mode::AbsoluteLongX
			| Mode::IndirectLong
			| Mode::IndirectLongY
			| Mode::StackRelative
			| Mode::StackRelativeIndirectY => self.is_65816(),
			_ => true,
		}
	}

	fn immediate_width(&self, mnemonic: &str) -> usize {
		if !self.is_65816() {
			return 1;
		}
		match mnemonic {
			"ADC" | "AND" | "BIT" | "CMP" | "EOR" | "LDA" | "ORA" | "SBC" if self.long_m.get() => 2,
			"CPX" | "CPY" | "LDX" | "LDY" if self.long_x.get() => 2,
			"PEA" => 2,
			_ => 1,
		}
	}

	/// Derives the addressing-mode candidates from the shape of the operand text. The first
	/// candidate whose opcode exists, whose value fits and whose mode the variant supports wins,
	/// which is how `$80` becomes zero-page while `$1234` becomes absolute.
	fn candidates(mnemonic: &str, text: &str) -> Vec<Mode> {
		let trimmed = text.trim();
		if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("A") {
			return vec![Mode::Implied];
		}
		if trimmed.starts_with('#') {
			return vec![Mode::Immediate];
		}
		let upper = trimmed.to_uppercase().replace(' ', "").replace('\t', "");
		if let Some(rest) = upper.strip_prefix('[') {
			return if rest.trim_end().ends_with("],Y") {
				vec![Mode::IndirectLongY]
			} else {
				vec![Mode::IndirectLong]
			};
		}
		if upper.starts_with('(') {
			if upper.ends_with(",X)") {
				return if matches!(mnemonic, "JMP" | "JSR") {
					vec![Mode::AbsoluteIndexedIndirect]
				} else {
					vec![Mode::IndirectX]
				};
			}
			if upper.ends_with(",S),Y") {
				return vec![Mode::StackRelativeIndirectY];
			}
			if upper.ends_with("),Y") {
				return vec![Mode::IndirectY];
			}
			if upper.ends_with(')') {
				return if mnemonic == "JMP" {
					vec![Mode::Indirect]
				} else if mnemonic == "PEI" {
					vec![Mode::IndirectZeroPage]
				} else {
					vec![Mode::IndirectZeroPage, Mode::Indirect]
				};
			}
		}
		if upper.ends_with(",X") {
			return vec![Mode::ZeroPageX, Mode::AbsoluteX, Mode::AbsoluteLongX];
		}
		if upper.ends_with(",Y") {
			return vec![Mode::ZeroPageY, Mode::AbsoluteY];
		}
		if upper.ends_with(",S") {
			return vec![Mode::StackRelative];
		}
		vec![Mode::ZeroPage, Mode::Absolute, Mode::AbsoluteLong]
	}

	fn value_fits(mode: Mode, value: u32) -> bool {
		match mode {
			Mode::ZeroPage
			| Mode::ZeroPageX
			| Mode::ZeroPageY
			| Mode::IndirectX
			| Mode::IndirectY
			| Mode::IndirectZeroPage
			| Mode::IndirectLong
			| Mode::IndirectLongY
			| Mode::StackRelative
			| Mode::StackRelativeIndirectY => value <= 0xFF,
			Mode::Absolute | Mode::AbsoluteX | Mode::AbsoluteY | Mode::Indirect | Mode::AbsoluteIndexedIndirect =>
				value <= 0xFFFF,
			Mode::AbsoluteLong | Mode::AbsoluteLongX => value <= 0xFF_FFFF,
			Mode::Implied | Mode::Immediate => true,
		}
	}

	fn operand_byte_count(&self, mnemonic: &str, mode: Mode) -> usize {
		match mode {
			Mode::Implied => 0,
			Mode::Immediate => self.immediate_width(mnemonic),
			Mode::ZeroPage
			| Mode::ZeroPageX
			| Mode::ZeroPageY
			| Mode::IndirectX
			| Mode::IndirectY
			| Mode::IndirectZeroPage
			| Mode::IndirectLong
			| Mode::IndirectLongY
			| Mode::StackRelative
			| Mode::StackRelativeIndirectY => 1,
			Mode::Absolute | Mode::AbsoluteX | Mode::AbsoluteY | Mode::Indirect | Mode::AbsoluteIndexedIndirect => 2,
			Mode::AbsoluteLong | Mode::AbsoluteLongX => 3,
		}
	}

	#[allow(clippy::too_many_lines)]
	fn opcode(&self, mnemonic: &str, mode: Mode) -> Option<u8> {
		// Rockwell bit instructions first; the numbered names don't fit the flat match below.
		if let Some(rest) = mnemonic.strip_prefix("RMB").or_else(|| mnemonic.strip_prefix("SMB")) {
			let bit: u8 = rest.parse().ok().filter(|&bit| bit < 8)?;
			if mode != Mode::ZeroPage || self.variant.get() != Variant::Rockwell {
				return None;
			}
			let base = if mnemonic.starts_with("RMB") { 0x07 } else { 0x87 };
			return Some(base + (bit << 4));
		}
		match mnemonic {
			"ADC" => modes!(mode; Immediate => 0x69, ZeroPage => 0x65, ZeroPageX => 0x75, Absolute => 0x6D,
				AbsoluteX => 0x7D, AbsoluteY => 0x79, IndirectX => 0x61, IndirectY => 0x71,
				IndirectZeroPage => 0x72, AbsoluteLong => 0x6F, AbsoluteLongX => 0x7F, IndirectLong => 0x67,
				IndirectLongY => 0x77, StackRelative => 0x63, StackRelativeIndirectY => 0x73),
			"AND" => modes!(mode; Immediate => 0x29, ZeroPage => 0x25, ZeroPageX => 0x35, Absolute => 0x2D,
				AbsoluteX => 0x3D, AbsoluteY => 0x39, IndirectX => 0x21, IndirectY => 0x31,
				IndirectZeroPage => 0x32, AbsoluteLong => 0x2F, AbsoluteLongX => 0x3F, IndirectLong => 0x27,
				IndirectLongY => 0x37, StackRelative => 0x23, StackRelativeIndirectY => 0x33),
			"ASL" => modes!(mode; Implied => 0x0A, ZeroPage => 0x06, ZeroPageX => 0x16, Absolute => 0x0E,
				AbsoluteX => 0x1E),
			"BIT" => {
				let cmos = self.at_least_cmos();
				match mode {
					Mode::Immediate if cmos => Some(0x89),
					Mode::ZeroPage => Some(0x24),
					Mode::ZeroPageX if cmos => Some(0x34),
					Mode::Absolute => Some(0x2C),
					Mode::AbsoluteX if cmos => Some(0x3C),
					_ => None,
				}
			},
			"BRK" => modes!(mode; Implied => 0x00),
			"CMP" => modes!(mode; Immediate => 0xC9, ZeroPage => 0xC5, ZeroPageX => 0xD5, Absolute => 0xCD,
				AbsoluteX => 0xDD, AbsoluteY => 0xD9, IndirectX => 0xC1, IndirectY => 0xD1,
				IndirectZeroPage => 0xD2, AbsoluteLong => 0xCF, AbsoluteLongX => 0xDF, IndirectLong => 0xC7,
				IndirectLongY => 0xD7, StackRelative => 0xC3, StackRelativeIndirectY => 0xD3),
			"CPX" => modes!(mode; Immediate => 0xE0, ZeroPage => 0xE4, Absolute => 0xEC),
			"CPY" => modes!(mode; Immediate => 0xC0, ZeroPage => 0xC4, Absolute => 0xCC),
			"DEC" => {
				let accumulator = self.at_least_cmos();
				match mode {
					Mode::Implied if accumulator => Some(0x3A),
					Mode::ZeroPage => Some(0xC6),
					Mode::ZeroPageX => Some(0xD6),
					Mode::Absolute => Some(0xCE),
					Mode::AbsoluteX => Some(0xDE),
					_ => None,
				}
			},
			"EOR" => modes!(mode; Immediate => 0x49, ZeroPage => 0x45, ZeroPageX => 0x55, Absolute => 0x4D,
				AbsoluteX => 0x5D, AbsoluteY => 0x59, IndirectX => 0x41, IndirectY => 0x51,
				IndirectZeroPage => 0x52, AbsoluteLong => 0x4F, AbsoluteLongX => 0x5F, IndirectLong => 0x47,
				IndirectLongY => 0x57, StackRelative => 0x43, StackRelativeIndirectY => 0x53),
			"INC" => {
				let accumulator = self.at_least_cmos();
				match mode {
					Mode::Implied if accumulator => Some(0x1A),
					Mode::ZeroPage => Some(0xE6),
					Mode::ZeroPageX => Some(0xF6),
					Mode::Absolute => Some(0xEE),
					Mode::AbsoluteX => Some(0xFE),
					_ => None,
				}
			},
			"JMP" | "JML" => modes!(mode; Absolute => 0x4C, Indirect => 0x6C, AbsoluteIndexedIndirect => 0x7C,
				AbsoluteLong => 0x5C, IndirectLong => 0xDC),
			"JSR" => modes!(mode; Absolute => 0x20, AbsoluteIndexedIndirect => 0xFC),
			"JSL" => modes!(mode; AbsoluteLong => 0x22),
			"LDA" => modes!(mode; Immediate => 0xA9, ZeroPage => 0xA5, ZeroPageX => 0xB5, Absolute => 0xAD,
				AbsoluteX => 0xBD, AbsoluteY => 0xB9, IndirectX => 0xA1, IndirectY => 0xB1,
				IndirectZeroPage => 0xB2, AbsoluteLong => 0xAF, AbsoluteLongX => 0xBF, IndirectLong => 0xA7,
				IndirectLongY => 0xB7, StackRelative => 0xA3, StackRelativeIndirectY => 0xB3),
			"LDX" => modes!(mode; Immediate => 0xA2, ZeroPage => 0xA6, ZeroPageY => 0xB6, Absolute => 0xAE,
				AbsoluteY => 0xBE),
			"LDY" => modes!(mode; Immediate => 0xA0, ZeroPage => 0xA4, ZeroPageX => 0xB4, Absolute => 0xAC,
				AbsoluteX => 0xBC),
			"LSR" => modes!(mode; Implied => 0x4A, ZeroPage => 0x46, ZeroPageX => 0x56, Absolute => 0x4E,
				AbsoluteX => 0x5E),
			"ORA" => modes!(mode; Immediate => 0x09, ZeroPage => 0x05, ZeroPageX => 0x15, Absolute => 0x0D,
				AbsoluteX => 0x1D, AbsoluteY => 0x19, IndirectX => 0x01, IndirectY => 0x11,
				IndirectZeroPage => 0x12, AbsoluteLong => 0x0F, AbsoluteLongX => 0x1F, IndirectLong => 0x07,
				IndirectLongY => 0x17, StackRelative => 0x03, StackRelativeIndirectY => 0x13),
			"PEA" => modes!(mode; Absolute => 0xF4),
			"PEI" => modes!(mode; IndirectZeroPage => 0xD4),
			"REP" => modes!(mode; Immediate => 0xC2),
			"ROL" => modes!(mode; Implied => 0x2A, ZeroPage => 0x26, ZeroPageX => 0x36, Absolute => 0x2E,
				AbsoluteX => 0x3E),
			"ROR" => modes!(mode; Implied => 0x6A, ZeroPage => 0x66, ZeroPageX => 0x76, Absolute => 0x6E,
				AbsoluteX => 0x7E),
			"SBC" => modes!(mode; Immediate => 0xE9, ZeroPage => 0xE5, ZeroPageX => 0xF5, Absolute => 0xED,
				AbsoluteX => 0xFD, AbsoluteY => 0xF9, IndirectX => 0xE1, IndirectY => 0xF1,
				IndirectZeroPage => 0xF2, AbsoluteLong => 0xEF, AbsoluteLongX => 0xFF, IndirectLong => 0xE7,
				IndirectLongY => 0xF7, StackRelative => 0xE3, StackRelativeIndirectY => 0xF3),
			"SEP" => modes!(mode; Immediate => 0xE2),
			"STA" => modes!(mode; ZeroPage => 0x85, ZeroPageX => 0x95, Absolute => 0x8D, AbsoluteX => 0x9D,
				AbsoluteY => 0x99, IndirectX => 0x81, IndirectY => 0x91, IndirectZeroPage => 0x92,
				AbsoluteLong => 0x8F, AbsoluteLongX => 0x9F, IndirectLong => 0x87, IndirectLongY => 0x97,
				StackRelative => 0x83, StackRelativeIndirectY => 0x93),
			"STX" => modes!(mode; ZeroPage => 0x86, ZeroPageY => 0x96, Absolute => 0x8E),
			"STY" => modes!(mode; ZeroPage => 0x84, ZeroPageX => 0x94, Absolute => 0x8C),
			"STZ" if self.at_least_cmos() =>
				modes!(mode; ZeroPage => 0x64, ZeroPageX => 0x74, Absolute => 0x9C, AbsoluteX => 0x9E),
			"TRB" if self.at_least_cmos() => modes!(mode; ZeroPage => 0x14, Absolute => 0x1C),
			"TSB" if self.at_least_cmos() => modes!(mode; ZeroPage => 0x04, Absolute => 0x0C),
			"COP" => modes!(mode; Immediate => 0x02, ZeroPage => 0x02),
			"WDM" => modes!(mode; Immediate => 0x42),
			_ => self.implied_opcode(mnemonic).and_then(|opcode| modes!(mode; Implied => opcode)),
		}
	}

	fn implied_opcode(&self, mnemonic: &str) -> Option<u8> {
		let nmos = |opcode| Some(opcode);
		let cmos = |opcode| self.at_least_cmos().then_some(opcode);
		let w816 = |opcode| self.is_65816().then_some(opcode);
		match mnemonic {
			"CLC" => nmos(0x18),
			"CLD" => nmos(0xD8),
			"CLI" => nmos(0x58),
			"CLV" => nmos(0xB8),
			"DEX" => nmos(0xCA),
			"DEY" => nmos(0x88),
			"INX" => nmos(0xE8),
			"INY" => nmos(0xC8),
			"NOP" => nmos(0xEA),
			"PHA" => nmos(0x48),
			"PHP" => nmos(0x08),
			"PLA" => nmos(0x68),
			"PLP" => nmos(0x28),
			"RTI" => nmos(0x40),
			"RTS" => nmos(0x60),
			"SEC" => nmos(0x38),
			"SED" => nmos(0xF8),
			"SEI" => nmos(0x78),
			"TAX" => nmos(0xAA),
			"TAY" => nmos(0xA8),
			"TSX" => nmos(0xBA),
			"TXA" => nmos(0x8A),
			"TXS" => nmos(0x9A),
			"TYA" => nmos(0x98),
			"PHX" => cmos(0xDA),
			"PHY" => cmos(0x5A),
			"PLX" => cmos(0xFA),
			"PLY" => cmos(0x7A),
			"PHB" => w816(0x8B),
			"PHD" => w816(0x0B),
			"PHK" => w816(0x4B),
			"PLB" => w816(0xAB),
			"PLD" => w816(0x2B),
			"RTL" => w816(0x6B),
			"STP" => w816(0xDB),
			"TCD" => w816(0x5B),
			"TCS" => w816(0x1B),
			"TDC" => w816(0x7B),
			"TSC" => w816(0x3B),
			"WAI" => w816(0xCB),
			"XBA" => w816(0xEB),
			"XCE" => w816(0xFB),
			_ => None,
		}
	}

	fn is_mnemonic(&self, mnemonic: &str) -> bool {
		const TABLED: &[&str] = &[
			"ADC", "AND", "ASL", "BIT", "BRK", "CMP", "COP", "CPX", "CPY", "DEC", "EOR", "INC", "JML", "JMP",
			"JSL", "JSR", "LDA", "LDX", "LDY", "LSR", "ORA", "PEA", "PEI", "REP", "ROL", "ROR", "SBC", "SEP",
			"STA", "STX", "STY", "STZ", "TRB", "TSB", "WDM",
		];
		TABLED.contains(&mnemonic)
			|| self.implied_opcode(mnemonic).is_some()
			|| branch_opcode(mnemonic).is_some()
			|| matches!(mnemonic, "BRA" | "BRL" | "MVN" | "MVP" | "PER")
			|| mnemonic.strip_prefix("RMB").or_else(|| mnemonic.strip_prefix("SMB")).is_some_and(|bit| bit.len() == 1)
			|| mnemonic.strip_prefix("BBR").or_else(|| mnemonic.strip_prefix("BBS")).is_some_and(|bit| bit.len() == 1)
	}
}

/// The opcode of a conditional branch mnemonic.
const fn branch_opcode(mnemonic: &str) -> Option<u8> {
	// const-compatible comparison over bytes
	match mnemonic.as_bytes() {
		b"BPL" => Some(0x10),
		b"BMI" => Some(0x30),
		b"BVC" => Some(0x50),
		b"BVS" => Some(0x70),
		b"BCC" | b"BLT" => Some(0x90),
		b"BCS" | b"BGE" => Some(0xB0),
		b"BNE" => Some(0xD0),
		b"BEQ" => Some(0xF0),
		_ => None,
	}
}

/// Complement mask: every 6502 conditional branch inverts by flipping bit 5.
const BRANCH_COMPLEMENT_MASK: u8 = 0x20;
/// The displacement that skips the 3-byte `JMP` of a relaxed branch.
const BRANCH_RELAXATION_OFFSET: u8 = 0x03;
const JMP_ABSOLUTE: u8 = 0x4C;

fn push_value(bytes: &mut Vec<u8>, value: u32, count: usize) {
	for index in 0 .. count {
		bytes.push(((value >> (8 * index)) & 0xFF) as u8);
	}
}

impl CpuBackend for Mos6502 {
	fn family_name(&self) -> &'static str {
		"6502"
	}

	fn supported_variants(&self) -> &'static [&'static str] {
		&["6502", "65c02", "65c02rock", "65816"]
	}

	fn is_reserved_word(&self, word: &str) -> bool {
		matches!(word.to_uppercase().as_str(), "A" | "X" | "Y" | "S")
	}

	fn upgrade_variant(&self) {
		let next = match self.variant.get() {
			Variant::Nmos => Variant::Cmos,
			_ => Variant::W65816,
		};
		self.variant.set(next);
	}

	fn set_immediate_widths(&self, long_m: bool, long_x: bool) {
		self.long_m.set(long_m);
		self.long_x.set(long_x);
	}

	fn encode(&self, mnemonic: &str, operand: u32, operand_text: &str) -> Result<Vec<u8>, EncodeError> {
		if !self.is_mnemonic(mnemonic) {
			return Err(EncodeError::UnknownMnemonic(SharedStr::from(mnemonic)));
		}
		let candidates = Self::candidates(mnemonic, operand_text);
		let mut found_opcode = false;
		let mut widest_bits = 8;
		for &mode in &candidates {
			let Some(opcode) = self.opcode(mnemonic, mode) else {
				continue;
			};
			if !self.mode_supported(mode) {
				return Err(EncodeError::UnsupportedOnVariant {
					mnemonic: SharedStr::from(mnemonic),
					variant:  self.variant_name(),
				});
			}
			found_opcode = true;
			let operand_bytes = self.operand_byte_count(mnemonic, mode);
			widest_bits = widest_bits.max(operand_bytes as u8 * 8);
			if mode == Mode::Immediate {
				let signed = operand as i32;
				let limit = if operand_bytes == 2 { (-0x8000, 0xFFFF) } else { (-0x80, 0xFF) };
				if signed < limit.0 || signed > limit.1 {
					return Err(EncodeError::OperandOutOfRange { value: signed.into(), bits: operand_bytes as u8 * 8 });
				}
			} else if !Self::value_fits(mode, operand) {
				continue;
			}
			let mut bytes = vec![opcode];
			push_value(&mut bytes, operand, operand_bytes);
			return Ok(bytes);
		}
		if found_opcode {
			Err(EncodeError::OperandOutOfRange { value: i64::from(operand), bits: widest_bits })
		} else {
			Err(EncodeError::InvalidAddressingMode {
				mnemonic: SharedStr::from(mnemonic),
				operand:  SharedStr::from(operand_text.trim()),
			})
		}
	}

	fn requires_special_encoding(&self, mnemonic: &str) -> bool {
		branch_opcode(mnemonic).is_some()
			|| matches!(mnemonic, "BRA" | "BRL" | "MVN" | "MVP" | "PER")
			|| mnemonic.strip_prefix("BBR").or_else(|| mnemonic.strip_prefix("BBS")).is_some_and(|bit| bit.len() == 1)
	}

	#[allow(clippy::cast_possible_truncation)]
	fn encode_special(
		&self,
		mnemonic: &str,
		operand_text: &str,
		current_address: MemoryAddress,
	) -> Result<Vec<u8>, EncodeError> {
		let invalid = || EncodeError::InvalidAddressingMode {
			mnemonic: SharedStr::from(mnemonic),
			operand:  SharedStr::from(operand_text.trim()),
		};
		let parts = split_operands(operand_text);

		// 65816 block move: MVN/MVP src,dst assembles as opcode, dst bank, src bank.
		if matches!(mnemonic, "MVN" | "MVP") {
			if !self.is_65816() {
				return Err(EncodeError::UnsupportedOnVariant {
					mnemonic: SharedStr::from(mnemonic),
					variant:  self.variant_name(),
				});
			}
			let [source, destination] = parts.as_slice() else {
				return Err(invalid());
			};
			let source = parse_resolved_number(source).ok_or_else(invalid)?;
			let destination = parse_resolved_number(destination).ok_or_else(invalid)?;
			if !(0 ..= 0xFF).contains(&source) || !(0 ..= 0xFF).contains(&destination) {
				return Err(EncodeError::OperandOutOfRange { value: source.max(destination), bits: 8 });
			}
			let opcode = if mnemonic == "MVN" { 0x54 } else { 0x44 };
			return Ok(vec![opcode, destination as u8, source as u8]);
		}

		// Rockwell BBR/BBS: zero-page operand plus a branch target.
		if let Some(bit) = mnemonic
			.strip_prefix("BBR")
			.or_else(|| mnemonic.strip_prefix("BBS"))
			.and_then(|rest| rest.parse::<u8>().ok().filter(|&bit| bit < 8))
		{
			if self.variant.get() != Variant::Rockwell {
				return Err(EncodeError::UnsupportedOnVariant {
					mnemonic: SharedStr::from(mnemonic),
					variant:  self.variant_name(),
				});
			}
			let [zero_page, target] = parts.as_slice() else {
				return Err(invalid());
			};
			let zero_page = parse_resolved_number(zero_page).ok_or_else(invalid)?;
			let target = parse_resolved_number(target).ok_or_else(invalid)?;
			let displacement = target - (current_address + 3);
			if !(-128 ..= 127).contains(&displacement) {
				return Err(EncodeError::BranchOutOfRange {
					mnemonic: SharedStr::from(mnemonic),
					distance: displacement,
				});
			}
			let base = if mnemonic.starts_with("BBR") { 0x0F } else { 0x8F };
			return Ok(vec![base + (bit << 4), (zero_page & 0xFF) as u8, (displacement & 0xFF) as u8]);
		}

		let [target] = parts.as_slice() else {
			return Err(invalid());
		};
		let target = parse_resolved_number(target).ok_or_else(invalid)?;

		// 65816 16-bit relative forms are range-checked but never rewritten.
		if matches!(mnemonic, "BRL" | "PER") {
			if !self.is_65816() {
				return Err(EncodeError::UnsupportedOnVariant {
					mnemonic: SharedStr::from(mnemonic),
					variant:  self.variant_name(),
				});
			}
			let displacement = target - (current_address + 3);
			if !(-0x8000 ..= 0x7FFF).contains(&displacement) {
				return Err(EncodeError::BranchOutOfRange {
					mnemonic: SharedStr::from(mnemonic),
					distance: displacement,
				});
			}
			let opcode = if mnemonic == "BRL" { 0x82 } else { 0x62 };
			return Ok(vec![opcode, (displacement & 0xFF) as u8, ((displacement >> 8) & 0xFF) as u8]);
		}

		let displacement = target - (current_address + 2);
		let in_range = (-128 ..= 127).contains(&displacement);
		if mnemonic == "BRA" {
			if !self.at_least_cmos() {
				return Err(EncodeError::UnsupportedOnVariant {
					mnemonic: SharedStr::from(mnemonic),
					variant:  self.variant_name(),
				});
			}
			// BRA has no complement, so the relaxed form is a plain absolute jump.
			return Ok(if in_range {
				vec![0x80, (displacement & 0xFF) as u8]
			} else {
				vec![JMP_ABSOLUTE, (target & 0xFF) as u8, ((target >> 8) & 0xFF) as u8]
			});
		}

		let opcode = branch_opcode(mnemonic).ok_or_else(|| EncodeError::UnknownMnemonic(SharedStr::from(mnemonic)))?;
		Ok(if in_range {
			vec![opcode, (displacement & 0xFF) as u8]
		} else {
			// Relaxed form: inverted branch over an absolute jump to the target.
			vec![
				opcode ^ BRANCH_COMPLEMENT_MASK,
				BRANCH_RELAXATION_OFFSET,
				JMP_ABSOLUTE,
				(target & 0xFF) as u8,
				((target >> 8) & 0xFF) as u8,
			]
		})
	}
}
