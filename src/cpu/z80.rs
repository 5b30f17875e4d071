//! Zilog Z80 back-end: prefix bytes, index registers, relative-jump relaxation.

use flexstr::SharedStr;

use super::{parse_resolved_number, split_operands, CpuBackend, EncodeError};
use crate::common::MemoryAddress;

/// 16-bit register pairs. IX and IY are normalized to HL after the prefix byte is chosen.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Pair {
	Bc,
	De,
	Hl,
	Sp,
	Af,
}

impl Pair {
	/// The two-bit field used by most 16-bit instructions (AF replaces SP for PUSH/POP).
	const fn code(self) -> u8 {
		match self {
			Self::Bc => 0,
			Self::De => 1,
			Self::Hl | Self::Af => 2,
			Self::Sp => 3,
		}
	}
}

/// One parsed operand.
#[derive(Clone, Debug, PartialEq)]
enum Operand {
	/// 8-bit register, already encoded (B=0, C=1, D=2, E=3, H=4, L=5, A=7).
	Reg8(u8),
	/// The interrupt vector register.
	RegI,
	/// The refresh register.
	RegR,
	/// A 16-bit pair (IX/IY normalized to HL).
	Pair(Pair),
	/// `(HL)`, including `(IX+d)`/`(IY+d)` after normalization.
	IndHl,
	/// `(BC)`.
	IndBc,
	/// `(DE)`.
	IndDe,
	/// `(SP)`.
	IndSp,
	/// `(C)`, for the ED-prefixed I/O group.
	IndC,
	/// `(nn)`.
	IndImm(MemoryAddress),
	/// A plain numeric value.
	Imm(MemoryAddress),
	/// `AF'`.
	AfAlternate,
}

/// Parsed operand list with prefix/displacement context pulled out of IX/IY uses.
#[derive(Clone, Debug, Default)]
struct OperandList {
	prefix:       Option<u8>,
	displacement: Option<MemoryAddress>,
	operands:     Vec<Operand>,
}

const fn condition_code(token: &str) -> Option<u8> {
	match token.as_bytes() {
		b"NZ" => Some(0),
		b"Z" => Some(1),
		b"NC" => Some(2),
		b"C" => Some(3),
		b"PO" => Some(4),
		b"PE" => Some(5),
		b"P" => Some(6),
		b"M" => Some(7),
		_ => None,
	}
}

fn push_word(bytes: &mut Vec<u8>, value: MemoryAddress) {
	bytes.push((value & 0xFF) as u8);
	bytes.push(((value >> 8) & 0xFF) as u8);
}

/// The Z80 encoder. The Game Boy variant accepts the base instruction set but rejects the IX/IY
/// and ED-prefixed extensions its core lacks.
#[derive(Clone, Debug)]
pub struct Z80 {
	gameboy: bool,
}

impl Z80 {
	/// Creates a Z80 or Game Boy back-end.
	#[must_use]
	pub const fn new(gameboy: bool) -> Self {
		Self { gameboy }
	}

	fn variant_name(&self) -> &'static str {
		if self.gameboy {
			"the Game Boy core"
		} else {
			"Z80"
		}
	}

	fn unsupported(&self, mnemonic: &str) -> EncodeError {
		EncodeError::UnsupportedOnVariant { mnemonic: SharedStr::from(mnemonic), variant: self.variant_name() }
	}

	/// Parses one operand token. `fallback` is the engine-resolved numeric value, used whenever
	/// the token itself still contains a symbol.
	fn parse_operand(token: &str, fallback: MemoryAddress, list: &mut OperandList) -> Operand {
		let cleaned: String = token.chars().filter(|character| !character.is_whitespace()).collect();
		let upper = cleaned.to_uppercase();
		match upper.as_str() {
			"A" => return Operand::Reg8(7),
			"B" => return Operand::Reg8(0),
			"C" => return Operand::Reg8(1),
			"D" => return Operand::Reg8(2),
			"E" => return Operand::Reg8(3),
			"H" => return Operand::Reg8(4),
			"L" => return Operand::Reg8(5),
			"I" => return Operand::RegI,
			"R" => return Operand::RegR,
			"BC" => return Operand::Pair(Pair::Bc),
			"DE" => return Operand::Pair(Pair::De),
			"HL" => return Operand::Pair(Pair::Hl),
			"SP" => return Operand::Pair(Pair::Sp),
			"AF" => return Operand::Pair(Pair::Af),
			"AF'" => return Operand::AfAlternate,
			"IX" => {
				list.prefix = Some(0xDD);
				return Operand::Pair(Pair::Hl);
			},
			"IY" => {
				list.prefix = Some(0xFD);
				return Operand::Pair(Pair::Hl);
			},
			_ => {},
		}
		if upper.starts_with('(') && upper.ends_with(')') {
			let inner = &upper[1 .. upper.len() - 1];
			match inner {
				"HL" => return Operand::IndHl,
				"BC" => return Operand::IndBc,
				"DE" => return Operand::IndDe,
				"SP" => return Operand::IndSp,
				"C" => return Operand::IndC,
				"IX" | "IY" => {
					list.prefix = Some(if inner == "IX" { 0xDD } else { 0xFD });
					list.displacement = Some(0);
					return Operand::IndHl;
				},
				_ => {},
			}
			if let Some(rest) = inner.strip_prefix("IX").or_else(|| inner.strip_prefix("IY")) {
				list.prefix = Some(if inner.starts_with("IX") { 0xDD } else { 0xFD });
				list.displacement = Some(parse_resolved_number(rest).unwrap_or(fallback));
				return Operand::IndHl;
			}
			let value = parse_resolved_number(inner).unwrap_or(fallback);
			return Operand::IndImm(value);
		}
		Operand::Imm(parse_resolved_number(&cleaned).unwrap_or(fallback))
	}

	fn parse_operands(text: &str, fallback: MemoryAddress) -> OperandList {
		let mut list = OperandList::default();
		let mut operands = Vec::new();
		for token in split_operands(text) {
			if !token.is_empty() {
				operands.push(Self::parse_operand(&token, fallback, &mut list));
			}
		}
		list.operands = operands;
		list
	}

	/// Emits prefix, opcode and index displacement in instruction order.
	fn assemble_opcode(
		&self,
		mnemonic: &str,
		list: &OperandList,
		opcode: &[u8],
	) -> Result<Vec<u8>, EncodeError> {
		let mut bytes = Vec::with_capacity(4);
		if let Some(prefix) = list.prefix {
			if self.gameboy {
				return Err(self.unsupported(mnemonic));
			}
			bytes.push(prefix);
		}
		bytes.extend_from_slice(opcode);
		if let Some(displacement) = list.displacement {
			if !(-128 ..= 127).contains(&displacement) {
				return Err(EncodeError::OperandOutOfRange { value: displacement, bits: 8 });
			}
			bytes.push((displacement & 0xFF) as u8);
		}
		Ok(bytes)
	}

	fn extended(&self, mnemonic: &str, opcode: u8) -> Result<Vec<u8>, EncodeError> {
		if self.gameboy {
			return Err(self.unsupported(mnemonic));
		}
		Ok(vec![0xED, opcode])
	}

	fn check_byte(value: MemoryAddress) -> Result<u8, EncodeError> {
		if (-128 ..= 255).contains(&value) {
			Ok((value & 0xFF) as u8)
		} else {
			Err(EncodeError::OperandOutOfRange { value, bits: 8 })
		}
	}

	#[allow(clippy::too_many_lines)]
	fn encode_ld(&self, list: &OperandList, operand_text: &str) -> Result<Vec<u8>, EncodeError> {
		let invalid = || EncodeError::InvalidAddressingMode {
			mnemonic: SharedStr::from("LD"),
			operand:  SharedStr::from(operand_text.trim()),
		};
		let [destination, source] = list.operands.as_slice() else {
			return Err(invalid());
		};
		let r_code = |operand: &Operand| match operand {
			Operand::Reg8(code) => Some(*code),
			Operand::IndHl => Some(6),
			_ => None,
		};
		match (destination, source) {
			// 8-bit register moves; (HL),(HL) would be HALT and is rejected.
			(d, s) if r_code(d).is_some() && r_code(s).is_some() => {
				let (d, s) = (r_code(d).unwrap_or_default(), r_code(s).unwrap_or_default());
				if d == 6 && s == 6 {
					return Err(invalid());
				}
				self.assemble_opcode("LD", list, &[0x40 + d * 8 + s])
			},
			(d, Operand::Imm(value)) if r_code(d).is_some() => {
				let mut bytes =
					self.assemble_opcode("LD", list, &[0x06 + r_code(d).unwrap_or_default() * 8])?;
				bytes.push(Self::check_byte(*value)?);
				Ok(bytes)
			},
			(Operand::Reg8(7), Operand::IndBc) => Ok(vec![0x0A]),
			(Operand::Reg8(7), Operand::IndDe) => Ok(vec![0x1A]),
			(Operand::IndBc, Operand::Reg8(7)) => Ok(vec![0x02]),
			(Operand::IndDe, Operand::Reg8(7)) => Ok(vec![0x12]),
			(Operand::Reg8(7), Operand::IndImm(address)) => {
				let mut bytes = vec![0x3A];
				push_word(&mut bytes, *address);
				Ok(bytes)
			},
			(Operand::IndImm(address), Operand::Reg8(7)) => {
				let mut bytes = vec![0x32];
				push_word(&mut bytes, *address);
				Ok(bytes)
			},
			(Operand::Reg8(7), Operand::RegI) => self.extended("LD", 0x57),
			(Operand::Reg8(7), Operand::RegR) => self.extended("LD", 0x5F),
			(Operand::RegI, Operand::Reg8(7)) => self.extended("LD", 0x47),
			(Operand::RegR, Operand::Reg8(7)) => self.extended("LD", 0x4F),
			(Operand::Pair(pair), Operand::Imm(value)) if *pair != Pair::Af => {
				let mut bytes = self.assemble_opcode("LD", list, &[0x01 + pair.code() * 16])?;
				push_word(&mut bytes, *value);
				Ok(bytes)
			},
			(Operand::Pair(Pair::Hl), Operand::IndImm(address)) => {
				let mut bytes = self.assemble_opcode("LD", list, &[0x2A])?;
				push_word(&mut bytes, *address);
				Ok(bytes)
			},
			(Operand::IndImm(address), Operand::Pair(Pair::Hl)) => {
				let mut bytes = self.assemble_opcode("LD", list, &[0x22])?;
				push_word(&mut bytes, *address);
				Ok(bytes)
			},
			(Operand::Pair(pair), Operand::IndImm(address)) if *pair != Pair::Af => {
				let mut bytes = self.extended("LD", 0x4B + pair.code() * 16)?;
				push_word(&mut bytes, *address);
				Ok(bytes)
			},
			(Operand::IndImm(address), Operand::Pair(pair)) if *pair != Pair::Af => {
				let mut bytes = self.extended("LD", 0x43 + pair.code() * 16)?;
				push_word(&mut bytes, *address);
				Ok(bytes)
			},
			(Operand::Pair(Pair::Sp), Operand::Pair(Pair::Hl)) => self.assemble_opcode("LD", list, &[0xF9]),
			_ => Err(invalid()),
		}
	}

	fn encode_arithmetic(
		&self,
		mnemonic: &str,
		list: &OperandList,
		operand_text: &str,
	) -> Result<Vec<u8>, EncodeError> {
		let invalid = || EncodeError::InvalidAddressingMode {
			mnemonic: SharedStr::from(mnemonic),
			operand:  SharedStr::from(operand_text.trim()),
		};
		let (register_base, immediate_opcode): (u8, u8) = match mnemonic {
			"ADD" => (0x80, 0xC6),
			"ADC" => (0x88, 0xCE),
			"SUB" => (0x90, 0xD6),
			"SBC" => (0x98, 0xDE),
			"AND" => (0xA0, 0xE6),
			"XOR" => (0xA8, 0xEE),
			"OR" => (0xB0, 0xF6),
			"CP" => (0xB8, 0xFE),
			_ => return Err(EncodeError::UnknownMnemonic(SharedStr::from(mnemonic))),
		};

		// 16-bit forms: ADD HL,rp / ADC HL,rp / SBC HL,rp.
		if let [Operand::Pair(Pair::Hl), Operand::Pair(pair)] = list.operands.as_slice() {
			if *pair == Pair::Af {
				return Err(invalid());
			}
			return match mnemonic {
				"ADD" => self.assemble_opcode(mnemonic, list, &[0x09 + pair.code() * 16]),
				"ADC" => self.extended(mnemonic, 0x4A + pair.code() * 16),
				"SBC" => self.extended(mnemonic, 0x42 + pair.code() * 16),
				_ => Err(invalid()),
			};
		}

		// The accumulator form, written with or without the explicit A.
		let source = match list.operands.as_slice() {
			[Operand::Reg8(7), source] | [source] => source,
			_ => return Err(invalid()),
		};
		match source {
			Operand::Reg8(code) => self.assemble_opcode(mnemonic, list, &[register_base + code]),
			Operand::IndHl => self.assemble_opcode(mnemonic, list, &[register_base + 6]),
			Operand::Imm(value) => {
				let mut bytes = vec![immediate_opcode];
				bytes.push(Self::check_byte(*value)?);
				Ok(bytes)
			},
			_ => Err(invalid()),
		}
	}

	fn encode_rotate_shift(
		&self,
		mnemonic: &str,
		list: &OperandList,
		operand_text: &str,
	) -> Result<Vec<u8>, EncodeError> {
		let base: u8 = match mnemonic {
			"RLC" => 0x00,
			"RRC" => 0x08,
			"RL" => 0x10,
			"RR" => 0x18,
			"SLA" => 0x20,
			"SRA" => 0x28,
			"SLL" | "SL1" => 0x30,
			"SRL" => 0x38,
			_ => return Err(EncodeError::UnknownMnemonic(SharedStr::from(mnemonic))),
		};
		let target = match list.operands.as_slice() {
			[Operand::Reg8(code)] => *code,
			[Operand::IndHl] => 6,
			_ =>
				return Err(EncodeError::InvalidAddressingMode {
					mnemonic: SharedStr::from(mnemonic),
					operand:  SharedStr::from(operand_text.trim()),
				}),
		};
		self.cb_prefixed(mnemonic, list, base + target)
	}

	/// CB-group emission: `CB op`, or `DD CB d op` for indexed targets.
	fn cb_prefixed(&self, mnemonic: &str, list: &OperandList, opcode: u8) -> Result<Vec<u8>, EncodeError> {
		if let Some(prefix) = list.prefix {
			if self.gameboy {
				return Err(self.unsupported(mnemonic));
			}
			let displacement = list.displacement.unwrap_or(0);
			if !(-128 ..= 127).contains(&displacement) {
				return Err(EncodeError::OperandOutOfRange { value: displacement, bits: 8 });
			}
			return Ok(vec![prefix, 0xCB, (displacement & 0xFF) as u8, opcode]);
		}
		Ok(vec![0xCB, opcode])
	}

	#[allow(clippy::too_many_lines)]
	fn encode_instruction(
		&self,
		mnemonic: &str,
		operand: MemoryAddress,
		operand_text: &str,
	) -> Result<Vec<u8>, EncodeError> {
		let list = Self::parse_operands(operand_text, operand);
		let invalid = || EncodeError::InvalidAddressingMode {
			mnemonic: SharedStr::from(mnemonic),
			operand:  SharedStr::from(operand_text.trim()),
		};

		match mnemonic {
			"LD" => self.encode_ld(&list, operand_text),
			"ADD" | "ADC" | "SUB" | "SBC" | "AND" | "XOR" | "OR" | "CP" =>
				self.encode_arithmetic(mnemonic, &list, operand_text),
			"RLC" | "RRC" | "RL" | "RR" | "SLA" | "SRA" | "SLL" | "SL1" | "SRL" =>
				self.encode_rotate_shift(mnemonic, &list, operand_text),
			"BIT" | "RES" | "SET" => {
				let [Operand::Imm(bit), target] = list.operands.as_slice() else {
					return Err(invalid());
				};
				if !(0 ..= 7).contains(bit) {
					return Err(EncodeError::OperandOutOfRange { value: *bit, bits: 3 });
				}
				let target = match target {
					Operand::Reg8(code) => *code,
					Operand::IndHl => 6,
					_ => return Err(invalid()),
				};
				let base: u8 = match mnemonic {
					"BIT" => 0x40,
					"RES" => 0x80,
					_ => 0xC0,
				};
				self.cb_prefixed(mnemonic, &list, base + (*bit as u8) * 8 + target)
			},
			"INC" | "DEC" => {
				let increment = mnemonic == "INC";
				match list.operands.as_slice() {
					[Operand::Reg8(code)] =>
						self.assemble_opcode(mnemonic, &list, &[if increment { 0x04 } else { 0x05 } + code * 8]),
					[Operand::IndHl] =>
						self.assemble_opcode(mnemonic, &list, &[if increment { 0x34 } else { 0x35 }]),
					[Operand::Pair(pair)] if *pair != Pair::Af => self.assemble_opcode(
						mnemonic,
						&list,
						&[if increment { 0x03 } else { 0x0B } + pair.code() * 16],
					),
					_ => Err(invalid()),
				}
			},
			"JP" => match list.operands.as_slice() {
				// `JP (HL)` / `JP (IX)`: no displacement byte despite the indexed spelling.
				[Operand::IndHl] => {
					let mut bytes = Vec::with_capacity(2);
					if let Some(prefix) = list.prefix {
						if self.gameboy {
							return Err(self.unsupported(mnemonic));
						}
						bytes.push(prefix);
					}
					bytes.push(0xE9);
					Ok(bytes)
				},
				[Operand::Imm(target)] => {
					let mut bytes = vec![0xC3];
					push_word(&mut bytes, *target);
					Ok(bytes)
				},
				[condition, Operand::Imm(target)] => {
					let code = Self::condition_of(condition, operand_text).ok_or_else(invalid)?;
					let mut bytes = vec![0xC2 + code * 8];
					push_word(&mut bytes, *target);
					Ok(bytes)
				},
				_ => Err(invalid()),
			},
			"CALL" => match list.operands.as_slice() {
				[Operand::Imm(target)] => {
					let mut bytes = vec![0xCD];
					push_word(&mut bytes, *target);
					Ok(bytes)
				},
				[condition, Operand::Imm(target)] => {
					let code = Self::condition_of(condition, operand_text).ok_or_else(invalid)?;
					let mut bytes = vec![0xC4 + code * 8];
					push_word(&mut bytes, *target);
					Ok(bytes)
				},
				_ => Err(invalid()),
			},
			"RET" => match list.operands.as_slice() {
				[] => Ok(vec![0xC9]),
				[condition] => {
					let code = Self::condition_of(condition, operand_text).ok_or_else(invalid)?;
					Ok(vec![0xC0 + code * 8])
				},
				_ => Err(invalid()),
			},
			"RETI" => self.extended(mnemonic, 0x4D),
			"RETN" => self.extended(mnemonic, 0x45),
			"RST" => {
				let [Operand::Imm(vector)] = list.operands.as_slice() else {
					return Err(invalid());
				};
				if *vector % 8 != 0 || !(0 ..= 0x38).contains(vector) {
					return Err(EncodeError::OperandOutOfRange { value: *vector, bits: 6 });
				}
				Ok(vec![0xC7 + (*vector as u8)])
			},
			"PUSH" | "POP" => {
				let [Operand::Pair(pair)] = list.operands.as_slice() else {
					return Err(invalid());
				};
				if *pair == Pair::Sp {
					return Err(invalid());
				}
				let code = if *pair == Pair::Af { 3 } else { pair.code() };
				let base: u8 = if mnemonic == "PUSH" { 0xC5 } else { 0xC1 };
				self.assemble_opcode(mnemonic, &list, &[base + code * 16])
			},
			"EX" => {
				if self.gameboy {
					return Err(self.unsupported(mnemonic));
				}
				match list.operands.as_slice() {
					[Operand::Pair(Pair::De), Operand::Pair(Pair::Hl)] => Ok(vec![0xEB]),
					[Operand::Pair(Pair::Af), Operand::AfAlternate] => Ok(vec![0x08]),
					[Operand::IndSp, Operand::Pair(Pair::Hl)] => self.assemble_opcode(mnemonic, &list, &[0xE3]),
					_ => Err(invalid()),
				}
			},
			"EXX" => {
				if self.gameboy {
					return Err(self.unsupported(mnemonic));
				}
				Ok(vec![0xD9])
			},
			"IN" => {
				if self.gameboy {
					return Err(self.unsupported(mnemonic));
				}
				match list.operands.as_slice() {
					[Operand::Reg8(7), Operand::IndImm(port)] => Ok(vec![0xDB, Self::check_byte(*port)?]),
					[Operand::Reg8(code), Operand::IndC] => self.extended(mnemonic, 0x40 + code * 8),
					_ => Err(invalid()),
				}
			},
			"OUT" => {
				if self.gameboy {
					return Err(self.unsupported(mnemonic));
				}
				match list.operands.as_slice() {
					[Operand::IndImm(port), Operand::Reg8(7)] => Ok(vec![0xD3, Self::check_byte(*port)?]),
					[Operand::IndC, Operand::Reg8(code)] => self.extended(mnemonic, 0x41 + code * 8),
					_ => Err(invalid()),
				}
			},
			"IM" => {
				let [Operand::Imm(mode)] = list.operands.as_slice() else {
					return Err(invalid());
				};
				let opcode = match mode {
					0 => 0x46,
					1 => 0x56,
					2 => 0x5E,
					_ => return Err(EncodeError::OperandOutOfRange { value: *mode, bits: 2 }),
				};
				self.extended(mnemonic, opcode)
			},
			"NEG" => self.extended(mnemonic, 0x44),
			"RRD" => self.extended(mnemonic, 0x67),
			"RLD" => self.extended(mnemonic, 0x6F),
			"LDI" => self.extended(mnemonic, 0xA0),
			"LDIR" => self.extended(mnemonic, 0xB0),
			"LDD" => self.extended(mnemonic, 0xA8),
			"LDDR" => self.extended(mnemonic, 0xB8),
			"CPI" => self.extended(mnemonic, 0xA1),
			"CPIR" => self.extended(mnemonic, 0xB1),
			"CPD" => self.extended(mnemonic, 0xA9),
			"CPDR" => self.extended(mnemonic, 0xB9),
			"INI" => self.extended(mnemonic, 0xA2),
			"INIR" => self.extended(mnemonic, 0xB2),
			"IND" => self.extended(mnemonic, 0xAA),
			"INDR" => self.extended(mnemonic, 0xBA),
			"OUTI" => self.extended(mnemonic, 0xA3),
			"OTIR" => self.extended(mnemonic, 0xB3),
			"OUTD" => self.extended(mnemonic, 0xAB),
			"OTDR" => self.extended(mnemonic, 0xBB),
			"RLCA" => Ok(vec![0x07]),
			"RRCA" => Ok(vec![0x0F]),
			"RLA" => Ok(vec![0x17]),
			"RRA" => Ok(vec![0x1F]),
			"DAA" => Ok(vec![0x27]),
			"CPL" => Ok(vec![0x2F]),
			"SCF" => Ok(vec![0x37]),
			"CCF" => Ok(vec![0x3F]),
			"NOP" => Ok(vec![0x00]),
			"HALT" => Ok(vec![0x76]),
			"DI" => Ok(vec![0xF3]),
			"EI" => Ok(vec![0xFB]),
			_ => Err(EncodeError::UnknownMnemonic(SharedStr::from(mnemonic))),
		}
	}

	/// Reads a condition code out of an operand that the generic parser saw as a register
	/// (`C`) or a symbol-like token.
	fn condition_of(operand: &Operand, operand_text: &str) -> Option<u8> {
		match operand {
			Operand::Reg8(1) => Some(3),
			Operand::Reg8(_) | Operand::Imm(_) => {
				let first = split_operands(operand_text);
				condition_code(first.first()?.to_uppercase().as_str())
			},
			_ => None,
		}
	}
}

impl CpuBackend for Z80 {
	fn family_name(&self) -> &'static str {
		"Z80"
	}

	fn supported_variants(&self) -> &'static [&'static str] {
		&["z80", "gameboy"]
	}

	fn is_reserved_word(&self, word: &str) -> bool {
		matches!(
			word.to_uppercase().as_str(),
			"A" | "B" | "C" | "D" | "E" | "H" | "L" | "I" | "R" | "AF" | "AF'" | "BC" | "DE" | "HL" | "SP"
				| "IX" | "IY" | "IXH" | "IXL" | "IYH" | "IYL" | "NZ" | "Z" | "NC" | "PO" | "PE" | "P" | "M"
				| "(HL)" | "(BC)" | "(DE)" | "(SP)" | "(C)"
		)
	}

	fn encode(&self, mnemonic: &str, operand: u32, operand_text: &str) -> Result<Vec<u8>, EncodeError> {
		self.encode_instruction(mnemonic, MemoryAddress::from(operand as i32), operand_text)
	}

	fn requires_special_encoding(&self, mnemonic: &str) -> bool {
		matches!(mnemonic, "JR" | "DJNZ")
	}

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
		let (condition, target_text) = match parts.as_slice() {
			[target] => (None, target),
			[condition, target] if mnemonic == "JR" => {
				let code = condition_code(condition.to_uppercase().as_str()).ok_or_else(invalid)?;
				if code > 3 {
					return Err(invalid());
				}
				(Some(code), target)
			},
			_ => return Err(invalid()),
		};
		let target = parse_resolved_number(target_text).ok_or_else(invalid)?;
		let displacement = target - (current_address + 2);

		if mnemonic == "DJNZ" {
			if condition.is_some() {
				return Err(invalid());
			}
			// DJNZ has no flag-preserving long form; out of range is a hard error.
			return if (-128 ..= 127).contains(&displacement) {
				Ok(vec![0x10, (displacement & 0xFF) as u8])
			} else {
				Err(EncodeError::BranchOutOfRange {
					mnemonic: SharedStr::from(mnemonic),
					distance: displacement,
				})
			};
		}

		if (-128 ..= 127).contains(&displacement) {
			let opcode = condition.map_or(0x18, |code| 0x20 + code * 8);
			return Ok(vec![opcode, (displacement & 0xFF) as u8]);
		}
		// Out-of-range relative jumps relax to the absolute form.
		let opcode = condition.map_or(0xC3, |code| 0xC2 + code * 8);
		let mut bytes = vec![opcode];
		push_word(&mut bytes, target);
		Ok(bytes)
	}
}
