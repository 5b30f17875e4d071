//! Motorola 6809 back-end: big-endian emission, post-byte indexed addressing, long branches.

use std::cell::Cell;

use byteorder::{BigEndian, ByteOrder};
use flexstr::SharedStr;

use super::{parse_resolved_number, split_operands, CpuBackend, EncodeError};
use crate::common::MemoryAddress;

/// One opcode row: the four standard addressing-mode encodings plus the immediate width.
/// Opcodes above `0xFF` carry their page prefix (`0x10` or `0x11`) in the high byte.
#[derive(Clone, Copy, Debug)]
struct OpcodeRow {
	immediate: Option<u16>,
	direct:    Option<u16>,
	indexed:   Option<u16>,
	extended:  Option<u16>,
	immediate_width: usize,
}

const fn row(
	immediate: Option<u16>,
	direct: Option<u16>,
	indexed: Option<u16>,
	extended: Option<u16>,
	immediate_width: usize,
) -> OpcodeRow {
	OpcodeRow { immediate, direct, indexed, extended, immediate_width }
}

#[allow(clippy::too_many_lines)]
fn opcode_row(mnemonic: &str) -> Option<OpcodeRow> {
	Some(match mnemonic {
		// Loads and stores
		"LDA" => row(Some(0x86), Some(0x96), Some(0xA6), Some(0xB6), 1),
		"LDB" => row(Some(0xC6), Some(0xD6), Some(0xE6), Some(0xF6), 1),
		"LDD" => row(Some(0xCC), Some(0xDC), Some(0xEC), Some(0xFC), 2),
		"LDX" => row(Some(0x8E), Some(0x9E), Some(0xAE), Some(0xBE), 2),
		"LDY" => row(Some(0x108E), Some(0x109E), Some(0x10AE), Some(0x10BE), 2),
		"LDU" => row(Some(0xCE), Some(0xDE), Some(0xEE), Some(0xFE), 2),
		"LDS" => row(Some(0x10CE), Some(0x10DE), Some(0x10EE), Some(0x10FE), 2),
		"STA" => row(None, Some(0x97), Some(0xA7), Some(0xB7), 1),
		"STB" => row(None, Some(0xD7), Some(0xE7), Some(0xF7), 1),
		"STD" => row(None, Some(0xDD), Some(0xED), Some(0xFD), 2),
		"STX" => row(None, Some(0x9F), Some(0xAF), Some(0xBF), 2),
		"STY" => row(None, Some(0x109F), Some(0x10AF), Some(0x10BF), 2),
		"STU" => row(None, Some(0xDF), Some(0xEF), Some(0xFF), 2),
		"STS" => row(None, Some(0x10DF), Some(0x10EF), Some(0x10FF), 2),
		// Arithmetic and logic
		"ADDA" => row(Some(0x8B), Some(0x9B), Some(0xAB), Some(0xBB), 1),
		"ADDB" => row(Some(0xCB), Some(0xDB), Some(0xEB), Some(0xFB), 1),
		"ADDD" => row(Some(0xC3), Some(0xD3), Some(0xE3), Some(0xF3), 2),
		"ADCA" => row(Some(0x89), Some(0x99), Some(0xA9), Some(0xB9), 1),
		"ADCB" => row(Some(0xC9), Some(0xD9), Some(0xE9), Some(0xF9), 1),
		"SUBA" => row(Some(0x80), Some(0x90), Some(0xA0), Some(0xB0), 1),
		"SUBB" => row(Some(0xC0), Some(0xD0), Some(0xE0), Some(0xF0), 1),
		"SUBD" => row(Some(0x83), Some(0x93), Some(0xA3), Some(0xB3), 2),
		"SBCA" => row(Some(0x82), Some(0x92), Some(0xA2), Some(0xB2), 1),
		"SBCB" => row(Some(0xC2), Some(0xD2), Some(0xE2), Some(0xF2), 1),
		"CMPA" => row(Some(0x81), Some(0x91), Some(0xA1), Some(0xB1), 1),
		"CMPB" => row(Some(0xC1), Some(0xD1), Some(0xE1), Some(0xF1), 1),
		"CMPD" => row(Some(0x1083), Some(0x1093), Some(0x10A3), Some(0x10B3), 2),
		"CMPX" => row(Some(0x8C), Some(0x9C), Some(0xAC), Some(0xBC), 2),
		"CMPY" => row(Some(0x108C), Some(0x109C), Some(0x10AC), Some(0x10BC), 2),
		"CMPU" => row(Some(0x1183), Some(0x1193), Some(0x11A3), Some(0x11B3), 2),
		"CMPS" => row(Some(0x118C), Some(0x119C), Some(0x11AC), Some(0x11BC), 2),
		"ANDA" => row(Some(0x84), Some(0x94), Some(0xA4), Some(0xB4), 1),
		"ANDB" => row(Some(0xC4), Some(0xD4), Some(0xE4), Some(0xF4), 1),
		"ORA" => row(Some(0x8A), Some(0x9A), Some(0xAA), Some(0xBA), 1),
		"ORB" => row(Some(0xCA), Some(0xDA), Some(0xEA), Some(0xFA), 1),
		"EORA" => row(Some(0x88), Some(0x98), Some(0xA8), Some(0xB8), 1),
		"EORB" => row(Some(0xC8), Some(0xD8), Some(0xE8), Some(0xF8), 1),
		"BITA" => row(Some(0x85), Some(0x95), Some(0xA5), Some(0xB5), 1),
		"BITB" => row(Some(0xC5), Some(0xD5), Some(0xE5), Some(0xF5), 1),
		// Read-modify-write memory forms
		"NEG" => row(None, Some(0x00), Some(0x60), Some(0x70), 1),
		"COM" => row(None, Some(0x03), Some(0x63), Some(0x73), 1),
		"LSR" => row(None, Some(0x04), Some(0x64), Some(0x74), 1),
		"ROR" => row(None, Some(0x06), Some(0x66), Some(0x76), 1),
		"ASR" => row(None, Some(0x07), Some(0x67), Some(0x77), 1),
		"ASL" | "LSL" => row(None, Some(0x08), Some(0x68), Some(0x78), 1),
		"ROL" => row(None, Some(0x09), Some(0x69), Some(0x79), 1),
		"DEC" => row(None, Some(0x0A), Some(0x6A), Some(0x7A), 1),
		"INC" => row(None, Some(0x0C), Some(0x6C), Some(0x7C), 1),
		"TST" => row(None, Some(0x0D), Some(0x6D), Some(0x7D), 1),
		"JMP" => row(None, Some(0x0E), Some(0x6E), Some(0x7E), 1),
		"CLR" => row(None, Some(0x0F), Some(0x6F), Some(0x7F), 1),
		"JSR" => row(None, Some(0x9D), Some(0xAD), Some(0xBD), 1),
		// Effective-address loads (indexed only)
		"LEAX" => row(None, None, Some(0x30), None, 1),
		"LEAY" => row(None, None, Some(0x31), None, 1),
		"LEAS" => row(None, None, Some(0x32), None, 1),
		"LEAU" => row(None, None, Some(0x33), None, 1),
		// Condition-code immediates
		"ANDCC" => row(Some(0x1C), None, None, None, 1),
		"ORCC" => row(Some(0x1A), None, None, None, 1),
		"CWAI" => row(Some(0x3C), None, None, None, 1),
		_ => return None,
	})
}

fn inherent_opcode(mnemonic: &str) -> Option<u16> {
	Some(match mnemonic {
		"NOP" => 0x12,
		"SYNC" => 0x13,
		"DAA" => 0x19,
		"SEX" => 0x1D,
		"RTS" => 0x39,
		"ABX" => 0x3A,
		"RTI" => 0x3B,
		"MUL" => 0x3D,
		"SWI" => 0x3F,
		"SWI2" => 0x103F,
		"SWI3" => 0x113F,
		"NEGA" => 0x40,
		"COMA" => 0x43,
		"LSRA" => 0x44,
		"RORA" => 0x46,
		"ASRA" => 0x47,
		"ASLA" | "LSLA" => 0x48,
		"ROLA" => 0x49,
		"DECA" => 0x4A,
		"INCA" => 0x4C,
		"TSTA" => 0x4D,
		"CLRA" => 0x4F,
		"NEGB" => 0x50,
		"COMB" => 0x53,
		"LSRB" => 0x54,
		"RORB" => 0x56,
		"ASRB" => 0x57,
		"ASLB" | "LSLB" => 0x58,
		"ROLB" => 0x59,
		"DECB" => 0x5A,
		"INCB" => 0x5C,
		"TSTB" => 0x5D,
		"CLRB" => 0x5F,
		_ => return None,
	})
}

/// Short-branch opcodes; the long form is the same opcode behind a `0x10` page prefix, except for
/// BRA/BSR which have native long opcodes.
fn branch_opcode(mnemonic: &str) -> Option<u8> {
	Some(match mnemonic {
		"BRA" => 0x20,
		"BRN" => 0x21,
		"BHI" => 0x22,
		"BLS" => 0x23,
		"BCC" | "BHS" => 0x24,
		"BCS" | "BLO" => 0x25,
		"BNE" => 0x26,
		"BEQ" => 0x27,
		"BVC" => 0x28,
		"BVS" => 0x29,
		"BPL" => 0x2A,
		"BMI" => 0x2B,
		"BGE" => 0x2C,
		"BLT" => 0x2D,
		"BGT" => 0x2E,
		"BLE" => 0x2F,
		"BSR" => 0x8D,
		_ => return None,
	})
}

/// Index-register field of the indexed post-byte, bits 6-5.
fn index_register_bits(register: &str) -> Option<u8> {
	Some(match register {
		"X" => 0b00,
		"Y" => 0b01,
		"U" => 0b10,
		"S" => 0b11,
		_ => return None,
	})
}

/// Register numbers for TFR/EXG post-byte nibbles.
fn transfer_register_code(register: &str) -> Option<u8> {
	Some(match register {
		"D" => 0x0,
		"X" => 0x1,
		"Y" => 0x2,
		"U" => 0x3,
		"S" => 0x4,
		"PC" => 0x5,
		"A" => 0x8,
		"B" => 0x9,
		"CC" => 0xA,
		"DP" => 0xB,
		_ => return None,
	})
}

/// Register bits for PSHS/PULS/PSHU/PULU post-bytes.
fn stack_register_bit(register: &str, user_stack: bool) -> Option<u8> {
	Some(match register {
		"CC" => 0x01,
		"A" => 0x02,
		"B" => 0x04,
		"D" => 0x06,
		"DP" => 0x08,
		"X" => 0x10,
		"Y" => 0x20,
		"S" if user_stack => 0x40,
		"U" if !user_stack => 0x40,
		"PC" => 0x80,
		_ => return None,
	})
}

fn push_opcode(bytes: &mut Vec<u8>, opcode: u16) {
	if opcode > 0xFF {
		bytes.push((opcode >> 8) as u8);
	}
	bytes.push((opcode & 0xFF) as u8);
}

fn push_word(bytes: &mut Vec<u8>, value: u16) {
	let mut buffer = [0_u8; 2];
	BigEndian::write_u16(&mut buffer, value);
	bytes.extend_from_slice(&buffer);
}

/// The Motorola 6809 encoder. The direct-page register lives in a cell so the `SETDP` directive
/// can change it through the shared back-end reference.
#[derive(Debug)]
pub struct Mc6809 {
	direct_page: Cell<u8>,
}

impl Mc6809 {
	/// Creates a 6809 back-end with the direct page at `$00`.
	#[must_use]
	pub fn new() -> Self {
		Self { direct_page: Cell::new(0) }
	}

	/// Encodes the indexed post-byte (and trailing offset bytes) for an operand of the form
	/// `offset,R`, `,R+`, `,--R`, `A,R`, `n,PCR`, `[...]` or `[nnnn]`.
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	fn encode_indexed(
		&self,
		mnemonic: &str,
		operand: &str,
		offset_value: MemoryAddress,
		current_address: Option<MemoryAddress>,
		instruction_length_so_far: usize,
	) -> Result<Vec<u8>, EncodeError> {
		let invalid = || EncodeError::InvalidAddressingMode {
			mnemonic: SharedStr::from(mnemonic),
			operand:  SharedStr::from(operand),
		};
		let mut text = operand.trim().to_uppercase();
		let indirect = text.starts_with('[') && text.ends_with(']');
		if indirect {
			text = text[1 .. text.len() - 1].trim().to_owned();
		}
		let indirect_bit = if indirect { 0x10 } else { 0x00 };

		let Some(comma) = text.rfind(',') else {
			// `[nnnn]`: extended indirect.
			if indirect {
				let mut bytes = vec![0x9F];
				push_word(&mut bytes, (offset_value & 0xFFFF) as u16);
				return Ok(bytes);
			}
			return Err(invalid());
		};
		let (offset_text, register_text) = text.split_at(comma);
		let offset_text = offset_text.trim();
		let register_text = register_text[1 ..].trim();

		// Auto increment/decrement forms.
		if let Some(register) = register_text.strip_suffix("++") {
			let bits = index_register_bits(register).ok_or_else(invalid)?;
			return Ok(vec![0x80 | (bits << 5) | 0x01 | indirect_bit]);
		}
		if let Some(register) = register_text.strip_suffix('+') {
			if indirect {
				return Err(invalid());
			}
			let bits = index_register_bits(register).ok_or_else(invalid)?;
			return Ok(vec![0x80 | (bits << 5)]);
		}
		if let Some(register) = register_text.strip_prefix("--") {
			let bits = index_register_bits(register).ok_or_else(invalid)?;
			return Ok(vec![0x80 | (bits << 5) | 0x03 | indirect_bit]);
		}
		if let Some(register) = register_text.strip_prefix('-') {
			if indirect {
				return Err(invalid());
			}
			let bits = index_register_bits(register).ok_or_else(invalid)?;
			return Ok(vec![0x80 | (bits << 5) | 0x02]);
		}

		// PC-relative: the offset counts from the end of the instruction.
		if register_text == "PCR" || register_text == "PC" {
			let target = offset_value;
			let Some(address) = current_address else {
				return Err(invalid());
			};
			let short_end = address + instruction_length_so_far as MemoryAddress + 2;
			let short_offset = target - short_end;
			if (-128 ..= 127).contains(&short_offset) {
				return Ok(vec![0x8C | indirect_bit, (short_offset & 0xFF) as u8]);
			}
			let long_offset = target - (short_end + 1);
			let mut bytes = vec![0x8D | indirect_bit];
			push_word(&mut bytes, (long_offset & 0xFFFF) as u16);
			return Ok(bytes);
		}

		let register_bits = index_register_bits(register_text).ok_or_else(|| {
			EncodeError::UnknownRegister(SharedStr::from(register_text))
		})?;
		let register_field = register_bits << 5;

		// Accumulator offsets.
		match offset_text {
			"A" => return Ok(vec![0x86 | register_field | indirect_bit]),
			"B" => return Ok(vec![0x85 | register_field | indirect_bit]),
			"D" => return Ok(vec![0x8B | register_field | indirect_bit]),
			_ => {},
		}

		// Constant offsets: zero, 5-bit, 8-bit or 16-bit.
		let offset = if offset_text.is_empty() { 0 } else { offset_value };
		if offset == 0 {
			return Ok(vec![0x84 | register_field | indirect_bit]);
		}
		if (-16 ..= 15).contains(&offset) && !indirect {
			return Ok(vec![register_field | ((offset & 0x1F) as u8)]);
		}
		if (-128 ..= 127).contains(&offset) {
			return Ok(vec![0x88 | register_field | indirect_bit, (offset & 0xFF) as u8]);
		}
		let mut bytes = vec![0x89 | register_field | indirect_bit];
		push_word(&mut bytes, (offset & 0xFFFF) as u16);
		Ok(bytes)
	}

	/// Detects the operand shape and encodes against the row. `current_address` is available on
	/// the special path and enables PC-relative indexing.
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	fn encode_with_address(
		&self,
		mnemonic: &str,
		operand_value: MemoryAddress,
		operand_text: &str,
		current_address: Option<MemoryAddress>,
	) -> Result<Vec<u8>, EncodeError> {
		let text = operand_text.trim();
		let invalid = || EncodeError::InvalidAddressingMode {
			mnemonic: SharedStr::from(mnemonic),
			operand:  SharedStr::from(text),
		};

		if let Some(opcode) = inherent_opcode(mnemonic) {
			let mut bytes = Vec::with_capacity(2);
			push_opcode(&mut bytes, opcode);
			return Ok(bytes);
		}

		// Register-list and register-pair instructions.
		match mnemonic {
			"PSHS" | "PULS" | "PSHU" | "PULU" => {
				let user_stack = mnemonic.ends_with('U');
				let opcode = match mnemonic {
					"PSHS" => 0x34,
					"PULS" => 0x35,
					"PSHU" => 0x36,
					_ => 0x37,
				};
				let mut post_byte = 0_u8;
				for register in split_operands(text) {
					let bit = stack_register_bit(&register.to_uppercase(), user_stack)
						.ok_or_else(|| EncodeError::UnknownRegister(SharedStr::from(register.as_str())))?;
					post_byte |= bit;
				}
				return Ok(vec![opcode, post_byte]);
			},
			"TFR" | "EXG" => {
				let parts = split_operands(text);
				let [source, destination] = parts.as_slice() else {
					return Err(invalid());
				};
				let source_code = transfer_register_code(&source.to_uppercase())
					.ok_or_else(|| EncodeError::UnknownRegister(SharedStr::from(source.as_str())))?;
				let destination_code = transfer_register_code(&destination.to_uppercase())
					.ok_or_else(|| EncodeError::UnknownRegister(SharedStr::from(destination.as_str())))?;
				let opcode = if mnemonic == "TFR" { 0x1F } else { 0x1E };
				return Ok(vec![opcode, (source_code << 4) | destination_code]);
			},
			_ => {},
		}

		let row = opcode_row(mnemonic).ok_or_else(|| EncodeError::UnknownMnemonic(SharedStr::from(mnemonic)))?;

		// Immediate.
		if let Some(rest) = text.strip_prefix('#') {
			let _ = rest;
			let opcode = row.immediate.ok_or_else(invalid)?;
			let mut bytes = Vec::with_capacity(4);
			push_opcode(&mut bytes, opcode);
			if row.immediate_width == 2 {
				push_word(&mut bytes, (operand_value & 0xFFFF) as u16);
			} else {
				let signed = operand_value;
				if !(-128 ..= 255).contains(&signed) {
					return Err(EncodeError::OperandOutOfRange { value: signed, bits: 8 });
				}
				bytes.push((operand_value & 0xFF) as u8);
			}
			return Ok(bytes);
		}

		// Indexed (anything with a comma or square brackets).
		if text.contains(',') || text.starts_with('[') {
			let opcode = row.indexed.ok_or_else(invalid)?;
			let mut bytes = Vec::with_capacity(5);
			push_opcode(&mut bytes, opcode);
			let length_so_far = bytes.len();
			let postbytes =
				self.encode_indexed(mnemonic, text, operand_value, current_address, length_so_far)?;
			bytes.extend_from_slice(&postbytes);
			return Ok(bytes);
		}

		// Forced direct / extended, otherwise decided by the direct-page register.
		let (forced_direct, forced_extended, stripped) = match text.chars().next() {
			Some('<') => (true, false, text[1 ..].trim()),
			Some('>') => (false, true, text[1 ..].trim()),
			_ => (false, false, text),
		};
		let _ = stripped;
		let address = operand_value & 0xFFFF;
		let page = ((address >> 8) & 0xFF) as u8;
		let use_direct = if forced_direct {
			true
		} else if forced_extended {
			false
		} else {
			page == self.direct_page.get() && row.direct.is_some()
		};
		if use_direct {
			let opcode = row.direct.ok_or_else(invalid)?;
			let mut bytes = Vec::with_capacity(3);
			push_opcode(&mut bytes, opcode);
			bytes.push((address & 0xFF) as u8);
			return Ok(bytes);
		}
		let opcode = row.extended.ok_or_else(invalid)?;
		let mut bytes = Vec::with_capacity(4);
		push_opcode(&mut bytes, opcode);
		push_word(&mut bytes, address as u16);
		Ok(bytes)
	}
}

impl Default for Mc6809 {
	fn default() -> Self {
		Self::new()
	}
}

impl CpuBackend for Mc6809 {
	fn family_name(&self) -> &'static str {
		"6809"
	}

	fn supported_variants(&self) -> &'static [&'static str] {
		&["6809"]
	}

	fn is_reserved_word(&self, word: &str) -> bool {
		matches!(
			word.to_uppercase().as_str(),
			"A" | "B" | "D" | "X" | "Y" | "U" | "S" | "CC" | "DP" | "PC" | "PCR"
		)
	}

	fn set_direct_page(&self, page: u8) {
		self.direct_page.set(page);
	}

	fn encode(&self, mnemonic: &str, operand: u32, operand_text: &str) -> Result<Vec<u8>, EncodeError> {
		self.encode_with_address(mnemonic, MemoryAddress::from(operand as i32), operand_text, None)
	}

	/// Branches need the current address, and so does anything indexable because of `n,PCR`.
	fn requires_special_encoding(&self, mnemonic: &str) -> bool {
		branch_opcode(mnemonic).is_some()
			|| mnemonic.strip_prefix("LB").map_or(false, |rest| branch_opcode(&format!("B{rest}")).is_some())
			|| matches!(mnemonic, "LBRA" | "LBSR")
			|| opcode_row(mnemonic).is_some_and(|row| row.indexed.is_some())
	}

	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	fn encode_special(
		&self,
		mnemonic: &str,
		operand_text: &str,
		current_address: MemoryAddress,
	) -> Result<Vec<u8>, EncodeError> {
		let text = operand_text.trim();

		// Long branches written explicitly.
		if let Some(short) = mnemonic.strip_prefix("LB").map(|rest| format!("B{rest}")) {
			if let Some(short_opcode) = branch_opcode(&short) {
				let target = parse_resolved_number(text).unwrap_or(0);
				let (opcode, length): (u16, MemoryAddress) = match mnemonic {
					"LBRA" => (0x16, 3),
					"LBSR" => (0x17, 3),
					_ => (0x1000 | u16::from(short_opcode), 4),
				};
				let displacement = target - (current_address + length);
				let mut bytes = Vec::with_capacity(4);
				push_opcode(&mut bytes, opcode);
				push_word(&mut bytes, (displacement & 0xFFFF) as u16);
				return Ok(bytes);
			}
		}

		// Short branches relax to the page-prefixed long form when out of range.
		if let Some(opcode) = branch_opcode(mnemonic) {
			let target = parse_resolved_number(text).unwrap_or(0);
			let displacement = target - (current_address + 2);
			if (-128 ..= 127).contains(&displacement) {
				return Ok(vec![opcode, (displacement & 0xFF) as u8]);
			}
			let (long_opcode, length): (u16, MemoryAddress) = match mnemonic {
				"BRA" => (0x16, 3),
				"BSR" => (0x17, 3),
				_ => (0x1000 | u16::from(opcode), 4),
			};
			let long_displacement = target - (current_address + length);
			let mut bytes = Vec::with_capacity(4);
			push_opcode(&mut bytes, long_opcode);
			push_word(&mut bytes, (long_displacement & 0xFFFF) as u16);
			return Ok(bytes);
		}

		// Indexed-capable instructions come through here so `n,PCR` can see the address.
		let first = split_operands(text);
		let value = first.first().and_then(|part| {
			let inner = part.trim().trim_start_matches(['#', '<', '>', '[']).trim_end_matches(']');
			parse_resolved_number(inner)
		});
		self.encode_with_address(mnemonic, value.unwrap_or(0), text, Some(current_address))
	}
}
