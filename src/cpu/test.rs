use super::{split_operands, CpuBackend, CpuType};

fn cpu(kind: CpuType) -> Box<dyn CpuBackend> {
	kind.backend()
}

#[test]
fn operand_splitting() {
	assert_eq!(split_operands("1, 2, 3"), ["1", "2", "3"]);
	assert_eq!(split_operands("($80),Y"), ["($80)", "Y"]);
	assert_eq!(split_operands("(IX+5),B"), ["(IX+5)", "B"]);
	assert_eq!(split_operands("'a','b'"), ["'a'", "'b'"]);
	assert!(split_operands("").is_empty());
}

mod mos6502 {
	use super::*;

	#[test]
	fn basic_modes() {
		let cpu = cpu(CpuType::Mos6502);
		assert_eq!(cpu.encode("LDA", 0x42, "#$42").unwrap(), [0xA9, 0x42]);
		assert_eq!(cpu.encode("LDA", 0x80, "$80").unwrap(), [0xA5, 0x80]);
		assert_eq!(cpu.encode("LDA", 0x1234, "$1234").unwrap(), [0xAD, 0x34, 0x12]);
		assert_eq!(cpu.encode("LDA", 0x1234, "$1234,X").unwrap(), [0xBD, 0x34, 0x12]);
		assert_eq!(cpu.encode("LDA", 0x80, "($80),Y").unwrap(), [0xB1, 0x80]);
		assert_eq!(cpu.encode("LDA", 0x80, "($80,X)").unwrap(), [0xA1, 0x80]);
		assert_eq!(cpu.encode("STA", 0x200, "$0200").unwrap(), [0x8D, 0x00, 0x02]);
		assert_eq!(cpu.encode("JMP", 0x1234, "($1234)").unwrap(), [0x6C, 0x34, 0x12]);
		assert_eq!(cpu.encode("LDX", 0x10, "$10,Y").unwrap(), [0xB6, 0x10]);
		assert_eq!(cpu.encode("NOP", 0, "").unwrap(), [0xEA]);
		assert_eq!(cpu.encode("ASL", 0, "A").unwrap(), [0x0A]);
	}

	#[test]
	fn zero_page_by_value() {
		let cpu = cpu(CpuType::Mos6502);
		// The same operand shape picks zero page or absolute from the resolved value.
		assert_eq!(cpu.encode("LDA", 0x0080, "$0080").unwrap().len(), 2);
		assert_eq!(cpu.encode("LDA", 0x0100, "$0100").unwrap().len(), 3);
	}

	#[test]
	fn unknown_and_invalid() {
		let cpu = cpu(CpuType::Mos6502);
		assert!(cpu.encode("XYZ", 0, "").is_err());
		assert!(cpu.encode("STA", 0, "#$12").is_err());
		// 65C02 modes are rejected on the NMOS part.
		assert!(cpu.encode("LDA", 0x80, "($80)").is_err());
		assert!(cpu.encode("STZ", 0x80, "$80").is_err());
	}

	#[test]
	fn branch_relaxation() {
		let cpu = cpu(CpuType::Mos6502);
		assert!(cpu.requires_special_encoding("BEQ"));
		assert!(!cpu.requires_special_encoding("LDA"));
		// In range: two bytes, displacement from PC+2.
		assert_eq!(cpu.encode_special("BEQ", "$1005", 0x1000).unwrap(), [0xF0, 0x03]);
		// Backwards.
		assert_eq!(cpu.encode_special("BNE", "$0FFE", 0x1000).unwrap(), [0xD0, 0xFC]);
		// Out of range: inverted branch over an absolute jump.
		assert_eq!(cpu.encode_special("BEQ", "$1100", 0x1000).unwrap(), [0xD0, 0x03, 0x4C, 0x00, 0x11]);
		// The complement is always opcode XOR 0x20.
		assert_eq!(cpu.encode_special("BCC", "$1100", 0x1000).unwrap()[0], 0x90 ^ 0x20);
	}

	#[test]
	fn cmos_and_rockwell_extensions() {
		let cpu = cpu(CpuType::Mos65C02);
		assert_eq!(cpu.encode("LDA", 0x80, "($80)").unwrap(), [0xB2, 0x80]);
		assert_eq!(cpu.encode("STZ", 0x80, "$80").unwrap(), [0x64, 0x80]);
		assert_eq!(cpu.encode("PHX", 0, "").unwrap(), [0xDA]);
		assert_eq!(cpu.encode_special("BRA", "$1010", 0x1000).unwrap(), [0x80, 0x0E]);
		// BRA has no complement; it relaxes to a plain JMP.
		assert_eq!(cpu.encode_special("BRA", "$2000", 0x1000).unwrap(), [0x4C, 0x00, 0x20]);

		let rockwell = cpu_with_rockwell();
		assert_eq!(rockwell.encode("RMB3", 0x12, "$12").unwrap(), [0x37, 0x12]);
		assert_eq!(rockwell.encode_special("BBR0", "$12,$1005", 0x1000).unwrap(), [0x0F, 0x12, 0x02]);
	}

	fn cpu_with_rockwell() -> Box<dyn CpuBackend> {
		cpu(CpuType::Mos65C02Rockwell)
	}

	#[test]
	fn w65816_long_modes() {
		let cpu = cpu(CpuType::Mos65816);
		assert_eq!(cpu.encode("LDA", 0x12_3456, "$123456").unwrap(), [0xAF, 0x56, 0x34, 0x12]);
		assert_eq!(cpu.encode("LDA", 0x10, "$10,S").unwrap(), [0xA3, 0x10]);
		assert_eq!(cpu.encode("LDA", 0x10, "[$10]").unwrap(), [0xA7, 0x10]);
		assert_eq!(cpu.encode("JSL", 0x12_3456, "$123456").unwrap(), [0x22, 0x56, 0x34, 0x12]);
		assert_eq!(cpu.encode("REP", 0x30, "#$30").unwrap(), [0xC2, 0x30]);
		// Block move: MVN src,dst emits opcode, dst, src.
		assert_eq!(cpu.encode_special("MVN", "$01,$02", 0x1000).unwrap(), [0x54, 0x02, 0x01]);
		// BRL is 16-bit relative and never rewritten.
		assert_eq!(cpu.encode_special("BRL", "$1103", 0x1000).unwrap(), [0x82, 0x00, 0x01]);
		// MX widens immediates.
		cpu.set_immediate_widths(true, false);
		assert_eq!(cpu.encode("LDA", 0x1234, "#$1234").unwrap(), [0xA9, 0x34, 0x12]);
		assert_eq!(cpu.encode("LDX", 0x12, "#$12").unwrap(), [0xA2, 0x12]);
	}

	#[test]
	fn xc_variant_ladder() {
		let cpu = cpu(CpuType::Mos6502);
		assert!(cpu.encode("PHX", 0, "").is_err());
		cpu.upgrade_variant();
		assert!(cpu.encode("PHX", 0, "").is_ok());
		cpu.upgrade_variant();
		assert!(cpu.encode("XBA", 0, "").is_ok());
	}
}

mod mc6809 {
	use super::*;

	#[test]
	fn big_endian_and_basic_modes() {
		let cpu = cpu(CpuType::Mc6809);
		assert_eq!(cpu.encode("LDA", 0x42, "#$42").unwrap(), [0x86, 0x42]);
		// 16-bit immediates are MSB first.
		assert_eq!(cpu.encode("LDD", 0x1234, "#$1234").unwrap(), [0xCC, 0x12, 0x34]);
		assert_eq!(cpu.encode("LDA", 0x80, "$80").unwrap(), [0x96, 0x80]);
		assert_eq!(cpu.encode("LDA", 0x1234, "$1234").unwrap(), [0xB6, 0x12, 0x34]);
		assert_eq!(cpu.encode("NOP", 0, "").unwrap(), [0x12]);
		assert_eq!(cpu.encode("CLRA", 0, "").unwrap(), [0x4F]);
		// Page-2 opcode.
		assert_eq!(cpu.encode("LDY", 0x1234, "#$1234").unwrap(), [0x10, 0x8E, 0x12, 0x34]);
	}

	#[test]
	fn direct_page_register() {
		let cpu = cpu(CpuType::Mc6809);
		// With DP=$20, $20xx addresses use the short direct form.
		cpu.set_direct_page(0x20);
		assert_eq!(cpu.encode("LDA", 0x2080, "$2080").unwrap(), [0x96, 0x80]);
		assert_eq!(cpu.encode("LDA", 0x0080, "$0080").unwrap(), [0xB6, 0x00, 0x80]);
		cpu.set_direct_page(0);
	}

	#[test]
	fn indexed_post_bytes() {
		let cpu = cpu(CpuType::Mc6809);
		// Zero offset.
		assert_eq!(cpu.encode_special("LDA", ",X", 0).unwrap(), [0xA6, 0x84]);
		// 5-bit offset.
		assert_eq!(cpu.encode_special("LDA", "5,X", 0).unwrap(), [0xA6, 0x05]);
		assert_eq!(cpu.encode_special("LDA", "-5,Y", 0).unwrap(), [0xA6, 0x3B]);
		// 8-bit offset.
		assert_eq!(cpu.encode_special("LDA", "100,X", 0).unwrap(), [0xA6, 0x88, 0x64]);
		// 16-bit offset.
		assert_eq!(cpu.encode_special("LDA", "$1234,X", 0).unwrap(), [0xA6, 0x89, 0x12, 0x34]);
		// Accumulator offsets.
		assert_eq!(cpu.encode_special("LDA", "A,X", 0).unwrap(), [0xA6, 0x86]);
		assert_eq!(cpu.encode_special("LDA", "B,Y", 0).unwrap(), [0xA6, 0x25 | 0x80]);
		assert_eq!(cpu.encode_special("LDA", "D,U", 0).unwrap(), [0xA6, 0xCB]);
		// Auto increment / decrement.
		assert_eq!(cpu.encode_special("LDA", ",X+", 0).unwrap(), [0xA6, 0x80]);
		assert_eq!(cpu.encode_special("LDA", ",X++", 0).unwrap(), [0xA6, 0x81]);
		assert_eq!(cpu.encode_special("LDA", ",-X", 0).unwrap(), [0xA6, 0x82]);
		assert_eq!(cpu.encode_special("LDA", ",--X", 0).unwrap(), [0xA6, 0x83]);
		// Indirect.
		assert_eq!(cpu.encode_special("LDA", "[,X]", 0).unwrap(), [0xA6, 0x94]);
		assert_eq!(cpu.encode_special("LDA", "[$1234]", 0).unwrap(), [0xA6, 0x9F, 0x12, 0x34]);
		// PC relative, short then long; the offset counts from the end of the instruction.
		assert_eq!(cpu.encode_special("LEAX", "$0010,PCR", 0).unwrap(), [0x30, 0x8C, 0x0D]);
		assert_eq!(cpu.encode_special("LEAX", "$1234,PCR", 0).unwrap(), [0x30, 0x8D, 0x12, 0x30]);
	}

	#[test]
	fn register_lists_and_pairs() {
		let cpu = cpu(CpuType::Mc6809);
		assert_eq!(cpu.encode("PSHS", 0, "A,B,X").unwrap(), [0x34, 0x16]);
		assert_eq!(cpu.encode("PULS", 0, "CC,PC").unwrap(), [0x35, 0x81]);
		assert_eq!(cpu.encode("PSHU", 0, "S").unwrap(), [0x36, 0x40]);
		assert_eq!(cpu.encode("TFR", 0, "X,Y").unwrap(), [0x1F, 0x12]);
		assert_eq!(cpu.encode("EXG", 0, "A,B").unwrap(), [0x1E, 0x89]);
		assert!(cpu.encode("PSHS", 0, "Q").is_err());
	}

	#[test]
	fn branch_relaxation_to_long_forms() {
		let cpu = cpu(CpuType::Mc6809);
		assert!(cpu.requires_special_encoding("BEQ"));
		assert_eq!(cpu.encode_special("BEQ", "$1005", 0x1000).unwrap(), [0x27, 0x03]);
		// Out of range: page-prefixed long branch with a 16-bit displacement.
		assert_eq!(cpu.encode_special("BEQ", "$2000", 0x1000).unwrap(), [0x10, 0x27, 0x0F, 0xFC]);
		// BRA relaxes to the native LBRA.
		assert_eq!(cpu.encode_special("BRA", "$2000", 0x1000).unwrap(), [0x16, 0x0F, 0xFD]);
		// Explicit long branches always take the long form.
		assert_eq!(cpu.encode_special("LBEQ", "$1005", 0x1000).unwrap(), [0x10, 0x27, 0x00, 0x01]);
		assert_eq!(cpu.encode_special("LBRA", "$1005", 0x1000).unwrap(), [0x16, 0x00, 0x02]);
	}
}

mod z80 {
	use super::*;

	#[test]
	fn load_group() {
		let cpu = cpu(CpuType::Z80);
		assert_eq!(cpu.encode("LD", 0x42, "A,$42").unwrap(), [0x3E, 0x42]);
		assert_eq!(cpu.encode("LD", 0, "B,C").unwrap(), [0x41]);
		assert_eq!(cpu.encode("LD", 0, "A,(HL)").unwrap(), [0x7E]);
		assert_eq!(cpu.encode("LD", 0, "(HL),A").unwrap(), [0x77]);
		// Little-endian 16-bit immediate.
		assert_eq!(cpu.encode("LD", 0x1234, "BC,$1234").unwrap(), [0x01, 0x34, 0x12]);
		assert_eq!(cpu.encode("LD", 0x4000, "IX,$4000").unwrap(), [0xDD, 0x21, 0x00, 0x40]);
		assert_eq!(cpu.encode("LD", 0x1234, "A,($1234)").unwrap(), [0x3A, 0x34, 0x12]);
		assert_eq!(cpu.encode("LD", 0x1234, "($1234),HL").unwrap(), [0x22, 0x34, 0x12]);
		assert_eq!(cpu.encode("LD", 0x1234, "BC,($1234)").unwrap(), [0xED, 0x4B, 0x34, 0x12]);
		assert_eq!(cpu.encode("LD", 5, "(IX+5),B").unwrap(), [0xDD, 0x70, 0x05]);
		assert_eq!(cpu.encode("LD", 0, "A,I").unwrap(), [0xED, 0x57]);
		assert_eq!(cpu.encode("LD", 0, "SP,HL").unwrap(), [0xF9]);
	}

	#[test]
	fn arithmetic_group() {
		let cpu = cpu(CpuType::Z80);
		assert_eq!(cpu.encode("ADD", 0, "A,B").unwrap(), [0x80]);
		assert_eq!(cpu.encode("ADD", 0x10, "A,$10").unwrap(), [0xC6, 0x10]);
		assert_eq!(cpu.encode("SUB", 0, "(HL)").unwrap(), [0x96]);
		assert_eq!(cpu.encode("AND", 0, "A").unwrap(), [0xA7]);
		assert_eq!(cpu.encode("CP", 0x2F, "$2F").unwrap(), [0xFE, 0x2F]);
		assert_eq!(cpu.encode("ADD", 0, "HL,DE").unwrap(), [0x19]);
		assert_eq!(cpu.encode("SBC", 0, "HL,BC").unwrap(), [0xED, 0x42]);
		assert_eq!(cpu.encode("INC", 0, "HL").unwrap(), [0x23]);
		assert_eq!(cpu.encode("DEC", 0, "(HL)").unwrap(), [0x35]);
		assert_eq!(cpu.encode("INC", 3, "(IX+3)").unwrap(), [0xDD, 0x34, 0x03]);
	}

	#[test]
	fn bit_and_rotate_group() {
		let cpu = cpu(CpuType::Z80);
		assert_eq!(cpu.encode("BIT", 0, "0,A").unwrap(), [0xCB, 0x47]);
		assert_eq!(cpu.encode("SET", 7, "7,(HL)").unwrap(), [0xCB, 0xFE]);
		assert_eq!(cpu.encode("RES", 1, "1,B").unwrap(), [0xCB, 0x88]);
		assert_eq!(cpu.encode("RLC", 0, "C").unwrap(), [0xCB, 0x01]);
		assert_eq!(cpu.encode("SRL", 0, "(HL)").unwrap(), [0xCB, 0x3E]);
		// Indexed bit operations interleave the displacement before the sub-opcode.
		assert_eq!(cpu.encode("BIT", 2, "2,(IY+2)").unwrap(), [0xFD, 0xCB, 0x02, 0x56]);
		assert_eq!(cpu.encode("RLCA", 0, "").unwrap(), [0x07]);
	}

	#[test]
	fn jump_and_call_group() {
		let cpu = cpu(CpuType::Z80);
		assert_eq!(cpu.encode("JP", 0x8000, "8000H").unwrap(), [0xC3, 0x00, 0x80]);
		assert_eq!(cpu.encode("JP", 0x8000, "NZ,8000H").unwrap(), [0xC2, 0x00, 0x80]);
		assert_eq!(cpu.encode("JP", 0x8000, "C,8000H").unwrap(), [0xDA, 0x00, 0x80]);
		assert_eq!(cpu.encode("JP", 0, "(HL)").unwrap(), [0xE9]);
		assert_eq!(cpu.encode("CALL", 0x1234, "$1234").unwrap(), [0xCD, 0x34, 0x12]);
		assert_eq!(cpu.encode("CALL", 0x1234, "PO,$1234").unwrap(), [0xE4, 0x34, 0x12]);
		assert_eq!(cpu.encode("RET", 0, "").unwrap(), [0xC9]);
		assert_eq!(cpu.encode("RET", 0, "Z").unwrap(), [0xC8]);
		assert_eq!(cpu.encode("RST", 0x18, "18H").unwrap(), [0xDF]);
		assert_eq!(cpu.encode("PUSH", 0, "AF").unwrap(), [0xF5]);
		assert_eq!(cpu.encode("POP", 0, "IY").unwrap(), [0xFD, 0xE1]);
	}

	#[test]
	fn relative_jump_relaxation() {
		let cpu = cpu(CpuType::Z80);
		assert!(cpu.requires_special_encoding("JR"));
		assert!(cpu.requires_special_encoding("DJNZ"));
		assert_eq!(cpu.encode_special("JR", "$8005", 0x8000).unwrap(), [0x18, 0x03]);
		assert_eq!(cpu.encode_special("JR", "NZ,$8005", 0x8000).unwrap(), [0x20, 0x03]);
		// Out of range relaxes to the absolute jump.
		assert_eq!(cpu.encode_special("JR", "$9000", 0x8000).unwrap(), [0xC3, 0x00, 0x90]);
		assert_eq!(cpu.encode_special("JR", "Z,$9000", 0x8000).unwrap(), [0xCA, 0x00, 0x90]);
		// DJNZ cannot be rewritten without clobbering flags.
		assert_eq!(cpu.encode_special("DJNZ", "$8000", 0x8005).unwrap(), [0x10, 0xF9]);
		assert!(cpu.encode_special("DJNZ", "$9000", 0x8000).is_err());
	}

	#[test]
	fn extended_and_io_group() {
		let cpu = cpu(CpuType::Z80);
		assert_eq!(cpu.encode("LDIR", 0, "").unwrap(), [0xED, 0xB0]);
		assert_eq!(cpu.encode("CPIR", 0, "").unwrap(), [0xED, 0xB1]);
		assert_eq!(cpu.encode("NEG", 0, "").unwrap(), [0xED, 0x44]);
		assert_eq!(cpu.encode("IM", 2, "2").unwrap(), [0xED, 0x5E]);
		assert_eq!(cpu.encode("IN", 0xFE, "A,($FE)").unwrap(), [0xDB, 0xFE]);
		assert_eq!(cpu.encode("IN", 0, "B,(C)").unwrap(), [0xED, 0x40]);
		assert_eq!(cpu.encode("OUT", 0xFE, "($FE),A").unwrap(), [0xD3, 0xFE]);
		assert_eq!(cpu.encode("EX", 0, "DE,HL").unwrap(), [0xEB]);
		assert_eq!(cpu.encode("EX", 0, "AF,AF'").unwrap(), [0x08]);
		assert_eq!(cpu.encode("EXX", 0, "").unwrap(), [0xD9]);
	}

	#[test]
	fn gameboy_restrictions() {
		let cpu = cpu(CpuType::GameBoy);
		assert_eq!(cpu.encode("LD", 0x42, "A,$42").unwrap(), [0x3E, 0x42]);
		assert!(cpu.encode("LD", 0x4000, "IX,$4000").is_err());
		assert!(cpu.encode("LDIR", 0, "").is_err());
		assert!(cpu.encode("IN", 0xFE, "A,($FE)").is_err());
		assert!(cpu.encode("EXX", 0, "").is_err());
	}
}
