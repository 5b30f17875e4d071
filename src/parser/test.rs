use super::*;
use crate::atom::AtomKind;
use crate::cpu::CpuType;
use crate::expression::{GenericNumberFormat, MerlinNumberFormat, ScmasmNumberFormat, Z80NumberFormat};
use crate::options::AssemblerOptions;
use crate::symbol::SymbolKind;

fn parse_simple(source: &str) -> ParseOutput {
	let code = AssemblyCode::new(source, "<test>");
	let options = AssemblerOptions::for_target(CpuType::Mos6502, Syntax::Simple);
	let cpu = CpuType::Mos6502.backend();
	simple::parse(&code, &options, &*cpu, &GenericNumberFormat)
}

fn parse_merlin(source: &str) -> ParseOutput {
	let code = AssemblyCode::new(source, "<test>");
	let options = AssemblerOptions::for_target(CpuType::Mos6502, Syntax::Merlin);
	let cpu = CpuType::Mos6502.backend();
	merlin::parse(&code, &options, &*cpu, &MerlinNumberFormat)
}

fn parse_scmasm(source: &str) -> ParseOutput {
	let code = AssemblyCode::new(source, "<test>");
	let options = AssemblerOptions::for_target(CpuType::Mos6502, Syntax::Scmasm);
	let cpu = CpuType::Mos6502.backend();
	scmasm::parse(&code, &options, &*cpu, &ScmasmNumberFormat)
}

fn parse_edtasm(source: &str) -> ParseOutput {
	let code = AssemblyCode::new(source, "<test>");
	let options = AssemblerOptions::for_target(CpuType::Z80, Syntax::Edtasm);
	let cpu = CpuType::Z80.backend();
	let format = Z80NumberFormat::default();
	edtasm::parse(&code, &options, &*cpu, &format)
}

fn atom_kinds(output: &ParseOutput) -> Vec<&AtomKind> {
	output.sections[0].atoms.iter().map(|atom| &atom.kind).collect()
}

fn data_bytes(output: &ParseOutput) -> Vec<u8> {
	output.sections[0]
		.atoms
		.iter()
		.filter_map(|atom| match &atom.kind {
			AtomKind::Data(data) => Some(data.bytes.clone()),
			_ => None,
		})
		.flatten()
		.collect()
}

#[test]
fn simple_atoms_in_source_order() {
	let output = parse_simple("start:\n\t.org $1000\nstart2:\tlda #$42\n\t.db 1,2\n\t.ds 4\n");
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	let kinds = atom_kinds(&output);
	assert!(matches!(kinds[0], AtomKind::Label { .. }));
	assert!(matches!(kinds[1], AtomKind::Org { address: 0x1000 }));
	assert!(matches!(kinds[2], AtomKind::Label { .. }));
	assert!(matches!(kinds[3], AtomKind::Instruction { .. }));
	assert!(matches!(kinds[4], AtomKind::Data(_)));
	assert!(matches!(kinds[5], AtomKind::Space { count: 4 }));
}

#[test]
fn simple_equates_and_sets() {
	let output = parse_simple("value .equ 40+2\ncounter .set 1\ncounter .set 2\n");
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	assert_eq!(output.symbols.get("value").map(|symbol| symbol.kind), Some(SymbolKind::Equate));
	assert!(output.symbols.get("counter").is_some());
	// Redefining the equate is an error.
	let failing = parse_simple("value .equ 1\nvalue .equ 2\n");
	assert!(!failing.errors.is_empty());
}

#[test]
fn simple_conditionals_gate_lines() {
	let output = parse_simple("\t.if 0\n\t.db $AA\n\t.else\n\t.db $BB\n\t.endif\n");
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	let data: Vec<_> = output.sections[0]
		.atoms
		.iter()
		.filter(|atom| matches!(atom.kind, AtomKind::Data(_)))
		.collect();
	assert_eq!(data.len(), 1);
}

#[test]
fn simple_macro_definition_and_expansion() {
	let source = "twice MACRO what\n\t.db what\n\t.db what\n\tENDM\n\ttwice 7\n";
	let output = parse_simple(source);
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	let data_count =
		output.sections[0].atoms.iter().filter(|atom| matches!(atom.kind, AtomKind::Data(_))).count();
	assert_eq!(data_count, 2);
}

#[test]
fn merlin_locals_and_variables() {
	let source = "START\tLDA #$01\n:LOOP\tDEC $20\n\tBNE :LOOP\n]V\tNOP\n\tBNE ]V\n";
	let output = parse_merlin(source);
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	// The local is qualified into the global's scope.
	let label_names: Vec<String> = output.sections[0]
		.atoms
		.iter()
		.filter_map(|atom| match &atom.kind {
			AtomKind::Label { name, .. } => Some(name.to_string()),
			_ => None,
		})
		.collect();
	assert!(label_names.contains(&"START.LOOP".to_owned()), "{label_names:?}");
	// The branch operand was rewritten to the qualified name.
	let branch_operands: Vec<String> = output.sections[0]
		.atoms
		.iter()
		.filter_map(|atom| match &atom.kind {
			AtomKind::Instruction { mnemonic, operand, .. } if mnemonic == "BNE" => Some(operand.clone()),
			_ => None,
		})
		.collect();
	assert_eq!(branch_operands[0], "START.LOOP");
	// Variable references resolve to the uniquified definition.
	assert!(branch_operands[1].starts_with("]V$"), "{branch_operands:?}");
}

#[test]
fn merlin_dum_defines_offsets_without_bytes() {
	let source = "\tORG $1000\n\tDUM $80\nPTR\tDS 2\nFLAG\tDS 1\n\tDEND\n\tNOP\n";
	let output = parse_merlin(source);
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	let table = &output.symbols;
	assert_eq!(crate::expression::SymbolLookup::lookup_value(table, "PTR").unwrap(), 0x80);
	assert_eq!(crate::expression::SymbolLookup::lookup_value(table, "FLAG").unwrap(), 0x82);
	// Only the NOP emits anything.
	let sized: usize = output.sections[0].atoms.iter().map(|atom| atom.size).sum();
	assert_eq!(sized, 0);
}

#[test]
fn merlin_string_directives() {
	let output = parse_merlin("\tASC \"AB\"\n\tDCI 'CD'\n\tHEX 01,02FF\n");
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	assert_eq!(data_bytes(&output), [0xC1, 0xC2, b'C', b'D' | 0x80, 0x01, 0x02, 0xFF]);
}

#[test]
fn scmasm_line_numbers_and_high_bit_rule() {
	let source = "1000\t.OR $0800\n1010\t.AS \"AB\"\n1020\t.AS 'CD'\n1030\t.HS 0102\n";
	let output = parse_scmasm(source);
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	assert_eq!(data_bytes(&output), [0xC1, 0xC2, 0x43, 0x44, 0x01, 0x02]);
}

#[test]
fn scmasm_numeric_locals_fold_into_scope() {
	let source = "START\tNOP\n.1\tNOP\n\tBNE .1\n";
	let output = parse_scmasm(source);
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	let operands: Vec<String> = output.sections[0]
		.atoms
		.iter()
		.filter_map(|atom| match &atom.kind {
			AtomKind::Instruction { mnemonic, operand, .. } if mnemonic == "BNE" => Some(operand.clone()),
			_ => None,
		})
		.collect();
	assert_eq!(operands, ["START.1"]);
}

#[test]
fn scmasm_da_widths() {
	let output = parse_scmasm("\t.DA #$34,/$1234,$1234\n");
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	let sizes: Vec<usize> = output.sections[0]
		.atoms
		.iter()
		.filter(|atom| matches!(atom.kind, AtomKind::Data(_)))
		.map(|atom| atom.size)
		.collect();
	assert_eq!(sizes, [1, 1, 2]);
}

#[test]
fn scmasm_phasing_atoms() {
	let output = parse_scmasm("\t.OR $0800\n\t.PH $2000\n\tNOP\n\t.EP\n");
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	let kinds = atom_kinds(&output);
	assert!(matches!(kinds[1], AtomKind::Phase { address: 0x2000 }));
	assert!(matches!(kinds[3], AtomKind::Dephase));
}

#[test]
fn edtasm_labels_and_segments() {
	let source = "\tORG 8000H\nSTART::\tNOP\n.loop:\tDJNZ .loop\n\tDSEG\nBUF:\tDS 10\n\tCSEG\n\tNOP\n";
	let output = parse_edtasm(source);
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	assert_eq!(output.sections.len(), 2);
	assert_eq!(output.sections[0].name, "CSEG");
	assert_eq!(output.sections[1].name, "DSEG");
	// Public labels get the export flag.
	assert!(output.symbols.get("START").unwrap().is_exported);
	// The CSEG continues after the DSEG interlude.
	let cseg_instructions = output.sections[0]
		.atoms
		.iter()
		.filter(|atom| matches!(atom.kind, AtomKind::Instruction { .. }))
		.count();
	assert_eq!(cseg_instructions, 3);
}

#[test]
fn edtasm_rept_and_irp() {
	let source = "\tREPT 3\n\tNOP\n\tENDM\n\tIRP R,<B,C>\n\tINC R\n\tENDM\n";
	let output = parse_edtasm(source);
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	let instructions: Vec<String> = output.sections[0]
		.atoms
		.iter()
		.filter_map(|atom| match &atom.kind {
			AtomKind::Instruction { mnemonic, operand, .. } => Some(format!("{mnemonic} {operand}")),
			_ => None,
		})
		.collect();
	assert_eq!(instructions, ["NOP ", "NOP ", "NOP ", "INC B", "INC C"]);
}

#[test]
fn edtasm_macro_local_uniquification() {
	let source = "WAIT\tMACRO N\n\tLOCAL LOOP\nLOOP:\tDJNZ LOOP\n\tENDM\n\tWAIT 1\n\tWAIT 2\n";
	let output = parse_edtasm(source);
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	let labels: Vec<String> = output.sections[0]
		.atoms
		.iter()
		.filter_map(|atom| match &atom.kind {
			AtomKind::Label { name, .. } => Some(name.to_string()),
			_ => None,
		})
		.collect();
	assert_eq!(labels.len(), 2);
	assert_ne!(labels[0], labels[1]);
}

#[test]
fn edtasm_radix_control() {
	let source = "\t.RADIX 16\nVAL\tEQU 0FF\n";
	let output = parse_edtasm(source);
	// `FF` with radix 16 is a number, not a symbol.
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	assert_eq!(crate::expression::SymbolLookup::lookup_value(&output.symbols, "VAL").unwrap(), 0xFF);
}

#[test]
fn edtasm_conditional_family() {
	let source = "\tIFDEF UNDEFINED\n\tDB 1\n\tELSE\n\tDB 2\n\tENDIF\n\tIF1\n\tDB 3\n\tENDC\n";
	let output = parse_edtasm(source);
	assert!(output.errors.is_empty(), "{:?}", output.errors);
	let data_count =
		output.sections[0].atoms.iter().filter(|atom| matches!(atom.kind, AtomKind::Data(_))).count();
	assert_eq!(data_count, 2);
}

#[test]
fn unbalanced_conditionals_are_reported() {
	let output = parse_simple("\t.if 1\n\t.db 1\n");
	assert!(output
		.errors
		.iter()
		.any(|error| matches!(error, crate::error::AssemblyError::UnbalancedConditionals { .. })));
}

#[test]
fn unknown_directive_suggestions_via_registry() {
	// Unknown words in the generic syntax fall through to the CPU as instructions, so probe the
	// registry machinery directly through a data-directive typo in Merlin, which reports at
	// assembly time. Here we just make sure nothing panics and the atom is produced.
	let output = parse_merlin("\tLDX #$01\n");
	assert!(output.errors.is_empty());
}
