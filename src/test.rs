use crate::atom::AtomKind;
use crate::cpu::CpuType;
use crate::options::AssemblerOptions;
use crate::parser::Syntax;
use crate::{assemble_to_image, run_assembler, AssemblyCode, MemoryAddress};

fn image_for(cpu: CpuType, syntax: Syntax, source: &str) -> (MemoryAddress, Vec<u8>) {
	assemble_to_image(source, &AssemblerOptions::for_target(cpu, syntax)).unwrap()
}

#[test]
fn forward_branch_relaxation_merlin_6502() {
	let source = "\tORG $1000\nstart\tBEQ target\n\tDS 200\ntarget\tNOP\n";
	let assembly = run_assembler(
		&AssemblyCode::new(source, "<test>"),
		&AssemblerOptions::for_target(CpuType::Mos6502, Syntax::Merlin),
	);
	assert!(assembly.result.success, "{:?}", assembly.result.errors);

	let (start, image) = assembly.image().unwrap();
	assert_eq!(start, 0x1000);
	// The branch relaxes to the inverted branch over an absolute jump; the target lands past
	// the 5-byte sequence and 200 reserved bytes.
	assert_eq!(&image[.. 5], [0xD0, 0x03, 0x4C, 0xCD, 0x10]);
	assert_eq!(image.len(), 5 + 200 + 1);
	assert_eq!(image[5 + 200], 0xEA);
	assert!(image[5 .. 5 + 200].iter().all(|&byte| byte == 0));

	// The labels resolved where the stream placed the bytes.
	use crate::expression::SymbolLookup;
	assert_eq!(assembly.symbols.lookup_value("start").unwrap(), 0x1000);
	assert_eq!(assembly.symbols.lookup_value("target").unwrap(), 0x10CD);
}

#[test]
fn z80_word_with_forward_reference() {
	let source = "\tORG 8000H\nTABLE\tDW LABEL\nLABEL\tNOP\n";
	let (start, image) = image_for(CpuType::Z80, Syntax::Edtasm, source);
	assert_eq!(start, 0x8000);
	// Little-endian word pointing just past itself, then the NOP.
	assert_eq!(image, [0x02, 0x80, 0x00]);
}

#[test]
fn scmasm_high_bit_rule() {
	let source = "\t.OR $0800\n\t.AS \"AB\"\n\t.AS 'CD'\n";
	let (start, image) = image_for(CpuType::Mos6502, Syntax::Scmasm, source);
	assert_eq!(start, 0x0800);
	// The double quote (0x22) is below apostrophe (0x27), so its string gets bit 7 set.
	assert_eq!(image, [0xC1, 0xC2, 0x43, 0x44]);
}

#[test]
fn mc6809_big_endian_words() {
	let source = "\tORG $0400\n\tFDB $1234,$5678\n";
	let (start, image) = image_for(CpuType::Mc6809, Syntax::Edtasm, source);
	assert_eq!(start, 0x0400);
	assert_eq!(image, [0x12, 0x34, 0x56, 0x78]);
}

#[test]
fn nested_conditional_assembly() {
	let source = "\tORG 0\n\tIF 0\n\tDB 0AAH\n\tIF 1\n\tDB 0BBH\n\tENDIF\n\tDB 0CCH\n\tELSE\n\tDB 0DDH\n\tENDIF\n";
	let (_, image) = image_for(CpuType::Z80, Syntax::Edtasm, source);
	// Only the ELSE branch of the outer (false) conditional emits.
	assert_eq!(image, [0xDD]);
}

#[test]
fn chained_branch_convergence_is_stable() {
	// Branches around the relaxation edge: each size change pulls the next branch into or out
	// of range, so this needs several passes to settle.
	let source =
		"\t.org $1000\nb1:\tbeq target\nb2:\tbeq target\nb3:\tbeq target\nb4:\tbeq target\n\t.ds 124\ntarget:\tnop\n";
	let options = AssemblerOptions::for_target(CpuType::Mos6502, Syntax::Simple);
	let first = run_assembler(&AssemblyCode::new(source, "<test>"), &options);
	assert!(first.result.success, "{:?}", first.result.errors);
	assert!(first.result.pass_count >= 3, "expected multiple passes, got {}", first.result.pass_count);
	assert!(first.result.pass_count < crate::MAX_PASSES);

	// Re-running the assembler on the same input yields identical bytes.
	let second = run_assembler(&AssemblyCode::new(source, "<test>"), &options);
	assert_eq!(first.image(), second.image());
}

#[test]
fn emitted_bytes_match_atom_sizes() {
	let source = "\t.org $2000\nloop:\tlda #$01\n\tsta $0200\n\t.dw loop, loop+3\n\t.ds 3\n\t.db 1,2,3\n\tbne loop\n";
	let assembly = run_assembler(
		&AssemblyCode::new(source, "<test>"),
		&AssemblerOptions::for_target(CpuType::Mos6502, Syntax::Simple),
	);
	assert!(assembly.result.success, "{:?}", assembly.result.errors);
	for atom in &assembly.sections[0].atoms {
		if let Some(bytes) = atom.bytes() {
			assert_eq!(bytes.len(), atom.size, "atom size does not match its emission: {atom:?}");
		}
	}
	// The stream emits exactly the non-space sizes.
	let emitted = assembly.sections[0].byte_stream().count();
	let expected: usize = assembly.sections[0]
		.atoms
		.iter()
		.filter(|atom| atom.bytes().is_some() || matches!(atom.kind, AtomKind::Align { .. }))
		.map(|atom| atom.size)
		.sum();
	assert_eq!(emitted, expected);
}

#[test]
fn label_addresses_agree_with_stream() {
	let source = "\t.org $1234\nfirst:\t.db 1\nsecond:\t.db 2\n";
	let assembly = run_assembler(
		&AssemblyCode::new(source, "<test>"),
		&AssemblerOptions::for_target(CpuType::Mos6502, Syntax::Simple),
	);
	assert!(assembly.result.success, "{:?}", assembly.result.errors);
	use crate::expression::SymbolLookup;
	let pairs: Vec<_> = assembly.sections[0].byte_stream().collect();
	assert_eq!(pairs, [(0x1234, 1), (0x1235, 2)]);
	assert_eq!(assembly.symbols.lookup_value("first").unwrap(), 0x1234);
	assert_eq!(assembly.symbols.lookup_value("second").unwrap(), 0x1235);
	for atom in &assembly.sections[0].atoms {
		if let AtomKind::Label { name, address } = &atom.kind {
			assert_eq!(assembly.symbols.lookup_value(name).unwrap(), *address);
		}
	}
}

#[test]
fn zero_page_vs_absolute_choice() {
	let source = "\t.org $0600\nzp\t.equ $80\nabs\t.equ $1234\n\tlda zp\n\tlda abs\n";
	let (_, image) = image_for(CpuType::Mos6502, Syntax::Simple, source);
	assert_eq!(image, [0xA5, 0x80, 0xAD, 0x34, 0x12]);
}

#[test]
fn undefined_symbol_is_reported_after_convergence() {
	let source = "\t.org $1000\n\tjmp nowhere\n";
	let assembly = run_assembler(
		&AssemblyCode::new(source, "<test>"),
		&AssemblerOptions::for_target(CpuType::Mos6502, Syntax::Simple),
	);
	assert!(!assembly.result.success);
	assert!(assembly
		.result
		.errors
		.iter()
		.any(|error| matches!(error, crate::AssemblyError::UndefinedSymbol { .. })));
	// Exactly once, not once per pass.
	let undefined_count = assembly
		.result
		.errors
		.iter()
		.filter(|error| matches!(error, crate::AssemblyError::UndefinedSymbol { .. }))
		.count();
	assert_eq!(undefined_count, 1);
}

#[test]
fn undefined_branch_target_is_reported() {
	let source = "\t.org $1000\n\tbeq nowhere\n";
	let assembly = run_assembler(
		&AssemblyCode::new(source, "<test>"),
		&AssemblerOptions::for_target(CpuType::Mos6502, Syntax::Simple),
	);
	assert!(!assembly.result.success);
	assert!(assembly
		.result
		.errors
		.iter()
		.any(|error| matches!(error, crate::AssemblyError::UndefinedSymbol { .. })));
}

#[test]
fn phased_block_labels_run_elsewhere() {
	// Code assembles at $0800 but the labels inside the phased block take $2000-based values.
	let source = "\t.OR $0800\n\t.HS 00\n\t.PH $2000\nRELOC\t.HS 01\n\t.EP\nAFTER\t.HS 02\n";
	let assembly = run_assembler(
		&AssemblyCode::new(source, "<test>"),
		&AssemblerOptions::for_target(CpuType::Mos6502, Syntax::Scmasm),
	);
	assert!(assembly.result.success, "{:?}", assembly.result.errors);
	use crate::expression::SymbolLookup;
	assert_eq!(assembly.symbols.lookup_value("RELOC").unwrap(), 0x2000);
	// Physical layout is untouched by phasing.
	assert_eq!(assembly.symbols.lookup_value("AFTER").unwrap(), 0x0802);
	let pairs: Vec<_> = assembly.sections[0].byte_stream().collect();
	assert_eq!(pairs, [(0x0800, 0x00), (0x0801, 0x01), (0x0802, 0x02)]);
}

#[test]
fn z80_relative_jump_relaxes_to_absolute() {
	let source = "\tORG 8000H\nSTART:\tJR FAR\n\tJR START\n\tDS 200\nFAR:\tRET\n";
	let assembly = run_assembler(
		&AssemblyCode::new(source, "<test>"),
		&AssemblerOptions::for_target(CpuType::Z80, Syntax::Edtasm),
	);
	assert!(assembly.result.success, "{:?}", assembly.result.errors);
	let (_, image) = assembly.image().unwrap();
	// Out of range: JP FAR. FAR = 8000h + 3 + 2 + 200 = 80CDh.
	assert_eq!(&image[.. 3], [0xC3, 0xCD, 0x80]);
	// In range: a plain relative jump back to START.
	assert_eq!(&image[3 .. 5], [0x18, 0xFB]);
}

#[test]
fn mc6809_branch_relaxes_to_long_form() {
	let source = "\tORG $0400\nENTRY\tBEQ FAR\n\tRMEM 200\nFAR\tRTS\n";
	let assembly = run_assembler(
		&AssemblyCode::new(source, "<test>"),
		&AssemblerOptions::for_target(CpuType::Mc6809, Syntax::Edtasm),
	);
	assert!(assembly.result.success, "{:?}", assembly.result.errors);
	let (_, image) = assembly.image().unwrap();
	// LBEQ with a 16-bit displacement: FAR = $0400 + 4 + 200 = $04CC; offset from $0404.
	assert_eq!(&image[.. 4], [0x10, 0x27, 0x00, 0xC8]);
}

#[test]
fn multiple_errors_in_one_run() {
	let source = "\t.org $1000\n\tlda nowhere\n\txyzzy #1\n\tsta elsewhere\n";
	let assembly = run_assembler(
		&AssemblyCode::new(source, "<test>"),
		&AssemblerOptions::for_target(CpuType::Mos6502, Syntax::Simple),
	);
	assert!(!assembly.result.success);
	// One run surfaces all three problems.
	assert!(assembly.result.errors.len() >= 3, "{:?}", assembly.result.errors);
}

#[test]
fn listing_controls_emit_nothing() {
	let source = "\tORG 100H\n\tTITLE 'demo'\n\t.LIST\n\tPAGE\n\tDB 1\n";
	let (_, image) = image_for(CpuType::Z80, Syntax::Edtasm, source);
	assert_eq!(image, [1]);
}

#[test]
fn include_files_are_spliced(){
	let directory = std::env::temp_dir().join("xasm-include-test");
	std::fs::create_dir_all(&directory).unwrap();
	let path = directory.join("lib.inc");
	std::fs::write(&path, "\t.db $77\n").unwrap();
	let source = format!("\t.org $4000\n\t.include \"{}\"\n\t.db $88\n", path.display());
	let (_, image) = image_for(CpuType::Mos6502, Syntax::Simple, &source);
	assert_eq!(image, [0x77, 0x88]);
}
