//! Multi-CPU, multi-syntax cross-assembler for vintage 8-bit processors.
//!
//! The pipeline runs source text through a syntax front-end into an atom stream, then a
//! multi-pass engine resolves symbols and instruction sizes to a fixed point, and the finished
//! sections expose an addressed byte stream for output writers.
//!
//! Supported CPUs: the 6502 family (6502, 65C02, Rockwell 65C02, 65816), the Motorola 6809 and
//! the Zilog Z80 (plus the Game Boy core). Supported syntaxes: a generic dialect, Merlin,
//! the S-C Macro Assembler and an EDTASM/M80/ZMAC superset.

use std::sync::Arc;

pub mod assembler;
pub mod atom;
pub mod common;
pub mod conditional;
pub mod cpu;
pub mod directive;
pub mod error;
pub mod expression;
pub mod mcro;
pub mod options;
pub mod parser;
pub mod section;
pub mod segments;
pub mod symbol;

pub use assembler::{assemble, AssemblerResult, MAX_PASSES};
pub use common::{pretty_hex, AssemblyCode, MemoryAddress};
pub use cpu::{CpuBackend, CpuType};
pub use error::AssemblyError;
pub use options::{AssemblerOptions, ColorChoice, PathMapping};
pub use parser::Syntax;
pub use section::{AddressedByteStream, Section};
pub use symbol::SymbolTable;

use expression::{
	GenericNumberFormat, MerlinNumberFormat, NumberFormat, ScmasmNumberFormat, Z80NumberFormat,
};

/// A finished assembly: resolved sections, the symbol table and the engine result.
#[derive(Debug)]
pub struct Assembly {
	/// Sections with every instruction encoded and every label placed.
	pub sections: Vec<Section>,
	/// The final symbol table, for listing and symbol-file writers.
	pub symbols:  SymbolTable,
	/// Pass count and collected errors.
	pub result:   AssemblerResult,
}

impl Assembly {
	/// The contiguous zero-filled image of all sections, with its start address.
	#[must_use]
	pub fn image(&self) -> Option<(MemoryAddress, Vec<u8>)> {
		assembler::stream::program_image(&self.sections)
	}
}

/// The number-literal recognizer belonging to a syntax.
#[must_use]
pub fn number_format_for(syntax: Syntax) -> Box<dyn NumberFormat> {
	match syntax {
		Syntax::Simple => Box::new(GenericNumberFormat),
		Syntax::Merlin => Box::new(MerlinNumberFormat),
		Syntax::Scmasm => Box::new(ScmasmNumberFormat),
		Syntax::Edtasm => Box::new(Z80NumberFormat::default()),
	}
}

/// Runs the whole pipeline over one source unit: parse, multi-pass assembly, verification.
///
/// Parser and engine errors are merged into the returned [`AssemblerResult`]; the assembly is
/// returned even on failure so callers can inspect partial results.
#[must_use]
pub fn run_assembler(source: &Arc<AssemblyCode>, options: &AssemblerOptions) -> Assembly {
	let cpu = options.cpu.backend();
	let format = number_format_for(options.syntax);
	let output = parser::parse_source(source, options, &*cpu, &*format);
	let parser::ParseOutput { mut sections, mut symbols, mut errors } = output;
	let mut result = assemble(&mut sections, &mut symbols, &*cpu, &*format);
	errors.append(&mut result.errors);
	result.errors = errors;
	result.success = result.errors.is_empty();
	Assembly { sections, symbols, result }
}

/// Convenience entry point for tests and simple callers: assembles source text and returns the
/// flattened image.
///
/// # Errors
/// The first collected error, if the assembly failed.
pub fn assemble_to_image(
	source_text: &str,
	options: &AssemblerOptions,
) -> Result<(MemoryAddress, Vec<u8>), Box<AssemblyError>> {
	let source = AssemblyCode::new(source_text, "<input>");
	let mut assembly = run_assembler(&source, options);
	if !assembly.result.errors.is_empty() {
		return Err(Box::new(assembly.result.errors.remove(0)));
	}
	Ok(assembly.image().unwrap_or((0, Vec::new())))
}

#[cfg(test)]
mod test;
