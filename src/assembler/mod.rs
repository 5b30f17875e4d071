//! The assembler engine: multi-pass fixed-point resolution over the atom stream.

use flexstr::SharedStr;
use miette::SourceSpan;
use std::sync::Arc;

use crate::atom::{Atom, AtomKind};
use crate::common::{AssemblyCode, MemoryAddress};
use crate::cpu::{split_operands, CpuBackend, EncodeError};
use crate::error::AssemblyError;
use crate::expression::{parse as parse_expression, EvaluationError, NumberFormat};
use crate::section::Section;
use crate::symbol::{SymbolKind, SymbolTable};

pub mod stream;

/// Maximum number of resolution passes before the engine gives up on convergence. Real code
/// settles in two or three passes; this bound only catches pathological branch chains.
pub const MAX_PASSES: usize = 500;

/// The outcome of one assembly.
#[derive(Debug)]
pub struct AssemblerResult {
	/// Whether assembly finished without errors.
	pub success:    bool,
	/// How many resolution passes ran.
	pub pass_count: usize,
	/// All collected errors, each with a source location.
	pub errors:     Vec<AssemblyError>,
}

/// Assembles the sections in place: every instruction atom ends up with its encoding, every
/// label atom with its address, and the symbol table with final label values.
///
/// The algorithm is a fixed-point iteration. Each pass encodes all atoms against the current
/// symbol values (undefined symbols become a 0 placeholder), then re-derives label addresses
/// from the just-computed sizes. When two consecutive passes produce identical size vectors the
/// addresses cannot move any further and the result is final. A last reporting walk then turns
/// still-unresolved symbols and encoding failures into diagnostics.
pub fn assemble(
	sections: &mut [Section],
	symbols: &mut SymbolTable,
	cpu: &dyn CpuBackend,
	format: &dyn NumberFormat,
) -> AssemblerResult {
	if sections.iter().all(|section| section.atoms.is_empty()) {
		return AssemblerResult { success: true, pass_count: 0, errors: Vec::new() };
	}

	let mut pass = 0;
	let mut converged = false;
	let mut previous_sizes: Vec<usize> = Vec::new();
	while !converged && pass < MAX_PASSES {
		pass += 1;
		let current_sizes = encode_pass(sections, symbols, cpu, format, None);
		label_pass(sections, symbols);
		if pass > 1 {
			converged = current_sizes == previous_sizes;
		}
		previous_sizes = current_sizes;
	}

	// The reporting walk re-encodes at the fixed point, so sizes cannot change here; it exists
	// to surface every deferred error exactly once.
	let mut errors = Vec::new();
	let _ = encode_pass(sections, symbols, cpu, format, Some(&mut errors));
	label_pass(sections, symbols);

	if !converged {
		let oscillating: Vec<&Atom> = sections
			.iter()
			.flat_map(|section| section.atoms.iter())
			.filter(|atom| atom.size != atom.last_size)
			.collect();
		let (src, location) = oscillating.first().map_or_else(
			|| {
				let section = &sections[0];
				let atom = &section.atoms[0];
				(atom.source.clone(), atom.span)
			},
			|atom| (atom.source.clone(), atom.span),
		);
		errors.push(AssemblyError::DidNotConverge {
			passes: pass,
			oscillating: oscillating.len(),
			src,
			location,
		});
	}

	AssemblerResult { success: errors.is_empty(), pass_count: pass, errors }
}

/// Walks all atoms, encoding instructions and materializing data against the current symbol
/// values. Returns the size vector used for the convergence check. With `errors` present this is
/// the reporting walk: undefined symbols and encoding failures become diagnostics.
fn encode_pass(
	sections: &mut [Section],
	symbols: &SymbolTable,
	cpu: &dyn CpuBackend,
	format: &dyn NumberFormat,
	mut errors: Option<&mut Vec<AssemblyError>>,
) -> Vec<usize> {
	let mut sizes = Vec::new();
	for section in sections.iter_mut() {
		let mut address = section.origin;
		let mut phase_delta: Option<MemoryAddress> = None;
		for atom in &mut section.atoms {
			let logical = address + phase_delta.unwrap_or(0);
			match &mut atom.kind {
				AtomKind::Org { address: new_address } => {
					address = *new_address;
					atom.record_size(0);
				},
				AtomKind::Phase { address: phase_address } => {
					phase_delta = Some(*phase_address - address);
					atom.record_size(0);
				},
				AtomKind::Dephase => {
					phase_delta = None;
					atom.record_size(0);
				},
				AtomKind::Label { .. } | AtomKind::ListingControl(_) => {
					atom.record_size(0);
				},
				AtomKind::Align { alignment } => {
					let modulus = *alignment as MemoryAddress;
					let padding = if modulus == 0 {
						0
					} else {
						((modulus - address.rem_euclid(modulus)) % modulus) as usize
					};
					atom.record_size(padding);
					address += padding as MemoryAddress;
				},
				AtomKind::Space { count } => {
					let count = *count;
					atom.record_size(count);
					address += count as MemoryAddress;
				},
				AtomKind::Data(data) => {
					symbols.set_current_location(logical);
					let reporting = errors.is_some();
					if let Err(error) = data.materialize(symbols, !reporting) {
						if let Some(errors) = errors.as_mut() {
							errors.push(evaluation_diagnostic(&error, symbols, &atom.source, atom.span));
						}
						// Keep layout stable: unresolvable data is zero-filled.
						data.bytes = vec![0; data.expected_size()];
					}
					let size = data.bytes.len();
					atom.record_size(size);
					address += size as MemoryAddress;
				},
				AtomKind::Instruction { mnemonic, operand, encoding } => {
					symbols.set_current_location(logical);
					let encoded = if cpu.requires_special_encoding(mnemonic) {
						let (resolved, undefined) = resolve_symbol_operands(operand, symbols, format, cpu);
						if let Some(errors) = errors.as_mut() {
							for name in &undefined {
								errors.push(undefined_diagnostic(name, symbols, &atom.source, atom.span));
							}
						}
						cpu.encode_special(mnemonic, &resolved, logical)
					} else {
						let (value, undefined) = operand_value(operand, symbols, format, cpu);
						if let (Some(errors), Some(name)) = (errors.as_mut(), undefined) {
							errors.push(undefined_diagnostic(&name, symbols, &atom.source, atom.span));
						}
						cpu.encode(mnemonic, value as u32, operand)
					};
					match encoded {
						Ok(bytes) => *encoding = bytes,
						Err(error) => {
							if let Some(errors) = errors.as_mut() {
								errors.push(encode_diagnostic(error, &atom.source, atom.span));
							}
							encoding.clear();
						},
					}
					let size = encoding.len();
					atom.record_size(size);
					address += size as MemoryAddress;
				},
			}
			sizes.push(atom.size);
		}
	}
	sizes
}

/// Re-derives every label address from the sizes the encoding walk just computed, and redefines
/// the label symbols so the next pass (and final consumers) see the updated values.
fn label_pass(sections: &mut [Section], symbols: &mut SymbolTable) {
	for section in sections.iter_mut() {
		let mut address = section.origin;
		let mut phase_delta: Option<MemoryAddress> = None;
		for atom in &mut section.atoms {
			match &mut atom.kind {
				AtomKind::Org { address: new_address } => address = *new_address,
				AtomKind::Phase { address: phase_address } => phase_delta = Some(*phase_address - address),
				AtomKind::Dephase => phase_delta = None,
				AtomKind::Label { name, address: label_address } => {
					let logical = address + phase_delta.unwrap_or(0);
					*label_address = logical;
					// Labels are redefined on every pass; the table allows that for label kind.
					let _ = symbols.define(
						name,
						SymbolKind::Label,
						crate::expression::Expression::Literal(logical),
						atom.span,
					);
				},
				_ => address += atom.size as MemoryAddress,
			}
		}
	}
}

/// Extracts the numeric operand value for standard encoding: the first comma-separated part
/// that is not a register or condition word is evaluated (stripping immediate markers and
/// grouping). Returns the value and the name of an undefined symbol if a placeholder was used.
fn operand_value(
	operand: &str,
	symbols: &SymbolTable,
	format: &dyn NumberFormat,
	cpu: &dyn CpuBackend,
) -> (MemoryAddress, Option<SharedStr>) {
	for part in split_operands(operand) {
		let mut text = part.trim();
		if let Some(rest) = text.strip_prefix('#') {
			text = rest.trim();
		}
		loop {
			let stripped = strip_full_wrap(text);
			if stripped == text {
				break;
			}
			text = stripped;
		}
		if text.is_empty() || cpu.is_reserved_word(text) {
			continue;
		}
		// Index-register arithmetic such as `IX+5`: evaluate only the displacement.
		if let Some((head, rest)) = split_register_prefix(text) {
			if cpu.is_reserved_word(head) {
				text = rest;
			}
		}
		if text.is_empty() {
			continue;
		}
		let Ok(expression) = parse_expression(text, format) else {
			continue;
		};
		match expression.evaluate(symbols) {
			Ok(value) => return (value, None),
			Err(EvaluationError::UndefinedSymbol(name)) => return (0, Some(name)),
			Err(_) => return (0, None),
		}
	}
	(0, None)
}

/// Rewrites symbolic parts of an operand to numeric literals before special encoding, keeping
/// registers, conditions, immediate markers and grouping intact. Undefined symbols become 0 so
/// early passes can size the instruction; their names are returned so the reporting walk can
/// surface them after convergence.
fn resolve_symbol_operands(
	operand: &str,
	symbols: &SymbolTable,
	format: &dyn NumberFormat,
	cpu: &dyn CpuBackend,
) -> (String, Vec<SharedStr>) {
	let mut undefined = Vec::new();
	let parts = split_operands(operand);
	let resolved: Vec<String> = parts
		.iter()
		.map(|part| {
			let trimmed = part.trim();
			let (prefix, body) = match trimmed.chars().next() {
				Some(marker @ ('#' | '<' | '>')) => (marker.to_string(), trimmed[1 ..].trim()),
				_ => (String::new(), trimmed),
			};
			let (open, inner, close) = match (body.chars().next(), body.chars().last()) {
				(Some('('), Some(')')) if strip_full_wrap(body) != body => ("(", &body[1 .. body.len() - 1], ")"),
				(Some('['), Some(']')) if strip_full_wrap(body) != body => ("[", &body[1 .. body.len() - 1], "]"),
				_ => ("", body, ""),
			};
			let inner = inner.trim();
			if inner.is_empty() || cpu.is_reserved_word(inner) {
				return part.clone();
			}
			if let Some((head, _)) = split_register_prefix(inner) {
				if cpu.is_reserved_word(head) {
					return part.clone();
				}
			}
			let Ok(expression) = parse_expression(inner, format) else {
				return part.clone();
			};
			let value = match expression.evaluate(symbols) {
				Ok(value) => value,
				Err(EvaluationError::UndefinedSymbol(name)) => {
					undefined.push(name);
					0
				},
				Err(_) => 0,
			};
			format!("{prefix}{open}{value}{close}")
		})
		.collect();
	(resolved.join(","), undefined)
}

/// Strips one level of grouping if the whole text is wrapped in `()` or `[]`.
fn strip_full_wrap(text: &str) -> &str {
	let trimmed = text.trim();
	for (open, close) in [('(', ')'), ('[', ']')] {
		if trimmed.starts_with(open) && trimmed.ends_with(close) && trimmed.len() >= 2 {
			let inner = &trimmed[1 .. trimmed.len() - 1];
			// Only strip when the brackets actually match each other.
			let mut depth = 0_i32;
			let mut matched = true;
			for (index, character) in inner.char_indices() {
				if character == open {
					depth += 1;
				} else if character == close {
					depth -= 1;
					if depth < 0 && index < inner.len() - 1 {
						matched = false;
						break;
					}
				}
			}
			if matched && depth >= 0 {
				return inner.trim();
			}
		}
	}
	trimmed
}

/// Splits `IX+5`-style operands into the register head and the signed remainder.
fn split_register_prefix(text: &str) -> Option<(&str, &str)> {
	let end = text.find(|character: char| !character.is_ascii_alphanumeric() && character != '\'')?;
	let (head, rest) = text.split_at(end);
	if rest.starts_with('+') || rest.starts_with('-') {
		Some((head, rest))
	} else {
		None
	}
}

fn undefined_diagnostic(
	name: &str,
	symbols: &SymbolTable,
	src: &Arc<AssemblyCode>,
	location: SourceSpan,
) -> AssemblyError {
	AssemblyError::UndefinedSymbol {
		name: SharedStr::from(name),
		help: symbols.suggestions_for(name),
		src: src.clone(),
		location,
	}
}

fn evaluation_diagnostic(
	error: &EvaluationError,
	symbols: &SymbolTable,
	src: &Arc<AssemblyCode>,
	location: SourceSpan,
) -> AssemblyError {
	match error {
		EvaluationError::UndefinedSymbol(name) => undefined_diagnostic(name, symbols, src, location),
		EvaluationError::DivisionByZero => AssemblyError::DivisionByZero { src: src.clone(), location },
		EvaluationError::CircularDefinition(name) =>
			AssemblyError::CircularDefinition { name: name.clone(), src: src.clone(), location },
	}
}

fn encode_diagnostic(error: EncodeError, src: &Arc<AssemblyCode>, location: SourceSpan) -> AssemblyError {
	let src = src.clone();
	match error {
		EncodeError::UnknownMnemonic(mnemonic) =>
			AssemblyError::UnknownMnemonic { mnemonic, help: None, src, location },
		EncodeError::InvalidAddressingMode { mnemonic, operand } =>
			AssemblyError::InvalidAddressingMode { mnemonic, operand, src, location },
		EncodeError::OperandOutOfRange { value, bits } =>
			AssemblyError::ValueOutOfRange { value, bits, src, location },
		EncodeError::BranchOutOfRange { mnemonic, distance } =>
			AssemblyError::BranchOutOfRange { mnemonic, distance, src, location },
		EncodeError::UnknownRegister(register) => AssemblyError::UnknownRegister {
			register,
			mnemonic: SharedStr::default(),
			src,
			location,
		},
		EncodeError::UnsupportedOnVariant { mnemonic, variant } => AssemblyError::UnsupportedOnVariant {
			mnemonic,
			variant: SharedStr::from(variant),
			src,
			location,
		},
	}
}
