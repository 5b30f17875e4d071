//! The Merlin (Apple II) front-end: column-oriented lines, `:` locals, `]` variables, DUM blocks.

use std::collections::HashMap;
use std::sync::Arc;

use flexstr::SharedStr;
use miette::SourceSpan;

use super::{
	first_operand_field, lines_with_spans, process_include, split_fields, strip_comment, Line, ParseOutput,
	ParserCore, SyntaxParser,
};
use crate::atom::{AtomKind, DataAtom, DataWidth, Endianness, ListingControl};
use crate::common::{AssemblyCode, MemoryAddress};
use crate::cpu::{split_operands, CpuBackend};
use crate::directive::DirectiveRegistry;
use crate::error::AssemblyError;
use crate::expression::NumberFormat;
use crate::mcro::MacroDialect;
use crate::options::AssemblerOptions;
use crate::symbol::SymbolKind;

const DIALECT: MacroDialect = MacroDialect { begin_words: &["MAC"], end_words: &["EOM", "<<<"] };

/// The Merlin front-end.
pub struct MerlinParser<'a> {
	core:       ParserCore<'a>,
	registry:   DirectiveRegistry<MerlinParser<'a>>,
	/// Dummy-section state: the dedicated address counter while inside `DUM`/`DEND`.
	dum:        Option<MemoryAddress>,
	/// Current uniquified name for each `]` variable label.
	variables:  HashMap<SharedStr, SharedStr>,
	/// Counter backing the uniquification of `]` variable labels.
	variable_generation: u32,
}

/// Parses one source unit in Merlin syntax.
#[must_use]
pub fn parse(
	source: &Arc<AssemblyCode>,
	options: &AssemblerOptions,
	cpu: &dyn CpuBackend,
	format: &dyn NumberFormat,
) -> ParseOutput {
	let mut parser = MerlinParser {
		core: ParserCore::new(source.clone(), options, cpu, format, DIALECT, true),
		registry: build_registry(),
		dum: None,
		variables: HashMap::new(),
		variable_generation: 0,
	};
	let lines = lines_with_spans(source);
	let final_span = lines.last().map_or_else(|| (0, 1).into(), |(_, span)| *span);
	for (line, span) in lines {
		if parser.core.end_seen {
			break;
		}
		parser.process_line(&line, span);
	}
	if parser.dum.is_some() {
		parser.core.error(AssemblyError::DendWithoutDum { src: parser.core.src.clone(), location: final_span });
	}
	parser.core.finish(final_span);
	parser.core.into_output()
}

fn build_registry<'a>() -> DirectiveRegistry<MerlinParser<'a>> {
	let mut registry = DirectiveRegistry::new();
	registry.register("ORG", handle_org);
	registry.register_aliases(&["EQU", "="], handle_equ);
	registry.register_aliases(&["DB", "DFB"], handle_db);
	registry.register_aliases(&["DW", "DA"], handle_dw);
	registry.register("DDB", handle_ddb);
	registry.register("DS", handle_ds);
	registry.register("HEX", handle_hex);
	registry.register_aliases(&["ASC", "INV"], handle_asc);
	registry.register("DCI", handle_dci);
	registry.register("FLS", handle_fls);
	registry.register("REV", handle_rev);
	registry.register("STR", handle_str);
	registry.register("DO", handle_do);
	registry.register("ELSE", handle_else);
	registry.register("FIN", handle_fin);
	registry.register("DUM", handle_dum);
	registry.register("DEND", handle_dend);
	registry.register("PUT", handle_put);
	registry.register_aliases(&["LST", "LSTDO"], handle_lst);
	registry.register("TR", handle_tr);
	registry.register("PAG", handle_pag);
	registry.register("XC", handle_xc);
	registry.register("MX", handle_mx);
	registry.register("ERR", handle_err);
	registry.register("END", handle_end);
	registry.register("MAC", handle_mac);
	registry.register_aliases(&[">>>", "PMC"], handle_pmc);
	registry
}

fn consumes_label(word: &str) -> bool {
	matches!(word, "EQU" | "=" | "MAC")
}

const fn is_local_prefix(character: char) -> bool {
	character == ':'
}

/// The Apple II high-bit rule shared by the string directives: delimiters below `'` (0x27) in
/// ASCII select inverse text, i.e. the high bit set.
fn high_bit_for_delimiter(delimiter: char) -> u8 {
	if (delimiter as u32) < 0x27 {
		0x80
	} else {
		0x00
	}
}

/// Extracts the body of a delimited Merlin string operand (`"TEXT"`, `'TEXT'`, ...), along with
/// the delimiter's high-bit mask.
fn delimited_string(operand: &str) -> Option<(String, u8)> {
	let mut characters = operand.trim().chars();
	let delimiter = characters.next()?;
	if delimiter.is_ascii_alphanumeric() {
		return None;
	}
	let rest: String = characters.collect();
	let body = rest.strip_suffix(delimiter).unwrap_or(&rest);
	Some((body.to_owned(), high_bit_for_delimiter(delimiter)))
}

impl MerlinParser<'_> {
	/// Rewrites `]variable` references to the uniquified name of their latest definition.
	fn qualify_variables(&self, text: &str) -> String {
		if !text.contains(']') {
			return text.to_owned();
		}
		let characters: Vec<char> = text.chars().collect();
		let mut output = String::with_capacity(text.len());
		let mut index = 0;
		let name_char = |c: char| c.is_ascii_alphanumeric() || c == '_';
		while index < characters.len() {
			if characters[index] == ']' && index + 1 < characters.len() && name_char(characters[index + 1]) {
				let mut end = index + 1;
				while end < characters.len() && name_char(characters[end]) {
					end += 1;
				}
				let name: String = characters[index .. end].iter().collect();
				match self.variables.get(&SharedStr::from(name.to_uppercase())) {
					Some(unique) => output.push_str(unique),
					None => output.push_str(&name),
				}
				index = end;
				continue;
			}
			output.push(characters[index]);
			index += 1;
		}
		output
	}

	fn define_line_label(&mut self, label: &str, span: SourceSpan) {
		if label.is_empty() {
			return;
		}
		if let Some(dum_address) = self.dum {
			// Labels inside a dummy section define offsets; nothing is emitted.
			let result = self
				.core
				.symbols
				.define(label, SymbolKind::Equate, crate::expression::Expression::Literal(dum_address), span)
				.map_err(|error| {
					Box::new(AssemblyError::RedefinedSymbol {
						name:     error.name,
						src:      self.core.src.clone(),
						location: span,
					})
				});
			self.core.report(result);
			return;
		}
		if label.starts_with(':') {
			match self.core.qualify_local(label, span) {
				Ok(qualified) => self.core.define_label(&qualified, span),
				Err(error) => self.core.errors.push(*error),
			}
		} else if label.starts_with(']') {
			// Variable labels are redefinable; every definition gets a fresh internal name and
			// references resolve to the most recent one.
			self.variable_generation += 1;
			let unique = SharedStr::from(format!("{label}${:04}", self.variable_generation));
			self.variables.insert(SharedStr::from(label.to_uppercase()), unique.clone());
			self.core.define_label(&unique, span);
		} else {
			self.core.scope = SharedStr::from(label);
			self.core.define_label(label, span);
		}
	}

	fn qualify_operand(&self, operand: &str) -> String {
		let with_locals = self.core.qualify_local_references(operand, is_local_prefix);
		self.qualify_variables(&with_locals)
	}

	/// Expands a macro invocation; Merlin refers to parameters positionally as `]1`-`]8`.
	fn expand_macro(&mut self, name: &str, operand: &str, span: SourceSpan) {
		let arguments = split_operands(operand);
		let expansion = match self.core.macros.expand(name, &arguments, &[]) {
			Ok(lines) => lines,
			Err(error) => {
				self.core.macro_error(&error, span);
				return;
			},
		};
		if let Err(error) = self.core.macros.enter_expansion(name) {
			self.core.macro_error(&error, span);
			return;
		}
		for text in expansion {
			if self.core.end_seen {
				break;
			}
			let mut substituted = text;
			for (index, argument) in arguments.iter().enumerate().take(8) {
				substituted = substituted.replace(&format!("]{}", index + 1), argument);
			}
			self.process_line(&substituted, span);
		}
		self.core.macros.leave_expansion();
	}

	/// Advances the dummy-section counter for size-taking directives inside `DUM`.
	fn advance_dum(&mut self, word: &str, line: &Line) -> bool {
		let Some(address) = self.dum else {
			return false;
		};
		let size: MemoryAddress = match word {
			"DS" => self.core.report(self.core.eval_expr(&line.operand, line.span)).unwrap_or(0),
			"DB" | "DFB" => split_operands(&line.operand).len() as MemoryAddress,
			"DW" | "DA" | "DDB" => split_operands(&line.operand).len() as MemoryAddress * 2,
			"HEX" => {
				let digits = line.operand.chars().filter(char::is_ascii_hexdigit).count();
				(digits / 2) as MemoryAddress
			},
			"DEND" => return false,
			_ => 0,
		};
		self.dum = Some(address + size);
		true
	}
}

impl<'a> SyntaxParser<'a> for MerlinParser<'a> {
	fn core(&mut self) -> &mut ParserCore<'a> {
		&mut self.core
	}

	fn process_line(&mut self, text: &str, span: SourceSpan) {
		if self.core.macros.is_capturing() {
			let _ = self.core.macros.capture_line(text);
			return;
		}
		let stripped = strip_comment(text, &[';'], true);
		if stripped.trim().is_empty() {
			return;
		}
		let mut line = split_fields(&stripped, span);
		line.operand = first_operand_field(&line.operand);
		let word = line.mnemonic.as_deref().map(str::to_uppercase).unwrap_or_default();

		if !self.core.conditionals.should_emit() {
			match word.as_str() {
				"DO" => self.core.begin_if(false, span),
				"ELSE" => self.core.begin_else(span),
				"FIN" => self.core.end_if(span),
				// Macros may be defined inside dead code, just not expanded there.
				"MAC" => {
					let _ = handle_mac(self, &line);
				},
				_ => {},
			}
			return;
		}

		if self.dum.is_some() {
			if let Some(label) = line.label.clone() {
				if !consumes_label(&word) {
					self.define_line_label(&label, span);
				}
			}
			if word == "EQU" || word == "=" {
				let _ = handle_equ(self, &line).map_err(|error| self.core.errors.push(*error));
				return;
			}
			if self.advance_dum(&word, &line) {
				return;
			}
			if word == "DEND" {
				self.dum = None;
			}
			return;
		}

		if let Some(label) = line.label.clone() {
			if !consumes_label(&word) {
				self.define_line_label(&label, span);
			}
		}
		let Some(mnemonic) = line.mnemonic.clone() else {
			return;
		};
		if let Some(handler) = self.registry.get(&word) {
			if let Err(error) = handler(self, &line) {
				self.core.errors.push(*error);
			}
			return;
		}
		if self.core.macros.is_macro(&word) {
			self.expand_macro(&word, &line.operand, span);
			return;
		}
		let operand = self.qualify_operand(&line.operand);
		self.core.emit(
			AtomKind::Instruction {
				mnemonic: SharedStr::from(mnemonic.to_uppercase()),
				operand,
				encoding: Vec::new(),
			},
			span,
		);
	}
}

fn handle_org(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let address = parser.core.eval_expr(&line.operand, line.span)?;
	parser.core.emit(AtomKind::Org { address }, line.span);
	Ok(())
}

fn handle_equ(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let Some(label) = line.label.clone() else {
		return Err(Box::new(AssemblyError::MissingLabel {
			directive: SharedStr::from("EQU"),
			src:       parser.core.src.clone(),
			location:  line.span,
		}));
	};
	let operand = parser.qualify_operand(&line.operand);
	if label.starts_with(']') {
		// Variable equates are ordinary redefinable symbols.
		parser.core.define_value_symbol(&label, SymbolKind::Set, &operand, line.span);
	} else {
		parser.core.define_value_symbol(&label, SymbolKind::Equate, &operand, line.span);
	}
	Ok(())
}

fn handle_db(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let operand = parser.qualify_operand(&line.operand);
	parser.core.emit_data_items(&operand, DataWidth::Byte, Endianness::Little, line.span, |byte, _, _| byte);
	Ok(())
}

fn handle_dw(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let operand = parser.qualify_operand(&line.operand);
	parser.core.emit_data_items(&operand, DataWidth::Word, Endianness::Little, line.span, |byte, _, _| byte);
	Ok(())
}

/// `DDB`: double byte, high byte first.
fn handle_ddb(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let operand = parser.qualify_operand(&line.operand);
	parser.core.emit_data_items(&operand, DataWidth::Word, Endianness::Big, line.span, |byte, _, _| byte);
	Ok(())
}

fn handle_ds(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let count = parser.core.eval_expr(&line.operand, line.span)?;
	parser.core.emit(AtomKind::Space { count: count.max(0) as usize }, line.span);
	Ok(())
}

fn handle_hex(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let mut bytes = Vec::new();
	let mut pending: Option<u32> = None;
	for character in line.operand.chars() {
		if character == ',' || character.is_whitespace() {
			continue;
		}
		let Some(digit) = character.to_digit(16) else {
			return Err(Box::new(AssemblyError::InvalidDigit {
				digit:    character,
				radix:    16,
				src:      parser.core.src.clone(),
				location: line.span,
			}));
		};
		match pending.take() {
			Some(high) => bytes.push(((high << 4) | digit) as u8),
			None => pending = Some(digit),
		}
	}
	if pending.is_some() {
		return Err(Box::new(AssemblyError::InvalidNumber {
			literal:  SharedStr::from(line.operand.as_str()),
			src:      parser.core.src.clone(),
			location: line.span,
		}));
	}
	parser.core.emit(AtomKind::Data(DataAtom::from_bytes(bytes)), line.span);
	Ok(())
}

fn string_operand(parser: &MerlinParser<'_>, line: &Line) -> Result<(String, u8), Box<AssemblyError>> {
	delimited_string(&line.operand).ok_or_else(|| {
		Box::new(AssemblyError::MissingOperand {
			directive: SharedStr::from(line.mnemonic.clone().unwrap_or_default()),
			src:       parser.core.src.clone(),
			location:  line.span,
		})
	})
}

/// `ASC`/`INV`: every character carries the delimiter's high-bit choice.
fn handle_asc(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let (body, mask) = string_operand(parser, line)?;
	let bytes = body.bytes().map(|byte| byte | mask).collect();
	parser.core.emit(AtomKind::Data(DataAtom::from_bytes(bytes)), line.span);
	Ok(())
}

/// `DCI`: like `ASC` with the final character's high bit flipped.
fn handle_dci(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let (body, mask) = string_operand(parser, line)?;
	let length = body.len();
	let bytes = body
		.bytes()
		.enumerate()
		.map(|(position, byte)| if position + 1 == length { (byte | mask) ^ 0x80 } else { byte | mask })
		.collect();
	parser.core.emit(AtomKind::Data(DataAtom::from_bytes(bytes)), line.span);
	Ok(())
}

/// `FLS`: flashing text, odd characters with the high bit set.
fn handle_fls(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let (body, _) = string_operand(parser, line)?;
	let bytes = body
		.bytes()
		.enumerate()
		.map(|(position, byte)| if position % 2 == 1 { byte | 0x80 } else { byte })
		.collect();
	parser.core.emit(AtomKind::Data(DataAtom::from_bytes(bytes)), line.span);
	Ok(())
}

/// `REV`: the string, reversed.
fn handle_rev(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let (body, mask) = string_operand(parser, line)?;
	let bytes = body.bytes().rev().map(|byte| byte | mask).collect();
	parser.core.emit(AtomKind::Data(DataAtom::from_bytes(bytes)), line.span);
	Ok(())
}

/// `STR`: length-prefixed string.
fn handle_str(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let (body, mask) = string_operand(parser, line)?;
	let mut bytes = vec![body.len() as u8];
	bytes.extend(body.bytes().map(|byte| byte | mask));
	parser.core.emit(AtomKind::Data(DataAtom::from_bytes(bytes)), line.span);
	Ok(())
}

fn handle_do(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let condition = match parser.core.eval_expr(&line.operand, line.span) {
		Ok(value) => value != 0,
		Err(error) => {
			parser.core.errors.push(*error);
			false
		},
	};
	parser.core.begin_if(condition, line.span);
	Ok(())
}

fn handle_else(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.begin_else(line.span);
	Ok(())
}

fn handle_fin(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.end_if(line.span);
	Ok(())
}

fn handle_dum(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let address = parser.core.eval_expr(&line.operand, line.span)?;
	parser.dum = Some(address);
	Ok(())
}

fn handle_dend(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	if parser.dum.take().is_none() {
		return Err(Box::new(AssemblyError::DendWithoutDum {
			src:      parser.core.src.clone(),
			location: line.span,
		}));
	}
	Ok(())
}

fn handle_put(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let file = line.operand.trim().to_owned();
	process_include(parser, &file, line.span);
	Ok(())
}

fn handle_lst(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let on = !line.operand.trim().eq_ignore_ascii_case("OFF");
	parser.core.emit(AtomKind::ListingControl(ListingControl::List(on)), line.span);
	Ok(())
}

fn handle_tr(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let on = line.operand.trim().eq_ignore_ascii_case("ON");
	parser.core.emit(AtomKind::ListingControl(ListingControl::List(!on)), line.span);
	Ok(())
}

fn handle_pag(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.emit(AtomKind::ListingControl(ListingControl::Page), line.span);
	Ok(())
}

/// `XC`: each use steps up the CPU ladder (6502 → 65C02 → 65816).
fn handle_xc(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	if !line.operand.trim().eq_ignore_ascii_case("OFF") {
		parser.core.cpu.upgrade_variant();
	}
	Ok(())
}

/// `MX %mx`: a zero bit widens the 65816 immediate for the accumulator (`m`) or index (`x`).
fn handle_mx(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let value = parser.core.eval_expr(&line.operand, line.span)?;
	parser.core.cpu.set_immediate_widths((value >> 1) & 1 == 0, value & 1 == 0);
	Ok(())
}

fn handle_err(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let triggered = if line.operand.trim().is_empty() {
		true
	} else {
		parser.core.eval_expr(&line.operand, line.span).map(|value| value != 0).unwrap_or(true)
	};
	if triggered {
		return Err(Box::new(AssemblyError::UserError {
			message:  SharedStr::from(line.operand.as_str()),
			src:      parser.core.src.clone(),
			location: line.span,
		}));
	}
	Ok(())
}

fn handle_end(parser: &mut MerlinParser<'_>, _line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.end_seen = true;
	Ok(())
}

fn handle_mac(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let Some(name) = line.label.clone() else {
		return Err(Box::new(AssemblyError::MissingLabel {
			directive: SharedStr::from("MAC"),
			src:       parser.core.src.clone(),
			location:  line.span,
		}));
	};
	parser.core.macros.begin_definition(&name, Vec::new(), line.span);
	Ok(())
}

/// `>>>` / `PMC`: explicit macro call, `>>> NAME,arg1;arg2` style.
fn handle_pmc(parser: &mut MerlinParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let operand = line.operand.clone();
	let (name, arguments) = operand
		.split_once([',', ' ', '.', '/', '-'])
		.map_or((operand.trim(), ""), |(name, rest)| (name.trim(), rest));
	if name.is_empty() {
		return Err(Box::new(AssemblyError::MissingOperand {
			directive: SharedStr::from("PMC"),
			src:       parser.core.src.clone(),
			location:  line.span,
		}));
	}
	parser.expand_macro(&name.to_uppercase(), arguments, line.span);
	Ok(())
}
