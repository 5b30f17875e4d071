//! The S-C Macro Assembler front-end: line numbers, dot directives, the delimiter high-bit rule.

use std::sync::Arc;

use flexstr::SharedStr;
use miette::SourceSpan;

use super::{
	lines_with_spans, process_include, split_fields, strip_comment, Line, ParseOutput, ParserCore, SyntaxParser,
};
use crate::atom::{AtomKind, DataAtom, DataWidth, Endianness, ListingControl};
use crate::common::{AssemblyCode, MemoryAddress};
use crate::cpu::{split_operands, CpuBackend};
use crate::directive::DirectiveRegistry;
use crate::error::AssemblyError;
use crate::expression::{Expression, NumberFormat, UnaryOperator};
use crate::mcro::MacroDialect;
use crate::options::AssemblerOptions;
use crate::symbol::SymbolKind;

const DIALECT: MacroDialect = MacroDialect { begin_words: &[".MA"], end_words: &[".EM"] };

/// The SCMASM front-end.
pub struct ScmasmParser<'a> {
	core:     ParserCore<'a>,
	registry: DirectiveRegistry<ScmasmParser<'a>>,
	/// Dummy-section counter while inside `.DUMMY`/`.ED`.
	dummy:    Option<MemoryAddress>,
	/// Whether a `.PH` block is open.
	phased:   bool,
}

/// Parses one source unit in SCMASM syntax.
#[must_use]
pub fn parse(
	source: &Arc<AssemblyCode>,
	options: &AssemblerOptions,
	cpu: &dyn CpuBackend,
	format: &dyn NumberFormat,
) -> ParseOutput {
	let mut parser = ScmasmParser {
		// SCMASM folds symbol case.
		core: ParserCore::new(source.clone(), options, cpu, format, DIALECT, false),
		registry: build_registry(),
		dummy: None,
		phased: false,
	};
	let lines = lines_with_spans(source);
	let final_span = lines.last().map_or_else(|| (0, 1).into(), |(_, span)| *span);
	for (line, span) in lines {
		if parser.core.end_seen {
			break;
		}
		parser.process_line(&line, span);
	}
	if parser.phased {
		parser.core.error(AssemblyError::DephaseWithoutPhase {
			src:      parser.core.src.clone(),
			location: final_span,
		});
	}
	parser.core.finish(final_span);
	parser.core.into_output()
}

fn build_registry<'a>() -> DirectiveRegistry<ScmasmParser<'a>> {
	let mut registry = DirectiveRegistry::new();
	registry.register(".OR", handle_or);
	registry.register(".EQ", handle_eq);
	registry.register(".SE", handle_se);
	registry.register(".DA", handle_da);
	registry.register(".HS", handle_hs);
	registry.register_aliases(&[".AS", ".AT", ".AZ"], handle_ascii);
	registry.register(".BS", handle_bs);
	registry.register_aliases(&[".IN", ".INB"], handle_inb);
	registry.register(".EN", handle_en);
	registry.register(".DO", handle_do);
	registry.register(".ELSE", handle_else);
	registry.register(".FIN", handle_fin);
	registry.register(".MA", handle_ma);
	registry.register(".EM", handle_em);
	registry.register(".PH", handle_ph);
	registry.register(".EP", handle_ep);
	registry.register_aliases(&[".DUMMY", ".DU"], handle_dummy);
	registry.register(".ED", handle_ed);
	registry.register(".LIST", handle_list);
	registry.register(".PG", handle_pg);
	registry.register(".TI", handle_ti);
	registry
}

fn consumes_label(word: &str) -> bool {
	matches!(word, ".EQ" | ".SE" | ".MA")
}

/// Directives whose operand is free text (string bodies, titles); everything else keeps only the
/// first field, the rest of the line being a comment.
fn takes_raw_operand(word: &str) -> bool {
	matches!(word, ".AS" | ".AT" | ".AZ" | ".TI")
}

const fn is_local_prefix(character: char) -> bool {
	character == '.'
}

/// Strips an optional BASIC-style line number (0-65535).
fn strip_line_number<'l>(
	text: &'l str,
	core: &mut ParserCore<'_>,
	span: SourceSpan,
) -> &'l str {
	let digits = text.chars().take_while(char::is_ascii_digit).count();
	if digits == 0 {
		return text;
	}
	let (number, rest) = text.split_at(digits);
	if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
		// Not a line number after all (e.g. a label starting with digits is not legal anyway).
		return text;
	}
	if let Ok(value) = number.parse::<i64>() {
		if value > 65535 {
			core.error(AssemblyError::LineNumberRange { value, src: core.src.clone(), location: span });
		}
	}
	rest
}

impl ScmasmParser<'_> {
	fn define_line_label(&mut self, label: &str, span: SourceSpan) {
		if label.is_empty() {
			return;
		}
		if let Some(address) = self.dummy {
			let result = self
				.core
				.symbols
				.define(label, SymbolKind::Equate, Expression::Literal(address), span)
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
		if label.starts_with('.') {
			match self.core.qualify_local(label, span) {
				Ok(qualified) => self.core.define_label(&qualified, span),
				Err(error) => self.core.errors.push(*error),
			}
		} else {
			self.core.scope = SharedStr::from(label);
			self.core.define_label(label, span);
		}
	}

	/// Expands a macro invocation (`>NAME args`); parameters appear as `\1`-`\9`, `\0` is the
	/// invocation label.
	fn expand_macro(&mut self, name: &str, label: &str, operand: &str, span: SourceSpan) {
		let arguments = split_operands(operand);
		let mut positional = vec![label.to_owned()];
		positional.extend(arguments.iter().cloned());
		let expansion = match self.core.macros.expand(name, &arguments, &positional) {
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
			self.process_line(&text, span);
		}
		self.core.macros.leave_expansion();
	}

	fn qualify_operand(&self, operand: &str) -> String {
		self.core.qualify_local_references(operand, is_local_prefix)
	}
}

impl<'a> SyntaxParser<'a> for ScmasmParser<'a> {
	fn core(&mut self) -> &mut ParserCore<'a> {
		&mut self.core
	}

	fn process_line(&mut self, text: &str, span: SourceSpan) {
		if self.core.macros.is_capturing() {
			let numberless = strip_line_number(text, &mut self.core, span).to_owned();
			let _ = self.core.macros.capture_line(&numberless);
			return;
		}
		let numberless = strip_line_number(text, &mut self.core, span).to_owned();
		let stripped = strip_comment(&numberless, &[';'], true);
		if stripped.trim().is_empty() {
			return;
		}
		let mut line = split_fields(&stripped, span);
		let word = line.mnemonic.as_deref().map(str::to_uppercase).unwrap_or_default();
		if !takes_raw_operand(&word) {
			line.operand = super::first_operand_field(&line.operand);
		}

		if !self.core.conditionals.should_emit() {
			match word.as_str() {
				".DO" => self.core.begin_if(false, span),
				".ELSE" => self.core.begin_else(span),
				".FIN" => self.core.end_if(span),
				".MA" => {
					let _ = handle_ma(self, &line);
				},
				_ => {},
			}
			return;
		}

		if self.dummy.is_some() {
			if let Some(label) = line.label.clone() {
				if !consumes_label(&word) {
					self.define_line_label(&label, span);
				}
			}
			match word.as_str() {
				".EQ" | ".SE" => {
					if let Err(error) = if word == ".EQ" { handle_eq(self, &line) } else { handle_se(self, &line) } {
						self.core.errors.push(*error);
					}
				},
				".BS" => {
					let size = self.core.report(self.core.eval_expr(&line.operand, line.span)).unwrap_or(0);
					self.dummy = self.dummy.map(|address| address + size);
				},
				".DA" => {
					let size = split_operands(&line.operand)
						.iter()
						.map(|item| if item.starts_with('#') || item.starts_with('/') { 1 } else { 2 })
						.sum::<MemoryAddress>();
					self.dummy = self.dummy.map(|address| address + size);
				},
				".ED" => self.dummy = None,
				_ => {},
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
		if let Some(invoked) = mnemonic.strip_prefix('>') {
			let label = line.label.clone().unwrap_or_default();
			// The whole rest of the line is the argument list.
			let arguments = format!("{} {}", invoked, line.operand);
			let (name, rest) = arguments.split_once(' ').unwrap_or((arguments.as_str(), ""));
			self.expand_macro(&name.to_uppercase(), &label, rest.trim(), span);
			return;
		}
		if let Some(handler) = self.registry.get(&word) {
			if let Err(error) = handler(self, &line) {
				self.core.errors.push(*error);
			}
			return;
		}
		// Every SCMASM directive starts with a dot; an unregistered dot word is a typo.
		if word.starts_with('.') {
			let error = AssemblyError::UnknownDirective {
				directive: SharedStr::from(word.as_str()),
				help:      self.registry.suggestions_for(&word),
				src:       self.core.src.clone(),
				location:  span,
			};
			self.core.error(error);
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

fn handle_or(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let address = parser.core.eval_expr(&line.operand, line.span)?;
	parser.core.emit(AtomKind::Org { address }, line.span);
	Ok(())
}

fn equ_like(parser: &mut ScmasmParser<'_>, line: &Line, kind: SymbolKind) -> Result<(), Box<AssemblyError>> {
	let Some(label) = line.label.clone() else {
		return Err(Box::new(AssemblyError::MissingLabel {
			directive: SharedStr::from(line.mnemonic.clone().unwrap_or_default()),
			src:       parser.core.src.clone(),
			location:  line.span,
		}));
	};
	let operand = parser.qualify_operand(&line.operand);
	parser.core.define_value_symbol(&label, kind, &operand, line.span);
	Ok(())
}

fn handle_eq(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	equ_like(parser, line, SymbolKind::Equate)
}

fn handle_se(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	equ_like(parser, line, SymbolKind::Set)
}

/// `.DA`: words by default; `#expr` stores the low byte, `/expr` the high byte.
fn handle_da(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let operand = parser.qualify_operand(&line.operand);
	for item in split_operands(&operand) {
		if item.is_empty() {
			continue;
		}
		let (width, expression_text, wrap) = match item.chars().next() {
			Some('#') => (DataWidth::Byte, &item[1 ..], Some(UnaryOperator::LowByte)),
			Some('/') => (DataWidth::Byte, &item[1 ..], Some(UnaryOperator::HighByte)),
			_ => (DataWidth::Word, item.as_str(), None),
		};
		match parser.core.parse_expr(expression_text, line.span) {
			Ok(expression) => {
				let expression = match wrap {
					Some(operator) => Expression::Unary { operator, operand: Box::new(expression) },
					None => expression,
				};
				parser.core.emit(
					AtomKind::Data(DataAtom::from_expressions(vec![expression], width, Endianness::Little)),
					line.span,
				);
			},
			Err(error) => parser.core.errors.push(*error),
		}
	}
	Ok(())
}

/// `.HS`: hex string, dots and spaces allowed as separators.
fn handle_hs(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let mut bytes = Vec::new();
	let mut pending: Option<u32> = None;
	for character in line.operand.chars() {
		if character == '.' || character == ',' || character.is_whitespace() {
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

/// `.AS`/`.AT`/`.AZ`: ASCII string with the delimiter high-bit rule (delimiters below `'` set
/// bit 7). `.AT` additionally sets the high bit on the last character, `.AZ` appends a zero.
fn handle_ascii(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let word = line.mnemonic.as_deref().map(str::to_uppercase).unwrap_or_default();
	let operand = line.operand.trim();
	let mut characters = operand.chars();
	let Some(delimiter) = characters.next() else {
		return Err(Box::new(AssemblyError::MissingOperand {
			directive: SharedStr::from(word.as_str()),
			src:       parser.core.src.clone(),
			location:  line.span,
		}));
	};
	let rest: String = characters.collect();
	let body = rest.split(delimiter).next().unwrap_or_default();
	let mask: u8 = if (delimiter as u32) < 0x27 { 0x80 } else { 0x00 };
	let mut bytes: Vec<u8> = body.bytes().map(|byte| byte | mask).collect();
	if word == ".AT" {
		if let Some(last) = bytes.last_mut() {
			*last |= 0x80;
		}
	}
	if word == ".AZ" {
		bytes.push(0);
	}
	parser.core.emit(AtomKind::Data(DataAtom::from_bytes(bytes)), line.span);
	Ok(())
}

fn handle_bs(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let count = parser.core.eval_expr(&line.operand, line.span)?;
	parser.core.emit(AtomKind::Space { count: count.max(0) as usize }, line.span);
	Ok(())
}

fn handle_inb(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let file = line.operand.trim().to_owned();
	process_include(parser, &file, line.span);
	Ok(())
}

fn handle_en(parser: &mut ScmasmParser<'_>, _line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.end_seen = true;
	Ok(())
}

fn handle_do(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
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

fn handle_else(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.begin_else(line.span);
	Ok(())
}

fn handle_fin(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.end_if(line.span);
	Ok(())
}

/// `.MA`: begin a macro definition; the name is the label or the operand.
fn handle_ma(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let name = line
		.label
		.clone()
		.filter(|label| !label.is_empty())
		.or_else(|| (!line.operand.trim().is_empty()).then(|| line.operand.trim().to_owned()));
	let Some(name) = name else {
		return Err(Box::new(AssemblyError::MissingLabel {
			directive: SharedStr::from(".MA"),
			src:       parser.core.src.clone(),
			location:  line.span,
		}));
	};
	parser.core.macros.begin_definition(&name, Vec::new(), line.span);
	Ok(())
}

fn handle_em(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	Err(Box::new(AssemblyError::EndmWithoutMacro { src: parser.core.src.clone(), location: line.span }))
}

/// `.PH`: begin phased assembly; labels take addresses from here while bytes stay put.
fn handle_ph(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let address = parser.core.eval_expr(&line.operand, line.span)?;
	parser.phased = true;
	parser.core.emit(AtomKind::Phase { address }, line.span);
	Ok(())
}

fn handle_ep(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	if !parser.phased {
		return Err(Box::new(AssemblyError::DephaseWithoutPhase {
			src:      parser.core.src.clone(),
			location: line.span,
		}));
	}
	parser.phased = false;
	parser.core.emit(AtomKind::Dephase, line.span);
	Ok(())
}

fn handle_dummy(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let address = if line.operand.trim().is_empty() {
		parser.core.parse_address
	} else {
		parser.core.eval_expr(&line.operand, line.span)?
	};
	parser.dummy = Some(address);
	Ok(())
}

fn handle_ed(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	if parser.dummy.take().is_none() {
		return Err(Box::new(AssemblyError::DendWithoutDum {
			src:      parser.core.src.clone(),
			location: line.span,
		}));
	}
	Ok(())
}

fn handle_list(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let on = !line.operand.trim().eq_ignore_ascii_case("OFF");
	parser.core.emit(AtomKind::ListingControl(ListingControl::List(on)), line.span);
	Ok(())
}

fn handle_pg(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.emit(AtomKind::ListingControl(ListingControl::Page), line.span);
	Ok(())
}

fn handle_ti(parser: &mut ScmasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.emit(
		AtomKind::ListingControl(ListingControl::Title(SharedStr::from(line.operand.trim()))),
		line.span,
	);
	Ok(())
}
