//! The generic syntax front-end: `.org`/`.db`-style directives, C-style numbers.

use std::sync::Arc;

use miette::SourceSpan;

use super::{
	lines_with_spans, process_include, split_fields, strip_comment, Line, ParseOutput, ParserCore, SyntaxParser,
};
use crate::atom::{AtomKind, DataWidth, Endianness};
use crate::common::AssemblyCode;
use crate::cpu::{split_operands, CpuBackend};
use crate::directive::DirectiveRegistry;
use crate::error::AssemblyError;
use crate::expression::NumberFormat;
use crate::mcro::{CapturedBlock, MacroDialect};
use crate::options::AssemblerOptions;
use crate::symbol::SymbolKind;
use flexstr::SharedStr;

const DIALECT: MacroDialect = MacroDialect { begin_words: &["MACRO"], end_words: &["ENDM"] };

/// The generic front-end.
pub struct SimpleParser<'a> {
	core:       ParserCore<'a>,
	registry:   DirectiveRegistry<SimpleParser<'a>>,
	endianness: Endianness,
}

/// Parses one source unit in the generic syntax.
#[must_use]
pub fn parse(
	source: &Arc<AssemblyCode>,
	options: &AssemblerOptions,
	cpu: &dyn CpuBackend,
	format: &dyn NumberFormat,
) -> ParseOutput {
	let endianness = if cpu.family_name() == "6809" { Endianness::Big } else { Endianness::Little };
	let mut parser = SimpleParser {
		core: ParserCore::new(source.clone(), options, cpu, format, DIALECT, true),
		registry: build_registry(),
		endianness,
	};
	let lines = lines_with_spans(source);
	let final_span = lines.last().map_or_else(|| (0, 1).into(), |(_, span)| *span);
	for (line, span) in lines {
		if parser.core.end_seen {
			break;
		}
		parser.process_line(&line, span);
	}
	parser.core.finish(final_span);
	parser.core.into_output()
}

fn build_registry<'a>() -> DirectiveRegistry<SimpleParser<'a>> {
	let mut registry = DirectiveRegistry::new();
	registry.register_aliases(&["ORG", ".ORG"], handle_org);
	registry.register_aliases(&["EQU", ".EQU"], handle_equ);
	registry.register_aliases(&["SET", ".SET"], handle_set);
	registry.register_aliases(&["DB", ".DB", "BYTE", ".BYTE"], handle_byte);
	registry.register_aliases(&["DW", ".DW", "WORD", ".WORD"], handle_word);
	registry.register_aliases(&["DS", ".DS", "SPACE", ".SPACE"], handle_space);
	registry.register_aliases(&["ALIGN", ".ALIGN"], handle_align);
	registry.register_aliases(&["INCLUDE", ".INCLUDE"], handle_include);
	registry.register_aliases(&["END", ".END"], handle_end);
	registry.register_aliases(&["IF", ".IF"], handle_if);
	registry.register_aliases(&["ELSE", ".ELSE"], handle_else);
	registry.register_aliases(&["ENDIF", ".ENDIF"], handle_endif);
	registry.register("MACRO", handle_macro);
	registry.register("ENDM", handle_endm);
	registry
}

/// Directives that bind the line's label themselves instead of defining it as an address label.
fn consumes_label(word: &str) -> bool {
	matches!(word, "EQU" | ".EQU" | "SET" | ".SET" | "MACRO")
}

const fn is_local_prefix(character: char) -> bool {
	character == '.'
}

impl SimpleParser<'_> {
	fn define_line_label(&mut self, label: &str, span: SourceSpan) {
		let name = label.trim_end_matches(':');
		if name.is_empty() {
			return;
		}
		if is_local_prefix(name.chars().next().unwrap_or_default()) {
			match self.core.qualify_local(name, span) {
				Ok(qualified) => self.core.define_label(&qualified, span),
				Err(error) => self.core.errors.push(*error),
			}
		} else {
			self.core.scope = SharedStr::from(name);
			self.core.define_label(name, span);
		}
	}

	fn expand_macro(&mut self, name: &str, line: &Line) {
		let arguments = split_operands(&line.operand);
		let mut positional = vec![line.label.clone().unwrap_or_default()];
		positional.extend(arguments.iter().cloned());
		let expansion = match self.core.macros.expand(name, &arguments, &positional) {
			Ok(lines) => lines,
			Err(error) => {
				self.core.macro_error(&error, line.span);
				return;
			},
		};
		if let Err(error) = self.core.macros.enter_expansion(name) {
			self.core.macro_error(&error, line.span);
			return;
		}
		for text in expansion {
			if self.core.end_seen {
				break;
			}
			// EXITM only counts outside a nested body capture; captured lines are raw text.
			if self.core.conditionals.should_emit() && !self.core.macros.is_capturing() && is_exitm(&text) {
				break;
			}
			self.process_line(&text, line.span);
		}
		self.core.macros.leave_expansion();
	}

	fn emit_instruction(&mut self, mnemonic: &str, operand: &str, span: SourceSpan) {
		let qualified = self.core.qualify_local_references(operand, is_local_prefix);
		self.core.emit(
			AtomKind::Instruction {
				mnemonic: SharedStr::from(mnemonic.to_uppercase()),
				operand:  qualified,
				encoding: Vec::new(),
			},
			span,
		);
	}
}

fn is_exitm(text: &str) -> bool {
	text.split_whitespace().take(2).any(|token| token.eq_ignore_ascii_case("EXITM"))
}

impl<'a> SyntaxParser<'a> for SimpleParser<'a> {
	fn core(&mut self) -> &mut ParserCore<'a> {
		&mut self.core
	}

	fn process_line(&mut self, text: &str, span: SourceSpan) {
		if self.core.macros.is_capturing() {
			if let Some(CapturedBlock::Repeat { .. }) = self.core.macros.capture_line(text) {
				// The generic syntax has no repeat directives; a stray block is dropped.
			}
			return;
		}
		let stripped = strip_comment(text, &[';'], false);
		if stripped.trim().is_empty() {
			return;
		}
		let mut line = split_fields(&stripped, span);
		// Indented `name:` labels are fine in the generic syntax; the colon marks them.
		if line.label.is_none() {
			if let Some(first) = line.mnemonic.clone() {
				if first.ends_with(':') {
					line.label = Some(first);
					let rest = line.operand.clone();
					let mut fields = rest.trim().splitn(2, char::is_whitespace);
					line.mnemonic = fields.next().filter(|field| !field.is_empty()).map(str::to_owned);
					line.operand = fields.next().unwrap_or("").trim().to_owned();
				}
			}
		}
		let word = line.mnemonic.as_deref().map(str::to_uppercase).unwrap_or_default();

		if !self.core.conditionals.should_emit() {
			match word.as_str() {
				"IF" | ".IF" => self.core.begin_if(false, span),
				"ELSE" | ".ELSE" => self.core.begin_else(span),
				"ENDIF" | ".ENDIF" => self.core.end_if(span),
				"MACRO" => {
					// Macros may be defined inside dead code, just not expanded there.
					let _ = handle_macro(self, &line);
				},
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
		if let Some(handler) = self.registry.get(&word) {
			if let Err(error) = handler(self, &line) {
				self.core.errors.push(*error);
			}
			return;
		}
		if self.core.macros.is_macro(&word) {
			self.expand_macro(&word, &line);
			return;
		}
		// A dot-prefixed word that is not registered can only be a misspelled directive.
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
		self.emit_instruction(&mnemonic, &line.operand, span);
	}
}

fn handle_org(parser: &mut SimpleParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let address = parser.core.eval_expr(&line.operand, line.span)?;
	parser.core.emit(AtomKind::Org { address }, line.span);
	Ok(())
}

fn equ_like(parser: &mut SimpleParser<'_>, line: &Line, kind: SymbolKind) -> Result<(), Box<AssemblyError>> {
	let Some(label) = line.label.as_deref() else {
		return Err(Box::new(AssemblyError::MissingLabel {
			directive: SharedStr::from(line.mnemonic.clone().unwrap_or_default()),
			src:       parser.core.src.clone(),
			location:  line.span,
		}));
	};
	let name = label.trim_end_matches(':').to_owned();
	parser.core.define_value_symbol(&name, kind, &line.operand, line.span);
	Ok(())
}

fn handle_equ(parser: &mut SimpleParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	equ_like(parser, line, SymbolKind::Equate)
}

fn handle_set(parser: &mut SimpleParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	// Without a label this may be the Z80 bit instruction `SET b,r`; let the CPU decide.
	if line.label.is_none() && line.mnemonic.as_deref().is_some_and(|word| word.eq_ignore_ascii_case("SET")) {
		parser.emit_instruction("SET", &line.operand, line.span);
		return Ok(());
	}
	equ_like(parser, line, SymbolKind::Set)
}

fn handle_byte(parser: &mut SimpleParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let operand = parser.core.qualify_local_references(&line.operand, is_local_prefix);
	let endianness = parser.endianness;
	parser.core.emit_data_items(&operand, DataWidth::Byte, endianness, line.span, |byte, _, _| byte);
	Ok(())
}

fn handle_word(parser: &mut SimpleParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let operand = parser.core.qualify_local_references(&line.operand, is_local_prefix);
	let endianness = parser.endianness;
	parser.core.emit_data_items(&operand, DataWidth::Word, endianness, line.span, |byte, _, _| byte);
	Ok(())
}

fn handle_space(parser: &mut SimpleParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let count = parser.core.eval_expr(&line.operand, line.span)?;
	parser.core.emit(AtomKind::Space { count: count.max(0) as usize }, line.span);
	Ok(())
}

fn handle_align(parser: &mut SimpleParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let alignment = parser.core.eval_expr(&line.operand, line.span)?;
	parser.core.emit(AtomKind::Align { alignment: alignment.max(1) as usize }, line.span);
	Ok(())
}

fn handle_include(parser: &mut SimpleParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let file = line.operand.trim().trim_matches('"').to_owned();
	process_include(parser, &file, line.span);
	Ok(())
}

fn handle_end(parser: &mut SimpleParser<'_>, _line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.end_seen = true;
	Ok(())
}

fn handle_if(parser: &mut SimpleParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
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

fn handle_else(parser: &mut SimpleParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.begin_else(line.span);
	Ok(())
}

fn handle_endif(parser: &mut SimpleParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.end_if(line.span);
	Ok(())
}

fn handle_macro(parser: &mut SimpleParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let Some(name) = line.label.as_deref() else {
		return Err(Box::new(AssemblyError::MissingLabel {
			directive: SharedStr::from("MACRO"),
			src:       parser.core.src.clone(),
			location:  line.span,
		}));
	};
	let parameters = split_operands(&line.operand).into_iter().map(SharedStr::from).collect();
	parser.core.macros.begin_definition(name.trim_end_matches(':'), parameters, line.span);
	Ok(())
}

fn handle_endm(parser: &mut SimpleParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	Err(Box::new(AssemblyError::EndmWithoutMacro { src: parser.core.src.clone(), location: line.span }))
}
