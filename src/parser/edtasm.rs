//! The EDTASM-M80++ front-end: the universal superset of the M80/ZMAC/Z80ASM family.

use std::sync::Arc;

use flexstr::SharedStr;
use miette::SourceSpan;

use super::{
	lines_with_spans, process_include, split_fields, strip_comment, Line, ParseOutput, ParserCore, SyntaxParser,
};
use crate::atom::{AtomKind, DataWidth, Endianness, ListingControl};
use crate::common::AssemblyCode;
use crate::cpu::{split_operands, CpuBackend};
use crate::directive::DirectiveRegistry;
use crate::error::AssemblyError;
use crate::expression::NumberFormat;
use crate::mcro::{CapturedBlock, MacroDialect, RepeatKind};
use crate::options::AssemblerOptions;
use crate::section::{Section, SectionAttributes};
use crate::segments::{SegmentManager, SegmentType};
use crate::symbol::SymbolKind;

const DIALECT: MacroDialect =
	MacroDialect { begin_words: &["MACRO", "REPT", "IRP", "IRPC"], end_words: &["ENDM"] };

/// The EDTASM-M80++ front-end.
pub struct EdtasmParser<'a> {
	core:       ParserCore<'a>,
	registry:   DirectiveRegistry<EdtasmParser<'a>>,
	segments:   SegmentManager,
	/// Whether a `PHASE` block is open.
	phased:     bool,
	/// Multi-byte data order, decided by the target CPU (big-endian on the 6809 side of the
	/// EDTASM family).
	endianness: Endianness,
}

/// Parses one source unit in the Z80-family universal syntax.
#[must_use]
pub fn parse(
	source: &Arc<AssemblyCode>,
	options: &AssemblerOptions,
	cpu: &dyn CpuBackend,
	format: &dyn NumberFormat,
) -> ParseOutput {
	let endianness = if cpu.family_name() == "6809" { Endianness::Big } else { Endianness::Little };
	let mut parser = EdtasmParser {
		// The M80 family folds symbol case.
		core: ParserCore::new(source.clone(), options, cpu, format, DIALECT, false),
		registry: build_registry(),
		segments: SegmentManager::new(),
		phased: false,
		endianness,
	};
	parser.core.sections[0].name = SharedStr::from("CSEG");
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

#[allow(clippy::too_many_lines)]
fn build_registry<'a>() -> DirectiveRegistry<EdtasmParser<'a>> {
	let mut registry = DirectiveRegistry::new();
	registry.register("ORG", handle_org);
	registry.register_aliases(&["EQU", "="], handle_equ);
	registry.register_aliases(&["SET", "DEFL", "ASET"], handle_set);
	registry.register_aliases(&["DB", "DEFB", "BYTE", "DM", "DEFM", "TEXT", "ASCII", "FCB", "FCC"], handle_db);
	registry.register("DC", handle_dc);
	registry.register_aliases(&["DW", "DEFW", "WORD", "FDB"], handle_dw);
	registry.register_aliases(&["DEF3", "D3"], handle_d3);
	registry.register_aliases(&["DEFD", "DWORD"], handle_dd);
	registry.register_aliases(&["DS", "DEFS", "BLOCK", "RMEM"], handle_ds);
	registry.register("ALIGN", handle_align);
	registry.register("CSEG", handle_cseg);
	registry.register("DSEG", handle_dseg);
	registry.register("ASEG", handle_aseg);
	registry.register("COMMON", handle_common);
	registry.register("PHASE", handle_phase);
	registry.register("DEPHASE", handle_dephase);
	registry.register_aliases(&["PUBLIC", "GLOBAL", "ENTRY"], handle_public);
	registry.register_aliases(&["EXTERN", "EXTRN", "EXT"], handle_extern);
	registry.register_aliases(&["IF", "IFT", "COND"], handle_if);
	registry.register_aliases(&["IFF", "IFE"], handle_ife);
	registry.register("IFDEF", handle_ifdef);
	registry.register("IFNDEF", handle_ifndef);
	registry.register("IF1", handle_if1);
	registry.register("IF2", handle_if2);
	registry.register("IFB", handle_ifb);
	registry.register("IFNB", handle_ifnb);
	registry.register("IFIDN", handle_ifidn);
	registry.register("IFDIF", handle_ifdif);
	registry.register_aliases(&["IFEQ", "IFNE", "IFLT", "IFGT", "IFLE", "IFGE"], handle_compare_if);
	registry.register("ELSE", handle_else);
	registry.register_aliases(&["ENDIF", "ENDC"], handle_endif);
	registry.register("MACRO", handle_macro);
	registry.register("ENDM", handle_endm);
	registry.register("REPT", handle_rept);
	registry.register("IRP", handle_irp);
	registry.register("IRPC", handle_irpc);
	registry.register("EXITM", handle_exitm);
	registry.register("INCLUDE", handle_include);
	registry.register_aliases(&[".RADIX", "RADIX", "*RADIX"], handle_radix);
	registry.register("SETDP", handle_setdp);
	registry.register_aliases(&[".LIST", "LIST"], handle_list);
	registry.register_aliases(&[".XLIST", "NOLIST", "XLIST"], handle_xlist);
	registry.register(".LALL", handle_lall);
	registry.register(".SALL", handle_sall);
	registry.register(".XALL", handle_xall);
	registry.register_aliases(&["TITLE", ".TITLE"], handle_title);
	registry.register_aliases(&["SUBTTL", ".SUBTTL"], handle_subttl);
	registry.register_aliases(&["PAGE", "EJECT", ".PAGE"], handle_page);
	registry.register("SPACE", handle_space_listing);
	registry.register("NAME", handle_name);
	registry.register("END", handle_end);
	registry
}

fn consumes_label(word: &str) -> bool {
	matches!(word, "EQU" | "=" | "SET" | "DEFL" | "ASET" | "MACRO")
}

const fn is_local_prefix(character: char) -> bool {
	matches!(character, '.' | '$' | '?')
}

fn is_conditional_word(word: &str) -> bool {
	matches!(
		word,
		"IF" | "IFT" | "COND" | "IFF" | "IFE" | "IFDEF" | "IFNDEF" | "IF1" | "IF2" | "IFB" | "IFNB"
			| "IFIDN" | "IFDIF" | "IFEQ" | "IFNE" | "IFLT" | "IFGT" | "IFLE" | "IFGE"
	)
}

/// Strips the `<...>` quoting M80 uses around conditional and IRP arguments.
fn strip_angle_brackets(text: &str) -> &str {
	let trimmed = text.trim();
	trimmed
		.strip_prefix('<')
		.and_then(|rest| rest.strip_suffix('>'))
		.unwrap_or(trimmed)
}

impl<'a> EdtasmParser<'a> {
	fn define_line_label(&mut self, label: &str, span: SourceSpan) {
		let public = label.ends_with("::");
		let name = label.trim_end_matches(':');
		if name.is_empty() {
			return;
		}
		if is_local_prefix(name.chars().next().unwrap_or_default()) {
			match self.core.qualify_local(name, span) {
				Ok(qualified) => self.core.define_label(&qualified, span),
				Err(error) => self.core.errors.push(*error),
			}
			return;
		}
		self.core.scope = SharedStr::from(name);
		self.core.define_label(name, span);
		if public {
			self.core.symbols.mark_exported(name, span);
		}
	}

	fn expand_macro(&mut self, name: &str, line: &Line) {
		let arguments: Vec<String> =
			split_operands(&line.operand).iter().map(|argument| strip_angle_brackets(argument).to_owned()).collect();
		let mut positional = vec![line.label.clone().unwrap_or_default()];
		positional.extend(arguments.iter().cloned());
		let expansion = match self.core.macros.expand(name, &arguments, &positional) {
			Ok(lines) => lines,
			Err(error) => {
				self.core.macro_error(&error, line.span);
				return;
			},
		};
		self.run_expansion(name, expansion, line.span);
	}

	/// Feeds expanded lines back through the parser, honoring `EXITM`.
	fn run_expansion(&mut self, name: &str, expansion: Vec<String>, span: SourceSpan) {
		if let Err(error) = self.core.macros.enter_expansion(name) {
			self.core.macro_error(&error, span);
			return;
		}
		for text in expansion {
			if self.core.end_seen {
				break;
			}
			if self.core.conditionals.should_emit() && !self.core.macros.is_capturing() && is_exitm(&text) {
				break;
			}
			self.process_line(&text, span);
		}
		self.core.macros.leave_expansion();
	}

	fn qualify_operand(&self, operand: &str) -> String {
		self.core.qualify_local_references(operand, is_local_prefix)
	}

	/// Switches to a segment's section, creating it on first use; address counters per segment
	/// survive the switch.
	fn switch_segment(&mut self, kind: SegmentType, name: &str, attributes: SectionAttributes) {
		self.segments.record_address(self.core.parse_address);
		match kind {
			SegmentType::Common => self.segments.switch_to_common(name),
			other => self.segments.switch_to(other),
		}
		let section_name = if kind == SegmentType::Common {
			format!("COMMON/{name}/")
		} else {
			name.to_owned()
		};
		let index = self.core.sections.iter().position(|section| section.name == section_name.as_str());
		let index = index.unwrap_or_else(|| {
			self.core.sections.push(Section::new(&section_name, attributes, self.segments.current_address()));
			self.core.sections.len() - 1
		});
		self.core.current_section = index;
		self.core.parse_address = self.segments.current_address();
	}

	fn emit_data(&mut self, line: &Line, width: DataWidth) {
		let operand = self.qualify_operand(&line.operand);
		let endianness = self.endianness;
		self.core.emit_data_items(&operand, width, endianness, line.span, |byte, _, _| byte);
	}
}

fn is_exitm(text: &str) -> bool {
	text.split_whitespace().take(2).any(|token| token.eq_ignore_ascii_case("EXITM"))
}

impl<'a> SyntaxParser<'a> for EdtasmParser<'a> {
	fn core(&mut self) -> &mut ParserCore<'a> {
		&mut self.core
	}

	fn process_line(&mut self, text: &str, span: SourceSpan) {
		if self.core.macros.is_capturing() {
			if let Some(block) = self.core.macros.capture_line(text) {
				match block {
					CapturedBlock::Defined(_) => {},
					CapturedBlock::Repeat { kind, body } => {
						if self.core.conditionals.should_emit() {
							let expansion = self.core.macros.expand_repeat(&kind, &body);
							self.run_expansion("REPT", expansion, span);
						}
					},
				}
			}
			return;
		}
		let stripped = strip_comment(text, &[';'], true);
		if stripped.trim().is_empty() {
			return;
		}
		let mut line = split_fields(&stripped, span);
		let mut word = line.mnemonic.as_deref().map(str::to_uppercase).unwrap_or_default();

		// A column-one word that is itself a directive or macro starts the mnemonic field; the
		// label slot shifts right. (`.LIST` is a directive, `.loop:` is a label.)
		if let Some(label) = line.label.clone() {
			let bare = label.trim_end_matches(':');
			let label_is_statement = !label.ends_with(':')
				&& !consumes_label(&word)
				&& (self.registry.contains(bare) || self.core.macros.is_macro(bare));
			if label_is_statement {
				let rest = if line.mnemonic.is_some() {
					format!("{} {}", line.mnemonic.clone().unwrap_or_default(), line.operand)
				} else {
					String::new()
				};
				line.operand = rest.trim().to_owned();
				line.mnemonic = Some(bare.to_owned());
				line.label = None;
				word = bare.to_uppercase();
			}
		}

		if !self.core.conditionals.should_emit() {
			if is_conditional_word(&word) {
				// Nested conditionals in a dead branch still track nesting.
				self.core.begin_if(false, span);
			} else {
				match word.as_str() {
					"ELSE" => self.core.begin_else(span),
					"ENDIF" | "ENDC" => self.core.end_if(span),
					"MACRO" => {
						let _ = handle_macro(self, &line);
					},
					_ => {},
				}
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

fn handle_org(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let address = parser.core.eval_expr(&line.operand, line.span)?;
	parser.segments.set_origin(address);
	parser.core.emit(AtomKind::Org { address }, line.span);
	Ok(())
}

fn equ_like(parser: &mut EdtasmParser<'_>, line: &Line, kind: SymbolKind) -> Result<(), Box<AssemblyError>> {
	let Some(label) = line.label.clone() else {
		return Err(Box::new(AssemblyError::MissingLabel {
			directive: SharedStr::from(line.mnemonic.clone().unwrap_or_default()),
			src:       parser.core.src.clone(),
			location:  line.span,
		}));
	};
	let name = label.trim_end_matches(':').to_owned();
	let operand = parser.qualify_operand(&line.operand);
	parser.core.define_value_symbol(&name, kind, &operand, line.span);
	Ok(())
}

fn handle_equ(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	equ_like(parser, line, SymbolKind::Equate)
}

fn handle_set(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	// Without a label this is the Z80 bit instruction `SET b,r`, not the symbol directive.
	if line.label.is_none() {
		let operand = parser.qualify_operand(&line.operand);
		parser.core.emit(
			AtomKind::Instruction { mnemonic: SharedStr::from("SET"), operand, encoding: Vec::new() },
			line.span,
		);
		return Ok(());
	}
	equ_like(parser, line, SymbolKind::Set)
}

fn handle_db(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.emit_data(line, DataWidth::Byte);
	Ok(())
}

/// `DC`: string with the final character's high bit set.
fn handle_dc(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let operand = parser.qualify_operand(&line.operand);
	parser.core.emit_data_items(&operand, DataWidth::Byte, Endianness::Little, line.span, |byte, position, length| {
		if position + 1 == length {
			byte | 0x80
		} else {
			byte
		}
	});
	Ok(())
}

fn handle_dw(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.emit_data(line, DataWidth::Word);
	Ok(())
}

fn handle_d3(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.emit_data(line, DataWidth::Tribyte);
	Ok(())
}

fn handle_dd(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.emit_data(line, DataWidth::Dword);
	Ok(())
}

fn handle_ds(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let count = parser.core.eval_expr(&line.operand, line.span)?;
	parser.core.emit(AtomKind::Space { count: count.max(0) as usize }, line.span);
	Ok(())
}

fn handle_align(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let alignment = parser.core.eval_expr(&line.operand, line.span)?;
	parser.core.emit(AtomKind::Align { alignment: alignment.max(1) as usize }, line.span);
	Ok(())
}

fn handle_cseg(parser: &mut EdtasmParser<'_>, _line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.switch_segment(SegmentType::Code, "CSEG", SectionAttributes::CODE);
	Ok(())
}

fn handle_dseg(parser: &mut EdtasmParser<'_>, _line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.switch_segment(SegmentType::Data, "DSEG", SectionAttributes::DATA);
	Ok(())
}

fn handle_aseg(parser: &mut EdtasmParser<'_>, _line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.switch_segment(SegmentType::Absolute, "ASEG", SectionAttributes::CODE);
	Ok(())
}

/// `COMMON /name/`: switch to a named common block.
fn handle_common(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let name = line.operand.trim().trim_matches('/').trim().to_uppercase();
	parser.switch_segment(SegmentType::Common, &name, SectionAttributes::BSS);
	Ok(())
}

fn handle_phase(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let address = parser.core.eval_expr(&line.operand, line.span)?;
	parser.phased = true;
	parser.core.emit(AtomKind::Phase { address }, line.span);
	Ok(())
}

fn handle_dephase(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
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

fn handle_public(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	for name in split_operands(&line.operand) {
		parser.core.symbols.mark_exported(name.trim(), line.span);
	}
	Ok(())
}

fn handle_extern(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	for name in split_operands(&line.operand) {
		parser.core.symbols.mark_imported(name.trim(), line.span);
	}
	Ok(())
}

fn condition_if(parser: &mut EdtasmParser<'_>, line: &Line, condition: bool) {
	parser.core.begin_if(condition, line.span);
}

fn eval_condition(parser: &mut EdtasmParser<'_>, line: &Line) -> bool {
	match parser.core.eval_expr(&line.operand, line.span) {
		Ok(value) => value != 0,
		Err(error) => {
			parser.core.errors.push(*error);
			false
		},
	}
}

fn handle_if(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let condition = eval_condition(parser, line);
	condition_if(parser, line, condition);
	Ok(())
}

fn handle_ife(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let condition = !eval_condition(parser, line);
	condition_if(parser, line, condition);
	Ok(())
}

fn handle_ifdef(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let defined = parser.core.symbols.is_defined(line.operand.trim());
	condition_if(parser, line, defined);
	Ok(())
}

fn handle_ifndef(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let defined = parser.core.symbols.is_defined(line.operand.trim());
	condition_if(parser, line, !defined);
	Ok(())
}

/// `IF1`/`IF2`: the front-end parses once, which is what M80 calls the first pass.
fn handle_if1(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	condition_if(parser, line, true);
	Ok(())
}

fn handle_if2(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	condition_if(parser, line, false);
	Ok(())
}

fn handle_ifb(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let blank = strip_angle_brackets(&line.operand).trim().is_empty();
	condition_if(parser, line, blank);
	Ok(())
}

fn handle_ifnb(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let blank = strip_angle_brackets(&line.operand).trim().is_empty();
	condition_if(parser, line, !blank);
	Ok(())
}

fn identical_arguments(line: &Line) -> bool {
	let parts = split_operands(&line.operand);
	match parts.as_slice() {
		[first, second] => strip_angle_brackets(first) == strip_angle_brackets(second),
		_ => false,
	}
}

fn handle_ifidn(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let identical = identical_arguments(line);
	condition_if(parser, line, identical);
	Ok(())
}

fn handle_ifdif(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let identical = identical_arguments(line);
	condition_if(parser, line, !identical);
	Ok(())
}

/// `IFEQ a,b` etc.: compares two expressions, or one expression against zero.
fn handle_compare_if(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let word = line.mnemonic.as_deref().map(str::to_uppercase).unwrap_or_default();
	let parts = split_operands(&line.operand);
	let mut values = Vec::new();
	for part in &parts {
		match parser.core.eval_expr(part, line.span) {
			Ok(value) => values.push(value),
			Err(error) => {
				parser.core.errors.push(*error);
				values.push(0);
			},
		}
	}
	let (left, right) = match values.as_slice() {
		[left] => (*left, 0),
		[left, right, ..] => (*left, *right),
		[] => (0, 0),
	};
	let condition = match word.as_str() {
		"IFEQ" => left == right,
		"IFNE" => left != right,
		"IFLT" => left < right,
		"IFGT" => left > right,
		"IFLE" => left <= right,
		_ => left >= right,
	};
	condition_if(parser, line, condition);
	Ok(())
}

fn handle_else(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.begin_else(line.span);
	Ok(())
}

fn handle_endif(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.end_if(line.span);
	Ok(())
}

fn handle_macro(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let Some(name) = line.label.clone() else {
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

fn handle_endm(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	Err(Box::new(AssemblyError::EndmWithoutMacro { src: parser.core.src.clone(), location: line.span }))
}

fn handle_rept(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let count = parser.core.eval_expr(&line.operand, line.span)?;
	parser.core.macros.begin_repeat(RepeatKind::Count(count), line.span);
	Ok(())
}

fn handle_irp(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let (symbol, list) = line.operand.split_once(',').ok_or_else(|| {
		Box::new(AssemblyError::MissingOperand {
			directive: SharedStr::from("IRP"),
			src:       parser.core.src.clone(),
			location:  line.span,
		})
	})?;
	let items =
		split_operands(strip_angle_brackets(list)).into_iter().filter(|item| !item.is_empty()).collect();
	parser.core.macros.begin_repeat(
		RepeatKind::List { symbol: SharedStr::from(symbol.trim()), items },
		line.span,
	);
	Ok(())
}

fn handle_irpc(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let (symbol, text) = line.operand.split_once(',').ok_or_else(|| {
		Box::new(AssemblyError::MissingOperand {
			directive: SharedStr::from("IRPC"),
			src:       parser.core.src.clone(),
			location:  line.span,
		})
	})?;
	parser.core.macros.begin_repeat(
		RepeatKind::Characters {
			symbol: SharedStr::from(symbol.trim()),
			text:   strip_angle_brackets(text).to_owned(),
		},
		line.span,
	);
	Ok(())
}

/// A stray `EXITM` outside any expansion is ignored, matching the reference assemblers.
fn handle_exitm(_parser: &mut EdtasmParser<'_>, _line: &Line) -> Result<(), Box<AssemblyError>> {
	Ok(())
}

fn handle_include(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let file = line.operand.trim().trim_matches('"').trim_matches('\'').to_owned();
	process_include(parser, &file, line.span);
	Ok(())
}

/// `.RADIX n`: the argument is always read in decimal.
fn handle_radix(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let radix: u32 = line.operand.trim().parse().map_err(|_| {
		Box::new(AssemblyError::InvalidNumber {
			literal:  SharedStr::from(line.operand.as_str()),
			src:      parser.core.src.clone(),
			location: line.span,
		})
	})?;
	parser.core.format.set_radix(radix);
	Ok(())
}

fn handle_setdp(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let page = parser.core.eval_expr(&line.operand, line.span)?;
	parser.core.cpu.set_direct_page((page & 0xFF) as u8);
	Ok(())
}

fn handle_list(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.emit(AtomKind::ListingControl(ListingControl::List(true)), line.span);
	Ok(())
}

fn handle_xlist(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.emit(AtomKind::ListingControl(ListingControl::List(false)), line.span);
	Ok(())
}

fn handle_lall(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.emit(AtomKind::ListingControl(ListingControl::ListAllMacroLines), line.span);
	Ok(())
}

fn handle_sall(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.emit(AtomKind::ListingControl(ListingControl::SuppressMacroLines), line.span);
	Ok(())
}

fn handle_xall(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.emit(AtomKind::ListingControl(ListingControl::ListGeneratingMacroLines), line.span);
	Ok(())
}

fn handle_title(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.emit(
		AtomKind::ListingControl(ListingControl::Title(SharedStr::from(line.operand.trim().trim_matches('\'')))),
		line.span,
	);
	Ok(())
}

fn handle_subttl(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.emit(
		AtomKind::ListingControl(ListingControl::Subtitle(SharedStr::from(line.operand.trim()))),
		line.span,
	);
	Ok(())
}

fn handle_page(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.emit(AtomKind::ListingControl(ListingControl::Page), line.span);
	Ok(())
}

fn handle_space_listing(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let count = parser.core.eval_expr(&line.operand, line.span).unwrap_or(1);
	parser.core.emit(AtomKind::ListingControl(ListingControl::Space(count.max(0) as usize)), line.span);
	Ok(())
}

fn handle_name(parser: &mut EdtasmParser<'_>, line: &Line) -> Result<(), Box<AssemblyError>> {
	let name = line.operand.trim().trim_matches(['(', ')', '\'']).to_owned();
	parser.core.emit(
		AtomKind::ListingControl(ListingControl::ModuleName(SharedStr::from(name.as_str()))),
		line.span,
	);
	Ok(())
}

fn handle_end(parser: &mut EdtasmParser<'_>, _line: &Line) -> Result<(), Box<AssemblyError>> {
	parser.core.end_seen = true;
	Ok(())
}
