//! Syntax front-ends: four parsers that tokenize source into the common atom vocabulary.

use std::collections::HashSet;
use std::sync::Arc;

use flexstr::SharedStr;
use miette::SourceSpan;

use crate::atom::{Atom, AtomKind, DataAtom, DataWidth, Endianness};
use crate::common::{AssemblyCode, MemoryAddress};
use crate::conditional::{ConditionalAssembler, ConditionalError};
use crate::cpu::CpuBackend;
use crate::error::AssemblyError;
use crate::expression::{
	parse as parse_expression_text, EvaluationError, Expression, ExpressionParseError, NumberFormat,
};
use crate::mcro::{MacroDialect, MacroError, MacroProcessor};
use crate::options::AssemblerOptions;
use crate::section::{Section, SectionAttributes};
use crate::symbol::{SymbolKind, SymbolTable};

pub mod edtasm;
pub mod merlin;
pub mod scmasm;
pub mod simple;

/// The syntax front-end selections the assembler accepts.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Syntax {
	/// The generic syntax (`.org`, `.db`, C-style numbers).
	#[default]
	Simple,
	/// Merlin (Apple II).
	Merlin,
	/// S-C Macro Assembler (Apple II).
	Scmasm,
	/// The EDTASM/M80/ZMAC Z80-family superset.
	Edtasm,
}

impl Syntax {
	/// Parses a syntax name as written in configuration.
	#[must_use]
	pub fn from_name(name: &str) -> Option<Self> {
		Some(match name.to_lowercase().as_str() {
			"simple" | "generic" => Self::Simple,
			"merlin" => Self::Merlin,
			"scmasm" => Self::Scmasm,
			"edtasm" | "m80" | "zmac" => Self::Edtasm,
			_ => return None,
		})
	}
}

/// One source line after field splitting.
#[derive(Clone, Debug)]
pub struct Line {
	/// The label field, if the line carries one (prefix characters preserved).
	pub label:    Option<String>,
	/// The mnemonic or directive field, original case.
	pub mnemonic: Option<String>,
	/// Everything after the mnemonic, comment already stripped.
	pub operand:  String,
	/// The span of the whole line.
	pub span:     SourceSpan,
}

impl Default for Line {
	fn default() -> Self {
		Self { label: None, mnemonic: None, operand: String::new(), span: SourceSpan::from((0, 0)) }
	}
}

/// What a front-end hands back to the driver.
#[derive(Debug)]
pub struct ParseOutput {
	/// The sections in registration order.
	pub sections: Vec<Section>,
	/// The symbol table with equates, sets and parse-time label estimates.
	pub symbols:  SymbolTable,
	/// All errors collected while parsing.
	pub errors:   Vec<AssemblyError>,
}

/// Maximum include nesting before the parser assumes a runaway cycle.
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// The state shared by every syntax front-end: sections, symbols, conditionals, macros, the
/// include stack and the local-label scope.
pub struct ParserCore<'a> {
	/// The source currently being parsed (switches during include processing).
	pub src:             Arc<AssemblyCode>,
	/// Engine options (include path, path map).
	pub options:         &'a AssemblerOptions,
	/// The CPU back-end; the parser needs it for `XC`, `MX`, `SETDP` and reserved words.
	pub cpu:             &'a dyn CpuBackend,
	/// The syntax's number-literal recognizer.
	pub format:          &'a dyn NumberFormat,
	/// The sections built so far, in registration order.
	pub sections:        Vec<Section>,
	/// Index of the section new atoms go to.
	pub current_section: usize,
	/// The symbol table under construction.
	pub symbols:         SymbolTable,
	/// Conditional-assembly state.
	pub conditionals:    ConditionalAssembler,
	/// Macro-definition and expansion state.
	pub macros:          MacroProcessor,
	/// Files currently being included, for cycle detection.
	pub include_stack:   Vec<SharedStr>,
	/// The most recent global label; local labels attach to it.
	pub scope:           SharedStr,
	/// Labels already defined in this unit, for duplicate detection.
	pub seen_labels:     HashSet<SharedStr>,
	/// Errors collected so far.
	pub errors:          Vec<AssemblyError>,
	/// Whether an END directive stopped the parse.
	pub end_seen:        bool,
	/// Parse-time address estimate backing `$` in parse-time evaluations.
	pub parse_address:   MemoryAddress,
}

impl<'a> ParserCore<'a> {
	/// Creates the core with one initial section.
	pub fn new(
		src: Arc<AssemblyCode>,
		options: &'a AssemblerOptions,
		cpu: &'a dyn CpuBackend,
		format: &'a dyn NumberFormat,
		dialect: MacroDialect,
		case_sensitive_symbols: bool,
	) -> Self {
		Self {
			src,
			options,
			cpu,
			format,
			sections: vec![Section::new("CODE", SectionAttributes::CODE, 0)],
			current_section: 0,
			symbols: SymbolTable::new(case_sensitive_symbols),
			conditionals: ConditionalAssembler::new(),
			macros: MacroProcessor::new(dialect),
			include_stack: Vec::new(),
			scope: SharedStr::default(),
			seen_labels: HashSet::new(),
			errors: Vec::new(),
			end_seen: false,
			parse_address: 0,
		}
	}

	/// The section new atoms go to.
	pub fn section_mut(&mut self) -> &mut Section {
		&mut self.sections[self.current_section]
	}

	/// Records an error and continues; a single run reports as many errors as possible.
	pub fn error(&mut self, error: AssemblyError) {
		self.errors.push(error);
	}

	/// Unwraps a result, recording the error and yielding [`None`] on failure.
	pub fn report<T>(&mut self, result: Result<T, Box<AssemblyError>>) -> Option<T> {
		match result {
			Ok(value) => Some(value),
			Err(error) => {
				self.errors.push(*error);
				None
			},
		}
	}

	/// Appends an atom to the current section, keeping the parse-time address estimate current.
	pub fn emit(&mut self, kind: AtomKind, span: SourceSpan) {
		let atom = Atom::new(kind, span, self.src.clone());
		match &atom.kind {
			AtomKind::Org { address } | AtomKind::Phase { address } => self.parse_address = *address,
			_ => self.parse_address += atom.size as MemoryAddress,
		}
		self.section_mut().add_atom(atom);
	}

	/// Converts an expression parse error into a located diagnostic.
	fn expression_error(&self, error: ExpressionParseError, span: SourceSpan) -> Box<AssemblyError> {
		let src = self.src.clone();
		Box::new(match error {
			ExpressionParseError::UnexpectedCharacter(character) =>
				AssemblyError::UnexpectedCharacter { character, src, location: span },
			ExpressionParseError::UnexpectedEnd | ExpressionParseError::EmptyExpression =>
				AssemblyError::EmptyExpression { src, location: span },
			ExpressionParseError::UnterminatedParenthesis =>
				AssemblyError::UnbalancedParentheses { src, location: span },
			ExpressionParseError::InvalidDigit { digit, radix } =>
				AssemblyError::InvalidDigit { digit, radix, src, location: span },
			ExpressionParseError::InvalidNumber(literal) =>
				AssemblyError::InvalidNumber { literal, src, location: span },
			ExpressionParseError::UnterminatedCharacter =>
				AssemblyError::UnterminatedString { src, location: span },
			ExpressionParseError::UnknownFunction(name) =>
				AssemblyError::UnknownFunction { name, src, location: span },
			ExpressionParseError::TrailingCharacters(rest) =>
				AssemblyError::TrailingCharacters { rest, src, location: span },
		})
	}

	/// Converts an evaluation error into a located diagnostic.
	pub fn evaluation_error(&self, error: &EvaluationError, span: SourceSpan) -> Box<AssemblyError> {
		let src = self.src.clone();
		Box::new(match error {
			EvaluationError::UndefinedSymbol(name) => AssemblyError::UndefinedSymbol {
				name: name.clone(),
				help: self.symbols.suggestions_for(name),
				src,
				location: span,
			},
			EvaluationError::DivisionByZero => AssemblyError::DivisionByZero { src, location: span },
			EvaluationError::CircularDefinition(name) =>
				AssemblyError::CircularDefinition { name: name.clone(), src, location: span },
		})
	}

	/// Parses an expression with this syntax's number formats.
	///
	/// # Errors
	/// The located equivalent of the underlying parse error.
	pub fn parse_expr(&self, text: &str, span: SourceSpan) -> Result<Expression, Box<AssemblyError>> {
		parse_expression_text(text, self.format).map_err(|error| self.expression_error(error, span))
	}

	/// Parses and immediately evaluates an expression against the parse-time symbol state.
	///
	/// # Errors
	/// Parse errors and evaluation errors, located at `span`.
	pub fn eval_expr(&self, text: &str, span: SourceSpan) -> Result<MemoryAddress, Box<AssemblyError>> {
		let expression = self.parse_expr(text, span)?;
		self.symbols.set_current_location(self.parse_address);
		expression.evaluate(&self.symbols).map_err(|error| self.evaluation_error(&error, span))
	}

	/// Defines an equate or set symbol. An expression that is exactly the location counter
	/// becomes a label atom instead, so `X EQU $` captures the address at its definition site.
	pub fn define_value_symbol(&mut self, name: &str, kind: SymbolKind, text: &str, span: SourceSpan) {
		if kind == SymbolKind::Equate {
			if let Ok(Expression::CurrentLocation) = parse_expression_text(text, self.format) {
				self.define_label(name, span);
				return;
			}
		}
		let Some(expression) = self.report(self.parse_expr(text, span)) else {
			return;
		};
		let result = self.symbols.define(name, kind, expression, span).map_err(|error| {
			Box::new(AssemblyError::RedefinedSymbol {
				name:     error.name,
				src:      self.src.clone(),
				location: span,
			})
		});
		self.report(result);
	}

	/// Defines a label: emits the label atom and records a parse-time address estimate so that
	/// parse-time evaluations (conditions, equates) can see backward references. The engine
	/// recomputes the real address on every pass.
	pub fn define_label(&mut self, name: &str, span: SourceSpan) {
		let key = SharedStr::from(name);
		if !self.seen_labels.insert(key.clone()) {
			self.error(AssemblyError::RedefinedSymbol { name: key, src: self.src.clone(), location: span });
			return;
		}
		let address = self.parse_address;
		let result =
			self.symbols.define(name, SymbolKind::Label, Expression::Literal(address), span).map_err(|error| {
				Box::new(AssemblyError::RedefinedSymbol {
					name:     error.name,
					src:      self.src.clone(),
					location: span,
				})
			});
		self.report(result);
		self.emit(AtomKind::Label { name: SharedStr::from(name), address }, span);
	}

	/// Qualifies a local-label name into its scope: `<global>.<local>` with the prefix character
	/// stripped, so `.loop` under `START` becomes `START.loop`.
	///
	/// # Errors
	/// [`AssemblyError::LocalOutsideScope`] when no global label is in scope yet.
	pub fn qualify_local(&self, name: &str, span: SourceSpan) -> Result<String, Box<AssemblyError>> {
		if self.scope.is_empty() {
			return Err(Box::new(AssemblyError::LocalOutsideScope {
				name:     SharedStr::from(name),
				src:      self.src.clone(),
				location: span,
			}));
		}
		let stripped = name.trim_start_matches([':', '.', '$', '?']);
		Ok(format!("{}.{stripped}", self.scope))
	}

	/// Rewrites local-label references inside operand text to their scope-qualified names, so
	/// the engine and CPU back-ends only ever see table-resolvable symbols. `is_local_prefix`
	/// decides which sigils start a local name in this syntax; `$` followed by hex digits is
	/// left alone (it is a number).
	#[must_use]
	pub fn qualify_local_references(&self, text: &str, is_local_prefix: fn(char) -> bool) -> String {
		if self.scope.is_empty() {
			return text.to_owned();
		}
		let characters: Vec<char> = text.chars().collect();
		let mut output = String::with_capacity(text.len());
		let mut index = 0;
		let is_name_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '?' | '$' | ':');
		while index < characters.len() {
			let character = characters[index];
			let at_token_start = index == 0 || !is_name_char(characters[index - 1]);
			if at_token_start && is_local_prefix(character) && index + 1 < characters.len() {
				let mut end = index + 1;
				while end < characters.len() && is_name_char(characters[end]) {
					end += 1;
				}
				let body: String = characters[index + 1 .. end].iter().collect();
				let all_hex = body.chars().all(|c| c.is_ascii_hexdigit());
				let is_number = character == '$' && all_hex;
				let numeric_local =
					character == '.' && body.len() == 1 && body.chars().all(|c| c.is_ascii_digit());
				if !body.is_empty() && (!is_number || numeric_local) {
					output.push_str(&format!("{}.{body}", self.scope));
					index = end;
					continue;
				}
			}
			// Skip over complete tokens so prefixes inside names don't trigger.
			if is_name_char(character) {
				let mut end = index;
				while end < characters.len() && is_name_char(characters[end]) {
					end += 1;
				}
				for &token_character in &characters[index .. end] {
					output.push(token_character);
				}
				index = end;
				continue;
			}
			output.push(character);
			index += 1;
		}
		output
	}

	/// Opens a conditional block, locating conditional-stack errors at `span`.
	pub fn begin_if(&mut self, condition: bool, span: SourceSpan) {
		if let Err(error) = self.conditionals.begin_if(condition) {
			self.conditional_error(&error, span);
		}
	}

	/// Switches to the ELSE branch.
	pub fn begin_else(&mut self, span: SourceSpan) {
		if let Err(error) = self.conditionals.begin_else() {
			self.conditional_error(&error, span);
		}
	}

	/// Closes a conditional block.
	pub fn end_if(&mut self, span: SourceSpan) {
		if let Err(error) = self.conditionals.end_if() {
			self.conditional_error(&error, span);
		}
	}

	fn conditional_error(&mut self, error: &ConditionalError, span: SourceSpan) {
		let src = self.src.clone();
		self.error(match error {
			ConditionalError::ElseWithoutIf => AssemblyError::ElseWithoutIf { src, location: span },
			ConditionalError::MultipleElse => AssemblyError::MultipleElse { src, location: span },
			ConditionalError::EndifWithoutIf => AssemblyError::EndifWithoutIf { src, location: span },
			ConditionalError::TooDeep => AssemblyError::ConditionalNestingTooDeep {
				limit: crate::conditional::MAX_CONDITIONAL_DEPTH,
				src,
				location: span,
			},
		});
	}

	/// Converts a macro-processor error into a located diagnostic.
	pub fn macro_error(&mut self, error: &MacroError, span: SourceSpan) {
		let src = self.src.clone();
		let report = match error {
			MacroError::RecursionLimit(name) => AssemblyError::MacroRecursionLimit {
				name:     name.clone(),
				depth:    crate::mcro::MAX_MACRO_DEPTH,
				src,
				location: span,
			},
			MacroError::Undefined(name) => AssemblyError::UndefinedMacro {
				name: name.clone(),
				help: crate::common::nearest_candidates(name, self.macros.names().map(SharedStr::as_str)),
				src,
				location: span,
			},
		};
		self.error(report);
	}

	/// Emits data items: quoted strings become byte runs (optionally transformed per character),
	/// everything else becomes a deferred expression the engine re-evaluates each pass.
	pub fn emit_data_items(
		&mut self,
		operand: &str,
		width: DataWidth,
		endianness: Endianness,
		span: SourceSpan,
		character_transform: fn(u8, usize, usize) -> u8,
	) {
		let mut expressions = Vec::new();
		for item in crate::cpu::split_operands(operand) {
			if item.is_empty() {
				continue;
			}
			let first = item.chars().next().unwrap_or_default();
			let is_string = matches!(first, '"' | '\'') && item.len() > 3 && item.ends_with(first);
			if is_string {
				// Flush pending expressions so atom order matches source order.
				if !expressions.is_empty() {
					self.emit(
						AtomKind::Data(DataAtom::from_expressions(
							std::mem::take(&mut expressions),
							width,
							endianness,
						)),
						span,
					);
				}
				let body = &item[1 .. item.len() - 1];
				let length = body.len();
				let bytes = body
					.bytes()
					.enumerate()
					.map(|(position, byte)| character_transform(byte, position, length))
					.collect();
				self.emit(AtomKind::Data(DataAtom::from_bytes(bytes)), span);
				continue;
			}
			match self.parse_expr(&item, span) {
				Ok(expression) => expressions.push(expression),
				Err(error) => self.errors.push(*error),
			}
		}
		if !expressions.is_empty() {
			self.emit(AtomKind::Data(DataAtom::from_expressions(expressions, width, endianness)), span);
		}
	}

	/// Checks end-of-source invariants: balanced conditionals and no capture left open.
	pub fn finish(&mut self, final_span: SourceSpan) {
		if !self.conditionals.is_balanced() {
			self.error(AssemblyError::UnbalancedConditionals {
				depth:    self.conditionals.depth(),
				src:      self.src.clone(),
				location: final_span,
			});
		}
		if let Some((name, span)) = self.macros.capture_in_progress() {
			self.error(AssemblyError::UnterminatedMacro { name, src: self.src.clone(), location: span });
		}
	}

	/// Splits the parse result into the driver's output form.
	#[must_use]
	pub fn into_output(self) -> ParseOutput {
		ParseOutput { sections: self.sections, symbols: self.symbols, errors: self.errors }
	}
}

/// A syntax front-end: one line-processing entry point over a shared core.
pub trait SyntaxParser<'a>: Sized {
	/// Access to the shared core.
	fn core(&mut self) -> &mut ParserCore<'a>;

	/// Processes one raw source line.
	fn process_line(&mut self, text: &str, span: SourceSpan);
}

/// Splits source text into `(line, span)` pairs. CR is stripped so CRLF input parses like LF.
#[must_use]
pub fn lines_with_spans(src: &AssemblyCode) -> Vec<(String, SourceSpan)> {
	let mut lines = Vec::new();
	let mut offset = 0;
	for raw in src.text.split('\n') {
		let length = raw.len();
		let line = raw.strip_suffix('\r').unwrap_or(raw);
		lines.push((line.to_owned(), (offset, line.len().max(1)).into()));
		offset += length + 1;
	}
	lines
}

/// Strips a comment introduced by any of `markers`, respecting quoted characters. A `*` in
/// column one comments the whole line when `column_one_star` is set.
#[must_use]
pub fn strip_comment(text: &str, markers: &[char], column_one_star: bool) -> String {
	if column_one_star && text.starts_with('*') {
		return String::new();
	}
	let mut output = String::with_capacity(text.len());
	let mut quote: Option<char> = None;
	for character in text.chars() {
		match character {
			_ if quote.is_some() => {
				if Some(character) == quote {
					quote = None;
				}
				output.push(character);
			},
			'\'' | '"' => {
				quote = Some(character);
				output.push(character);
			},
			_ if markers.contains(&character) => break,
			_ => output.push(character),
		}
	}
	output
}

/// Splits a line into label / mnemonic / operand fields by the column convention: a label is
/// whatever starts in column one; the next field is the mnemonic; the rest is the operand.
#[must_use]
pub fn split_fields(text: &str, span: SourceSpan) -> Line {
	let mut line = Line { span, ..Line::default() };
	let has_label = text.chars().next().is_some_and(|first| !first.is_whitespace());
	let mut rest = text;
	if has_label {
		let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
		line.label = Some(rest[.. end].to_owned());
		rest = &rest[end ..];
	}
	let rest = rest.trim_start();
	if !rest.is_empty() {
		let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
		line.mnemonic = Some(rest[.. end].to_owned());
		line.operand = rest[end ..].trim().to_owned();
	}
	line
}

/// Takes the first whitespace-delimited field of an operand, respecting quotes; Merlin treats
/// everything after it as a comment.
#[must_use]
pub fn first_operand_field(text: &str) -> String {
	let mut output = String::new();
	let mut quote: Option<char> = None;
	for character in text.trim().chars() {
		match character {
			_ if quote.is_some() => {
				if Some(character) == quote {
					quote = None;
				}
				output.push(character);
			},
			'\'' | '"' => {
				quote = Some(character);
				output.push(character);
			},
			_ if character.is_whitespace() => break,
			_ => output.push(character),
		}
	}
	output
}

/// Recursively processes an include file through the front-end's own line handler, with cycle
/// detection and a depth bound.
pub fn process_include<'a, P: SyntaxParser<'a>>(parser: &mut P, file: &str, span: SourceSpan) {
	let mapped = parser.core().options.map_path(file);
	let resolved = resolve_include(parser.core(), &mapped);
	let core = parser.core();
	let key = SharedStr::from(resolved.clone());
	if core.include_stack.contains(&key) {
		let error =
			AssemblyError::IncludeCycle { file: SharedStr::from(file), src: core.src.clone(), location: span };
		core.error(error);
		return;
	}
	if core.include_stack.len() >= MAX_INCLUDE_DEPTH {
		let error = AssemblyError::IncludeDepthExceeded {
			depth:    MAX_INCLUDE_DEPTH,
			src:      core.src.clone(),
			location: span,
		};
		core.error(error);
		return;
	}
	let included = match AssemblyCode::from_file(&resolved) {
		Ok(code) => code,
		Err(os_error) => {
			let error = AssemblyError::FileNotFound {
				file:     SharedStr::from(file),
				os_error: SharedStr::from(os_error.to_string()),
				src:      core.src.clone(),
				location: span,
			};
			core.error(error);
			return;
		},
	};
	core.include_stack.push(key);
	let saved_src = std::mem::replace(&mut core.src, included.clone());
	for (line, line_span) in lines_with_spans(&included) {
		if parser.core().end_seen {
			break;
		}
		parser.process_line(&line, line_span);
	}
	let core = parser.core();
	core.src = saved_src;
	core.include_stack.pop();
}

fn resolve_include(core: &ParserCore<'_>, file: &str) -> String {
	if std::path::Path::new(file).exists() {
		return file.to_owned();
	}
	for directory in &core.options.include_path {
		let candidate = directory.join(file);
		if candidate.exists() {
			return candidate.to_string_lossy().into_owned();
		}
	}
	file.to_owned()
}

/// Runs the front-end selected by the options over one source.
#[must_use]
pub fn parse_source(
	source: &Arc<AssemblyCode>,
	options: &AssemblerOptions,
	cpu: &dyn CpuBackend,
	format: &dyn NumberFormat,
) -> ParseOutput {
	match options.syntax {
		Syntax::Simple => simple::parse(source, options, cpu, format),
		Syntax::Merlin => merlin::parse(source, options, cpu, format),
		Syntax::Scmasm => scmasm::parse(source, options, cpu, format),
		Syntax::Edtasm => edtasm::parse(source, options, cpu, format),
	}
}

#[cfg(test)]
mod test;
