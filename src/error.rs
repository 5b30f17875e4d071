//! All user-visible errors the assembler can produce.

use std::sync::Arc;

use flexstr::SharedStr;
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::common::AssemblyCode;

/// The complete diagnostic surface of the assembler.
///
/// Every variant carries the source code object and a span so that diagnostics render as
/// `file:line:col` with a source echo and caret. Errors are collected, not thrown: one run
/// reports as many of them as possible.
#[derive(Clone, Debug, Error, Diagnostic)]
#[allow(missing_docs, clippy::module_name_repetitions)]
pub enum AssemblyError {
	//
	// Source syntax
	//
	#[error("Unexpected character `{character}`")]
	#[diagnostic(code(xasm::syntax::unexpected_character))]
	UnexpectedCharacter {
		character: char,
		#[source_code]
		src:       Arc<AssemblyCode>,
		#[label("here")]
		location:  SourceSpan,
	},

	#[error("Malformed number literal `{literal}`")]
	#[diagnostic(code(xasm::syntax::invalid_number))]
	InvalidNumber {
		literal:  SharedStr,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("not a valid number")]
		location: SourceSpan,
	},

	#[error("Invalid digit `{digit}` for radix {radix}")]
	#[diagnostic(code(xasm::syntax::invalid_digit))]
	InvalidDigit {
		digit:    char,
		radix:    u32,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("in this number")]
		location: SourceSpan,
	},

	#[error("`{directive}` is missing its operand")]
	#[diagnostic(code(xasm::syntax::missing_operand))]
	MissingOperand {
		directive: SharedStr,
		#[source_code]
		src:       Arc<AssemblyCode>,
		#[label("needs an operand")]
		location:  SourceSpan,
	},

	#[error("Unterminated string")]
	#[diagnostic(code(xasm::syntax::unterminated_string))]
	UnterminatedString {
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("string starts here")]
		location: SourceSpan,
	},

	#[error("Unknown directive `{directive}`")]
	#[diagnostic(code(xasm::syntax::unknown_directive))]
	UnknownDirective {
		directive: SharedStr,
		#[help]
		help:      Option<String>,
		#[source_code]
		src:       Arc<AssemblyCode>,
		#[label("not a directive of this syntax")]
		location:  SourceSpan,
	},

	#[error("Line number {value} is out of range 0-65535")]
	#[diagnostic(code(xasm::syntax::line_number_range))]
	LineNumberRange {
		value:    i64,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("line number")]
		location: SourceSpan,
	},

	#[error("`{directive}` requires a label")]
	#[diagnostic(code(xasm::syntax::missing_label), help("write `NAME {directive} <value>`"))]
	MissingLabel {
		directive: SharedStr,
		#[source_code]
		src:       Arc<AssemblyCode>,
		#[label("no label on this line")]
		location:  SourceSpan,
	},

	//
	// Symbols
	//
	#[error("Undefined symbol `{name}`")]
	#[diagnostic(code(xasm::symbol::undefined))]
	UndefinedSymbol {
		name:     SharedStr,
		#[help]
		help:     Option<String>,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("referenced here")]
		location: SourceSpan,
	},

	#[error("Symbol `{name}` is already defined")]
	#[diagnostic(code(xasm::symbol::redefined), help("equates are immutable; use a redefinable `SET` symbol instead"))]
	RedefinedSymbol {
		name:     SharedStr,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("redefined here")]
		location: SourceSpan,
	},

	#[error("Local label `{name}` used outside any global scope")]
	#[diagnostic(code(xasm::symbol::local_outside_scope), help("define a global label above it first"))]
	LocalOutsideScope {
		name:     SharedStr,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("no global label precedes this")]
		location: SourceSpan,
	},

	#[error("Circular definition of symbol `{name}`")]
	#[diagnostic(code(xasm::symbol::circular_definition))]
	CircularDefinition {
		name:     SharedStr,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("evaluating this symbol loops back to itself")]
		location: SourceSpan,
	},

	//
	// Expressions
	//
	#[error("Division by zero")]
	#[diagnostic(code(xasm::expression::division_by_zero))]
	DivisionByZero {
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("in this expression")]
		location: SourceSpan,
	},

	#[error("Missing closing parenthesis")]
	#[diagnostic(code(xasm::expression::unbalanced_parentheses))]
	UnbalancedParentheses {
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("expression starts here")]
		location: SourceSpan,
	},

	#[error("Empty expression")]
	#[diagnostic(code(xasm::expression::empty))]
	EmptyExpression {
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("a value is needed here")]
		location: SourceSpan,
	},

	#[error("Unknown function `{name}`")]
	#[diagnostic(code(xasm::expression::unknown_function), help("available functions are `LOW` and `HIGH`"))]
	UnknownFunction {
		name:     SharedStr,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("not a function")]
		location: SourceSpan,
	},

	#[error("Trailing characters `{rest}` after expression")]
	#[diagnostic(code(xasm::expression::trailing_characters))]
	TrailingCharacters {
		rest:     SharedStr,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("expression ends before this")]
		location: SourceSpan,
	},

	//
	// Ranges
	//
	#[error("Value {value} does not fit into {bits} bits")]
	#[diagnostic(code(xasm::range::value_out_of_range))]
	ValueOutOfRange {
		value:    i64,
		bits:     u8,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("this value is too large")]
		location: SourceSpan,
	},

	#[error("Branch target is out of range for `{mnemonic}` (distance {distance})")]
	#[diagnostic(code(xasm::range::branch_out_of_range))]
	BranchOutOfRange {
		mnemonic: SharedStr,
		distance: i64,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("branch distance exceeds the instruction's reach")]
		location: SourceSpan,
	},

	//
	// CPU
	//
	#[error("Unknown mnemonic `{mnemonic}`")]
	#[diagnostic(code(xasm::cpu::unknown_mnemonic))]
	UnknownMnemonic {
		mnemonic: SharedStr,
		#[help]
		help:     Option<String>,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("not an instruction of the selected CPU")]
		location: SourceSpan,
	},

	#[error("Invalid addressing mode `{operand}` for `{mnemonic}`")]
	#[diagnostic(code(xasm::cpu::invalid_addressing_mode))]
	InvalidAddressingMode {
		mnemonic: SharedStr,
		operand:  SharedStr,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("this operand form is not supported")]
		location: SourceSpan,
	},

	#[error("Unknown register `{register}` in operand of `{mnemonic}`")]
	#[diagnostic(code(xasm::cpu::unknown_register))]
	UnknownRegister {
		register: SharedStr,
		mnemonic: SharedStr,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("not a register of the selected CPU")]
		location: SourceSpan,
	},

	#[error("`{mnemonic}` is not available on {variant}")]
	#[diagnostic(code(xasm::cpu::unsupported_on_variant))]
	UnsupportedOnVariant {
		mnemonic: SharedStr,
		variant:  SharedStr,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("needs a later CPU variant")]
		location: SourceSpan,
	},

	//
	// Conditionals and macros
	//
	#[error("ELSE without matching IF")]
	#[diagnostic(code(xasm::conditional::else_without_if))]
	ElseWithoutIf {
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("no conditional is open here")]
		location: SourceSpan,
	},

	#[error("Multiple ELSE in the same conditional block")]
	#[diagnostic(code(xasm::conditional::multiple_else))]
	MultipleElse {
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("this block already has an ELSE")]
		location: SourceSpan,
	},

	#[error("ENDIF without matching IF")]
	#[diagnostic(code(xasm::conditional::endif_without_if))]
	EndifWithoutIf {
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("no conditional is open here")]
		location: SourceSpan,
	},

	#[error("{depth} conditional block(s) left open at end of source")]
	#[diagnostic(code(xasm::conditional::unbalanced))]
	UnbalancedConditionals {
		depth:    usize,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("last line of the source")]
		location: SourceSpan,
	},

	#[error("Conditional nesting exceeds the limit of {limit}")]
	#[diagnostic(code(xasm::conditional::nesting_too_deep))]
	ConditionalNestingTooDeep {
		limit:    usize,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("this conditional nests too deeply")]
		location: SourceSpan,
	},

	#[error("Macro `{name}` is never terminated")]
	#[diagnostic(code(xasm::macros::unterminated))]
	UnterminatedMacro {
		name:     SharedStr,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("definition starts here")]
		location: SourceSpan,
	},

	#[error("ENDM without matching MACRO or REPT")]
	#[diagnostic(code(xasm::macros::endm_without_macro))]
	EndmWithoutMacro {
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("nothing to terminate here")]
		location: SourceSpan,
	},

	#[error("Macro expansion of `{name}` exceeds the recursion limit of {depth}")]
	#[diagnostic(code(xasm::macros::recursion_limit))]
	MacroRecursionLimit {
		name:     SharedStr,
		depth:    usize,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("expanded here")]
		location: SourceSpan,
	},

	#[error("Undefined macro `{name}`")]
	#[diagnostic(code(xasm::macros::undefined))]
	UndefinedMacro {
		name:     SharedStr,
		#[help]
		help:     Option<String>,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("no macro of this name is defined")]
		location: SourceSpan,
	},

	//
	// Includes
	//
	#[error("Circular inclusion of `{file}`")]
	#[diagnostic(code(xasm::include::cycle))]
	IncludeCycle {
		file:     SharedStr,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("this file is already being included")]
		location: SourceSpan,
	},

	#[error("Include nesting exceeds the limit of {depth}")]
	#[diagnostic(code(xasm::include::too_deep))]
	IncludeDepthExceeded {
		depth:    usize,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("included here")]
		location: SourceSpan,
	},

	#[error("File `{file}` was not found ({os_error})")]
	#[diagnostic(code(xasm::include::file_not_found))]
	FileNotFound {
		file:     SharedStr,
		os_error: SharedStr,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("included here")]
		location: SourceSpan,
	},

	//
	// Structural directives
	//
	#[error("DEND without matching DUM")]
	#[diagnostic(code(xasm::structure::dend_without_dum))]
	DendWithoutDum {
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("no dummy section is open here")]
		location: SourceSpan,
	},

	#[error("DEPHASE without matching PHASE")]
	#[diagnostic(code(xasm::structure::dephase_without_phase))]
	DephaseWithoutPhase {
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("no phased block is open here")]
		location: SourceSpan,
	},

	#[error("Assembly stopped by ERR directive: {message}")]
	#[diagnostic(code(xasm::structure::user_error))]
	UserError {
		message:  SharedStr,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("forced error")]
		location: SourceSpan,
	},

	//
	// Engine
	//
	#[error("Assembly did not converge after {passes} passes; {oscillating} atom(s) kept changing size")]
	#[diagnostic(
		code(xasm::engine::did_not_converge),
		help("a chain of branches is likely flipping between short and long forms")
	)]
	DidNotConverge {
		passes:      usize,
		oscillating: usize,
		#[source_code]
		src:         Arc<AssemblyCode>,
		#[label("first oscillating atom")]
		location:    SourceSpan,
	},

	#[error("Internal assembler error: {message}")]
	#[diagnostic(code(xasm::engine::internal), help("this is a bug in the assembler, please report it"))]
	Internal {
		message:  SharedStr,
		#[source_code]
		src:      Arc<AssemblyCode>,
		#[label("while processing this")]
		location: SourceSpan,
	},
}

impl AssemblyError {
	/// Returns the source location this error points at.
	#[must_use]
	pub const fn location(&self) -> &SourceSpan {
		match self {
			Self::UnexpectedCharacter { location, .. }
			| Self::InvalidNumber { location, .. }
			| Self::InvalidDigit { location, .. }
			| Self::MissingOperand { location, .. }
			| Self::UnterminatedString { location, .. }
			| Self::UnknownDirective { location, .. }
			| Self::LineNumberRange { location, .. }
			| Self::MissingLabel { location, .. }
			| Self::UndefinedSymbol { location, .. }
			| Self::RedefinedSymbol { location, .. }
			| Self::LocalOutsideScope { location, .. }
			| Self::CircularDefinition { location, .. }
			| Self::DivisionByZero { location, .. }
			| Self::UnbalancedParentheses { location, .. }
			| Self::EmptyExpression { location, .. }
			| Self::UnknownFunction { location, .. }
			| Self::TrailingCharacters { location, .. }
			| Self::ValueOutOfRange { location, .. }
			| Self::BranchOutOfRange { location, .. }
			| Self::UnknownMnemonic { location, .. }
			| Self::InvalidAddressingMode { location, .. }
			| Self::UnknownRegister { location, .. }
			| Self::UnsupportedOnVariant { location, .. }
			| Self::ElseWithoutIf { location, .. }
			| Self::MultipleElse { location, .. }
			| Self::EndifWithoutIf { location, .. }
			| Self::UnbalancedConditionals { location, .. }
			| Self::ConditionalNestingTooDeep { location, .. }
			| Self::UnterminatedMacro { location, .. }
			| Self::EndmWithoutMacro { location, .. }
			| Self::MacroRecursionLimit { location, .. }
			| Self::UndefinedMacro { location, .. }
			| Self::IncludeCycle { location, .. }
			| Self::IncludeDepthExceeded { location, .. }
			| Self::FileNotFound { location, .. }
			| Self::DendWithoutDum { location, .. }
			| Self::DephaseWithoutPhase { location, .. }
			| Self::UserError { location, .. }
			| Self::DidNotConverge { location, .. }
			| Self::Internal { location, .. } => location,
		}
	}
}
