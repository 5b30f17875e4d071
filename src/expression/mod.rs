//! Assembly-time expressions: tree representation and evaluation.

use flexstr::SharedStr;
use thiserror::Error;

use crate::common::MemoryAddress;

pub mod parser;

pub use parser::{
	parse, ExpressionParseError, GenericNumberFormat, MerlinNumberFormat, NumberFormat, ScmasmNumberFormat,
	Z80NumberFormat,
};

/// Binary operators, in increasing precedence group order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOperator {
	/// `||`
	LogicalOr,
	/// `&&`
	LogicalAnd,
	/// `==`
	Equals,
	/// `!=`
	NotEquals,
	/// `<`
	Less,
	/// `<=`
	LessEquals,
	/// `>`
	Greater,
	/// `>=`
	GreaterEquals,
	/// `|`
	Or,
	/// `^`
	Xor,
	/// `&`
	And,
	/// `<<`
	ShiftLeft,
	/// `>>`
	ShiftRight,
	/// `+`
	Add,
	/// `-`
	Subtract,
	/// `*`
	Multiply,
	/// `/`
	Divide,
	/// `%`
	Modulus,
}

/// Unary operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOperator {
	/// `-`
	Negate,
	/// `~`
	BitNot,
	/// `!`
	Not,
	/// `<` (byte 0 of the operand)
	LowByte,
	/// `>` (byte 1 of the operand)
	HighByte,
}

/// The built-in expression functions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Function {
	/// `LOW(x)`: byte 0 of the argument.
	Low,
	/// `HIGH(x)`: byte 1 of the argument.
	High,
}

/// An assembly-time expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
	/// A numeric literal.
	Literal(MemoryAddress),
	/// A reference to a symbol, resolved through the symbol table at evaluation time.
	Symbol(SharedStr),
	/// The location counter (`$` or `*`).
	CurrentLocation,
	/// A unary operation.
	Unary {
		/// The operator.
		operator: UnaryOperator,
		/// The operand.
		operand:  Box<Expression>,
	},
	/// A binary operation.
	Binary {
		/// The operator.
		operator: BinaryOperator,
		/// Left-hand side.
		left:     Box<Expression>,
		/// Right-hand side.
		right:    Box<Expression>,
	},
	/// A call of one of the built-in functions.
	FunctionCall {
		/// The called function.
		function: Function,
		/// The single argument.
		argument: Box<Expression>,
	},
}

/// Errors during expression evaluation.
///
/// These carry no source location; the caller that knows the span converts them into
/// [`crate::AssemblyError`]. Undefined symbols are deliberately distinguishable so the engine can
/// downgrade them to a placeholder during early passes.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum EvaluationError {
	/// A referenced symbol has no definition (yet).
	#[error("undefined symbol `{0}`")]
	UndefinedSymbol(SharedStr),
	/// Division or modulus by zero.
	#[error("division by zero")]
	DivisionByZero,
	/// Two symbols define each other.
	#[error("circular definition of `{0}`")]
	CircularDefinition(SharedStr),
}

/// Anything expressions can resolve symbols against.
pub trait SymbolLookup {
	/// Resolves a symbol name to its current value.
	///
	/// # Errors
	/// [`EvaluationError::UndefinedSymbol`] if the name has no binding, and
	/// [`EvaluationError::CircularDefinition`] if resolving it recurses into itself.
	fn lookup_value(&self, name: &str) -> Result<MemoryAddress, EvaluationError>;

	/// The program-counter value at the point of evaluation (the `$` operator).
	fn current_location(&self) -> MemoryAddress;
}

/// A lookup with no symbols at all. Every symbol reference fails as undefined; the location
/// counter is zero. Used by CPU back-ends when re-parsing pre-resolved operand text, and handy in
/// tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSymbols;

impl SymbolLookup for NoSymbols {
	fn lookup_value(&self, name: &str) -> Result<MemoryAddress, EvaluationError> {
		Err(EvaluationError::UndefinedSymbol(SharedStr::from(name)))
	}

	fn current_location(&self) -> MemoryAddress {
		0
	}
}

impl Expression {
	/// Evaluates the expression against a symbol lookup.
	///
	/// Comparison and logical operators yield 1 for true and 0 for false. Shifts and bitwise
	/// operators work on the full 64-bit value; callers mask to the width they need.
	///
	/// # Errors
	/// See [`EvaluationError`].
	pub fn evaluate(&self, symbols: &dyn SymbolLookup) -> Result<MemoryAddress, EvaluationError> {
		Ok(match self {
			Self::Literal(value) => *value,
			Self::Symbol(name) => symbols.lookup_value(name)?,
			Self::CurrentLocation => symbols.current_location(),
			Self::Unary { operator, operand } => {
				let value = operand.evaluate(symbols)?;
				match operator {
					UnaryOperator::Negate => value.wrapping_neg(),
					UnaryOperator::BitNot => !value,
					UnaryOperator::Not => MemoryAddress::from(value == 0),
					UnaryOperator::LowByte => value & 0xFF,
					UnaryOperator::HighByte => (value >> 8) & 0xFF,
				}
			},
			Self::Binary { operator, left, right } => {
				let left = left.evaluate(symbols)?;
				let right = right.evaluate(symbols)?;
				match operator {
					BinaryOperator::LogicalOr => MemoryAddress::from(left != 0 || right != 0),
					BinaryOperator::LogicalAnd => MemoryAddress::from(left != 0 && right != 0),
					BinaryOperator::Equals => MemoryAddress::from(left == right),
					BinaryOperator::NotEquals => MemoryAddress::from(left != right),
					BinaryOperator::Less => MemoryAddress::from(left < right),
					BinaryOperator::LessEquals => MemoryAddress::from(left <= right),
					BinaryOperator::Greater => MemoryAddress::from(left > right),
					BinaryOperator::GreaterEquals => MemoryAddress::from(left >= right),
					BinaryOperator::Or => left | right,
					BinaryOperator::Xor => left ^ right,
					BinaryOperator::And => left & right,
					BinaryOperator::ShiftLeft => left.wrapping_shl(right as u32),
					BinaryOperator::ShiftRight => left.wrapping_shr(right as u32),
					BinaryOperator::Add => left.wrapping_add(right),
					BinaryOperator::Subtract => left.wrapping_sub(right),
					BinaryOperator::Multiply => left.wrapping_mul(right),
					BinaryOperator::Divide =>
						if right == 0 {
							return Err(EvaluationError::DivisionByZero);
						} else {
							left.wrapping_div(right)
						},
					BinaryOperator::Modulus =>
						if right == 0 {
							return Err(EvaluationError::DivisionByZero);
						} else {
							left.wrapping_rem(right)
						},
				}
			},
			Self::FunctionCall { function, argument } => {
				let value = argument.evaluate(symbols)?;
				match function {
					Function::Low => value & 0xFF,
					Function::High => (value >> 8) & 0xFF,
				}
			},
		})
	}

	/// Whether the expression contains no symbol references or location-counter uses, i.e.
	/// evaluates to the same value in any context.
	#[must_use]
	pub fn is_constant(&self) -> bool {
		match self {
			Self::Literal(_) => true,
			Self::Symbol(_) | Self::CurrentLocation => false,
			Self::Unary { operand, .. } | Self::FunctionCall { argument: operand, .. } => operand.is_constant(),
			Self::Binary { left, right, .. } => left.is_constant() && right.is_constant(),
		}
	}

	/// Whether the expression contains an address-like term (a symbol reference or the location
	/// counter), i.e. its value shifts when code moves.
	#[must_use]
	pub fn is_relocatable(&self) -> bool {
		match self {
			Self::Literal(_) => false,
			Self::Symbol(_) | Self::CurrentLocation => true,
			Self::Unary { operand, .. } | Self::FunctionCall { argument: operand, .. } => operand.is_relocatable(),
			Self::Binary { left, right, .. } => left.is_relocatable() || right.is_relocatable(),
		}
	}

	/// Returns the first symbol name referenced by this expression, if any.
	#[must_use]
	pub fn first_symbol(&self) -> Option<&SharedStr> {
		match self {
			Self::Literal(_) | Self::CurrentLocation => None,
			Self::Symbol(name) => Some(name),
			Self::Unary { operand, .. } | Self::FunctionCall { argument: operand, .. } => operand.first_symbol(),
			Self::Binary { left, right, .. } => left.first_symbol().or_else(|| right.first_symbol()),
		}
	}
}

impl From<MemoryAddress> for Expression {
	fn from(value: MemoryAddress) -> Self {
		Self::Literal(value)
	}
}

#[cfg(test)]
mod test;
