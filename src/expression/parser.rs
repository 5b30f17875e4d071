//! Recursive-descent expression parser with pluggable number-literal recognition.

use std::cell::Cell;

use flexstr::SharedStr;
use thiserror::Error;

use super::{BinaryOperator, Expression, Function, UnaryOperator};
use crate::common::MemoryAddress;

/// Errors the expression parser can produce.
///
/// These carry no source location; the caller that knows the span converts them into
/// [`crate::AssemblyError`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[allow(missing_docs)]
pub enum ExpressionParseError {
	#[error("unexpected character `{0}`")]
	UnexpectedCharacter(char),
	#[error("expression ends unexpectedly")]
	UnexpectedEnd,
	#[error("empty expression")]
	EmptyExpression,
	#[error("missing closing parenthesis")]
	UnterminatedParenthesis,
	#[error("invalid digit `{digit}` for radix {radix}")]
	InvalidDigit { digit: char, radix: u32 },
	#[error("malformed number literal `{0}`")]
	InvalidNumber(SharedStr),
	#[error("unterminated character constant")]
	UnterminatedCharacter,
	#[error("unknown function `{0}`")]
	UnknownFunction(SharedStr),
	#[error("trailing characters `{0}` after expression")]
	TrailingCharacters(SharedStr),
}

/// Number-literal recognition that varies between the assembler syntaxes.
///
/// The expression parser handles the shared prefixes itself (`$` hex, `%` binary, character
/// constants); a format object decides everything that starts with a plain digit and the value of
/// character constants.
pub trait NumberFormat {
	/// Parses an alphanumeric token whose first character is a decimal digit.
	///
	/// # Errors
	/// If the token is not a number of this syntax.
	fn parse_number(&self, token: &str) -> Result<MemoryAddress, ExpressionParseError>;

	/// The value of the character constant `<delimiter>character`.
	fn character_value(&self, character: char, _delimiter: char) -> MemoryAddress {
		character as MemoryAddress
	}

	/// Whether `.` separators inside `%` binary literals are ignored.
	fn binary_separators(&self) -> bool {
		false
	}

	/// Sets the default radix for suffix-less numbers (`.RADIX`). Formats without a default
	/// radix ignore this.
	fn set_radix(&self, _radix: u32) {}
}

/// The generic number format: `$FF`, `0xFF`, `%1010`, `0b1010`, decimal, plain character
/// constants.
#[derive(Clone, Copy, Debug, Default)]
pub struct GenericNumberFormat;

impl NumberFormat for GenericNumberFormat {
	fn parse_number(&self, token: &str) -> Result<MemoryAddress, ExpressionParseError> {
		if let Some(rest) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
			parse_radix(rest, 16, token)
		} else if let Some(rest) = token.strip_prefix("0b").or_else(|| token.strip_prefix("0B")) {
			parse_radix(rest, 2, token)
		} else {
			parse_radix(token, 10, token)
		}
	}
}

/// The Z80-family number format: suffix forms `0FFH`, `377O`, `377Q`, `11111111B`, `255D`, the
/// generic prefixes, and a mutable default radix controlled by `.RADIX`.
#[derive(Clone, Debug)]
pub struct Z80NumberFormat {
	radix: Cell<u32>,
}

impl Default for Z80NumberFormat {
	fn default() -> Self {
		Self { radix: Cell::new(10) }
	}
}

impl Z80NumberFormat {
	/// Sets the default radix for suffix-less numbers (2-16).
	pub fn set_radix(&self, radix: u32) {
		self.radix.set(radix.clamp(2, 16));
	}

	/// The current default radix.
	#[must_use]
	pub fn radix(&self) -> u32 {
		self.radix.get()
	}
}

impl NumberFormat for Z80NumberFormat {
	fn set_radix(&self, radix: u32) {
		Self::set_radix(self, radix);
	}

	fn parse_number(&self, token: &str) -> Result<MemoryAddress, ExpressionParseError> {
		if let Some(rest) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
			return parse_radix(rest, 16, token);
		}
		let (body, radix) = match token.chars().last() {
			Some('H' | 'h') => (&token[.. token.len() - 1], 16),
			Some('O' | 'o' | 'Q' | 'q') => (&token[.. token.len() - 1], 8),
			Some('B' | 'b') => (&token[.. token.len() - 1], 2),
			Some('D' | 'd') => (&token[.. token.len() - 1], 10),
			_ => (token, self.radix.get()),
		};
		parse_radix(body, radix, token)
	}
}

/// The SCMASM number format: decimal, `%` binary with `.` separators, and the delimiter-ASCII
/// high-bit rule for character constants (delimiters below `'` set bit 7).
#[derive(Clone, Copy, Debug, Default)]
pub struct ScmasmNumberFormat;

impl NumberFormat for ScmasmNumberFormat {
	fn parse_number(&self, token: &str) -> Result<MemoryAddress, ExpressionParseError> {
		parse_radix(token, 10, token)
	}

	fn character_value(&self, character: char, delimiter: char) -> MemoryAddress {
		if (delimiter as u32) < 0x27 {
			(character as MemoryAddress) | 0x80
		} else {
			character as MemoryAddress
		}
	}

	fn binary_separators(&self) -> bool {
		true
	}
}

/// The Merlin number format: generic numbers, Apple II delimiter rule for character constants.
#[derive(Clone, Copy, Debug, Default)]
pub struct MerlinNumberFormat;

impl NumberFormat for MerlinNumberFormat {
	fn parse_number(&self, token: &str) -> Result<MemoryAddress, ExpressionParseError> {
		GenericNumberFormat.parse_number(token)
	}

	fn character_value(&self, character: char, delimiter: char) -> MemoryAddress {
		ScmasmNumberFormat.character_value(character, delimiter)
	}
}

fn parse_radix(body: &str, radix: u32, token: &str) -> Result<MemoryAddress, ExpressionParseError> {
	if body.is_empty() {
		return Err(ExpressionParseError::InvalidNumber(SharedStr::from(token)));
	}
	let mut value: MemoryAddress = 0;
	for digit in body.chars() {
		let digit_value = digit
			.to_digit(radix)
			.ok_or(ExpressionParseError::InvalidDigit { digit, radix })?;
		value = value.wrapping_mul(MemoryAddress::from(radix)).wrapping_add(MemoryAddress::from(digit_value));
	}
	Ok(value)
}

/// Parses an expression string into a tree.
///
/// # Errors
/// See [`ExpressionParseError`].
pub fn parse(text: &str, format: &dyn NumberFormat) -> Result<Expression, ExpressionParseError> {
	let mut scanner = Scanner { characters: text.chars().collect(), position: 0, format };
	scanner.skip_whitespace();
	if scanner.at_end() {
		return Err(ExpressionParseError::EmptyExpression);
	}
	let expression = scanner.parse_logical_or()?;
	scanner.skip_whitespace();
	if scanner.at_end() {
		Ok(expression)
	} else {
		let rest: String = scanner.characters[scanner.position ..].iter().collect();
		Err(ExpressionParseError::TrailingCharacters(SharedStr::from(rest)))
	}
}

struct Scanner<'a> {
	characters: Vec<char>,
	position:   usize,
	format:     &'a dyn NumberFormat,
}

const fn is_identifier_start(character: char) -> bool {
	character.is_ascii_alphabetic() || matches!(character, '_' | '.' | '@' | '?' | ':' | ']')
}

const fn is_identifier_continue(character: char) -> bool {
	character.is_ascii_alphanumeric() || matches!(character, '_' | '.' | '@' | '?' | ':' | ']' | '$')
}

impl Scanner<'_> {
	fn at_end(&self) -> bool {
		self.position >= self.characters.len()
	}

	fn peek(&self) -> Option<char> {
		self.characters.get(self.position).copied()
	}

	fn peek_at(&self, offset: usize) -> Option<char> {
		self.characters.get(self.position + offset).copied()
	}

	fn advance(&mut self) -> Option<char> {
		let character = self.peek();
		if character.is_some() {
			self.position += 1;
		}
		character
	}

	fn skip_whitespace(&mut self) {
		while self.peek().is_some_and(char::is_whitespace) {
			self.position += 1;
		}
	}

	/// Consumes the given operator text if it is next in the input.
	fn matches(&mut self, operator: &str) -> bool {
		for (offset, expected) in operator.chars().enumerate() {
			if self.peek_at(offset) != Some(expected) {
				return false;
			}
		}
		self.position += operator.chars().count();
		true
	}

	fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
		Expression::Binary { operator, left: Box::new(left), right: Box::new(right) }
	}

	fn parse_logical_or(&mut self) -> Result<Expression, ExpressionParseError> {
		let mut left = self.parse_logical_and()?;
		loop {
			self.skip_whitespace();
			if self.matches("||") {
				let right = self.parse_logical_and()?;
				left = Self::binary(BinaryOperator::LogicalOr, left, right);
			} else {
				return Ok(left);
			}
		}
	}

	fn parse_logical_and(&mut self) -> Result<Expression, ExpressionParseError> {
		let mut left = self.parse_comparison()?;
		loop {
			self.skip_whitespace();
			if self.matches("&&") {
				let right = self.parse_comparison()?;
				left = Self::binary(BinaryOperator::LogicalAnd, left, right);
			} else {
				return Ok(left);
			}
		}
	}

	fn parse_comparison(&mut self) -> Result<Expression, ExpressionParseError> {
		let mut left = self.parse_bitwise_or()?;
		loop {
			self.skip_whitespace();
			let operator = if self.matches("==") {
				BinaryOperator::Equals
			} else if self.matches("!=") {
				BinaryOperator::NotEquals
			} else if self.matches("<=") {
				BinaryOperator::LessEquals
			} else if self.matches(">=") {
				BinaryOperator::GreaterEquals
			} else if self.peek() == Some('<') && self.peek_at(1) != Some('<') {
				self.position += 1;
				BinaryOperator::Less
			} else if self.peek() == Some('>') && self.peek_at(1) != Some('>') {
				self.position += 1;
				BinaryOperator::Greater
			} else {
				return Ok(left);
			};
			let right = self.parse_bitwise_or()?;
			left = Self::binary(operator, left, right);
		}
	}

	fn parse_bitwise_or(&mut self) -> Result<Expression, ExpressionParseError> {
		let mut left = self.parse_bitwise_xor()?;
		loop {
			self.skip_whitespace();
			if self.peek() == Some('|') && self.peek_at(1) != Some('|') {
				self.position += 1;
				let right = self.parse_bitwise_xor()?;
				left = Self::binary(BinaryOperator::Or, left, right);
			} else {
				return Ok(left);
			}
		}
	}

	fn parse_bitwise_xor(&mut self) -> Result<Expression, ExpressionParseError> {
		let mut left = self.parse_bitwise_and()?;
		loop {
			self.skip_whitespace();
			if self.peek() == Some('^') {
				self.position += 1;
				let right = self.parse_bitwise_and()?;
				left = Self::binary(BinaryOperator::Xor, left, right);
			} else {
				return Ok(left);
			}
		}
	}

	fn parse_bitwise_and(&mut self) -> Result<Expression, ExpressionParseError> {
		let mut left = self.parse_shift()?;
		loop {
			self.skip_whitespace();
			if self.peek() == Some('&') && self.peek_at(1) != Some('&') {
				self.position += 1;
				let right = self.parse_shift()?;
				left = Self::binary(BinaryOperator::And, left, right);
			} else {
				return Ok(left);
			}
		}
	}

	fn parse_shift(&mut self) -> Result<Expression, ExpressionParseError> {
		let mut left = self.parse_add_subtract()?;
		loop {
			self.skip_whitespace();
			let operator = if self.matches("<<") {
				BinaryOperator::ShiftLeft
			} else if self.matches(">>") {
				BinaryOperator::ShiftRight
			} else {
				return Ok(left);
			};
			let right = self.parse_add_subtract()?;
			left = Self::binary(operator, left, right);
		}
	}

	fn parse_add_subtract(&mut self) -> Result<Expression, ExpressionParseError> {
		let mut left = self.parse_multiply_divide()?;
		loop {
			self.skip_whitespace();
			let operator = match self.peek() {
				Some('+') => BinaryOperator::Add,
				Some('-') => BinaryOperator::Subtract,
				_ => return Ok(left),
			};
			self.position += 1;
			let right = self.parse_multiply_divide()?;
			left = Self::binary(operator, left, right);
		}
	}

	fn parse_multiply_divide(&mut self) -> Result<Expression, ExpressionParseError> {
		let mut left = self.parse_unary()?;
		loop {
			self.skip_whitespace();
			let operator = match self.peek() {
				Some('*') => BinaryOperator::Multiply,
				Some('/') => BinaryOperator::Divide,
				// A `%` after a complete operand can only be the modulus operator; binary
				// literals are recognized in operand position by `parse_primary`.
				Some('%') => BinaryOperator::Modulus,
				_ => return Ok(left),
			};
			self.position += 1;
			let right = self.parse_unary()?;
			left = Self::binary(operator, left, right);
		}
	}

	fn parse_unary(&mut self) -> Result<Expression, ExpressionParseError> {
		self.skip_whitespace();
		let operator = match self.peek() {
			Some('-') => Some(UnaryOperator::Negate),
			Some('~') => Some(UnaryOperator::BitNot),
			Some('!') => Some(UnaryOperator::Not),
			Some('<') => Some(UnaryOperator::LowByte),
			Some('>') => Some(UnaryOperator::HighByte),
			Some('+') => {
				self.position += 1;
				return self.parse_unary();
			},
			_ => None,
		};
		if let Some(operator) = operator {
			self.position += 1;
			let operand = self.parse_unary()?;
			return Ok(Expression::Unary { operator, operand: Box::new(operand) });
		}
		self.parse_primary()
	}

	fn parse_primary(&mut self) -> Result<Expression, ExpressionParseError> {
		self.skip_whitespace();
		let Some(first) = self.peek() else {
			return Err(ExpressionParseError::UnexpectedEnd);
		};
		match first {
			'(' => {
				self.position += 1;
				let inner = self.parse_logical_or()?;
				self.skip_whitespace();
				if self.advance() == Some(')') {
					Ok(inner)
				} else {
					Err(ExpressionParseError::UnterminatedParenthesis)
				}
			},
			'$' => {
				self.position += 1;
				let run = self.take_while(is_identifier_continue);
				if run.is_empty() {
					Ok(Expression::CurrentLocation)
				} else if run.chars().all(|character| character.is_ascii_hexdigit()) {
					parse_radix(&run, 16, &run).map(Expression::Literal)
				} else {
					Ok(Expression::Symbol(SharedStr::from(format!("${run}"))))
				}
			},
			'*' => {
				self.position += 1;
				Ok(Expression::CurrentLocation)
			},
			'%' => {
				self.position += 1;
				let mut run = self.take_while(|character| character.is_ascii_alphanumeric() || character == '.');
				if self.format.binary_separators() {
					run.retain(|character| character != '.');
				}
				if let Some(bad) = run.chars().find(|character| !matches!(character, '0' | '1')) {
					return Err(ExpressionParseError::InvalidDigit { digit: bad, radix: 2 });
				}
				parse_radix(&run, 2, &run).map(Expression::Literal)
			},
			'\'' | '"' | '/' if matches!(first, '\'' | '"') || self.is_character_constant() => {
				self.position += 1;
				let Some(character) = self.advance() else {
					return Err(ExpressionParseError::UnterminatedCharacter);
				};
				if self.peek() == Some(first) {
					self.position += 1;
				}
				Ok(Expression::Literal(self.format.character_value(character, first)))
			},
			digit if digit.is_ascii_digit() => {
				let run = self.take_while(char::is_alphanumeric);
				self.format.parse_number(&run).map(Expression::Literal)
			},
			start if is_identifier_start(start) => {
				let name = self.take_while(is_identifier_continue);
				let upper = name.to_uppercase();
				if self.peek() == Some('(') {
					let function = match upper.as_str() {
						"LOW" => Function::Low,
						"HIGH" => Function::High,
						_ => return Err(ExpressionParseError::UnknownFunction(SharedStr::from(name))),
					};
					self.position += 1;
					let argument = self.parse_logical_or()?;
					self.skip_whitespace();
					if self.advance() != Some(')') {
						return Err(ExpressionParseError::UnterminatedParenthesis);
					}
					return Ok(Expression::FunctionCall { function, argument: Box::new(argument) });
				}
				match upper.as_str() {
					"LOW" | "HIGH" => {
						let argument = self.parse_unary()?;
						Ok(Expression::FunctionCall {
							function: if upper == "LOW" { Function::Low } else { Function::High },
							argument: Box::new(argument),
						})
					},
					_ => Ok(Expression::Symbol(SharedStr::from(name))),
				}
			},
			other => Err(ExpressionParseError::UnexpectedCharacter(other)),
		}
	}

	/// SCMASM allows `/` as a string delimiter; only treat it as one when it can possibly close.
	fn is_character_constant(&self) -> bool {
		self.peek_at(2) == self.peek() || self.peek_at(1).is_some() && self.peek_at(2).is_none()
	}

	fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
		let mut collected = String::new();
		while let Some(character) = self.peek() {
			if predicate(character) {
				collected.push(character);
				self.position += 1;
			} else {
				break;
			}
		}
		collected
	}
}
