use std::collections::HashMap;

use flexstr::SharedStr;

use super::parser::{parse, GenericNumberFormat, MerlinNumberFormat, ScmasmNumberFormat, Z80NumberFormat};
use super::{EvaluationError, Expression, NoSymbols, SymbolLookup};
use crate::common::MemoryAddress;

struct FixedSymbols(HashMap<SharedStr, MemoryAddress>, MemoryAddress);

impl FixedSymbols {
	fn new(entries: &[(&str, MemoryAddress)], location: MemoryAddress) -> Self {
		Self(entries.iter().map(|&(name, value)| (SharedStr::from(name), value)).collect(), location)
	}
}

impl SymbolLookup for FixedSymbols {
	fn lookup_value(&self, name: &str) -> Result<MemoryAddress, EvaluationError> {
		self.0.get(&SharedStr::from(name)).copied().ok_or_else(|| EvaluationError::UndefinedSymbol(SharedStr::from(name)))
	}

	fn current_location(&self) -> MemoryAddress {
		self.1
	}
}

fn eval_generic(text: &str, symbols: &dyn SymbolLookup) -> MemoryAddress {
	parse(text, &GenericNumberFormat).unwrap().evaluate(symbols).unwrap()
}

#[test]
fn literals() {
	assert_eq!(eval_generic("$FF", &NoSymbols), 0xFF);
	assert_eq!(eval_generic("0xFF", &NoSymbols), 0xFF);
	assert_eq!(eval_generic("%10101010", &NoSymbols), 0xAA);
	assert_eq!(eval_generic("0b1010", &NoSymbols), 10);
	assert_eq!(eval_generic("42", &NoSymbols), 42);
	assert_eq!(eval_generic("'A'", &NoSymbols), 0x41);
	assert_eq!(eval_generic("\"A\"", &NoSymbols), 0x41);
}

#[test]
fn precedence_and_associativity() {
	assert_eq!(eval_generic("2+3*4", &NoSymbols), 14);
	assert_eq!(eval_generic("(2+3)*4", &NoSymbols), 20);
	assert_eq!(eval_generic("10-4-3", &NoSymbols), 3);
	assert_eq!(eval_generic("1<<4|1", &NoSymbols), 0x11);
	assert_eq!(eval_generic("6&3^1", &NoSymbols), 3);
	assert_eq!(eval_generic("100/10/2", &NoSymbols), 5);
	assert_eq!(eval_generic("17%5", &NoSymbols), 2);
}

#[test]
fn comparisons_and_logic() {
	assert_eq!(eval_generic("1 == 1", &NoSymbols), 1);
	assert_eq!(eval_generic("1 != 1", &NoSymbols), 0);
	assert_eq!(eval_generic("2 < 3 && 3 < 2", &NoSymbols), 0);
	assert_eq!(eval_generic("2 < 3 || 3 < 2", &NoSymbols), 1);
	assert_eq!(eval_generic("!0", &NoSymbols), 1);
	assert_eq!(eval_generic("4 >= 4", &NoSymbols), 1);
}

#[test]
fn unary_byte_extraction() {
	assert_eq!(eval_generic("<$1234", &NoSymbols), 0x34);
	assert_eq!(eval_generic(">$1234", &NoSymbols), 0x12);
	assert_eq!(eval_generic("LOW($1234)", &NoSymbols), 0x34);
	assert_eq!(eval_generic("HIGH($1234)", &NoSymbols), 0x12);
	assert_eq!(eval_generic("-5", &NoSymbols), -5);
	assert_eq!(eval_generic("~0", &NoSymbols), -1);
}

#[test]
fn symbols_and_location_counter() {
	let symbols = FixedSymbols::new(&[("start", 0x8000), ("length", 0x10)], 0x8005);
	assert_eq!(eval_generic("start + length", &symbols), 0x8010);
	assert_eq!(eval_generic("$", &symbols), 0x8005);
	assert_eq!(eval_generic("* - start", &symbols), 5);
	assert_eq!(eval_generic("start+$10*2", &symbols), 0x8020);
}

#[test]
fn constness_and_relocatability() {
	let format = GenericNumberFormat;
	let constant = parse("1+2*3", &format).unwrap();
	assert!(constant.is_constant());
	assert!(!constant.is_relocatable());
	let relocatable = parse("label+1", &format).unwrap();
	assert!(!relocatable.is_constant());
	assert!(relocatable.is_relocatable());
	assert_eq!(relocatable.first_symbol().unwrap().as_str(), "label");
	assert!(parse("$+1", &format).unwrap().is_relocatable());
}

#[test]
fn evaluation_is_pure() {
	let symbols = FixedSymbols::new(&[("x", 7)], 0x100);
	let expression = parse("x*3+$", &GenericNumberFormat).unwrap();
	let first = expression.evaluate(&symbols).unwrap();
	let second = expression.evaluate(&symbols).unwrap();
	assert_eq!(first, second);
}

#[test]
fn failure_modes() {
	let format = GenericNumberFormat;
	assert!(parse("", &format).is_err());
	assert!(parse("(1+2", &format).is_err());
	assert!(parse("1+2)", &format).is_err());
	assert!(parse("0b102", &format).is_err());
	assert!(parse("FOO(1)", &format).is_err());
	assert!(matches!(
		parse("1/0", &format).unwrap().evaluate(&NoSymbols),
		Err(EvaluationError::DivisionByZero)
	));
	assert!(matches!(
		parse("ghost", &format).unwrap().evaluate(&NoSymbols),
		Err(EvaluationError::UndefinedSymbol(_))
	));
}

#[test]
fn z80_number_formats() {
	let format = Z80NumberFormat::default();
	assert_eq!(parse("0FFH", &format).unwrap(), Expression::Literal(0xFF));
	assert_eq!(parse("377O", &format).unwrap(), Expression::Literal(0o377));
	assert_eq!(parse("377Q", &format).unwrap(), Expression::Literal(0o377));
	assert_eq!(parse("11111111B", &format).unwrap(), Expression::Literal(0xFF));
	assert_eq!(parse("255D", &format).unwrap(), Expression::Literal(255));
	assert_eq!(parse("$FF", &format).unwrap(), Expression::Literal(0xFF));
	format.set_radix(16);
	assert_eq!(parse("FF", &format).unwrap(), Expression::Symbol(SharedStr::from("FF")));
	assert_eq!(parse("0FF", &format).unwrap(), Expression::Literal(0xFF));
	format.set_radix(10);
}

#[test]
fn scmasm_number_formats() {
	let format = ScmasmNumberFormat;
	assert_eq!(parse("%1111.0000", &format).unwrap(), Expression::Literal(0xF0));
	// Delimiter below apostrophe sets the high bit.
	assert_eq!(parse("\"A", &format).unwrap(), Expression::Literal(0xC1));
	assert_eq!(parse("'A", &format).unwrap(), Expression::Literal(0x41));
}

#[test]
fn merlin_character_rule() {
	let format = MerlinNumberFormat;
	assert_eq!(parse("\"A\"", &format).unwrap(), Expression::Literal(0xC1));
	assert_eq!(parse("'A'", &format).unwrap(), Expression::Literal(0x41));
}
