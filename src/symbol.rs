//! Symbol table: name bindings evaluated lazily through expression trees.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use flexstr::SharedStr;
use miette::SourceSpan;

use crate::common::{nearest_candidates, MemoryAddress};
use crate::expression::{EvaluationError, Expression, SymbolLookup};

/// What kind of binding a symbol is.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymbolKind {
	/// An address label, redefined by the engine on every pass.
	Label,
	/// An immutable equate (`EQU`, `.EQ`, `=`). Defining it twice is an error.
	Equate,
	/// A redefinable binding (`SET`, `DEFL`, `.SE`, Merlin `]` variables).
	Set,
}

/// One symbol binding.
#[derive(Clone, Debug)]
pub struct Symbol {
	/// The (possibly case-folded) symbol name.
	pub name:        SharedStr,
	/// The binding kind.
	pub kind:        SymbolKind,
	/// The defining expression; labels bind a literal of their address.
	pub value:       Expression,
	/// Whether the symbol is exported (`PUBLIC`).
	pub is_exported: bool,
	/// Whether the symbol is imported (`EXTERN`). Imported symbols resolve to 0 in this
	/// absolute-only assembler.
	pub is_imported: bool,
	/// Where the symbol was defined.
	pub span:        SourceSpan,
}

/// The error of a rejected [`SymbolTable::define`], carrying what the caller needs to build a
/// located diagnostic.
#[derive(Clone, Debug)]
pub struct RedefinitionError {
	/// The offending name.
	pub name:     SharedStr,
	/// Where the previous definition lives.
	pub previous: SourceSpan,
}

/// Name → symbol mapping with lazy, re-entrant evaluation.
///
/// Lookups evaluate the bound expression recursively through the table, so equates may freely
/// reference labels and other equates in any order. A currently-evaluating set catches circular
/// definitions (`A = B`, `B = A`). The ambient location counter backs the `$` operator.
#[derive(Debug, Default)]
pub struct SymbolTable {
	symbols:         HashMap<SharedStr, Symbol>,
	insertion_order: Vec<SharedStr>,
	case_sensitive:  bool,
	location:        Cell<MemoryAddress>,
	evaluating:      RefCell<Vec<SharedStr>>,
}

impl SymbolTable {
	/// Creates an empty table. `case_sensitive` is syntax-dependent: SCMASM and the Z80 family
	/// fold symbol names, Merlin and the generic syntax do not.
	#[must_use]
	pub fn new(case_sensitive: bool) -> Self {
		Self { case_sensitive, ..Self::default() }
	}

	fn fold(&self, name: &str) -> SharedStr {
		if self.case_sensitive {
			SharedStr::from(name)
		} else {
			SharedStr::from(name.to_uppercase())
		}
	}

	/// Records a binding.
	///
	/// Labels and Sets may replace an existing binding of the same kind; labels are in fact
	/// redefined by the engine on every pass. An equate colliding with any existing binding, or
	/// any binding colliding with an existing equate, is rejected.
	///
	/// # Errors
	/// [`RedefinitionError`] when the rules above reject the definition.
	pub fn define(
		&mut self,
		name: &str,
		kind: SymbolKind,
		value: Expression,
		span: SourceSpan,
	) -> Result<(), RedefinitionError> {
		let key = self.fold(name);
		if let Some(existing) = self.symbols.get(&key) {
			let replaceable = match (existing.kind, kind) {
				(SymbolKind::Label, SymbolKind::Label) | (SymbolKind::Set, SymbolKind::Set) => true,
				_ => false,
			};
			if !replaceable {
				return Err(RedefinitionError { name: key, previous: existing.span });
			}
		} else {
			self.insertion_order.push(key.clone());
		}
		self.symbols.insert(key.clone(), Symbol {
			name: key,
			kind,
			value,
			is_exported: false,
			is_imported: false,
			span,
		});
		Ok(())
	}

	/// Returns the symbol bound to `name`, if any.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Symbol> {
		self.symbols.get(&self.fold(name))
	}

	/// Whether `name` has a binding.
	#[must_use]
	pub fn is_defined(&self, name: &str) -> bool {
		self.symbols.contains_key(&self.fold(name))
	}

	/// Marks a symbol as exported, creating an undefined-until-labeled placeholder if needed.
	pub fn mark_exported(&mut self, name: &str, span: SourceSpan) {
		let key = self.fold(name);
		if let Some(symbol) = self.symbols.get_mut(&key) {
			symbol.is_exported = true;
		} else {
			self.insertion_order.push(key.clone());
			self.symbols.insert(key.clone(), Symbol {
				name:        key,
				kind:        SymbolKind::Label,
				value:       Expression::Literal(0),
				is_exported: true,
				is_imported: false,
				span,
			});
		}
	}

	/// Marks a symbol as imported. Imported symbols resolve to 0; everything in this assembler
	/// is absolute, so external linkage is recorded but not relocated.
	pub fn mark_imported(&mut self, name: &str, span: SourceSpan) {
		let key = self.fold(name);
		self.symbols.entry(key.clone()).or_insert_with(|| {
			Symbol {
				name:        key.clone(),
				kind:        SymbolKind::Equate,
				value:       Expression::Literal(0),
				is_exported: false,
				is_imported: true,
				span,
			}
		}).is_imported = true;
		if !self.insertion_order.contains(&key) {
			self.insertion_order.push(key);
		}
	}

	/// Sets the ambient program counter used when `$` is evaluated.
	pub fn set_current_location(&self, address: MemoryAddress) {
		self.location.set(address);
	}

	/// Yields symbols in insertion order, for listing and symbol-file consumers.
	pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
		self.insertion_order.iter().filter_map(|name| self.symbols.get(name))
	}

	/// A "did you mean" help line for an undefined name, if anything defined is close enough.
	#[must_use]
	pub fn suggestions_for(&self, name: &str) -> Option<String> {
		nearest_candidates(name, self.insertion_order.iter().map(SharedStr::as_str))
	}
}

impl SymbolLookup for SymbolTable {
	fn lookup_value(&self, name: &str) -> Result<MemoryAddress, EvaluationError> {
		let key = self.fold(name);
		let Some(symbol) = self.symbols.get(&key) else {
			return Err(EvaluationError::UndefinedSymbol(key));
		};
		if self.evaluating.borrow().contains(&key) {
			return Err(EvaluationError::CircularDefinition(key));
		}
		self.evaluating.borrow_mut().push(key);
		let result = symbol.value.evaluate(self);
		self.evaluating.borrow_mut().pop();
		result
	}

	fn current_location(&self) -> MemoryAddress {
		self.location.get()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::expression::{parse, GenericNumberFormat};

	fn expr(text: &str) -> Expression {
		parse(text, &GenericNumberFormat).unwrap()
	}

	#[test]
	fn lazy_forward_evaluation() {
		let mut table = SymbolTable::new(true);
		table.define("double", SymbolKind::Equate, expr("base*2"), (0, 0).into()).unwrap();
		assert!(matches!(table.lookup_value("double"), Err(EvaluationError::UndefinedSymbol(_))));
		table.define("base", SymbolKind::Label, Expression::Literal(0x20), (0, 0).into()).unwrap();
		assert_eq!(table.lookup_value("double").unwrap(), 0x40);
		// Labels shift between passes; dependents follow.
		table.define("base", SymbolKind::Label, Expression::Literal(0x30), (0, 0).into()).unwrap();
		assert_eq!(table.lookup_value("double").unwrap(), 0x60);
	}

	#[test]
	fn equates_are_immutable() {
		let mut table = SymbolTable::new(true);
		table.define("answer", SymbolKind::Equate, Expression::Literal(42), (0, 0).into()).unwrap();
		assert!(table.define("answer", SymbolKind::Equate, Expression::Literal(43), (5, 1).into()).is_err());
		assert!(table.define("answer", SymbolKind::Set, Expression::Literal(43), (5, 1).into()).is_err());
	}

	#[test]
	fn sets_are_redefinable() {
		let mut table = SymbolTable::new(true);
		table.define("counter", SymbolKind::Set, Expression::Literal(1), (0, 0).into()).unwrap();
		table.define("counter", SymbolKind::Set, Expression::Literal(2), (0, 0).into()).unwrap();
		assert_eq!(table.lookup_value("counter").unwrap(), 2);
	}

	#[test]
	fn case_folding() {
		let mut table = SymbolTable::new(false);
		table.define("Start", SymbolKind::Label, Expression::Literal(0x800), (0, 0).into()).unwrap();
		assert_eq!(table.lookup_value("START").unwrap(), 0x800);
		assert_eq!(table.lookup_value("start").unwrap(), 0x800);
	}

	#[test]
	fn circular_definitions_are_caught() {
		let mut table = SymbolTable::new(true);
		table.define("a", SymbolKind::Equate, expr("b"), (0, 0).into()).unwrap();
		table.define("b", SymbolKind::Equate, expr("a"), (0, 0).into()).unwrap();
		assert!(matches!(table.lookup_value("a"), Err(EvaluationError::CircularDefinition(_))));
		// The guard unwinds, so unrelated lookups still work afterwards.
		table.define("c", SymbolKind::Equate, Expression::Literal(7), (0, 0).into()).unwrap();
		assert_eq!(table.lookup_value("c").unwrap(), 7);
	}

	#[test]
	fn current_location() {
		let table = SymbolTable::new(true);
		table.set_current_location(0x1234);
		let dollar = expr("$");
		assert_eq!(dollar.evaluate(&table).unwrap(), 0x1234);
	}

	#[test]
	fn insertion_order_iteration() {
		let mut table = SymbolTable::new(true);
		table.define("one", SymbolKind::Equate, Expression::Literal(1), (0, 0).into()).unwrap();
		table.define("two", SymbolKind::Equate, Expression::Literal(2), (0, 0).into()).unwrap();
		table.define("three", SymbolKind::Equate, Expression::Literal(3), (0, 0).into()).unwrap();
		let names: Vec<&str> = table.iter().map(|symbol| symbol.name.as_str()).collect();
		assert_eq!(names, ["one", "two", "three"]);
	}
}
