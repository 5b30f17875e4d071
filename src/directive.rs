//! Directive registry: case-insensitive dispatch from directive names to handlers.

use std::collections::HashMap;

use flexstr::SharedStr;

use crate::common::nearest_candidates;
use crate::error::AssemblyError;
use crate::parser::Line;

/// A directive handler. Handlers are plain function pointers over the concrete parser type, so
/// each syntax front-end registers functions that receive itself plus the already-split line.
pub type DirectiveHandler<P> = fn(&mut P, &Line) -> Result<(), Box<AssemblyError>>;

/// Case-insensitive name → handler mapping. One handler may serve many aliases (`DB`, `DEFB`,
/// `BYTE`), which is how the syntaxes share implementations.
#[derive(Debug)]
pub struct DirectiveRegistry<P> {
	handlers: HashMap<SharedStr, DirectiveHandler<P>>,
}

impl<P> Default for DirectiveRegistry<P> {
	fn default() -> Self {
		Self { handlers: HashMap::new() }
	}
}

impl<P> DirectiveRegistry<P> {
	/// Creates an empty registry.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a handler under one name.
	pub fn register(&mut self, name: &str, handler: DirectiveHandler<P>) {
		self.handlers.insert(SharedStr::from(name.to_uppercase()), handler);
	}

	/// Registers the same handler under several alias names.
	pub fn register_aliases(&mut self, names: &[&str], handler: DirectiveHandler<P>) {
		for name in names {
			self.register(name, handler);
		}
	}

	/// Looks up the handler for a directive name. Handlers are `Copy`, so the returned value is
	/// independent of the registry borrow.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<DirectiveHandler<P>> {
		self.handlers.get(&SharedStr::from(name.to_uppercase())).copied()
	}

	/// Whether the name is a registered directive.
	#[must_use]
	pub fn contains(&self, name: &str) -> bool {
		self.handlers.contains_key(&SharedStr::from(name.to_uppercase()))
	}

	/// A "did you mean" help line for an unknown directive, if any registered name is close.
	#[must_use]
	pub fn suggestions_for(&self, name: &str) -> Option<String> {
		nearest_candidates(name, self.handlers.keys().map(SharedStr::as_str))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	struct FakeParser {
		calls: usize,
	}

	fn bump(parser: &mut FakeParser, _line: &Line) -> Result<(), Box<AssemblyError>> {
		parser.calls += 1;
		Ok(())
	}

	#[test]
	fn case_insensitive_dispatch_and_aliases() {
		let mut registry: DirectiveRegistry<FakeParser> = DirectiveRegistry::new();
		registry.register_aliases(&["DB", "DEFB", "BYTE"], bump);

		let mut parser = FakeParser { calls: 0 };
		let line = Line::default();
		for name in ["db", "DeFb", "BYTE"] {
			let handler = registry.get(name).unwrap();
			handler(&mut parser, &line).unwrap();
		}
		assert_eq!(parser.calls, 3);
		assert!(registry.contains("defb"));
		assert!(!registry.contains("DEFW"));
	}

	#[test]
	fn suggestions() {
		let mut registry: DirectiveRegistry<FakeParser> = DirectiveRegistry::new();
		registry.register_aliases(&["ORG", "EQU", "DB"], bump);
		assert!(registry.suggestions_for("OGR").unwrap().contains("ORG"));
		assert!(registry.suggestions_for("XYZZY").is_none());
	}
}
