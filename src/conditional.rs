//! Conditional assembly: the IF/ELSE/ENDIF stack shared by all syntax parsers.

use thiserror::Error;

/// Maximum conditional nesting depth, to catch runaway nesting.
pub const MAX_CONDITIONAL_DEPTH: usize = 32;

/// Errors of the conditional stack. The parser that knows the source span converts these into
/// [`crate::AssemblyError`].
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[allow(missing_docs)]
pub enum ConditionalError {
	#[error("ELSE without matching IF")]
	ElseWithoutIf,
	#[error("multiple ELSE in the same IF block")]
	MultipleElse,
	#[error("ENDIF without matching IF")]
	EndifWithoutIf,
	#[error("conditional nesting exceeds {MAX_CONDITIONAL_DEPTH}")]
	TooDeep,
}

#[derive(Clone, Copy, Debug)]
struct ConditionalBlock {
	condition:     bool,
	in_else_block: bool,
	should_emit:   bool,
}

/// A stack of conditional blocks.
///
/// Each nested block's emission flag is the parent's flag ANDed with the taken branch of its own
/// condition, so a false outer block silences everything inside regardless of inner conditions.
#[derive(Clone, Debug, Default)]
pub struct ConditionalAssembler {
	stack: Vec<ConditionalBlock>,
}

impl ConditionalAssembler {
	/// Creates an empty stack: everything is emitted.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Opens a conditional block (IF/IFDEF/DO).
	///
	/// # Errors
	/// [`ConditionalError::TooDeep`] past [`MAX_CONDITIONAL_DEPTH`] levels.
	pub fn begin_if(&mut self, condition: bool) -> Result<(), ConditionalError> {
		if self.stack.len() >= MAX_CONDITIONAL_DEPTH {
			return Err(ConditionalError::TooDeep);
		}
		let parent_should_emit = self.stack.last().map_or(true, |block| block.should_emit);
		self.stack.push(ConditionalBlock {
			condition,
			in_else_block: false,
			should_emit: parent_should_emit && condition,
		});
		Ok(())
	}

	/// Switches the innermost block to its ELSE branch.
	///
	/// # Errors
	/// Without an open block, or when the block is already in its ELSE branch.
	pub fn begin_else(&mut self) -> Result<(), ConditionalError> {
		let parent_should_emit =
			if self.stack.len() > 1 { self.stack[self.stack.len() - 2].should_emit } else { true };
		let Some(block) = self.stack.last_mut() else {
			return Err(ConditionalError::ElseWithoutIf);
		};
		if block.in_else_block {
			return Err(ConditionalError::MultipleElse);
		}
		block.in_else_block = true;
		block.should_emit = parent_should_emit && !block.condition;
		Ok(())
	}

	/// Closes the innermost block.
	///
	/// # Errors
	/// Without an open block.
	pub fn end_if(&mut self) -> Result<(), ConditionalError> {
		self.stack.pop().map(|_| ()).ok_or(ConditionalError::EndifWithoutIf)
	}

	/// Whether code at the current position is emitted.
	#[must_use]
	pub fn should_emit(&self) -> bool {
		self.stack.last().map_or(true, |block| block.should_emit)
	}

	/// Whether every IF has been closed; queried at end of source.
	#[must_use]
	pub fn is_balanced(&self) -> bool {
		self.stack.is_empty()
	}

	/// The current nesting depth.
	#[must_use]
	pub fn depth(&self) -> usize {
		self.stack.len()
	}

	/// Clears all blocks, e.g. before parsing a fresh source.
	pub fn reset(&mut self) {
		self.stack.clear();
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn plain_if_else() {
		let mut conditionals = ConditionalAssembler::new();
		conditionals.begin_if(true).unwrap();
		assert!(conditionals.should_emit());
		conditionals.begin_else().unwrap();
		assert!(!conditionals.should_emit());
		conditionals.end_if().unwrap();
		assert!(conditionals.should_emit());
		assert!(conditionals.is_balanced());
	}

	#[test]
	fn false_condition_takes_else() {
		let mut conditionals = ConditionalAssembler::new();
		conditionals.begin_if(false).unwrap();
		assert!(!conditionals.should_emit());
		conditionals.begin_else().unwrap();
		assert!(conditionals.should_emit());
		conditionals.end_if().unwrap();
	}

	#[test]
	fn parent_silences_nested_true() {
		let mut conditionals = ConditionalAssembler::new();
		conditionals.begin_if(false).unwrap();
		conditionals.begin_if(true).unwrap();
		assert!(!conditionals.should_emit());
		// An ELSE inside a dead branch must stay dead too.
		conditionals.begin_else().unwrap();
		assert!(!conditionals.should_emit());
		conditionals.end_if().unwrap();
		conditionals.end_if().unwrap();
		assert!(conditionals.should_emit());
	}

	#[test]
	fn error_cases() {
		let mut conditionals = ConditionalAssembler::new();
		assert_eq!(conditionals.begin_else(), Err(ConditionalError::ElseWithoutIf));
		assert_eq!(conditionals.end_if(), Err(ConditionalError::EndifWithoutIf));
		conditionals.begin_if(true).unwrap();
		conditionals.begin_else().unwrap();
		assert_eq!(conditionals.begin_else(), Err(ConditionalError::MultipleElse));
		conditionals.reset();
		for _ in 0 .. MAX_CONDITIONAL_DEPTH {
			conditionals.begin_if(true).unwrap();
		}
		assert_eq!(conditionals.begin_if(true), Err(ConditionalError::TooDeep));
	}
}
