//! Common types shared by all stages of the assembly pipeline.

use std::fmt::Write;
use std::sync::Arc;

use flexstr::SharedStr;
use miette::{MietteError, MietteSpanContents, SourceCode, SourceSpan, SpanContents};

/// A memory address or assembly-time numeric value.
///
/// Signed so that address arithmetic (branch displacements, `*-label`) works without surprises;
/// emitters mask down to the width the target needs.
pub type MemoryAddress = i64;

/// The source code of one assembly file, plus the metadata diagnostics need.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AssemblyCode {
	/// The full source text.
	pub text: String,
	/// The file name this text was read from, or a pseudo-name such as `<input>`.
	pub name: SharedStr,
}

impl AssemblyCode {
	/// Creates a new source code object from text and a (pseudo-)file name.
	#[must_use]
	pub fn new(text: &str, name: &str) -> Arc<Self> {
		Arc::new(Self { text: text.to_owned(), name: SharedStr::from(name) })
	}

	/// Reads source code from a file.
	///
	/// # Errors
	/// Any I/O error while reading the file.
	pub fn from_file(file_name: &str) -> Result<Arc<Self>, std::io::Error> {
		let text = std::fs::read_to_string(file_name)?;
		Ok(Arc::new(Self { text, name: SharedStr::from(file_name) }))
	}

	/// Returns the 1-based line and column of a byte offset, for symbol-file and listing output.
	#[must_use]
	pub fn line_column_at(&self, offset: usize) -> (usize, usize) {
		let mut line = 1;
		let mut column = 1;
		for (index, character) in self.text.char_indices() {
			if index >= offset {
				break;
			}
			if character == '\n' {
				line += 1;
				column = 1;
			} else {
				column += 1;
			}
		}
		(line, column)
	}
}

impl SourceCode for AssemblyCode {
	fn read_span<'a>(
		&'a self,
		span: &SourceSpan,
		context_lines_before: usize,
		context_lines_after: usize,
	) -> Result<Box<dyn SpanContents<'a> + 'a>, MietteError> {
		let contents = self.text.read_span(span, context_lines_before, context_lines_after)?;
		Ok(Box::new(MietteSpanContents::new_named(
			self.name.to_string(),
			contents.data(),
			*contents.span(),
			contents.line(),
			contents.column(),
			contents.line_count(),
		)))
	}
}

/// Creates a source span covering both given spans, for diagnostics on multi-token constructs.
#[must_use]
pub fn source_range(start: SourceSpan, end: SourceSpan) -> SourceSpan {
	let start_offset = start.offset().min(end.offset());
	let end_offset = (start.offset() + start.len()).max(end.offset() + end.len());
	(start_offset, end_offset - start_offset).into()
}

/// Pretty-prints a byte slice as rows of hex pairs, sixteen to a line.
#[must_use]
pub fn pretty_hex(bytes: &[u8]) -> String {
	let mut output = String::new();
	for (index, byte) in bytes.iter().enumerate() {
		let separator = if index % 16 == 15 { "\n" } else { " " };
		write!(output, "{byte:02X}{separator}").unwrap();
	}
	output
}

/// Levenshtein edit distance between two (short) strings; used for "did you mean" suggestions.
#[must_use]
pub fn edit_distance(a: &str, b: &str) -> usize {
	let a: Vec<char> = a.chars().collect();
	let b: Vec<char> = b.chars().collect();
	let mut previous: Vec<usize> = (0 ..= b.len()).collect();
	let mut current = vec![0; b.len() + 1];

	for (i, a_char) in a.iter().enumerate() {
		current[0] = i + 1;
		for (j, b_char) in b.iter().enumerate() {
			let substitution_cost = usize::from(a_char != b_char);
			current[j + 1] = (previous[j] + substitution_cost).min(previous[j + 1] + 1).min(current[j] + 1);
		}
		std::mem::swap(&mut previous, &mut current);
	}
	previous[b.len()]
}

/// Produces a "did you mean" help line from the closest candidates (edit distance ≤ 2, up to
/// three suggestions), or [`None`] if nothing is close enough.
pub fn nearest_candidates<'a>(target: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
	let mut scored: Vec<(usize, &str)> = candidates
		.filter_map(|candidate| {
			let distance = edit_distance(&target.to_uppercase(), &candidate.to_uppercase());
			(distance <= 2 && distance > 0).then_some((distance, candidate))
		})
		.collect();
	scored.sort_by_key(|&(distance, name)| (distance, name.to_owned()));
	scored.dedup_by_key(|&mut (_, name)| name.to_owned());
	if scored.is_empty() {
		return None;
	}
	let suggestions: Vec<&str> = scored.iter().take(3).map(|&(_, name)| name).collect();
	Some(match suggestions.as_slice() {
		[single] => format!("did you mean `{single}`?"),
		many => format!("did you mean one of {}?", many.iter().map(|name| format!("`{name}`")).collect::<Vec<_>>().join(", ")),
	})
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn line_and_column() {
		let code = AssemblyCode::new("lda #1\nsta $20\n", "<test>");
		assert_eq!(code.line_column_at(0), (1, 1));
		assert_eq!(code.line_column_at(7), (2, 1));
		assert_eq!(code.line_column_at(11), (2, 5));
	}

	#[test]
	fn edit_distance_basics() {
		assert_eq!(edit_distance("ORG", "ORG"), 0);
		assert_eq!(edit_distance("ORG", "OGR"), 2);
		assert_eq!(edit_distance("DB", "DW"), 1);
		assert_eq!(edit_distance("", "ABC"), 3);
	}

	#[test]
	fn suggestions() {
		let candidates = ["ORG", "EQU", "DB", "DW"];
		let help = nearest_candidates("OGR", candidates.iter().copied()).unwrap();
		assert!(help.contains("ORG"));
		assert!(nearest_candidates("COMPLETELYOFF", candidates.iter().copied()).is_none());
	}
}
