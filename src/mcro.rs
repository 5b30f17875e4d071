//! Macro processing: definition capture, parameter substitution, repeat blocks.

use std::collections::HashMap;

use flexstr::SharedStr;
use miette::SourceSpan;
use thiserror::Error;

/// Maximum nesting of macro expansions, to bound runaway recursion.
pub const MAX_MACRO_DEPTH: usize = 63;

/// Errors of the macro processor. The parser that knows the source span converts these into
/// [`crate::AssemblyError`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[allow(missing_docs)]
pub enum MacroError {
	#[error("macro expansion of `{0}` exceeds the recursion limit of {MAX_MACRO_DEPTH}")]
	RecursionLimit(SharedStr),
	#[error("undefined macro `{0}`")]
	Undefined(SharedStr),
}

/// The words a syntax uses to open and close captured bodies. Capture must honor nesting, so the
/// processor needs to recognize both sets while swallowing raw lines.
#[derive(Clone, Copy, Debug)]
pub struct MacroDialect {
	/// Words that open a nested capture (`MACRO`, `REPT`, `IRP`, `IRPC`, `.MA`).
	pub begin_words: &'static [&'static str],
	/// Words that close a capture (`ENDM`, `.EM`).
	pub end_words:   &'static [&'static str],
}

/// A stored macro definition.
#[derive(Clone, Debug)]
pub struct MacroDefinition {
	/// Case-folded macro name.
	pub name:       SharedStr,
	/// Formal parameter names.
	pub parameters: Vec<SharedStr>,
	/// Raw body lines, captured without expansion.
	pub body:       Vec<String>,
	/// Where the definition started.
	pub span:       SourceSpan,
}

/// What a repeat block iterates over.
#[derive(Clone, Debug)]
pub enum RepeatKind {
	/// `REPT n`: emit the body `n` times.
	Count(i64),
	/// `IRP sym,<a,b,c>`: bind `sym` to each list item in turn.
	List {
		/// The iteration symbol.
		symbol: SharedStr,
		/// The items.
		items:  Vec<String>,
	},
	/// `IRPC sym,text`: bind `sym` to each character in turn.
	Characters {
		/// The iteration symbol.
		symbol: SharedStr,
		/// The text iterated character by character.
		text:   String,
	},
}

#[derive(Clone, Debug)]
enum CaptureTarget {
	Definition { name: SharedStr, parameters: Vec<SharedStr> },
	Repeat(RepeatKind),
}

#[derive(Clone, Debug)]
struct Capture {
	target:  CaptureTarget,
	body:    Vec<String>,
	nesting: usize,
	span:    SourceSpan,
}

/// A finished capture, handed back to the parser.
#[derive(Clone, Debug)]
pub enum CapturedBlock {
	/// A macro definition was stored under this name; nothing further to do.
	Defined(SharedStr),
	/// A repeat block finished; the parser feeds the expansion back through itself.
	Repeat {
		/// What the block iterates over.
		kind: RepeatKind,
		/// The captured raw body.
		body: Vec<String>,
	},
}

/// Captures, stores and expands macros for one source unit.
#[derive(Debug)]
pub struct MacroProcessor {
	dialect:           MacroDialect,
	macros:            HashMap<SharedStr, MacroDefinition>,
	capture:           Option<Capture>,
	expansion_counter: u32,
	depth:             usize,
}

impl MacroProcessor {
	/// Creates a processor for the given dialect's capture words.
	#[must_use]
	pub fn new(dialect: MacroDialect) -> Self {
		Self { dialect, macros: HashMap::new(), capture: None, expansion_counter: 0, depth: 0 }
	}

	/// Whether a body is currently being captured.
	#[must_use]
	pub const fn is_capturing(&self) -> bool {
		self.capture.is_some()
	}

	/// The name of the definition being captured, if any, with its starting span.
	#[must_use]
	pub fn capture_in_progress(&self) -> Option<(SharedStr, SourceSpan)> {
		self.capture.as_ref().map(|capture| {
			let name = match &capture.target {
				CaptureTarget::Definition { name, .. } => name.clone(),
				CaptureTarget::Repeat(_) => SharedStr::from("REPT"),
			};
			(name, capture.span)
		})
	}

	/// Starts capturing a macro definition.
	pub fn begin_definition(&mut self, name: &str, parameters: Vec<SharedStr>, span: SourceSpan) {
		self.capture = Some(Capture {
			target: CaptureTarget::Definition { name: SharedStr::from(name.to_uppercase()), parameters },
			body: Vec::new(),
			nesting: 0,
			span,
		});
	}

	/// Starts capturing a repeat block.
	pub fn begin_repeat(&mut self, kind: RepeatKind, span: SourceSpan) {
		self.capture = Some(Capture { target: CaptureTarget::Repeat(kind), body: Vec::new(), nesting: 0, span });
	}

	/// Feeds one raw line into the active capture. Returns the finished block once the matching
	/// terminator arrives; nested begin/end pairs are swallowed into the body.
	pub fn capture_line(&mut self, line: &str) -> Option<CapturedBlock> {
		let capture = self.capture.as_mut()?;
		let mut tokens = line.split_whitespace().take(2).map(str::to_uppercase);
		let first = tokens.next().unwrap_or_default();
		let second = tokens.next().unwrap_or_default();
		let dialect = &self.dialect;
		let word_in = |words: &[&str]| {
			words.iter().any(|&word| first == word || second == word)
		};

		if word_in(dialect.end_words) {
			if capture.nesting == 0 {
				let finished = self.capture.take().unwrap();
				return Some(match finished.target {
					CaptureTarget::Definition { name, parameters } => {
						let definition = MacroDefinition {
							name: name.clone(),
							parameters,
							body: finished.body,
							span: finished.span,
						};
						self.macros.insert(name.clone(), definition);
						CapturedBlock::Defined(name)
					},
					CaptureTarget::Repeat(kind) => CapturedBlock::Repeat { kind, body: finished.body },
				});
			}
			capture.nesting -= 1;
		} else if word_in(dialect.begin_words) {
			capture.nesting += 1;
		}
		capture.body.push(line.to_owned());
		None
	}

	/// Whether `name` is a defined macro.
	#[must_use]
	pub fn is_macro(&self, name: &str) -> bool {
		self.macros.contains_key(&SharedStr::from(name.to_uppercase()))
	}

	/// The names of all defined macros.
	pub fn names(&self) -> impl Iterator<Item = &SharedStr> {
		self.macros.keys()
	}

	/// Expands a macro invocation into raw source lines.
	///
	/// Formal parameters are bound to `arguments` in order (missing arguments become empty).
	/// `LOCAL` declarations are stripped from the body and their names uniquified with this
	/// expansion's id. `positional` backs the `%n` and `\n` forms, index 0 conventionally being
	/// the invocation label.
	///
	/// # Errors
	/// [`MacroError::Undefined`] for an unknown name.
	pub fn expand(
		&mut self,
		name: &str,
		arguments: &[String],
		positional: &[String],
	) -> Result<Vec<String>, MacroError> {
		let key = SharedStr::from(name.to_uppercase());
		let definition = self.macros.get(&key).ok_or_else(|| MacroError::Undefined(key.clone()))?.clone();
		self.expansion_counter += 1;
		let id = self.expansion_counter;

		let mut bindings: Vec<(SharedStr, String)> = definition
			.parameters
			.iter()
			.enumerate()
			.map(|(index, parameter)| (parameter.clone(), arguments.get(index).cloned().unwrap_or_default()))
			.collect();

		let mut expanded = Vec::with_capacity(definition.body.len());
		for line in &definition.body {
			let mut tokens = line.split_whitespace();
			if tokens.next().is_some_and(|first| first.eq_ignore_ascii_case("LOCAL")) {
				let rest = line.trim_start().get(5 ..).unwrap_or_default();
				for local in rest.split(',').map(str::trim).filter(|local| !local.is_empty()) {
					bindings.push((SharedStr::from(local), format!("{local}_{id:06}")));
				}
				continue;
			}
			expanded.push(substitute_parameters(line, &bindings, positional));
		}
		Ok(expanded)
	}

	/// Expands a finished repeat block into raw source lines.
	#[must_use]
	pub fn expand_repeat(&mut self, kind: &RepeatKind, body: &[String]) -> Vec<String> {
		let mut expanded = Vec::new();
		match kind {
			RepeatKind::Count(count) => {
				for _ in 0 .. (*count).max(0) {
					expanded.extend_from_slice(body);
				}
			},
			RepeatKind::List { symbol, items } => {
				for item in items {
					let bindings = [(symbol.clone(), item.clone())];
					expanded.extend(body.iter().map(|line| substitute_parameters(line, &bindings, &[])));
				}
			},
			RepeatKind::Characters { symbol, text } => {
				for character in text.chars() {
					let bindings = [(symbol.clone(), character.to_string())];
					expanded.extend(body.iter().map(|line| substitute_parameters(line, &bindings, &[])));
				}
			},
		}
		expanded
	}

	/// Enters one level of expansion.
	///
	/// # Errors
	/// [`MacroError::RecursionLimit`] past [`MAX_MACRO_DEPTH`] levels.
	pub fn enter_expansion(&mut self, name: &str) -> Result<(), MacroError> {
		if self.depth >= MAX_MACRO_DEPTH {
			return Err(MacroError::RecursionLimit(SharedStr::from(name)));
		}
		self.depth += 1;
		Ok(())
	}

	/// Leaves one level of expansion.
	pub fn leave_expansion(&mut self) {
		self.depth = self.depth.saturating_sub(1);
	}

	/// The current expansion depth.
	#[must_use]
	pub const fn depth(&self) -> usize {
		self.depth
	}
}

const fn is_name_char(character: char) -> bool {
	character.is_ascii_alphanumeric() || matches!(character, '_' | '.' | '@' | '?' | '$')
}

/// Substitutes macro parameters in one line.
///
/// Named bindings replace whole identifier tokens (case-insensitively). `&NAME` splices a binding
/// into the middle of a token. `%n` and `\n` select positional values.
#[must_use]
pub fn substitute_parameters(line: &str, named: &[(SharedStr, String)], positional: &[String]) -> String {
	let characters: Vec<char> = line.chars().collect();
	let mut output = String::with_capacity(line.len());
	let mut index = 0;

	let lookup = |token: &str| {
		named
			.iter()
			.find(|(name, _)| name.eq_ignore_ascii_case(token))
			.map(|(_, value)| value.clone())
	};

	while index < characters.len() {
		let character = characters[index];
		match character {
			'&' if index + 1 < characters.len() && is_name_char(characters[index + 1]) => {
				let start = index + 1;
				let mut end = start;
				while end < characters.len() && is_name_char(characters[end]) {
					end += 1;
				}
				let token: String = characters[start .. end].iter().collect();
				if let Some(value) = lookup(&token) {
					output.push_str(&value);
					// A trailing `&` separates the splice from following name characters.
					if end < characters.len() && characters[end] == '&' {
						end += 1;
					}
				} else {
					output.push('&');
					output.push_str(&token);
				}
				index = end;
			},
			'%' | '\\' if index + 1 < characters.len() && characters[index + 1].is_ascii_digit() => {
				let position = characters[index + 1] as usize - '0' as usize;
				if let Some(value) = positional.get(position) {
					output.push_str(value);
				}
				index += 2;
			},
			start if is_name_char(start) && !start.is_ascii_digit() => {
				let begin = index;
				let mut end = index;
				while end < characters.len() && is_name_char(characters[end]) {
					end += 1;
				}
				let token: String = characters[begin .. end].iter().collect();
				match lookup(&token) {
					Some(value) => output.push_str(&value),
					None => output.push_str(&token),
				}
				index = end;
			},
			other => {
				output.push(other);
				index += 1;
			},
		}
	}
	output
}

#[cfg(test)]
mod test {
	use super::*;

	const DIALECT: MacroDialect =
		MacroDialect { begin_words: &["MACRO", "REPT", "IRP", "IRPC"], end_words: &["ENDM"] };

	fn processor() -> MacroProcessor {
		MacroProcessor::new(DIALECT)
	}

	#[test]
	fn define_and_expand() {
		let mut macros = processor();
		macros.begin_definition("MOVB", vec![SharedStr::from("SRC"), SharedStr::from("DEST")], (0, 0).into());
		assert!(macros.capture_line("\tLDA SRC").is_none());
		assert!(macros.capture_line("\tSTA DEST").is_none());
		assert!(matches!(macros.capture_line("\tENDM"), Some(CapturedBlock::Defined(_))));
		assert!(macros.is_macro("movb"));

		let lines = macros.expand("MOVB", &["$80".to_owned(), "$90".to_owned()], &[]).unwrap();
		assert_eq!(lines, ["\tLDA $80", "\tSTA $90"]);
	}

	#[test]
	fn nested_capture() {
		let mut macros = processor();
		macros.begin_definition("OUTER", Vec::new(), (0, 0).into());
		assert!(macros.capture_line("INNER MACRO").is_none());
		assert!(macros.capture_line("\tNOP").is_none());
		assert!(macros.capture_line("\tENDM").is_none());
		let finished = macros.capture_line("\tENDM");
		assert!(matches!(finished, Some(CapturedBlock::Defined(_))));
		let lines = macros.expand("OUTER", &[], &[]).unwrap();
		assert_eq!(lines.len(), 3);
	}

	#[test]
	fn local_labels_are_uniquified() {
		let mut macros = processor();
		macros.begin_definition("WAIT", Vec::new(), (0, 0).into());
		macros.capture_line("\tLOCAL LOOP");
		macros.capture_line("LOOP:\tDJNZ LOOP");
		macros.capture_line("\tENDM");

		let first = macros.expand("WAIT", &[], &[]).unwrap();
		let second = macros.expand("WAIT", &[], &[]).unwrap();
		assert_eq!(first, ["LOOP_000001:\tDJNZ LOOP_000001"]);
		assert_eq!(second, ["LOOP_000002:\tDJNZ LOOP_000002"]);
	}

	#[test]
	fn splice_and_positional_forms() {
		let bindings = [(SharedStr::from("REG"), "IX".to_owned())];
		assert_eq!(substitute_parameters("\tLD &REG&H,0", &bindings, &[]), "\tLD IXH,0");
		let positional = ["LBL".to_owned(), "first".to_owned(), "second".to_owned()];
		assert_eq!(substitute_parameters("\tDB %1,%2", &[], &positional), "\tDB first,second");
		assert_eq!(substitute_parameters("\\0\tNOP", &[], &positional), "LBL\tNOP");
	}

	#[test]
	fn repeat_blocks() {
		let mut macros = processor();
		macros.begin_repeat(RepeatKind::Count(3), (0, 0).into());
		macros.capture_line("\tNOP");
		let Some(CapturedBlock::Repeat { kind, body }) = macros.capture_line("\tENDM") else {
			panic!("repeat did not finish");
		};
		assert_eq!(macros.expand_repeat(&kind, &body).len(), 3);

		macros.begin_repeat(
			RepeatKind::List { symbol: SharedStr::from("X"), items: vec!["1".into(), "2".into()] },
			(0, 0).into(),
		);
		macros.capture_line("\tDB X");
		let Some(CapturedBlock::Repeat { kind, body }) = macros.capture_line("\tENDM") else {
			panic!("irp did not finish");
		};
		assert_eq!(macros.expand_repeat(&kind, &body), ["\tDB 1", "\tDB 2"]);

		macros.begin_repeat(
			RepeatKind::Characters { symbol: SharedStr::from("C"), text: "AB".to_owned() },
			(0, 0).into(),
		);
		macros.capture_line("\tDB 'C'");
		let Some(CapturedBlock::Repeat { kind, body }) = macros.capture_line("\tENDM") else {
			panic!("irpc did not finish");
		};
		assert_eq!(macros.expand_repeat(&kind, &body), ["\tDB 'A'", "\tDB 'B'"]);
	}

	#[test]
	fn recursion_limit() {
		let mut macros = processor();
		for _ in 0 .. MAX_MACRO_DEPTH {
			macros.enter_expansion("SELF").unwrap();
		}
		assert!(matches!(macros.enter_expansion("SELF"), Err(MacroError::RecursionLimit(_))));
	}
}
