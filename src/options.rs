//! Engine-construction configuration.

use std::path::PathBuf;

use crate::cpu::CpuType;
use crate::parser::Syntax;

/// Diagnostic coloring choice, passed through to the report renderer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ColorChoice {
	/// Color when the output is a terminal.
	#[default]
	Auto,
	/// Always color.
	Always,
	/// Never color.
	Never,
}

/// A `virtual=actual` path substitution, applied by SCMASM `.INB` before opening include files.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathMapping {
	/// The prefix as written in the source.
	pub virtual_prefix: String,
	/// The prefix to substitute on the local filesystem.
	pub actual_prefix:  String,
}

/// All configuration the assembler core takes at construction.
#[derive(Clone, Debug)]
pub struct AssemblerOptions {
	/// Target CPU.
	pub cpu:          CpuType,
	/// Source syntax front-end.
	pub syntax:       Syntax,
	/// Output artifact path, passed through to the byte-stream consumer.
	pub output:       Option<PathBuf>,
	/// Optional listing output path, passed through to the listing writer.
	pub list:         Option<PathBuf>,
	/// Optional symbol-table output path, passed through to the symbol writer.
	pub symbols:      Option<PathBuf>,
	/// Diagnostic coloring.
	pub color:        ColorChoice,
	/// Directories searched for include files, in order.
	pub include_path: Vec<PathBuf>,
	/// Path substitutions for SCMASM `.INB`.
	pub path_map:     Vec<PathMapping>,
}

impl Default for AssemblerOptions {
	fn default() -> Self {
		Self {
			cpu:          CpuType::Mos6502,
			syntax:       Syntax::Simple,
			output:       None,
			list:         None,
			symbols:      None,
			color:        ColorChoice::Auto,
			include_path: Vec::new(),
			path_map:     Vec::new(),
		}
	}
}

impl AssemblerOptions {
	/// Options for the given CPU and syntax, everything else default.
	#[must_use]
	pub fn for_target(cpu: CpuType, syntax: Syntax) -> Self {
		Self { cpu, syntax, ..Self::default() }
	}

	/// Applies the path map to an include-file name, returning the substituted path.
	#[must_use]
	pub fn map_path(&self, file: &str) -> String {
		for mapping in &self.path_map {
			if let Some(rest) = file.strip_prefix(mapping.virtual_prefix.as_str()) {
				return format!("{}{rest}", mapping.actual_prefix);
			}
		}
		file.to_owned()
	}
}
