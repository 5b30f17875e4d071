//! CPU back-ends: plugins that encode one instruction at a time.

use flexstr::SharedStr;
use thiserror::Error;

use crate::common::MemoryAddress;
use crate::expression::{self, GenericNumberFormat, NoSymbols};

pub mod mc6809;
pub mod mos6502;
pub mod z80;

pub use mc6809::Mc6809;
pub use mos6502::Mos6502;
pub use z80::Z80;

/// Errors a CPU back-end can produce while encoding. The engine attaches the source location of
/// the offending atom when converting these into [`crate::AssemblyError`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[allow(missing_docs)]
pub enum EncodeError {
	#[error("unknown mnemonic `{0}`")]
	UnknownMnemonic(SharedStr),
	#[error("invalid addressing mode `{operand}` for `{mnemonic}`")]
	InvalidAddressingMode { mnemonic: SharedStr, operand: SharedStr },
	#[error("value {value} does not fit into {bits} bits")]
	OperandOutOfRange { value: MemoryAddress, bits: u8 },
	#[error("branch target out of range for `{mnemonic}` (distance {distance})")]
	BranchOutOfRange { mnemonic: SharedStr, distance: MemoryAddress },
	#[error("unknown register `{0}`")]
	UnknownRegister(SharedStr),
	#[error("`{mnemonic}` is not available on {variant}")]
	UnsupportedOnVariant { mnemonic: SharedStr, variant: &'static str },
}

/// The CPU selections the assembler accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CpuType {
	/// NMOS 6502.
	Mos6502,
	/// WDC/CMOS 65C02.
	Mos65C02,
	/// Rockwell 65C02 (adds BBR/BBS/RMB/SMB).
	Mos65C02Rockwell,
	/// WDC 65816.
	Mos65816,
	/// Motorola 6809.
	Mc6809,
	/// Zilog Z80.
	Z80,
	/// Game Boy SM83 core (Z80 subset).
	GameBoy,
}

impl CpuType {
	/// Parses a CPU name as written in configuration (`6502`, `65c02`, `65c02rock`, `65816`,
	/// `6809`, `z80`, `gameboy`).
	#[must_use]
	pub fn from_name(name: &str) -> Option<Self> {
		Some(match name.to_lowercase().as_str() {
			"6502" => Self::Mos6502,
			"65c02" => Self::Mos65C02,
			"65c02rock" | "65c02rockwell" => Self::Mos65C02Rockwell,
			"65816" => Self::Mos65816,
			"6809" => Self::Mc6809,
			"z80" => Self::Z80,
			"gameboy" | "gb" => Self::GameBoy,
			_ => return None,
		})
	}

	/// Instantiates the back-end for this CPU selection.
	#[must_use]
	pub fn backend(self) -> Box<dyn CpuBackend> {
		match self {
			Self::Mos6502 | Self::Mos65C02 | Self::Mos65C02Rockwell | Self::Mos65816 =>
				Box::new(Mos6502::new(self)),
			Self::Mc6809 => Box::new(Mc6809::new()),
			Self::Z80 | Self::GameBoy => Box::new(Z80::new(self == Self::GameBoy)),
		}
	}
}

/// The contract every CPU plugin implements.
///
/// `encode` receives the canonical upper-case mnemonic, the engine-resolved numeric operand (0
/// while symbols are still unresolved) and the raw operand text for addressing-mode detection. A
/// back-end must be deterministic: the same inputs yield the same bytes on every call.
pub trait CpuBackend {
	/// The CPU family name, for reporting and routing.
	fn family_name(&self) -> &'static str;

	/// The variant names this plugin accepts.
	fn supported_variants(&self) -> &'static [&'static str];

	/// Encodes one instruction.
	///
	/// # Errors
	/// See [`EncodeError`].
	fn encode(&self, mnemonic: &str, operand: u32, operand_text: &str) -> Result<Vec<u8>, EncodeError>;

	/// Whether this mnemonic's size depends on the current address, so the engine must call
	/// [`CpuBackend::encode_special`] with the address instead of [`CpuBackend::encode`].
	fn requires_special_encoding(&self, _mnemonic: &str) -> bool {
		false
	}

	/// Encodes an address-dependent instruction. The engine pre-resolves symbol references in
	/// the operand text to numeric literals before calling.
	///
	/// # Errors
	/// See [`EncodeError`].
	fn encode_special(
		&self,
		mnemonic: &str,
		_operand_text: &str,
		_current_address: MemoryAddress,
	) -> Result<Vec<u8>, EncodeError> {
		Err(EncodeError::UnknownMnemonic(SharedStr::from(mnemonic)))
	}

	/// Whether a word is a register or condition name of this CPU. The engine must not resolve
	/// such words as symbols when pre-processing operands.
	fn is_reserved_word(&self, _word: &str) -> bool {
		false
	}

	/// Sets the direct-page register (6809). Other CPUs ignore this.
	fn set_direct_page(&self, _page: u8) {}

	/// Upgrades to the next CPU variant in the family (Merlin `XC`: 6502 → 65C02 → 65816).
	/// CPUs without variant laddering ignore this.
	fn upgrade_variant(&self) {}

	/// Sets 65816 immediate widths (Merlin `MX`): `long_m` widens accumulator immediates to 16
	/// bits, `long_x` widens index immediates. Other CPUs ignore this.
	fn set_immediate_widths(&self, _long_m: bool, _long_x: bool) {}
}

/// Splits operand text at top-level commas, respecting parentheses, brackets and quoted
/// characters. Angle-bracketed macro arguments are handled by the front-ends, not here.
#[must_use]
pub fn split_operands(text: &str) -> Vec<String> {
	let mut parts = Vec::new();
	let mut current = String::new();
	let mut depth = 0_u32;
	let mut quote: Option<char> = None;
	for character in text.chars() {
		match character {
			_ if quote.is_some() => {
				if Some(character) == quote {
					quote = None;
				}
				current.push(character);
			},
			'\'' | '"' => {
				quote = Some(character);
				current.push(character);
			},
			'(' | '[' => {
				depth += 1;
				current.push(character);
			},
			')' | ']' => {
				depth = depth.saturating_sub(1);
				current.push(character);
			},
			',' if depth == 0 => {
				parts.push(current.trim().to_owned());
				current = String::new();
			},
			_ => current.push(character),
		}
	}
	if !current.trim().is_empty() || !parts.is_empty() {
		parts.push(current.trim().to_owned());
	}
	parts
}

/// Parses a numeric operand token the engine has already pre-resolved (plain numbers, `$` hex,
/// simple arithmetic). Returns [`None`] when the token still contains something symbolic.
#[must_use]
pub fn parse_resolved_number(token: &str) -> Option<MemoryAddress> {
	expression::parse(token, &GenericNumberFormat).ok()?.evaluate(&NoSymbols).ok()
}

#[cfg(test)]
mod test;
