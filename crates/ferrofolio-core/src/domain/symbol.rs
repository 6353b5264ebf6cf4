use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Default maximum ticker length.
pub const DEFAULT_MAX_SYMBOL_LEN: usize = 5;

/// Normalized market symbol/ticker.
///
/// Always 1..=max uppercase ASCII alphanumeric characters.
///
/// Deserialization and [`Symbol::parse`] apply [`DEFAULT_MAX_SYMBOL_LEN`].
/// A wider limit, such as `FolioConfig::max_symbol_len`, only applies to
/// input passed through the matching [`SymbolNormalizer`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol with the default maximum length.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        SymbolNormalizer::default().normalize(input)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Canonicalizes raw ticker input: trims, upper-cases and bounds the length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolNormalizer {
    max_len: usize,
}

impl Default for SymbolNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SYMBOL_LEN)
    }
}

impl SymbolNormalizer {
    pub const fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    pub const fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn normalize(&self, input: &str) -> Result<Symbol, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized = trimmed.to_ascii_uppercase();
        for (index, ch) in normalized.chars().enumerate() {
            if !ch.is_ascii_alphanumeric() {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        let len = normalized.len();
        if len > self.max_len {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: self.max_len,
            });
        }

        Ok(Symbol(normalized))
    }
}

/// Normalize a raw ticker with the default rules.
pub fn normalize_symbol(input: &str) -> Result<Symbol, ValidationError> {
    Symbol::parse(input)
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
