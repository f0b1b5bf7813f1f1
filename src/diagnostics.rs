//! A per-run sink for the warnings and notes produced while parsing.
//!
//! Every parser and assembler takes a `&mut Diagnostics` so that a caller can see
//! which tiles degraded (missing axes, unknown container versions) and which
//! mosaics were dropped, without scraping the log. Every entry is also forwarded
//! to the [`log`] facade.
use std::fmt::Display;
use std::slice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiagnosticLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    /// What the message is about, usually a file path or a group identifier
    pub context: String,
    pub message: String,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}: {}", self.level, self.context, self.message)
    }
}

#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn<C: Display, M: Display>(&mut self, context: C, message: M) {
        let entry = Diagnostic {
            level: DiagnosticLevel::Warning,
            context: context.to_string(),
            message: message.to_string(),
        };
        log::warn!("{}: {}", entry.context, entry.message);
        self.entries.push(entry);
    }

    pub fn info<C: Display, M: Display>(&mut self, context: C, message: M) {
        let entry = Diagnostic {
            level: DiagnosticLevel::Info,
            context: context.to_string(),
            message: message.to_string(),
        };
        log::info!("{}: {}", entry.context, entry.message);
        self.entries.push(entry);
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    pub fn iter(&self) -> slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Absorb the entries of another sink, e.g. one used for a single tile
    pub fn merge(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
