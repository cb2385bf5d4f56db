//! Structured diagnostics, generalizing the teacher compiler's
//! `Diagnostic`/`DiagnosticEngine` (`common::error`) from source spans to the
//! table/action locators this backend works with (MAU IR nodes carry no
//! source text of their own).

use std::fmt;

/// Where a diagnostic occurred: the table and, if applicable, the action
/// within it. Stands in for the teacher's `Span` (line/column in a source
/// file) since the MAU IR has no source text of its own.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Locator {
    pub table: Option<String>,
    pub action: Option<String>,
    pub container: Option<String>,
}

impl Locator {
    pub fn table(name: impl Into<String>) -> Self {
        Self { table: Some(name.into()), action: None, container: None }
    }

    pub fn action(mut self, name: impl Into<String>) -> Self {
        self.action = Some(name.into());
        self
    }

    pub fn container(mut self, name: impl Into<String>) -> Self {
        self.container = Some(name.into());
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.table, &self.action, &self.container) {
            (Some(t), Some(a), Some(c)) => write!(f, "{t}.{a}[{c}]"),
            (Some(t), Some(a), None) => write!(f, "{t}.{a}"),
            (Some(t), None, _) => write!(f, "{t}"),
            _ => write!(f, "<unknown>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub at: Locator,
    pub notes: Vec<(Locator, String)>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, at: Locator) -> Self {
        Self { severity: Severity::Error, message: message.into(), at, notes: Vec::new() }
    }

    pub fn warning(message: impl Into<String>, at: Locator) -> Self {
        Self { severity: Severity::Warning, message: message.into(), at, notes: Vec::new() }
    }

    pub fn with_note(mut self, at: Locator, message: impl Into<String>) -> Self {
        self.notes.push((at, message.into()));
        self
    }

    pub fn emit(&self) {
        let severity_str = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        eprintln!("{}: {}: {}", self.at, severity_str, self.message);
        for (note_at, note_msg) in &self.notes {
            eprintln!("{}: note: {}", note_at, note_msg);
        }
    }
}

/// Collects diagnostics during a compilation pipeline run, tracking the
/// fatal-error count that causes the outer driver to abort after the
/// current pass (per the error-handling design's propagation policy).
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
    error_count: u32,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self { diagnostics: Vec::new(), error_count: 0 }
    }

    pub fn emit(&mut self, diag: Diagnostic) {
        if diag.severity == Severity::Error {
            self.error_count += 1;
            tracing::error!(at = %diag.at, "{}", diag.message);
        } else {
            tracing::warn!(at = %diag.at, "{}", diag.message);
        }
        self.diagnostics.push(diag);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn print_all(&self) {
        for diag in &self.diagnostics {
            diag.emit();
        }
    }
}
