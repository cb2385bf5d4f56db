pub mod bitvec;
pub mod diagnostic;
pub mod error;

pub use bitvec::BitRange;
pub use diagnostic::{Diagnostic, DiagnosticEngine, Severity};
