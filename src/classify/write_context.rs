//! Write-Context Classifier (specification §4.1, C2).
//!
//! For any position an expression occupies inside an action/gateway/parser
//! walk, decides whether it is read, written, or read-as-an-input-crossbar
//! index, using only the lexical context the caller is currently in — the
//! classifier never inspects expression identity, only the [`Context`]
//! frame it is called with.

/// The lexical position an expression occupies, matching each row of the
/// classification table in specification §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    AluFirstOperand,
    AluNonFirstOperand,
    StatefulAluOutputAssignment,
    ExternArgOut,
    ExternArgInOut,
    ParserMatchOrSelect,
    DeparserEmitSource,
    GatewayOrTableMatchKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Classification {
    pub is_write: bool,
    pub is_read: bool,
    pub is_ixbar_read: bool,
}

/// Classify a position per the table in specification §4.1.
pub fn classify(ctx: Context) -> Classification {
    match ctx {
        Context::AluFirstOperand => Classification { is_write: true, is_read: false, is_ixbar_read: false },
        Context::AluNonFirstOperand => Classification { is_write: false, is_read: true, is_ixbar_read: false },
        Context::StatefulAluOutputAssignment => {
            Classification { is_write: true, is_read: false, is_ixbar_read: false }
        }
        Context::ExternArgOut => Classification { is_write: true, is_read: false, is_ixbar_read: false },
        Context::ExternArgInOut => Classification { is_write: true, is_read: true, is_ixbar_read: false },
        Context::ParserMatchOrSelect => Classification { is_write: false, is_read: true, is_ixbar_read: false },
        Context::DeparserEmitSource => Classification { is_write: false, is_read: true, is_ixbar_read: false },
        Context::GatewayOrTableMatchKey => Classification { is_write: false, is_read: true, is_ixbar_read: true },
    }
}

/// A small context stack, for walks that need to track nested positions
/// (e.g. an extern call argument nested inside a gateway key expression).
/// Only the top frame determines the classification; deeper frames are
/// kept so a caller can report "written at X, read at Y" style diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ContextStack(Vec<Context>);

impl ContextStack {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, ctx: Context) {
        self.0.push(ctx);
    }

    pub fn pop(&mut self) -> Option<Context> {
        self.0.pop()
    }

    pub fn current(&self) -> Option<Classification> {
        self.0.last().copied().map(classify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alu_first_operand_is_write_only() {
        let c = classify(Context::AluFirstOperand);
        assert!(c.is_write && !c.is_read && !c.is_ixbar_read);
    }

    #[test]
    fn gateway_key_is_read_and_ixbar() {
        let c = classify(Context::GatewayOrTableMatchKey);
        assert!(!c.is_write && c.is_read && c.is_ixbar_read);
    }

    #[test]
    fn extern_inout_is_both() {
        let c = classify(Context::ExternArgInOut);
        assert!(c.is_write && c.is_read);
    }

    #[test]
    fn stack_tracks_nested_positions() {
        let mut stack = ContextStack::new();
        stack.push(Context::GatewayOrTableMatchKey);
        stack.push(Context::AluFirstOperand);
        assert_eq!(stack.current(), Some(classify(Context::AluFirstOperand)));
        stack.pop();
        assert_eq!(stack.current(), Some(classify(Context::GatewayOrTableMatchKey)));
    }
}
