pub mod operand;
pub mod write_context;

pub use operand::classify_operands;
pub use write_context::{classify, Classification, Context as WriteContext};
