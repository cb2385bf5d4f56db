pub mod action_param;
pub mod container;
pub mod container_action;
pub mod expr;
pub mod field_action;
pub mod table;

pub use action_param::{ActionParam, ParamKind, Source, Speciality};
pub use expr::{Action, ArgMode, BinOp, Expr, Stmt};
pub use container::{AllocSlice, Container, ContainerKind, FieldSlice, LiveAccess, LivePoint, LiveRange};
pub use container_action::{ActionDataDescriptor, ConstantDescriptor, ContainerAction, ContainerActionError, Variant};
pub use field_action::{Alignment, FieldAction, FieldActionError, Opcode, SrcSlot, TotalAlignment};
pub use table::{AttachedEntry, DepEdge, DepKind, Placed, PlacedArena, PlacedId, Resources, Table, TableId};
