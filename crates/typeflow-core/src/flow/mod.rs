//! Flow-sensitive state threaded through a routine

pub mod context;
pub mod state;

pub use context::{CallTarget, Diagnostic, DiagnosticKind, FlowContext, RoutineEffects};
pub use state::{FlowState, VarSlot};
