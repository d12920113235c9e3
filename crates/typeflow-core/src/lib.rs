//! # Typeflow Core
//!
//! Flow-sensitive, interprocedural type inference for the ahead-of-time
//! compiler of a dynamically typed scripting language.
//!
//! The front end lowers every routine of a compilation unit into a
//! [`RoutineBody`](bound::RoutineBody): a variable table, an expression arena
//! and a control flow graph. [`FlowTypeInferencer`] then computes, for every
//! expression and every variable at every block entry, a sound
//! over-approximation of the types it may hold, and for every routine the
//! types it may return.
//!
//! ## Modules
//!
//! - **[`types`]** - type references and the bitmask lattice over them
//! - **[`bound`]** - bound bodies and the builder used by front ends and tests
//! - **[`flow`]** - per-block flow states and per-routine accumulated facts
//! - **[`symbols`]** - declared routines and classes, behind [`SymbolOracle`]
//! - **[`binder`]** - static overload resolution
//! - **[`worklist`]** - block queue and cross-routine dependencies
//! - **[`inferencer`]** - the fixpoint driver and its results
//!
//! ## Quick Start
//!
//! ```rust
//! use typeflow_core::prelude::*;
//!
//! let mut table = SymbolTable::new();
//! let id = table.declare_function(RoutineSymbol::function("pick").param(ParamSymbol::new("flag")));
//!
//! let mut b = BodyBuilder::new(id, RoutineKind::Function);
//! let flag = b.param("flag");
//! let x = b.local("x");
//! let condition = b.var(flag);
//! let one = b.long(1);
//! let text = b.string("one");
//! let to_long = b.assign_var(x, one);
//! let to_string = b.assign_var(x, text);
//! let result = b.var(x);
//! let body = b.build(&[
//!     Stmt::If {
//!         condition,
//!         then_body: vec![Stmt::Expr(to_long)],
//!         else_body: vec![Stmt::Expr(to_string)],
//!     },
//!     Stmt::Return(Some(result)),
//! ]);
//!
//! let results = FlowTypeInferencer::new().infer_unit(&[body], &table).unwrap();
//! assert_eq!(results.routine(id).unwrap().result_display(), "long|string");
//! ```

pub mod binder;
pub mod bound;
pub mod error;
pub mod flow;
pub mod inferencer;
pub mod options;
pub mod symbols;
pub mod types;
pub mod worklist;

mod analysis;

pub use error::{AnalysisError, Result};
pub use inferencer::{FlowTypeInferencer, InferenceResults, InferredRoutine, RoutineReport};
pub use options::AnalysisOptions;
pub use symbols::{SymbolOracle, SymbolTable};
pub use types::{TypeRefContext, TypeRefMask, TypeSummary};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::binder::{ArgumentInfo, Binding, ConversionCost};
    pub use crate::bound::{
        Argument, BinaryOp, BlockId, BodyBuilder, BoundExpr, CatchClause, ClassRef, ExprId, RoutineBody, RoutineKind,
        Stmt, SwitchCase, VariableHandle,
    };
    pub use crate::error::{AnalysisError, Result};
    pub use crate::flow::{CallTarget, Diagnostic, DiagnosticKind, FlowState, RoutineEffects};
    pub use crate::inferencer::{FlowTypeInferencer, InferenceResults, InferredRoutine};
    pub use crate::options::AnalysisOptions;
    pub use crate::symbols::{
        ClassSymbol, Name, ParamSymbol, RoutineId, RoutineSymbol, SymbolOracle, SymbolTable, TypeHint, Visibility,
    };
    pub use crate::types::{TypeRefContext, TypeRefMask, TypeSummary};
}
