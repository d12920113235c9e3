//! Type universe of a routine
//!
//! Masks are plain bitsets; their meaning lives in the [`TypeRefContext`]
//! that interned the type refs. Results leave a context only as
//! [`TypeSummary`] values.

pub mod context;
pub mod mask;

pub use context::{ContextId, TypeDesc, TypeRef, TypeRefContext, TypeSummary};
pub use mask::{TypeIndices, TypeRefMask, MAX_TYPE_REFS};
