//! Per-routine analysis context
//!
//! A [`FlowContext`] outlives the individual block visits of a routine. It
//! owns the routine's [`TypeRefContext`] and accumulates everything the
//! walkers learn: expression masks, the result mask, effect flags, bound call
//! targets and diagnostics. All accumulators only grow during a run.

use crate::bound::{ExprId, RoutineBody, RoutineKind, VariableKind};
use crate::flow::FlowState;
use crate::symbols::{RoutineId, RoutineSymbol};
use crate::types::{ContextId, TypeRefContext, TypeRefMask};
use fnv::FnvHashSet;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use smallvec::SmallVec;

/// Routine-level facts the code generator needs besides types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RoutineEffects {
    /// Locals may be read or written by name (`eval`, `extract`, `$$name`, ...)
    pub uses_dynamic_locals: bool,
    /// `static::` or `new static` appear in the body
    pub uses_late_static_binding: bool,
    pub is_generator: bool,
}

/// Outcome of binding one call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CallTarget {
    Resolved(RoutineId),
    /// Several candidates remain; the call is typed with all of them
    Ambiguous(SmallVec<[RoutineId; 2]>),
    /// Resolved at run time
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticKind {
    /// A value that is not a variable, item or property was passed to a
    /// by-reference parameter
    ByRefArgumentNotLValue { callee: RoutineId, parameter: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Diagnostic {
    pub expr: ExprId,
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone)]
pub struct FlowContext {
    routine: RoutineId,
    kind: RoutineKind,
    pub(crate) types: TypeRefContext,
    return_mask: TypeRefMask,
    effects: RoutineEffects,
    expr_masks: Vec<TypeRefMask>,
    maybe_uninitialized: FnvHashSet<ExprId>,
    call_targets: IndexMap<ExprId, CallTarget>,
    diagnostics: IndexSet<Diagnostic>,
}

impl FlowContext {
    pub fn new(body: &RoutineBody, types: TypeRefContext) -> Self {
        Self {
            routine: body.routine,
            kind: body.kind,
            types,
            return_mask: TypeRefMask::EMPTY,
            effects: RoutineEffects::default(),
            expr_masks: vec![TypeRefMask::EMPTY; body.exprs.len()],
            maybe_uninitialized: FnvHashSet::default(),
            call_targets: IndexMap::new(),
            diagnostics: IndexSet::new(),
        }
    }

    pub fn routine(&self) -> RoutineId {
        self.routine
    }

    pub fn kind(&self) -> RoutineKind {
        self.kind
    }

    pub fn context_id(&self) -> ContextId {
        self.types.id()
    }

    pub fn types(&self) -> &TypeRefContext {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRefContext {
        &mut self.types
    }

    /// State at the routine's entry: parameters, `$this` and captured
    /// variables are bound; locals are unassigned
    pub fn initial_state(&mut self, body: &RoutineBody, symbol: &RoutineSymbol) -> FlowState {
        let mut state = FlowState::new(self.context_id(), body.variables.len());
        for (handle, variable) in body.variables.iter() {
            match variable.kind {
                VariableKind::Local => {}
                VariableKind::Parameter => {
                    let param = symbol.params.iter().find(|p| p.name == variable.name);
                    match param {
                        Some(param) if param.by_ref => state.mark_local_by_ref(handle),
                        Some(param) => {
                            let mut mask = match &param.hint {
                                Some(hint) => self.types.type_hint_mask(hint),
                                None => TypeRefMask::ANY,
                            };
                            if param.default_null {
                                mask |= self.types.get_null_type_mask();
                            }
                            if param.variadic {
                                mask = self.types.get_array_type_mask(mask);
                            }
                            state.set_local_type(handle, mask);
                        }
                        None => state.set_local_type(handle, TypeRefMask::ANY),
                    }
                }
                VariableKind::This => {
                    let mask = match self.types.self_class().cloned() {
                        Some(class) => self.types.get_class_type_mask(&class, true),
                        None => TypeRefMask::ANY,
                    };
                    state.set_local_type(handle, mask);
                }
                VariableKind::Captured { by_ref: true } => state.mark_local_by_ref(handle),
                VariableKind::Captured { by_ref: false } => state.set_local_type(handle, TypeRefMask::ANY),
            }
        }
        state
    }

    pub fn record_expr(&mut self, expr: ExprId, mask: TypeRefMask) {
        if let Some(slot) = self.expr_masks.get_mut(expr.index()) {
            *slot |= mask;
        }
    }

    pub fn expr_mask(&self, expr: ExprId) -> TypeRefMask {
        self.expr_masks
            .get(expr.index())
            .copied()
            .unwrap_or(TypeRefMask::EMPTY)
    }

    pub fn expr_masks(&self) -> &[TypeRefMask] {
        &self.expr_masks
    }

    pub fn mark_maybe_uninitialized(&mut self, expr: ExprId) {
        self.maybe_uninitialized.insert(expr);
    }

    pub fn is_maybe_uninitialized(&self, expr: ExprId) -> bool {
        self.maybe_uninitialized.contains(&expr)
    }

    pub fn add_return(&mut self, mask: TypeRefMask) {
        self.return_mask |= mask.with_ref(false);
    }

    pub fn return_mask(&self) -> TypeRefMask {
        self.return_mask
    }

    pub fn effects(&self) -> RoutineEffects {
        self.effects
    }

    pub fn set_uses_dynamic_locals(&mut self) {
        self.effects.uses_dynamic_locals = true;
    }

    pub fn set_uses_late_static_binding(&mut self) {
        self.effects.uses_late_static_binding = true;
    }

    pub fn set_is_generator(&mut self) {
        self.effects.is_generator = true;
    }

    pub fn set_call_target(&mut self, expr: ExprId, target: CallTarget) {
        self.call_targets.insert(expr, target);
    }

    pub fn call_target(&self, expr: ExprId) -> Option<&CallTarget> {
        self.call_targets.get(&expr)
    }

    pub fn report(&mut self, expr: ExprId, kind: DiagnosticKind) {
        self.diagnostics.insert(Diagnostic { expr, kind });
    }

    /// Result mask as seen by callers
    pub fn result_mask(&mut self) -> TypeRefMask {
        if self.effects.is_generator {
            let generator = crate::symbols::Name::new("Generator");
            return self.types.get_class_type_mask(&generator, false);
        }
        self.return_mask
    }

    pub(crate) fn into_parts(self) -> FlowParts {
        FlowParts {
            types: self.types,
            effects: self.effects,
            expr_masks: self.expr_masks,
            maybe_uninitialized: self.maybe_uninitialized,
            call_targets: self.call_targets,
            diagnostics: self.diagnostics.into_iter().collect(),
        }
    }
}

/// Accumulated results handed to the public result types
pub(crate) struct FlowParts {
    pub types: TypeRefContext,
    pub effects: RoutineEffects,
    pub expr_masks: Vec<TypeRefMask>,
    pub maybe_uninitialized: FnvHashSet<ExprId>,
    pub call_targets: IndexMap<ExprId, CallTarget>,
    pub diagnostics: Vec<Diagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bound::{BodyBuilder, Stmt};
    use crate::symbols::{Name, ParamSymbol, TypeHint};
    use crate::types::MAX_TYPE_REFS;

    fn context_for(body: &RoutineBody, class: Option<&str>) -> FlowContext {
        let types = TypeRefContext::new(ContextId(0), MAX_TYPE_REFS).with_self_class(class.map(Name::new));
        FlowContext::new(body, types)
    }

    #[test]
    fn test_initial_state_binds_parameters() {
        let mut b = BodyBuilder::new(RoutineId(0), RoutineKind::Method { is_static: false });
        let count = b.param("count");
        let out = b.param("out");
        let rest = b.param("rest");
        let this = b.this();
        let local = b.local("tmp");
        let body = b.build(&[Stmt::Return(None)]);

        let symbol = RoutineSymbol::method("run")
            .param(ParamSymbol::new("count").typed(TypeHint::Long).default_null())
            .param(ParamSymbol::new("out").by_ref())
            .param(ParamSymbol::new("rest").typed(TypeHint::String).variadic());
        let mut flow = context_for(&body, Some("Runner"));
        let state = flow.initial_state(&body, &symbol);
        let types = flow.types();

        assert_eq!(types.display(state.get_local_type(count)), "null|long");
        assert!(state.is_by_ref(out));
        assert_eq!(types.display(state.get_local_type(rest)), "string[]");
        assert_eq!(types.display(state.get_local_type(this)), "Runner");
        assert!(!state.is_local_set(local));
    }

    #[test]
    fn test_expr_masks_accumulate() {
        let mut b = BodyBuilder::new(RoutineId(0), RoutineKind::Function);
        let one = b.long(1);
        let body = b.build(&[Stmt::Return(Some(one))]);
        let mut flow = context_for(&body, None);
        let long = flow.types().get_long_type_mask();
        let string = flow.types().get_string_type_mask();

        flow.record_expr(one, long);
        flow.record_expr(one, string);
        assert_eq!(flow.expr_mask(one), long | string);
        assert!(flow.expr_mask(ExprId(42)).is_empty());
    }

    #[test]
    fn test_generator_result_is_generator_class() {
        let body = BodyBuilder::new(RoutineId(0), RoutineKind::Function).build(&[]);
        let mut flow = context_for(&body, None);
        flow.add_return(flow.types().get_null_type_mask());
        flow.set_is_generator();
        let result = flow.result_mask();
        assert_eq!(flow.types().display(result), "Generator");
    }

    #[test]
    fn test_diagnostics_are_deduplicated() {
        let body = BodyBuilder::new(RoutineId(0), RoutineKind::Function).build(&[]);
        let mut flow = context_for(&body, None);
        let kind = DiagnosticKind::ByRefArgumentNotLValue {
            callee: RoutineId(3),
            parameter: "out".to_string(),
        };
        flow.report(ExprId(0), kind.clone());
        flow.report(ExprId(0), kind);
        assert_eq!(flow.into_parts().diagnostics.len(), 1);
    }
}
