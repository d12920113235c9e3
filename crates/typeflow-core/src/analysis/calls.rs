//! Call sites
//!
//! Candidates come from the symbol oracle, the binder picks among them and
//! the chosen binding decides how arguments are visited: by-reference
//! parameters write their hinted type back into the argument, unresolved
//! calls taint every lvalue argument as a reference. Results of routines in
//! the unit are read from their published summaries, which registers the
//! calling block as a dependent of the callee.

use super::conditions::TypeCheck;
use super::{Access, ExpressionAnalysis};
use crate::binder::{self, ArgumentInfo, Binding};
use crate::bound::{Argument, ClassRef, ExprId};
use crate::flow::{CallTarget, DiagnosticKind};
use crate::symbols::{Name, ParamSymbol, RoutineId, RoutineSymbol, TypeHint};
use crate::types::TypeRefMask;
use smallvec::SmallVec;

/// Functions that read or write the caller's locals by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalsAccess {
    Writes,
    Reads,
}

fn locals_access(name: &Name) -> Option<LocalsAccess> {
    match name.key() {
        "extract" | "parse_str" => Some(LocalsAccess::Writes),
        "compact" | "get_defined_vars" => Some(LocalsAccess::Reads),
        _ => None,
    }
}

impl<'a> ExpressionAnalysis<'a> {
    pub(crate) fn visit_function_call(&mut self, id: ExprId, name: &Name, args: &[Argument]) -> TypeRefMask {
        let oracle = self.oracle;
        let candidates = oracle.functions(name);
        let mask = if candidates.is_empty() {
            self.visit_intrinsic(id, name, args)
        } else {
            let infos = self.argument_infos(args);
            let binding = self.bind(candidates, &infos);
            self.apply_binding(id, binding, args)
        };

        match locals_access(name) {
            Some(LocalsAccess::Writes) => {
                self.state.set_all_unknown(true);
                self.flow.set_uses_dynamic_locals();
            }
            Some(LocalsAccess::Reads) => {
                self.state.set_all_unknown(false);
                self.flow.set_uses_dynamic_locals();
            }
            None => {}
        }
        mask
    }

    /// Undeclared functions the analysis knows the result of
    fn visit_intrinsic(&mut self, id: ExprId, name: &Name, args: &[Argument]) -> TypeRefMask {
        let types = self.flow.types_mut();
        let known = if TypeCheck::from_function(name).is_some() {
            Some(types.get_boolean_type_mask())
        } else {
            match name.key() {
                "extract" => Some(types.get_long_type_mask()),
                "parse_str" => Some(types.get_null_type_mask()),
                "compact" | "get_defined_vars" => Some(types.get_generic_array_mask()),
                _ => None,
            }
        };
        match known {
            Some(mask) => {
                for arg in args {
                    self.visit(arg.value, Access::Read);
                }
                self.flow.set_call_target(id, CallTarget::Dynamic);
                mask
            }
            None => self.visit_dynamic_call(id, args),
        }
    }

    /// Call whose target is only known at run time
    pub(crate) fn visit_dynamic_call(&mut self, id: ExprId, args: &[Argument]) -> TypeRefMask {
        self.argument_infos(args);
        self.apply_binding(id, Binding::Missing, args)
    }

    pub(crate) fn visit_method_call(
        &mut self,
        id: ExprId,
        receiver: ExprId,
        method: &str,
        args: &[Argument],
    ) -> TypeRefMask {
        let receiver_mask = self.visit(receiver, Access::Read);
        let classes = if receiver_mask.is_any() {
            Vec::new()
        } else {
            self.flow.types().get_object_types(receiver_mask)
        };
        let oracle = self.oracle;
        let per_class: Vec<SmallVec<[RoutineId; 2]>> =
            classes.iter().map(|class| oracle.methods(class, method)).collect();
        if per_class.is_empty() || per_class.iter().any(|candidates| candidates.is_empty()) {
            // unknown receiver or a class without the method (`__call`)
            return self.visit_dynamic_call(id, args);
        }

        let infos = self.argument_infos(args);
        let bindings: Vec<Binding> = per_class
            .iter()
            .map(|candidates| self.bind(candidates, &infos))
            .collect();
        let binding = combine(bindings);
        self.apply_binding(id, binding, args)
    }

    pub(crate) fn visit_static_call(
        &mut self,
        id: ExprId,
        class: &ClassRef,
        method: &str,
        args: &[Argument],
    ) -> TypeRefMask {
        let Some((class, _)) = self.resolve_class_ref(class) else {
            return self.visit_dynamic_call(id, args);
        };
        let candidates = self.oracle.methods(&class, method);
        if candidates.is_empty() {
            return self.visit_dynamic_call(id, args);
        }
        let infos = self.argument_infos(args);
        let binding = self.bind(&candidates, &infos);
        self.apply_binding(id, binding, args)
    }

    pub(crate) fn visit_new(&mut self, id: ExprId, class: &ClassRef, args: &[Argument]) -> TypeRefMask {
        let Some((class, late_bound)) = self.resolve_class_ref(class) else {
            self.visit_dynamic_call(id, args);
            return TypeRefMask::ANY;
        };
        let constructors = self.oracle.methods(&class, "__construct");
        if constructors.is_empty() {
            for arg in args {
                self.visit(arg.value, Access::Read);
            }
        } else {
            let infos = self.argument_infos(args);
            let binding = self.bind(&constructors, &infos);
            self.bind_arguments(id, binding, args);
        }
        self.flow.types_mut().get_class_type_mask(&class, late_bound)
    }

    /// Class named by a class reference, and whether it is late bound
    ///
    /// Dynamic class expressions are visited and yield `None`.
    pub(crate) fn resolve_class_ref(&mut self, class: &ClassRef) -> Option<(Name, bool)> {
        match class {
            ClassRef::Named(name) => Some((name.clone(), false)),
            ClassRef::SelfClass => self.self_class().map(|name| (name, false)),
            ClassRef::Parent => {
                let own = self.self_class()?;
                let base = self.oracle.class(&own)?.base.clone()?;
                Some((base, false))
            }
            ClassRef::Static => {
                self.flow.set_uses_late_static_binding();
                self.self_class().map(|name| (name, true))
            }
            ClassRef::Dynamic(expr) => {
                self.visit(*expr, Access::Read);
                None
            }
        }
    }

    /// Masks of the arguments; lvalues are peeked so a by-reference binding
    /// can still write them
    fn argument_infos(&mut self, args: &[Argument]) -> SmallVec<[ArgumentInfo; 4]> {
        args.iter()
            .map(|arg| {
                let mask = if self.defers_argument(arg) {
                    self.peek(arg.value)
                } else {
                    self.visit(arg.value, Access::Read)
                };
                ArgumentInfo {
                    mask,
                    unpack: arg.unpack,
                }
            })
            .collect()
    }

    /// Lvalue arguments are visited once the binding is known
    fn defers_argument(&self, arg: &Argument) -> bool {
        !arg.unpack && self.expr(arg.value).is_lvalue()
    }

    fn bind(&mut self, candidates: &[RoutineId], infos: &[ArgumentInfo]) -> Binding {
        let oracle = self.oracle;
        let symbols: Vec<&RoutineSymbol> = candidates.iter().filter_map(|id| oracle.routine(*id)).collect();
        let scope = self.self_class();
        binder::resolve(self.flow.types_mut(), oracle, &symbols, infos, scope.as_ref())
    }

    fn apply_binding(&mut self, id: ExprId, binding: Binding, args: &[Argument]) -> TypeRefMask {
        let oracle = self.oracle;
        match self.bind_arguments(id, binding, args) {
            Binding::Resolved(callee) => match oracle.routine(callee) {
                Some(symbol) => self.routine_result(id, symbol),
                None => TypeRefMask::ANY,
            },
            Binding::Ambiguous(callees) => {
                let mut mask = TypeRefMask::EMPTY;
                for symbol in callees.iter().filter_map(|c| oracle.routine(*c)) {
                    mask |= self.routine_result(id, symbol);
                }
                mask
            }
            Binding::Missing => TypeRefMask::ANY,
        }
    }

    /// Visit the arguments under `binding` and record the call target,
    /// without reading any callee result
    ///
    /// Returns the binding actually applied.
    fn bind_arguments(&mut self, id: ExprId, binding: Binding, args: &[Argument]) -> Binding {
        let oracle = self.oracle;
        match binding {
            Binding::Resolved(callee) => {
                let Some(symbol) = oracle.routine(callee) else {
                    return self.bind_arguments(id, Binding::Missing, args);
                };
                for (position, arg) in args.iter().enumerate() {
                    let param = symbol.param_for_argument(position);
                    match param {
                        Some(param) if param.by_ref => {
                            if self.defers_argument(arg) {
                                let mask = self.hint_mask(param.hint.as_ref());
                                self.visit(arg.value, Access::Write(mask));
                            } else {
                                self.report_not_lvalue(arg, callee, &param.name);
                            }
                        }
                        _ => {
                            if self.defers_argument(arg) {
                                self.visit(arg.value, Access::Read);
                            }
                        }
                    }
                }
                self.flow.set_call_target(id, CallTarget::Resolved(callee));
                Binding::Resolved(callee)
            }
            Binding::Ambiguous(callees) => {
                let symbols: Vec<&RoutineSymbol> = callees.iter().filter_map(|c| oracle.routine(*c)).collect();
                for (position, arg) in args.iter().enumerate() {
                    let by_ref: Vec<(RoutineId, &ParamSymbol)> = symbols
                        .iter()
                        .filter_map(|s| s.param_for_argument(position).map(|p| (s.id, p)))
                        .filter(|(_, p)| p.by_ref)
                        .collect();
                    if !self.defers_argument(arg) {
                        if !arg.unpack {
                            for (callee, param) in by_ref {
                                self.report_not_lvalue(arg, callee, &param.name);
                            }
                        }
                        continue;
                    }
                    if by_ref.is_empty() {
                        self.visit(arg.value, Access::Read);
                    } else {
                        let mut mask = TypeRefMask::EMPTY;
                        for (_, param) in by_ref {
                            mask |= self.hint_mask(param.hint.as_ref());
                        }
                        self.visit(arg.value, Access::Write(mask));
                    }
                }
                self.flow.set_call_target(id, CallTarget::Ambiguous(callees.clone()));
                Binding::Ambiguous(callees)
            }
            Binding::Missing => {
                for arg in args {
                    if self.defers_argument(arg) {
                        self.visit(arg.value, Access::ReadRef);
                    }
                }
                self.flow.set_call_target(id, CallTarget::Dynamic);
                Binding::Missing
            }
        }
    }

    fn report_not_lvalue(&mut self, arg: &Argument, callee: RoutineId, parameter: &str) {
        self.flow.report(
            arg.value,
            DiagnosticKind::ByRefArgumentNotLValue {
                callee,
                parameter: parameter.to_string(),
            },
        );
    }

    fn hint_mask(&mut self, hint: Option<&TypeHint>) -> TypeRefMask {
        match hint {
            Some(hint) => self.flow.types_mut().type_hint_mask(hint),
            None => TypeRefMask::ANY,
        }
    }

    /// Result of calling `symbol` as seen from this routine
    fn routine_result(&mut self, call: ExprId, symbol: &RoutineSymbol) -> TypeRefMask {
        if let Some(hint) = &symbol.return_hint {
            return self.flow.types_mut().type_hint_mask(hint);
        }
        let published = self.published;
        let Some(summary) = published.get(&symbol.id) else {
            return TypeRefMask::ANY;
        };
        let caller = (self.flow.routine(), self.block);
        let unstable = self.worklist.enqueue_routine(symbol.id, caller, call);
        if unstable && symbol.id != self.flow.routine() && self.pending_callee.is_none() {
            self.pending_callee = Some(symbol.id);
        }
        self.flow.types_mut().import(summary)
    }
}

/// Join the bindings of one call made on several receiver classes
fn combine(bindings: Vec<Binding>) -> Binding {
    let mut callees: SmallVec<[RoutineId; 2]> = SmallVec::new();
    for binding in bindings {
        match binding {
            Binding::Missing => return Binding::Missing,
            Binding::Resolved(callee) => {
                if !callees.contains(&callee) {
                    callees.push(callee);
                }
            }
            Binding::Ambiguous(ids) => {
                for callee in ids {
                    if !callees.contains(&callee) {
                        callees.push(callee);
                    }
                }
            }
        }
    }
    match callees.as_slice() {
        [] => Binding::Missing,
        [only] => Binding::Resolved(*only),
        _ => Binding::Ambiguous(callees),
    }
}
