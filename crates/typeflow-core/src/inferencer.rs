//! Interprocedural fixpoint driver
//!
//! [`FlowTypeInferencer`] analyzes every routine body of a compilation unit
//! together. Blocks are visited from a shared worklist; the state leaving a
//! block is merged into the entry state of each successor, which is queued
//! again whenever its entry state grows. At the end of every round each
//! routine publishes its result mask, and callers that consumed an older
//! result are queued again. The run ends when a round changes nothing.
//!
//! # Example
//! ```ignore
//! use typeflow_core::prelude::*;
//!
//! let mut table = SymbolTable::new();
//! let id = table.declare_function(RoutineSymbol::function("answer"));
//! let mut b = BodyBuilder::new(id, RoutineKind::Function);
//! let value = b.long(42);
//! let body = b.build(&[Stmt::Return(Some(value))]);
//!
//! let results = FlowTypeInferencer::new().infer_unit(&[body], &table)?;
//! assert_eq!(results.routine(id).unwrap().result_display(), "long");
//! ```

use crate::analysis::{AnalysisEnv, ExpressionAnalysis};
use crate::bound::{BlockId, ExprId, RoutineBody, VariableHandle};
use crate::error::{AnalysisError, Result};
use crate::flow::{CallTarget, Diagnostic, FlowContext, FlowState, RoutineEffects};
use crate::options::AnalysisOptions;
use crate::symbols::{RoutineId, RoutineSymbol, SymbolOracle};
use crate::types::{ContextId, TypeRefContext, TypeRefMask, TypeSummary};
use crate::worklist::Worklist;
use anyhow::Context as _;
use fnv::{FnvHashMap, FnvHashSet};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Flow-sensitive type inference over a compilation unit
#[derive(Debug, Clone, Default)]
pub struct FlowTypeInferencer {
    options: AnalysisOptions,
    cancellation: Option<Arc<AtomicBool>>,
}

/// Analysis state of one routine during a run
struct RoutineRun<'b> {
    body: &'b RoutineBody,
    flow: FlowContext,
    entry_states: Vec<Option<FlowState>>,
    visits: Vec<usize>,
    /// Deferred blocks that must propagate on their next visit
    must_complete: FnvHashSet<BlockId>,
}

impl RoutineRun<'_> {
    /// Merge `state` into the entry of `target`; true when it grew
    fn merge_entry(&mut self, target: BlockId, state: &FlowState) -> bool {
        let slot = &mut self.entry_states[target.index()];
        if let Some(existing) = slot.as_mut() {
            existing.merge_with(state)
        } else {
            *slot = Some(state.clone());
            true
        }
    }
}

impl FlowTypeInferencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: AnalysisOptions) -> Self {
        Self {
            options,
            cancellation: None,
        }
    }

    /// Stop the run at the next round boundary once `flag` is set
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(flag);
        self
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Infer types for a single body; calls into other routines use their
    /// declared signatures only
    pub fn infer_routine(&self, body: &RoutineBody, oracle: &dyn SymbolOracle) -> Result<InferredRoutine> {
        let mut results = self.infer_unit(std::slice::from_ref(body), oracle)?;
        results
            .routines
            .shift_remove(&body.routine)
            .ok_or(AnalysisError::UnknownRoutine(body.routine))
    }

    /// Infer types for every body of a compilation unit
    pub fn infer_unit(&self, bodies: &[RoutineBody], oracle: &dyn SymbolOracle) -> Result<InferenceResults> {
        let symbols = validate_unit(bodies, oracle)?;
        debug!(routines = bodies.len(), "starting type inference");

        let mut runs: Vec<RoutineRun<'_>> = Vec::with_capacity(bodies.len());
        let mut index: FnvHashMap<RoutineId, usize> = FnvHashMap::default();
        let mut published: IndexMap<RoutineId, TypeSummary> = IndexMap::new();
        let mut worklist = Worklist::new();

        for (position, (body, symbol)) in bodies.iter().zip(&symbols).enumerate() {
            let types = TypeRefContext::new(ContextId(position as u32), self.options.type_ref_cap)
                .with_self_class(symbol.class.clone());
            let mut flow = FlowContext::new(body, types);
            let mut entry_states = vec![None; body.cfg.len()];
            entry_states[body.cfg.entry.index()] = Some(flow.initial_state(body, symbol));

            index.insert(body.routine, runs.len());
            published.insert(body.routine, TypeSummary::default());
            worklist.enqueue(body.routine, body.cfg.entry);
            runs.push(RoutineRun {
                body,
                flow,
                entry_states,
                visits: vec![0; body.cfg.len()],
                must_complete: FnvHashSet::default(),
            });
        }

        let mut iterations = 0;
        let mut rounds = 0;
        let mut converged = true;

        'rounds: loop {
            if self.is_cancelled() {
                warn!(rounds, "type inference cancelled");
                return Err(AnalysisError::Cancelled { rounds });
            }
            rounds += 1;
            debug!(round = rounds, queued = worklist.len(), "fixpoint round");

            while let Some((routine, block)) = worklist.dequeue() {
                if iterations >= self.options.max_iterations {
                    warn!(iterations, "iteration limit reached, results may be incomplete");
                    converged = false;
                    break 'rounds;
                }
                let Some(&slot) = index.get(&routine) else {
                    continue;
                };
                let run = &mut runs[slot];
                let Some(entry) = run.entry_states[block.index()].clone() else {
                    continue;
                };
                iterations += 1;
                run.visits[block.index()] += 1;

                let env = AnalysisEnv {
                    body: run.body,
                    oracle,
                    flow: &mut run.flow,
                    published: &published,
                    worklist: &mut worklist,
                };
                let outcome = ExpressionAnalysis::new(env, block, entry).analyze_block();

                let must_complete = run.must_complete.remove(&block);
                if let Some(callee) = outcome.pending_callee {
                    if self.options.defer_on_pending_callee && !must_complete {
                        trace!(?routine, ?block, ?callee, "deferring block on unstable callee");
                        worklist.defer(callee, (routine, block));
                        continue;
                    }
                }

                for (target, state) in &outcome.exits {
                    if run.merge_entry(*target, state) {
                        worklist.enqueue(routine, *target);
                    }
                }
                if let Some(state) = &outcome.handler_state {
                    let body = run.body;
                    for handler in &body.block(block).handlers {
                        if run.merge_entry(*handler, state) {
                            worklist.enqueue(routine, *handler);
                        }
                    }
                }
            }

            let mut queued = false;
            for run in &mut runs {
                let routine = run.body.routine;
                let mask = run.flow.result_mask();
                let summary = run.flow.types().export(mask);
                if published.get(&routine) == Some(&summary) {
                    continue;
                }
                debug!(?routine, result = %run.flow.types().display(mask), "published routine result");
                published.insert(routine, summary);
                let waiters: Vec<_> = worklist.waiters(routine).collect();
                for (caller, block) in waiters {
                    queued |= worklist.enqueue(caller, block);
                }
            }
            for routine in published.keys() {
                for (caller, block) in worklist.take_deferred(*routine) {
                    if let Some(&slot) = index.get(&caller) {
                        runs[slot].must_complete.insert(block);
                    }
                    queued |= worklist.enqueue(caller, block);
                }
            }
            if !queued && worklist.is_empty() {
                break;
            }
        }

        debug!(iterations, rounds, converged, "type inference finished");
        let routines = runs
            .into_iter()
            .map(|run| {
                let routine = InferredRoutine::from_run(run);
                (routine.routine, routine)
            })
            .collect();
        Ok(InferenceResults {
            routines,
            iterations,
            rounds,
            converged,
        })
    }
}

/// Check the unit up front and look up the symbol of every body
fn validate_unit<'o>(bodies: &[RoutineBody], oracle: &'o dyn SymbolOracle) -> Result<Vec<&'o RoutineSymbol>> {
    let mut seen: FnvHashSet<RoutineId> = FnvHashSet::default();
    let mut symbols = Vec::with_capacity(bodies.len());
    for body in bodies {
        if !seen.insert(body.routine) {
            return Err(AnalysisError::DuplicateRoutine(body.routine));
        }
        let symbol = oracle
            .routine(body.routine)
            .ok_or(AnalysisError::UnknownRoutine(body.routine))?;
        body.validate()?;
        symbols.push(symbol);
    }
    Ok(symbols)
}

/// Everything inferred for one routine
#[derive(Debug, Clone)]
pub struct InferredRoutine {
    pub routine: RoutineId,
    types: TypeRefContext,
    result: TypeRefMask,
    effects: RoutineEffects,
    expr_masks: Vec<TypeRefMask>,
    maybe_uninitialized: FnvHashSet<ExprId>,
    call_targets: IndexMap<ExprId, CallTarget>,
    entry_states: Vec<Option<FlowState>>,
    block_visits: Vec<usize>,
    diagnostics: Vec<Diagnostic>,
}

impl InferredRoutine {
    fn from_run(mut run: RoutineRun<'_>) -> Self {
        let result = run.flow.result_mask();
        let parts = run.flow.into_parts();
        Self {
            routine: run.body.routine,
            types: parts.types,
            result,
            effects: parts.effects,
            expr_masks: parts.expr_masks,
            maybe_uninitialized: parts.maybe_uninitialized,
            call_targets: parts.call_targets,
            entry_states: run.entry_states,
            block_visits: run.visits,
            diagnostics: parts.diagnostics,
        }
    }

    /// The routine's type universe; every mask below belongs to it
    pub fn types(&self) -> &TypeRefContext {
        &self.types
    }

    pub fn display(&self, mask: TypeRefMask) -> String {
        self.types.display(mask)
    }

    /// Mask of the values the routine returns (`Generator` for generators)
    pub fn result_mask(&self) -> TypeRefMask {
        self.result
    }

    pub fn result_display(&self) -> String {
        self.types.display(self.result)
    }

    /// Context-free form of the result mask
    pub fn result_summary(&self) -> TypeSummary {
        self.types.export(self.result)
    }

    pub fn effects(&self) -> RoutineEffects {
        self.effects
    }

    /// Union of every value the expression produced; empty if never reached
    pub fn expr_mask(&self, expr: ExprId) -> TypeRefMask {
        self.expr_masks.get(expr.index()).copied().unwrap_or(TypeRefMask::EMPTY)
    }

    pub fn expr_display(&self, expr: ExprId) -> String {
        self.types.display(self.expr_mask(expr))
    }

    /// The variable read at `expr` may not have been assigned
    pub fn is_maybe_uninitialized(&self, expr: ExprId) -> bool {
        self.maybe_uninitialized.contains(&expr)
    }

    pub fn call_target(&self, expr: ExprId) -> Option<&CallTarget> {
        self.call_targets.get(&expr)
    }

    pub fn call_targets(&self) -> impl Iterator<Item = (ExprId, &CallTarget)> {
        self.call_targets.iter().map(|(expr, target)| (*expr, target))
    }

    /// State on entry to `block`; `None` if the block was never reached
    pub fn entry_state(&self, block: BlockId) -> Option<&FlowState> {
        self.entry_states.get(block.index()).and_then(Option::as_ref)
    }

    pub fn variable_mask(&self, block: BlockId, variable: VariableHandle) -> Option<TypeRefMask> {
        self.entry_state(block)
            .filter(|state| variable.index() < state.len())
            .map(|state| state.get_local_type(variable))
    }

    /// How often `block` was analyzed
    pub fn block_visits(&self, block: BlockId) -> usize {
        self.block_visits.get(block.index()).copied().unwrap_or(0)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn report(&self) -> RoutineReport {
        RoutineReport {
            routine: self.routine,
            result: self.result_display(),
            summary: self.result_summary(),
            effects: self.effects,
            diagnostics: self.diagnostics.clone(),
            block_visits: self.block_visits.clone(),
            type_refs: self.types.len(),
            overflowed: self.types.has_overflowed(),
        }
    }
}

/// Serializable digest of an [`InferredRoutine`]
#[derive(Debug, Clone, Serialize)]
pub struct RoutineReport {
    pub routine: RoutineId,
    pub result: String,
    pub summary: TypeSummary,
    pub effects: RoutineEffects,
    pub diagnostics: Vec<Diagnostic>,
    pub block_visits: Vec<usize>,
    pub type_refs: usize,
    pub overflowed: bool,
}

/// Outcome of [`FlowTypeInferencer::infer_unit`]
#[derive(Debug, Clone)]
pub struct InferenceResults {
    pub routines: IndexMap<RoutineId, InferredRoutine>,
    /// Block visits across the unit
    pub iterations: usize,
    pub rounds: usize,
    /// False when the iteration limit stopped the run
    pub converged: bool,
}

#[derive(Serialize)]
struct UnitReport {
    iterations: usize,
    rounds: usize,
    converged: bool,
    routines: Vec<RoutineReport>,
}

impl InferenceResults {
    pub fn routine(&self, id: RoutineId) -> Option<&InferredRoutine> {
        self.routines.get(&id)
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InferredRoutine> {
        self.routines.values()
    }

    /// Entry state of a block, checked against the analyzed unit
    pub fn entry_state(&self, routine: RoutineId, block: BlockId) -> Result<Option<&FlowState>> {
        let inferred = self
            .routine(routine)
            .ok_or(AnalysisError::UnknownRoutine(routine))?;
        if block.index() >= inferred.entry_states.len() {
            return Err(AnalysisError::UnknownBlock { routine, block });
        }
        Ok(inferred.entry_state(block))
    }

    /// Pretty-printed JSON digest of the run
    pub fn to_json(&self) -> anyhow::Result<String> {
        let report = UnitReport {
            iterations: self.iterations,
            rounds: self.rounds,
            converged: self.converged,
            routines: self.iter().map(InferredRoutine::report).collect(),
        };
        serde_json::to_string_pretty(&report).context("Failed to serialize inference results")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bound::{BodyBuilder, RoutineKind, Stmt};
    use crate::symbols::SymbolTable;

    fn single(table: &mut SymbolTable, name: &str, build: impl FnOnce(&mut BodyBuilder) -> Vec<Stmt>) -> RoutineBody {
        let id = table.declare_function(RoutineSymbol::function(name));
        let mut b = BodyBuilder::new(id, RoutineKind::Function);
        let stmts = build(&mut b);
        b.build(&stmts)
    }

    #[test]
    fn test_infer_literal_return() {
        let mut table = SymbolTable::new();
        let body = single(&mut table, "answer", |b| {
            let value = b.long(42);
            vec![Stmt::Return(Some(value))]
        });
        let inferred = FlowTypeInferencer::new().infer_routine(&body, &table).unwrap();
        assert_eq!(inferred.result_display(), "long");
        assert_eq!(inferred.block_visits(BlockId::ENTRY), 1);
        assert!(inferred.diagnostics().is_empty());
    }

    #[test]
    fn test_rejects_duplicate_bodies() {
        let mut table = SymbolTable::new();
        let body = single(&mut table, "f", |_| vec![]);
        let err = FlowTypeInferencer::new()
            .infer_unit(&[body.clone(), body], &table)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::DuplicateRoutine(_)));
    }

    #[test]
    fn test_rejects_undeclared_routine() {
        let table = SymbolTable::new();
        let body = BodyBuilder::new(RoutineId(3), RoutineKind::Function).build(&[]);
        let err = FlowTypeInferencer::new().infer_unit(&[body], &table).unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownRoutine(RoutineId(3))));
    }

    #[test]
    fn test_cancellation_before_first_round() {
        let mut table = SymbolTable::new();
        let body = single(&mut table, "f", |_| vec![]);
        let flag = Arc::new(AtomicBool::new(true));
        let err = FlowTypeInferencer::new()
            .with_cancellation(flag)
            .infer_unit(&[body], &table)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Cancelled { rounds: 0 }));
    }

    #[test]
    fn test_iteration_limit_reports_non_convergence() {
        let mut table = SymbolTable::new();
        let body = single(&mut table, "spin", |b| {
            let x = b.local("x");
            let zero = b.long(0);
            let init = b.assign_var(x, zero);
            let read = b.var(x);
            let step = b.post_inc(read);
            let condition = b.bool(true);
            vec![
                Stmt::Expr(init),
                Stmt::While {
                    condition,
                    body: vec![Stmt::Expr(step)],
                },
            ]
        });
        let options = AnalysisOptions::new().with_max_iterations(2);
        let results = FlowTypeInferencer::with_options(options).infer_unit(&[body], &table).unwrap();
        assert!(!results.converged);
        assert_eq!(results.iterations, 2);
    }

    #[test]
    fn test_entry_state_lookup_errors() {
        let mut table = SymbolTable::new();
        let body = single(&mut table, "f", |_| vec![]);
        let id = body.routine;
        let results = FlowTypeInferencer::new().infer_unit(&[body], &table).unwrap();
        assert!(results.entry_state(id, BlockId::ENTRY).unwrap().is_some());
        assert!(matches!(
            results.entry_state(id, BlockId(40)),
            Err(AnalysisError::UnknownBlock { .. })
        ));
        assert!(matches!(
            results.entry_state(RoutineId(99), BlockId::ENTRY),
            Err(AnalysisError::UnknownRoutine(_))
        ));
    }

    #[test]
    fn test_json_report() {
        let mut table = SymbolTable::new();
        let body = single(&mut table, "f", |b| {
            let text = b.string("hi");
            vec![Stmt::Return(Some(text))]
        });
        let results = FlowTypeInferencer::new().infer_unit(&[body], &table).unwrap();
        let json = results.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["converged"], true);
        assert_eq!(value["routines"][0]["result"], "string");
    }
}
