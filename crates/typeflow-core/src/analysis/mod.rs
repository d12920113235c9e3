//! Expression analysis of one basic block
//!
//! [`ExpressionAnalysis`] walks the statements and the terminating edge of a
//! block, starting from the block's entry state. It computes a mask for every
//! expression it visits, updates the flow state imperatively and hands the
//! resulting states to the driver, one per successor. Anything that must
//! survive the visit (expression masks, flags, call targets) goes to the
//! routine's [`FlowContext`].

mod calls;
mod conditions;
pub(crate) mod operators;
mod walker;

use crate::bound::{BlockId, BoundExpr, BoundStmt, Edge, ExprId, RoutineBody};
use crate::flow::{FlowContext, FlowState};
use crate::symbols::{Name, RoutineId, SymbolOracle};
use crate::types::{TypeRefMask, TypeSummary};
use crate::worklist::Worklist;
use indexmap::IndexMap;
use std::mem;
use tracing::trace;

/// How an expression is used by its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    /// Read that tolerates an unassigned variable (`isset`, `??`, `empty`)
    ReadQuiet,
    /// Store a value of the given mask
    Write(TypeRefMask),
    /// Bind a reference to the location
    ReadRef,
}

impl Access {
    fn is_read(self) -> bool {
        matches!(self, Access::Read | Access::ReadQuiet)
    }
}

/// Which outcome of a condition the current path assumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConditionBranch {
    Default,
    ToTrue,
    ToFalse,
}

impl ConditionBranch {
    fn flip(self) -> Self {
        match self {
            ConditionBranch::Default => ConditionBranch::Default,
            ConditionBranch::ToTrue => ConditionBranch::ToFalse,
            ConditionBranch::ToFalse => ConditionBranch::ToTrue,
        }
    }
}

/// What a block visit produced
#[derive(Debug)]
pub(crate) struct BlockOutcome {
    /// State flowing into each normal successor
    pub exits: Vec<(BlockId, FlowState)>,
    /// Join of every intermediate state, for the block's handlers
    pub handler_state: Option<FlowState>,
    /// A unit callee whose result may still change in this round
    pub pending_callee: Option<RoutineId>,
}

/// Everything a block visit reads or updates besides the flow state
pub(crate) struct AnalysisEnv<'a> {
    pub body: &'a RoutineBody,
    pub oracle: &'a dyn SymbolOracle,
    pub flow: &'a mut FlowContext,
    /// Published results of the routines in the unit
    pub published: &'a IndexMap<RoutineId, TypeSummary>,
    pub worklist: &'a mut Worklist,
}

pub(crate) struct ExpressionAnalysis<'a> {
    body: &'a RoutineBody,
    oracle: &'a dyn SymbolOracle,
    flow: &'a mut FlowContext,
    published: &'a IndexMap<RoutineId, TypeSummary>,
    worklist: &'a mut Worklist,
    block: BlockId,
    state: FlowState,
    tracks_handlers: bool,
    handler_state: Option<FlowState>,
    pending_callee: Option<RoutineId>,
}

impl<'a> ExpressionAnalysis<'a> {
    pub fn new(env: AnalysisEnv<'a>, block: BlockId, entry: FlowState) -> Self {
        Self {
            body: env.body,
            oracle: env.oracle,
            flow: env.flow,
            published: env.published,
            worklist: env.worklist,
            block,
            state: entry,
            tracks_handlers: false,
            handler_state: None,
            pending_callee: None,
        }
    }

    /// Visit the block's statements and edge
    pub fn analyze_block(mut self) -> BlockOutcome {
        let body = self.body;
        let block = body.block(self.block);
        trace!(routine = ?self.flow.routine(), block = ?self.block, "analyzing block");

        self.tracks_handlers = !block.handlers.is_empty();
        self.feed_handlers();
        for statement in &block.statements {
            self.visit_statement(statement);
            self.feed_handlers();
        }
        let exits = self.visit_edge(&block.edge);

        BlockOutcome {
            exits,
            handler_state: self.handler_state,
            pending_callee: self.pending_callee,
        }
    }

    fn feed_handlers(&mut self) {
        if !self.tracks_handlers {
            return;
        }
        let merged = match self.handler_state.take() {
            Some(mut state) => {
                state.merge_with(&self.state);
                state
            }
            None => self.state.clone(),
        };
        self.handler_state = Some(merged);
    }

    fn self_class(&self) -> Option<Name> {
        self.flow.types().self_class().cloned()
    }

    fn expr(&self, id: ExprId) -> &'a BoundExpr {
        let body = self.body;
        &body.exprs[id]
    }

    fn visit_statement(&mut self, statement: &BoundStmt) {
        match statement {
            BoundStmt::Expr(expr) => {
                self.visit(*expr, Access::Read);
            }
            BoundStmt::Echo(exprs) => {
                for expr in exprs {
                    self.visit(*expr, Access::Read);
                }
            }
            BoundStmt::Unset(exprs) => {
                for expr in exprs {
                    self.visit_unset(*expr);
                }
            }
            BoundStmt::Global(variables) => {
                for variable in variables {
                    self.state.mark_local_by_ref(*variable);
                }
            }
            BoundStmt::Static(variables) => {
                for variable in variables {
                    if let Some(initializer) = variable.initializer {
                        self.visit(initializer, Access::Read);
                    }
                    self.state.mark_local_by_ref(variable.variable);
                }
            }
            BoundStmt::Catch { variable, types } => {
                let Some(variable) = variable else {
                    return;
                };
                let context = self.flow.types_mut();
                let mut mask = TypeRefMask::EMPTY;
                for class in types {
                    mask |= context.get_class_type_mask(class, true);
                }
                if mask.is_empty() {
                    mask = context.get_class_type_mask(&Name::new("Throwable"), true);
                }
                self.state.set_local_type(*variable, mask);
            }
        }
    }

    fn visit_unset(&mut self, expr: ExprId) {
        match self.expr(expr) {
            BoundExpr::Variable(variable) => {
                self.state.set_var_uninitialized(*variable);
                let null = self.flow.types().get_null_type_mask();
                self.flow.record_expr(expr, null);
            }
            BoundExpr::ItemAccess { array, index } => {
                if let Some(index) = index {
                    self.visit(*index, Access::Read);
                }
                self.visit(*array, Access::ReadQuiet);
            }
            _ => {
                self.visit(expr, Access::ReadQuiet);
            }
        }
    }

    fn visit_edge(&mut self, edge: &Edge) -> Vec<(BlockId, FlowState)> {
        let mut exits = Vec::new();
        match edge {
            Edge::Simple { target } | Edge::Leave { target } => {
                exits.push((*target, self.state.clone()));
            }
            Edge::Conditional {
                condition,
                if_true,
                if_false,
            } => {
                let before = self.state.clone();
                self.visit_condition(*condition, ConditionBranch::ToTrue);
                let true_state = mem::replace(&mut self.state, before);
                self.feed_handlers();
                self.visit_condition(*condition, ConditionBranch::ToFalse);
                exits.push((*if_true, true_state));
                exits.push((*if_false, self.state.clone()));
            }
            Edge::Switch { value, arms, end } => {
                self.visit(*value, Access::Read);
                for label in arms.iter().filter_map(|arm| arm.label) {
                    self.visit(label, Access::Read);
                }
                for arm in arms {
                    exits.push((arm.body, self.state.clone()));
                }
                if !arms.iter().any(|arm| arm.label.is_none()) {
                    exits.push((*end, self.state.clone()));
                }
            }
            Edge::TryCatchFinally { body, .. } => {
                exits.push((*body, self.state.clone()));
            }
            Edge::ForeachEnumeree {
                enumeree,
                by_ref,
                move_next,
            } => {
                let access = if *by_ref && self.expr(*enumeree).is_lvalue() {
                    Access::ReadRef
                } else {
                    Access::Read
                };
                self.visit(*enumeree, access);
                exits.push((*move_next, self.state.clone()));
            }
            Edge::ForeachMoveNext {
                enumeree,
                key,
                value,
                by_ref,
                body,
                end,
            } => {
                exits.push((*end, self.state.clone()));
                let collection = self.flow.expr_mask(*enumeree);
                let element = self.flow.types().get_array_element_mask(collection);
                if let Some(key) = key {
                    let types = self.flow.types();
                    let key_mask = types.get_long_type_mask() | types.get_string_type_mask();
                    self.visit(*key, Access::Write(key_mask));
                }
                if *by_ref {
                    self.visit(*value, Access::ReadRef);
                } else {
                    self.visit(*value, Access::Write(element));
                }
                exits.push((*body, self.state.clone()));
            }
            Edge::Return { value } => {
                let mask = match value {
                    Some(value) => self.visit(*value, Access::Read),
                    None => self.flow.types().get_null_type_mask().with_void(true),
                };
                self.flow.add_return(mask);
            }
            Edge::Throw { value } => {
                self.visit(*value, Access::Read);
            }
            Edge::Exit { value } => {
                if let Some(value) = value {
                    self.visit(*value, Access::Read);
                }
            }
        }
        self.feed_handlers();
        exits
    }
}
