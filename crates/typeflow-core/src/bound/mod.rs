//! Bound routine bodies consumed by the analysis
//!
//! A [`RoutineBody`] is what the front end hands over for one routine:
//! - the variable table, addressed by [`VariableHandle`]
//! - the expression arena, addressed by [`ExprId`]
//! - the control flow graph, addressed by [`BlockId`]
//!
//! Bodies are never mutated by the analysis. They are validated once, up
//! front, so the walkers can index without re-checking.

pub mod builder;
pub mod cfg;
pub mod expr;

pub use builder::{BodyBuilder, CatchClause, Stmt, SwitchCase};
pub use cfg::{BasicBlock, BlockId, ControlFlowGraph, Edge, SwitchArm};
pub use expr::{
    Argument, ArrayItem, BinaryOp, BoundExpr, BoundStmt, CastKind, ClassRef, ClosureUse, ExprArena, ExprId, Literal,
    LogicalOp, StaticVar, UnaryOp, VariableHandle,
};

use crate::error::{AnalysisError, Result};
use crate::symbols::RoutineId;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutineKind {
    /// Top-level script code; reads of unassigned variables see the global scope
    GlobalCode,
    Function,
    Method { is_static: bool },
    Closure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Local,
    Parameter,
    This,
    /// Imported through a closure's `use` clause
    Captured { by_ref: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub kind: VariableKind,
}

/// Names of the variables a routine can address statically
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    vars: Vec<Variable>,
    by_name: IndexMap<String, VariableHandle>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name`; an existing declaration is returned unchanged
    pub fn declare(&mut self, name: &str, kind: VariableKind) -> VariableHandle {
        if let Some(&handle) = self.by_name.get(name) {
            return handle;
        }
        let handle = VariableHandle(self.vars.len() as u32);
        self.vars.push(Variable {
            name: name.to_string(),
            kind,
        });
        self.by_name.insert(name.to_string(), handle);
        handle
    }

    pub fn lookup(&self, name: &str) -> Option<VariableHandle> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, handle: VariableHandle) -> Option<&Variable> {
        self.vars.get(handle.index())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VariableHandle, &Variable)> {
        self.vars
            .iter()
            .enumerate()
            .map(|(i, v)| (VariableHandle(i as u32), v))
    }
}

/// Everything the analysis needs to know about one routine's code
#[derive(Debug, Clone)]
pub struct RoutineBody {
    pub routine: RoutineId,
    pub kind: RoutineKind,
    pub variables: VariableTable,
    pub exprs: ExprArena,
    pub cfg: ControlFlowGraph,
}

impl RoutineBody {
    pub fn expr(&self, id: ExprId) -> &BoundExpr {
        &self.exprs[id]
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.cfg.blocks[id.index()]
    }

    /// Check that every block, expression and variable reference is in range.
    ///
    /// Sub-expressions must be allocated before their parent, which keeps the
    /// expression graph acyclic.
    pub fn validate(&self) -> Result<()> {
        let malformed = |what: String| AnalysisError::MalformedBody(format!("routine {:?}: {what}", self.routine));

        if self.cfg.is_empty() || self.cfg.entry.index() >= self.cfg.len() {
            return Err(malformed("missing entry block".to_string()));
        }
        let expr_in_range = |id: ExprId| id.index() < self.exprs.len();
        let var_in_range = |h: VariableHandle| h.index() < self.variables.len();

        for (id, expr) in self.exprs.iter() {
            if let Some(child) = expr.children().into_iter().find(|c| !expr_in_range(*c)) {
                return Err(malformed(format!("expression {id:?} refers to missing {child:?}")));
            }
            if let Some(child) = expr.children().into_iter().find(|c| *c >= id) {
                return Err(malformed(format!("expression {id:?} refers to {child:?}, which is not allocated before it")));
            }
            let variables: Vec<VariableHandle> = match expr {
                BoundExpr::Variable(h) => vec![*h],
                BoundExpr::Closure { uses, .. } => uses.iter().map(|u| u.variable).collect(),
                _ => Vec::new(),
            };
            if let Some(h) = variables.into_iter().find(|h| !var_in_range(*h)) {
                return Err(malformed(format!("expression {id:?} refers to missing {h:?}")));
            }
        }

        for (index, block) in self.cfg.blocks.iter().enumerate() {
            if block.id.index() != index {
                return Err(malformed(format!("block at position {index} is labelled {:?}", block.id)));
            }
            let blocks = block.edge.referenced_blocks();
            if let Some(target) = blocks.iter().chain(block.handlers.iter()).find(|b| b.index() >= self.cfg.len()) {
                return Err(malformed(format!("{:?} jumps to missing {target:?}", block.id)));
            }
            let exprs = block
                .statements
                .iter()
                .flat_map(|s| s.exprs())
                .chain(block.edge.exprs());
            for id in exprs {
                if !expr_in_range(id) {
                    return Err(malformed(format!("{:?} refers to missing {id:?}", block.id)));
                }
            }
            let vars = block.statements.iter().flat_map(|s| s.variables());
            for h in vars {
                if !var_in_range(h) {
                    return Err(malformed(format!("{:?} refers to missing {h:?}", block.id)));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_with(cfg: ControlFlowGraph, exprs: ExprArena) -> RoutineBody {
        RoutineBody {
            routine: RoutineId(0),
            kind: RoutineKind::Function,
            variables: VariableTable::new(),
            exprs,
            cfg,
        }
    }

    #[test]
    fn test_declare_is_idempotent() {
        let mut vars = VariableTable::new();
        let a = vars.declare("a", VariableKind::Local);
        let b = vars.declare("b", VariableKind::Parameter);
        assert_eq!(vars.declare("a", VariableKind::Parameter), a);
        assert_eq!(vars.lookup("b"), Some(b));
        assert_eq!(vars.get(a).map(|v| v.kind), Some(VariableKind::Local));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_validate_rejects_dangling_block() {
        let cfg = ControlFlowGraph::new(vec![BasicBlock::new(BlockId(0), Edge::Simple { target: BlockId(3) })]);
        let err = body_with(cfg, ExprArena::new()).validate().unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedBody(msg) if msg.contains("BlockId(3)")));
    }

    #[test]
    fn test_validate_rejects_dangling_expression() {
        let mut exprs = ExprArena::new();
        exprs.alloc(BoundExpr::Unary {
            op: UnaryOp::Not,
            operand: ExprId(9),
        });
        let cfg = ControlFlowGraph::new(vec![BasicBlock::new(BlockId(0), Edge::Return { value: None })]);
        assert!(body_with(cfg, exprs).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_self_referencing_expression() {
        let mut exprs = ExprArena::new();
        exprs.alloc(BoundExpr::Unary {
            op: UnaryOp::Minus,
            operand: ExprId(0),
        });
        let cfg = ControlFlowGraph::new(vec![BasicBlock::new(
            BlockId(0),
            Edge::Return { value: Some(ExprId(0)) },
        )]);
        let err = body_with(cfg, exprs).validate().unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedBody(msg) if msg.contains("not allocated before")));
    }

    #[test]
    fn test_validate_rejects_forward_reference_cycle() {
        let mut exprs = ExprArena::new();
        exprs.alloc(BoundExpr::Unary {
            op: UnaryOp::Not,
            operand: ExprId(1),
        });
        exprs.alloc(BoundExpr::Unary {
            op: UnaryOp::Not,
            operand: ExprId(0),
        });
        let cfg = ControlFlowGraph::new(vec![BasicBlock::new(
            BlockId(0),
            Edge::Return { value: Some(ExprId(1)) },
        )]);
        assert!(matches!(
            body_with(cfg, exprs).validate(),
            Err(AnalysisError::MalformedBody(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_variable() {
        let mut exprs = ExprArena::new();
        exprs.alloc(BoundExpr::Variable(VariableHandle(0)));
        let cfg = ControlFlowGraph::new(vec![BasicBlock::new(BlockId(0), Edge::Return { value: None })]);
        assert!(body_with(cfg, exprs).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_cfg() {
        assert!(body_with(ControlFlowGraph::new(Vec::new()), ExprArena::new())
            .validate()
            .is_err());
    }
}
