//! Control flow graph of a bound routine body

use super::expr::{BoundStmt, ExprId};
use serde::Serialize;
use smallvec::SmallVec;

/// Unique identifier for a basic block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockId(pub u32);

impl BlockId {
    pub const ENTRY: BlockId = BlockId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchArm {
    /// `None` for `default:`
    pub label: Option<ExprId>,
    pub body: BlockId,
}

/// How a basic block terminates
#[derive(Debug, Clone, PartialEq)]
pub enum Edge {
    Simple {
        target: BlockId,
    },
    /// `break`/`continue` leaving a nested scope
    Leave {
        target: BlockId,
    },
    Conditional {
        condition: ExprId,
        if_true: BlockId,
        if_false: BlockId,
    },
    /// Arms are listed in source order; fallthrough is a simple edge between bodies
    Switch {
        value: ExprId,
        arms: Vec<SwitchArm>,
        end: BlockId,
    },
    /// Enters a protected region; blocks of the region list the handlers in
    /// [`BasicBlock::handlers`]
    TryCatchFinally {
        body: BlockId,
        catches: Vec<BlockId>,
        finally: Option<BlockId>,
        end: BlockId,
    },
    ForeachEnumeree {
        enumeree: ExprId,
        by_ref: bool,
        move_next: BlockId,
    },
    ForeachMoveNext {
        enumeree: ExprId,
        key: Option<ExprId>,
        value: ExprId,
        by_ref: bool,
        body: BlockId,
        end: BlockId,
    },
    Return {
        value: Option<ExprId>,
    },
    Throw {
        value: ExprId,
    },
    /// `exit`/`die`
    Exit {
        value: Option<ExprId>,
    },
}

impl Edge {
    /// Blocks reached through normal control flow
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Edge::Simple { target } | Edge::Leave { target } => smallvec::smallvec![*target],
            Edge::Conditional { if_true, if_false, .. } => smallvec::smallvec![*if_true, *if_false],
            Edge::Switch { arms, end, .. } => {
                let mut out: SmallVec<[BlockId; 2]> = arms.iter().map(|arm| arm.body).collect();
                if !arms.iter().any(|arm| arm.label.is_none()) {
                    out.push(*end);
                }
                out
            }
            Edge::TryCatchFinally { body, .. } => smallvec::smallvec![*body],
            Edge::ForeachEnumeree { move_next, .. } => smallvec::smallvec![*move_next],
            Edge::ForeachMoveNext { body, end, .. } => smallvec::smallvec![*body, *end],
            Edge::Return { .. } | Edge::Throw { .. } | Edge::Exit { .. } => SmallVec::new(),
        }
    }

    /// Expressions evaluated by the edge itself
    pub fn exprs(&self) -> SmallVec<[ExprId; 4]> {
        match self {
            Edge::Conditional { condition, .. } => smallvec::smallvec![*condition],
            Edge::Switch { value, arms, .. } => {
                let mut out: SmallVec<[ExprId; 4]> = smallvec::smallvec![*value];
                out.extend(arms.iter().filter_map(|arm| arm.label));
                out
            }
            Edge::ForeachEnumeree { enumeree, .. } => smallvec::smallvec![*enumeree],
            Edge::ForeachMoveNext {
                enumeree, key, value, ..
            } => {
                let mut out: SmallVec<[ExprId; 4]> = smallvec::smallvec![*enumeree, *value];
                out.extend(*key);
                out
            }
            Edge::Return { value } | Edge::Exit { value } => value.iter().copied().collect(),
            Edge::Throw { value } => smallvec::smallvec![*value],
            _ => SmallVec::new(),
        }
    }

    /// Every block the edge mentions, including region bookkeeping
    pub fn referenced_blocks(&self) -> SmallVec<[BlockId; 4]> {
        let mut out: SmallVec<[BlockId; 4]> = self.successors().into_iter().collect();
        match self {
            Edge::Switch { end, .. } => out.push(*end),
            Edge::TryCatchFinally {
                catches, finally, end, ..
            } => {
                out.extend(catches.iter().copied());
                out.extend(*finally);
                out.push(*end);
            }
            _ => {}
        }
        out
    }
}

/// A basic block in the CFG
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub statements: Vec<BoundStmt>,
    pub edge: Edge,
    /// Catch and finally blocks that receive control if a statement throws
    pub handlers: SmallVec<[BlockId; 2]>,
}

impl BasicBlock {
    pub fn new(id: BlockId, edge: Edge) -> Self {
        Self {
            id,
            statements: Vec::new(),
            edge,
            handlers: SmallVec::new(),
        }
    }
}

/// Control Flow Graph
#[derive(Debug, Clone, PartialEq)]
pub struct ControlFlowGraph {
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
}

impl ControlFlowGraph {
    pub fn new(blocks: Vec<BasicBlock>) -> Self {
        Self {
            blocks,
            entry: BlockId::ENTRY,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
