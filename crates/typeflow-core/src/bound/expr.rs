//! Bound expressions and statements
//!
//! Expressions of one routine live in an [`ExprArena`] and refer to each other
//! by [`ExprId`]. The set of node kinds is closed; the analysis dispatches on it
//! with a single `match`.

use crate::symbols::{Name, RoutineId};
use serde::Serialize;
use smallvec::SmallVec;
use std::ops::Index;

/// Index of an expression in its routine's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ExprId(pub u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a variable in its routine's [`VariableTable`](super::VariableTable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VariableHandle(pub u32);

impl VariableHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    ShiftLeft,
    ShiftRight,
    BitAnd,
    BitOr,
    BitXor,
    Concat,
    Equal,
    NotEqual,
    Identical,
    NotIdentical,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Spaceship,
    LogicalXor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    Bool,
    Long,
    Double,
    String,
    Array,
    Object,
    Unset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
    BitNot,
    /// `@expr`
    Silence,
    Cast(CastKind),
}

/// Class named in `new`, `instanceof` or a static member access
#[derive(Debug, Clone, PartialEq)]
pub enum ClassRef {
    Named(Name),
    SelfClass,
    Parent,
    /// `static::`, resolved at run time
    Static,
    Dynamic(ExprId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Argument {
    pub value: ExprId,
    /// `...$args`
    pub unpack: bool,
}

impl Argument {
    pub fn new(value: ExprId) -> Self {
        Self { value, unpack: false }
    }

    pub fn unpacked(value: ExprId) -> Self {
        Self { value, unpack: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayItem {
    pub key: Option<ExprId>,
    pub value: ExprId,
    pub by_ref: bool,
    pub unpack: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosureUse {
    pub variable: VariableHandle,
    pub by_ref: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    Literal(Literal),
    Variable(VariableHandle),
    /// `$$name`
    VariableVariable { name: ExprId },
    Assign { target: ExprId, value: ExprId },
    /// `$a = &$b`
    AssignRef { target: ExprId, value: ExprId },
    CompoundAssign { op: BinaryOp, target: ExprId, value: ExprId },
    IncDec { target: ExprId, increment: bool, prefix: bool },
    Binary { op: BinaryOp, left: ExprId, right: ExprId },
    Logical { op: LogicalOp, left: ExprId, right: ExprId },
    Unary { op: UnaryOp, operand: ExprId },
    /// `c ? a : b`; `if_true` is `None` for `c ?: b`
    Conditional { condition: ExprId, if_true: Option<ExprId>, if_false: ExprId },
    Coalesce { left: ExprId, right: ExprId },
    Array { items: Vec<ArrayItem> },
    /// `list($a, , $b)` / `[$a, $b]` on the left of an assignment
    List { items: Vec<Option<ExprId>> },
    /// `$a[i]`; `index` is `None` for `$a[]`
    ItemAccess { array: ExprId, index: Option<ExprId> },
    FieldAccess { instance: ExprId, field: String },
    StaticFieldAccess { class: ClassRef, field: String },
    InstanceOf { operand: ExprId, class: ClassRef },
    Isset { operands: Vec<ExprId> },
    Empty { operand: ExprId },
    Call { name: Name, args: Vec<Argument> },
    DynamicCall { callee: ExprId, args: Vec<Argument> },
    MethodCall { receiver: ExprId, name: String, args: Vec<Argument> },
    StaticCall { class: ClassRef, name: String, args: Vec<Argument> },
    New { class: ClassRef, args: Vec<Argument> },
    Closure { routine: RoutineId, uses: Vec<ClosureUse> },
    Eval { code: ExprId },
    Include { path: ExprId },
    Yield { key: Option<ExprId>, value: Option<ExprId> },
    YieldFrom { source: ExprId },
    Constant { name: Name },
}

impl BoundExpr {
    /// Whether the expression denotes a storage location
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self,
            BoundExpr::Variable(_)
                | BoundExpr::VariableVariable { .. }
                | BoundExpr::ItemAccess { .. }
                | BoundExpr::FieldAccess { .. }
                | BoundExpr::StaticFieldAccess { .. }
        )
    }

    /// Direct sub-expressions, in evaluation order
    pub fn children(&self) -> SmallVec<[ExprId; 4]> {
        let mut out = SmallVec::new();
        let args = |out: &mut SmallVec<[ExprId; 4]>, args: &[Argument]| {
            out.extend(args.iter().map(|a| a.value));
        };
        match self {
            BoundExpr::Literal(_) | BoundExpr::Variable(_) | BoundExpr::Constant { .. } => {}
            BoundExpr::Closure { .. } => {}
            BoundExpr::VariableVariable { name } => out.push(*name),
            BoundExpr::Assign { target, value }
            | BoundExpr::AssignRef { target, value }
            | BoundExpr::CompoundAssign { target, value, .. } => {
                out.push(*value);
                out.push(*target);
            }
            BoundExpr::IncDec { target, .. } => out.push(*target),
            BoundExpr::Binary { left, right, .. }
            | BoundExpr::Logical { left, right, .. }
            | BoundExpr::Coalesce { left, right } => {
                out.push(*left);
                out.push(*right);
            }
            BoundExpr::Unary { operand, .. }
            | BoundExpr::Empty { operand }
            | BoundExpr::InstanceOf { operand, .. } => out.push(*operand),
            BoundExpr::Conditional {
                condition,
                if_true,
                if_false,
            } => {
                out.push(*condition);
                out.extend(*if_true);
                out.push(*if_false);
            }
            BoundExpr::Array { items } => {
                for item in items {
                    out.extend(item.key);
                    out.push(item.value);
                }
            }
            BoundExpr::List { items } => out.extend(items.iter().flatten().copied()),
            BoundExpr::ItemAccess { array, index } => {
                out.push(*array);
                out.extend(*index);
            }
            BoundExpr::FieldAccess { instance, .. } => out.push(*instance),
            BoundExpr::StaticFieldAccess { .. } => {}
            BoundExpr::Isset { operands } => out.extend(operands.iter().copied()),
            BoundExpr::Call { args: a, .. } | BoundExpr::StaticCall { args: a, .. } | BoundExpr::New { args: a, .. } => {
                args(&mut out, a)
            }
            BoundExpr::DynamicCall { callee, args: a } => {
                out.push(*callee);
                args(&mut out, a);
            }
            BoundExpr::MethodCall { receiver, args: a, .. } => {
                out.push(*receiver);
                args(&mut out, a);
            }
            BoundExpr::Eval { code } => out.push(*code),
            BoundExpr::Include { path } => out.push(*path),
            BoundExpr::Yield { key, value } => {
                out.extend(*key);
                out.extend(*value);
            }
            BoundExpr::YieldFrom { source } => out.push(*source),
        }
        if let Some(ClassRef::Dynamic(class)) = self.class_ref() {
            out.push(*class);
        }
        out
    }

    fn class_ref(&self) -> Option<&ClassRef> {
        match self {
            BoundExpr::StaticFieldAccess { class, .. }
            | BoundExpr::InstanceOf { class, .. }
            | BoundExpr::StaticCall { class, .. }
            | BoundExpr::New { class, .. } => Some(class),
            _ => None,
        }
    }
}

/// Arena owning every expression of one routine body
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    exprs: Vec<BoundExpr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, expr: BoundExpr) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn get(&self, id: ExprId) -> Option<&BoundExpr> {
        self.exprs.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExprId, &BoundExpr)> {
        self.exprs
            .iter()
            .enumerate()
            .map(|(i, e)| (ExprId(i as u32), e))
    }
}

impl Index<ExprId> for ExprArena {
    type Output = BoundExpr;

    fn index(&self, id: ExprId) -> &BoundExpr {
        &self.exprs[id.index()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticVar {
    pub variable: VariableHandle,
    pub initializer: Option<ExprId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundStmt {
    Expr(ExprId),
    Echo(Vec<ExprId>),
    Unset(Vec<ExprId>),
    Global(Vec<VariableHandle>),
    Static(Vec<StaticVar>),
    /// First statement of a catch block; binds the caught exception
    Catch {
        variable: Option<VariableHandle>,
        types: Vec<Name>,
    },
}

impl BoundStmt {
    pub fn exprs(&self) -> SmallVec<[ExprId; 4]> {
        match self {
            BoundStmt::Expr(e) => smallvec::smallvec![*e],
            BoundStmt::Echo(es) | BoundStmt::Unset(es) => es.iter().copied().collect(),
            BoundStmt::Static(vars) => vars.iter().filter_map(|v| v.initializer).collect(),
            BoundStmt::Global(_) | BoundStmt::Catch { .. } => SmallVec::new(),
        }
    }

    pub fn variables(&self) -> SmallVec<[VariableHandle; 4]> {
        match self {
            BoundStmt::Global(vars) => vars.iter().copied().collect(),
            BoundStmt::Static(vars) => vars.iter().map(|v| v.variable).collect(),
            BoundStmt::Catch { variable, .. } => variable.iter().copied().collect(),
            _ => SmallVec::new(),
        }
    }
}
