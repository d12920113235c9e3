//! Structured construction of bound routine bodies
//!
//! Front ends that already produce a CFG can fill a [`RoutineBody`] directly.
//! [`BodyBuilder`] is the convenient path: allocate expressions through its
//! helpers, describe statements with the structured [`Stmt`] tree and let
//! [`BodyBuilder::build`] lower loops, switches and try regions into blocks.

use super::cfg::{BasicBlock, BlockId, ControlFlowGraph, Edge, SwitchArm};
use super::expr::{
    Argument, ArrayItem, BinaryOp, BoundExpr, BoundStmt, ClassRef, ExprArena, ExprId, Literal, LogicalOp, StaticVar,
    UnaryOp, VariableHandle,
};
use super::{RoutineBody, RoutineKind, VariableKind, VariableTable};
use crate::symbols::{Name, RoutineId};
use smallvec::SmallVec;

/// Structured statement, lowered by [`BodyBuilder::build`]
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(ExprId),
    Echo(Vec<ExprId>),
    Unset(Vec<ExprId>),
    Global(Vec<VariableHandle>),
    Static(Vec<StaticVar>),
    If {
        condition: ExprId,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        condition: ExprId,
        body: Vec<Stmt>,
    },
    DoWhile {
        body: Vec<Stmt>,
        condition: ExprId,
    },
    For {
        init: Vec<ExprId>,
        condition: Option<ExprId>,
        step: Vec<ExprId>,
        body: Vec<Stmt>,
    },
    Foreach {
        enumeree: ExprId,
        key: Option<ExprId>,
        value: ExprId,
        by_ref: bool,
        body: Vec<Stmt>,
    },
    Switch {
        value: ExprId,
        cases: Vec<SwitchCase>,
    },
    Try {
        body: Vec<Stmt>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    Return(Option<ExprId>),
    Throw(ExprId),
    Exit(Option<ExprId>),
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for `default:`
    pub label: Option<ExprId>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub types: Vec<Name>,
    pub variable: Option<VariableHandle>,
    pub body: Vec<Stmt>,
}

struct DraftBlock {
    statements: Vec<BoundStmt>,
    edge: Option<Edge>,
    handlers: SmallVec<[BlockId; 2]>,
}

struct LoopContext {
    continue_block: BlockId,
    break_block: BlockId,
}

/// Builder for a [`RoutineBody`]
pub struct BodyBuilder {
    routine: RoutineId,
    kind: RoutineKind,
    variables: VariableTable,
    exprs: ExprArena,
    blocks: Vec<DraftBlock>,
    current_block: BlockId,
    loop_stack: Vec<LoopContext>,
    handler_stack: Vec<SmallVec<[BlockId; 2]>>,
}

impl BodyBuilder {
    pub fn new(routine: RoutineId, kind: RoutineKind) -> Self {
        let mut builder = Self {
            routine,
            kind,
            variables: VariableTable::new(),
            exprs: ExprArena::new(),
            blocks: Vec::new(),
            current_block: BlockId::ENTRY,
            loop_stack: Vec::new(),
            handler_stack: Vec::new(),
        };
        builder.current_block = builder.new_block();
        builder
    }

    // Variables

    pub fn local(&mut self, name: &str) -> VariableHandle {
        self.variables.declare(name, VariableKind::Local)
    }

    pub fn param(&mut self, name: &str) -> VariableHandle {
        self.variables.declare(name, VariableKind::Parameter)
    }

    pub fn this(&mut self) -> VariableHandle {
        self.variables.declare("this", VariableKind::This)
    }

    pub fn captured(&mut self, name: &str, by_ref: bool) -> VariableHandle {
        self.variables.declare(name, VariableKind::Captured { by_ref })
    }

    // Expressions

    pub fn expr(&mut self, expr: BoundExpr) -> ExprId {
        self.exprs.alloc(expr)
    }

    pub fn var(&mut self, variable: VariableHandle) -> ExprId {
        self.expr(BoundExpr::Variable(variable))
    }

    pub fn null(&mut self) -> ExprId {
        self.expr(BoundExpr::Literal(Literal::Null))
    }

    pub fn bool(&mut self, value: bool) -> ExprId {
        self.expr(BoundExpr::Literal(Literal::Bool(value)))
    }

    pub fn long(&mut self, value: i64) -> ExprId {
        self.expr(BoundExpr::Literal(Literal::Long(value)))
    }

    pub fn double(&mut self, value: f64) -> ExprId {
        self.expr(BoundExpr::Literal(Literal::Double(value)))
    }

    pub fn string(&mut self, value: &str) -> ExprId {
        self.expr(BoundExpr::Literal(Literal::String(value.to_string())))
    }

    pub fn constant(&mut self, name: &str) -> ExprId {
        self.expr(BoundExpr::Constant { name: Name::new(name) })
    }

    pub fn assign(&mut self, target: ExprId, value: ExprId) -> ExprId {
        self.expr(BoundExpr::Assign { target, value })
    }

    /// `$variable = value`, allocating the target read
    pub fn assign_var(&mut self, variable: VariableHandle, value: ExprId) -> ExprId {
        let target = self.var(variable);
        self.assign(target, value)
    }

    pub fn assign_ref(&mut self, target: ExprId, value: ExprId) -> ExprId {
        self.expr(BoundExpr::AssignRef { target, value })
    }

    pub fn compound(&mut self, op: BinaryOp, target: ExprId, value: ExprId) -> ExprId {
        self.expr(BoundExpr::CompoundAssign { op, target, value })
    }

    pub fn post_inc(&mut self, target: ExprId) -> ExprId {
        self.expr(BoundExpr::IncDec {
            target,
            increment: true,
            prefix: false,
        })
    }

    pub fn pre_inc(&mut self, target: ExprId) -> ExprId {
        self.expr(BoundExpr::IncDec {
            target,
            increment: true,
            prefix: true,
        })
    }

    pub fn post_dec(&mut self, target: ExprId) -> ExprId {
        self.expr(BoundExpr::IncDec {
            target,
            increment: false,
            prefix: false,
        })
    }

    pub fn binary(&mut self, op: BinaryOp, left: ExprId, right: ExprId) -> ExprId {
        self.expr(BoundExpr::Binary { op, left, right })
    }

    pub fn and(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.expr(BoundExpr::Logical {
            op: LogicalOp::And,
            left,
            right,
        })
    }

    pub fn or(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.expr(BoundExpr::Logical {
            op: LogicalOp::Or,
            left,
            right,
        })
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ExprId) -> ExprId {
        self.expr(BoundExpr::Unary { op, operand })
    }

    pub fn not(&mut self, operand: ExprId) -> ExprId {
        self.unary(UnaryOp::Not, operand)
    }

    pub fn ternary(&mut self, condition: ExprId, if_true: Option<ExprId>, if_false: ExprId) -> ExprId {
        self.expr(BoundExpr::Conditional {
            condition,
            if_true,
            if_false,
        })
    }

    pub fn coalesce(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.expr(BoundExpr::Coalesce { left, right })
    }

    /// List-style array literal
    pub fn array(&mut self, values: Vec<ExprId>) -> ExprId {
        let items = values
            .into_iter()
            .map(|value| ArrayItem {
                key: None,
                value,
                by_ref: false,
                unpack: false,
            })
            .collect();
        self.expr(BoundExpr::Array { items })
    }

    pub fn item(&mut self, array: ExprId, index: Option<ExprId>) -> ExprId {
        self.expr(BoundExpr::ItemAccess { array, index })
    }

    pub fn list(&mut self, items: Vec<Option<ExprId>>) -> ExprId {
        self.expr(BoundExpr::List { items })
    }

    pub fn field(&mut self, instance: ExprId, field: &str) -> ExprId {
        self.expr(BoundExpr::FieldAccess {
            instance,
            field: field.to_string(),
        })
    }

    pub fn instance_of(&mut self, operand: ExprId, class: &str) -> ExprId {
        self.expr(BoundExpr::InstanceOf {
            operand,
            class: ClassRef::Named(Name::new(class)),
        })
    }

    pub fn isset(&mut self, operands: Vec<ExprId>) -> ExprId {
        self.expr(BoundExpr::Isset { operands })
    }

    pub fn empty(&mut self, operand: ExprId) -> ExprId {
        self.expr(BoundExpr::Empty { operand })
    }

    pub fn call(&mut self, name: &str, args: Vec<ExprId>) -> ExprId {
        let args = args.into_iter().map(Argument::new).collect();
        self.call_with(name, args)
    }

    pub fn call_with(&mut self, name: &str, args: Vec<Argument>) -> ExprId {
        self.expr(BoundExpr::Call {
            name: Name::new(name),
            args,
        })
    }

    pub fn method_call(&mut self, receiver: ExprId, name: &str, args: Vec<ExprId>) -> ExprId {
        self.expr(BoundExpr::MethodCall {
            receiver,
            name: name.to_string(),
            args: args.into_iter().map(Argument::new).collect(),
        })
    }

    pub fn static_call(&mut self, class: ClassRef, name: &str, args: Vec<ExprId>) -> ExprId {
        self.expr(BoundExpr::StaticCall {
            class,
            name: name.to_string(),
            args: args.into_iter().map(Argument::new).collect(),
        })
    }

    pub fn new_object(&mut self, class: &str, args: Vec<ExprId>) -> ExprId {
        self.expr(BoundExpr::New {
            class: ClassRef::Named(Name::new(class)),
            args: args.into_iter().map(Argument::new).collect(),
        })
    }

    pub fn eval(&mut self, code: ExprId) -> ExprId {
        self.expr(BoundExpr::Eval { code })
    }

    pub fn yield_value(&mut self, value: Option<ExprId>) -> ExprId {
        self.expr(BoundExpr::Yield { key: None, value })
    }

    // Lowering

    fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(DraftBlock {
            statements: Vec::new(),
            edge: None,
            handlers: self.handler_stack.last().cloned().unwrap_or_default(),
        });
        id
    }

    fn add_stmt(&mut self, stmt: BoundStmt) {
        self.blocks[self.current_block.index()].statements.push(stmt);
    }

    fn is_terminated(&self, block: BlockId) -> bool {
        self.blocks[block.index()].edge.is_some()
    }

    fn set_edge(&mut self, block: BlockId, edge: Edge) {
        let draft = &mut self.blocks[block.index()];
        if draft.edge.is_none() {
            draft.edge = Some(edge);
        }
    }

    /// Jump from the current block to `target` unless it already terminated
    fn goto(&mut self, target: BlockId) {
        if !self.is_terminated(self.current_block) {
            self.set_edge(self.current_block, Edge::Simple { target });
        }
    }

    /// Terminate the current block and continue in a fresh, unreachable one
    fn terminate(&mut self, edge: Edge) {
        self.set_edge(self.current_block, edge);
        self.current_block = self.new_block();
    }

    pub fn build(mut self, body: &[Stmt]) -> RoutineBody {
        self.build_body(body);
        let blocks = self
            .blocks
            .into_iter()
            .enumerate()
            .map(|(i, draft)| BasicBlock {
                id: BlockId(i as u32),
                statements: draft.statements,
                // falling off the end returns null
                edge: draft.edge.unwrap_or(Edge::Return { value: None }),
                handlers: draft.handlers,
            })
            .collect();

        RoutineBody {
            routine: self.routine,
            kind: self.kind,
            variables: self.variables,
            exprs: self.exprs,
            cfg: ControlFlowGraph::new(blocks),
        }
    }

    fn build_body(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.build_stmt(stmt);
        }
    }

    fn build_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr) => self.add_stmt(BoundStmt::Expr(*expr)),
            Stmt::Echo(exprs) => self.add_stmt(BoundStmt::Echo(exprs.clone())),
            Stmt::Unset(exprs) => self.add_stmt(BoundStmt::Unset(exprs.clone())),
            Stmt::Global(vars) => self.add_stmt(BoundStmt::Global(vars.clone())),
            Stmt::Static(vars) => self.add_stmt(BoundStmt::Static(vars.clone())),
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => self.build_if(*condition, then_body, else_body),
            Stmt::While { condition, body } => self.build_while(*condition, body),
            Stmt::DoWhile { body, condition } => self.build_do_while(body, *condition),
            Stmt::For {
                init,
                condition,
                step,
                body,
            } => self.build_for(init, *condition, step, body),
            Stmt::Foreach {
                enumeree,
                key,
                value,
                by_ref,
                body,
            } => self.build_foreach(*enumeree, *key, *value, *by_ref, body),
            Stmt::Switch { value, cases } => self.build_switch(*value, cases),
            Stmt::Try { body, catches, finally } => self.build_try(body, catches, finally.as_deref()),
            Stmt::Return(value) => self.terminate(Edge::Return { value: *value }),
            Stmt::Throw(value) => self.terminate(Edge::Throw { value: *value }),
            Stmt::Exit(value) => self.terminate(Edge::Exit { value: *value }),
            Stmt::Break => {
                if let Some(target) = self.loop_stack.last().map(|ctx| ctx.break_block) {
                    self.set_edge(self.current_block, Edge::Leave { target });
                }
                self.current_block = self.new_block();
            }
            Stmt::Continue => {
                if let Some(target) = self.loop_stack.last().map(|ctx| ctx.continue_block) {
                    self.set_edge(self.current_block, Edge::Leave { target });
                }
                self.current_block = self.new_block();
            }
        }
    }

    fn build_if(&mut self, condition: ExprId, then_body: &[Stmt], else_body: &[Stmt]) {
        let then_block = self.new_block();
        let else_block = self.new_block();
        let merge_block = self.new_block();

        self.set_edge(
            self.current_block,
            Edge::Conditional {
                condition,
                if_true: then_block,
                if_false: else_block,
            },
        );

        self.current_block = then_block;
        self.build_body(then_body);
        self.goto(merge_block);

        self.current_block = else_block;
        self.build_body(else_body);
        self.goto(merge_block);

        self.current_block = merge_block;
    }

    fn build_loop_body(&mut self, body: &[Stmt], continue_block: BlockId, break_block: BlockId) {
        self.loop_stack.push(LoopContext {
            continue_block,
            break_block,
        });
        self.build_body(body);
        self.loop_stack.pop();
    }

    fn build_while(&mut self, condition: ExprId, body: &[Stmt]) {
        let header_block = self.new_block();
        let body_block = self.new_block();
        let exit_block = self.new_block();

        self.goto(header_block);
        self.set_edge(
            header_block,
            Edge::Conditional {
                condition,
                if_true: body_block,
                if_false: exit_block,
            },
        );

        self.current_block = body_block;
        self.build_loop_body(body, header_block, exit_block);
        // back edge
        self.goto(header_block);

        self.current_block = exit_block;
    }

    fn build_do_while(&mut self, body: &[Stmt], condition: ExprId) {
        let body_block = self.new_block();
        let condition_block = self.new_block();
        let exit_block = self.new_block();

        self.goto(body_block);
        self.current_block = body_block;
        self.build_loop_body(body, condition_block, exit_block);
        self.goto(condition_block);

        self.set_edge(
            condition_block,
            Edge::Conditional {
                condition,
                if_true: body_block,
                if_false: exit_block,
            },
        );
        self.current_block = exit_block;
    }

    fn build_for(&mut self, init: &[ExprId], condition: Option<ExprId>, step: &[ExprId], body: &[Stmt]) {
        for expr in init {
            self.add_stmt(BoundStmt::Expr(*expr));
        }
        let header_block = self.new_block();
        let body_block = self.new_block();
        let step_block = self.new_block();
        let exit_block = self.new_block();

        self.goto(header_block);
        let header_edge = match condition {
            Some(condition) => Edge::Conditional {
                condition,
                if_true: body_block,
                if_false: exit_block,
            },
            None => Edge::Simple { target: body_block },
        };
        self.set_edge(header_block, header_edge);

        self.current_block = body_block;
        self.build_loop_body(body, step_block, exit_block);
        self.goto(step_block);

        self.current_block = step_block;
        for expr in step {
            self.add_stmt(BoundStmt::Expr(*expr));
        }
        self.goto(header_block);

        self.current_block = exit_block;
    }

    fn build_foreach(&mut self, enumeree: ExprId, key: Option<ExprId>, value: ExprId, by_ref: bool, body: &[Stmt]) {
        let move_next = self.new_block();
        let body_block = self.new_block();
        let exit_block = self.new_block();

        self.set_edge(
            self.current_block,
            Edge::ForeachEnumeree {
                enumeree,
                by_ref,
                move_next,
            },
        );
        self.set_edge(
            move_next,
            Edge::ForeachMoveNext {
                enumeree,
                key,
                value,
                by_ref,
                body: body_block,
                end: exit_block,
            },
        );

        self.current_block = body_block;
        self.build_loop_body(body, move_next, exit_block);
        self.goto(move_next);

        self.current_block = exit_block;
    }

    fn build_switch(&mut self, value: ExprId, cases: &[SwitchCase]) {
        let bodies: Vec<BlockId> = cases.iter().map(|_| self.new_block()).collect();
        let end_block = self.new_block();

        let arms = cases
            .iter()
            .zip(&bodies)
            .map(|(case, &body)| SwitchArm {
                label: case.label,
                body,
            })
            .collect();
        self.set_edge(
            self.current_block,
            Edge::Switch {
                value,
                arms,
                end: end_block,
            },
        );

        for (i, case) in cases.iter().enumerate() {
            self.current_block = bodies[i];
            // `continue` inside a switch behaves like `break`
            self.build_loop_body(&case.body, end_block, end_block);
            // fallthrough
            let next = bodies.get(i + 1).copied().unwrap_or(end_block);
            self.goto(next);
        }

        self.current_block = end_block;
    }

    fn build_try(&mut self, body: &[Stmt], catches: &[CatchClause], finally: Option<&[Stmt]>) {
        let catch_blocks: Vec<BlockId> = catches.iter().map(|_| self.new_block()).collect();
        let finally_block = finally.map(|_| self.new_block());
        let end_block = self.new_block();
        let after_body = finally_block.unwrap_or(end_block);

        let mut handlers: SmallVec<[BlockId; 2]> = catch_blocks.iter().copied().collect();
        handlers.extend(finally_block);
        self.handler_stack.push(handlers);
        let body_block = self.new_block();

        self.set_edge(
            self.current_block,
            Edge::TryCatchFinally {
                body: body_block,
                catches: catch_blocks.clone(),
                finally: finally_block,
                end: end_block,
            },
        );

        self.current_block = body_block;
        self.build_body(body);
        self.goto(after_body);
        self.handler_stack.pop();

        // exceptions escaping a catch still run the finally block
        let mut catch_handlers = self.handler_stack.last().cloned().unwrap_or_default();
        catch_handlers.extend(finally_block);
        if finally_block.is_some() {
            self.handler_stack.push(catch_handlers.clone());
        }
        for (clause, &block) in catches.iter().zip(&catch_blocks) {
            self.blocks[block.index()].handlers = catch_handlers.clone();
            self.current_block = block;
            self.add_stmt(BoundStmt::Catch {
                variable: clause.variable,
                types: clause.types.clone(),
            });
            self.build_body(&clause.body);
            self.goto(after_body);
        }
        if finally_block.is_some() {
            self.handler_stack.pop();
        }

        if let (Some(block), Some(stmts)) = (finally_block, finally) {
            self.current_block = block;
            self.build_body(stmts);
            self.goto(end_block);
        }

        self.current_block = end_block;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> BodyBuilder {
        BodyBuilder::new(RoutineId(0), RoutineKind::Function)
    }

    #[test]
    fn test_simple_return() {
        let mut b = builder();
        let one = b.long(1);
        let body = b.build(&[Stmt::Return(Some(one))]);

        assert_eq!(body.cfg.entry, BlockId::ENTRY);
        assert_eq!(body.block(BlockId::ENTRY).edge, Edge::Return { value: Some(one) });
        assert!(body.validate().is_ok());
    }

    #[test]
    fn test_if_statement() {
        let mut b = builder();
        let x = b.param("x");
        let cond = b.var(x);
        let one = b.long(1);
        let body = b.build(&[Stmt::If {
            condition: cond,
            then_body: vec![Stmt::Return(Some(one))],
            else_body: vec![],
        }]);

        assert!(matches!(body.block(BlockId::ENTRY).edge, Edge::Conditional { .. }));
        assert!(body.cfg.len() >= 4);
        assert!(body.validate().is_ok());
    }

    #[test]
    fn test_while_loop_has_back_edge() {
        let mut b = builder();
        let i = b.local("i");
        let cond = b.var(i);
        let target = b.var(i);
        let step = b.post_inc(target);
        let body = b.build(&[Stmt::While {
            condition: cond,
            body: vec![Stmt::Expr(step)],
        }]);

        let header = BlockId(1);
        let entering = body
            .cfg
            .blocks
            .iter()
            .filter(|block| block.edge.successors().contains(&header))
            .count();
        assert!(matches!(body.block(header).edge, Edge::Conditional { .. }));
        assert_eq!(entering, 2);
    }

    #[test]
    fn test_for_loop_continue_targets_step() {
        let mut b = builder();
        let i = b.local("i");
        let init_target = b.var(i);
        let zero = b.long(0);
        let init = b.assign(init_target, zero);
        let step_target = b.var(i);
        let step = b.post_inc(step_target);
        let body = b.build(&[Stmt::For {
            init: vec![init],
            condition: None,
            step: vec![step],
            body: vec![Stmt::Continue],
        }]);

        let leave = body
            .cfg
            .blocks
            .iter()
            .find_map(|block| match block.edge {
                Edge::Leave { target } => Some(target),
                _ => None,
            })
            .unwrap();
        assert_eq!(body.block(leave).statements, vec![BoundStmt::Expr(step)]);
    }

    #[test]
    fn test_break_leaves_loop() {
        let mut b = builder();
        let cond = b.bool(true);
        let body = b.build(&[Stmt::While {
            condition: cond,
            body: vec![Stmt::Break],
        }]);

        let exit = match body.block(BlockId(1)).edge {
            Edge::Conditional { if_false, .. } => if_false,
            ref other => panic!("unexpected header edge {other:?}"),
        };
        assert!(body
            .cfg
            .blocks
            .iter()
            .any(|block| block.edge == Edge::Leave { target: exit }));
    }

    #[test]
    fn test_switch_falls_through() {
        let mut b = builder();
        let value = b.long(1);
        let label = b.long(1);
        let body = b.build(&[Stmt::Switch {
            value,
            cases: vec![
                SwitchCase {
                    label: Some(label),
                    body: vec![],
                },
                SwitchCase {
                    label: None,
                    body: vec![Stmt::Break],
                },
            ],
        }]);

        let Edge::Switch { arms, end, .. } = &body.block(BlockId::ENTRY).edge else {
            panic!("expected a switch edge");
        };
        assert_eq!(body.block(arms[0].body).edge, Edge::Simple { target: arms[1].body });
        assert_eq!(body.block(arms[1].body).edge, Edge::Leave { target: *end });
    }

    #[test]
    fn test_try_blocks_carry_handlers() {
        let mut b = builder();
        let e = b.local("e");
        let risky = b.call("risky", vec![]);
        let body = b.build(&[Stmt::Try {
            body: vec![Stmt::Expr(risky)],
            catches: vec![CatchClause {
                types: vec![Name::new("Exception")],
                variable: Some(e),
                body: vec![],
            }],
            finally: Some(vec![]),
        }]);

        let Edge::TryCatchFinally {
            body: try_body,
            catches,
            finally,
            ..
        } = &body.block(BlockId::ENTRY).edge
        else {
            panic!("expected a try edge");
        };
        let finally = finally.unwrap();
        assert_eq!(body.block(*try_body).handlers.as_slice(), &[catches[0], finally]);
        assert_eq!(body.block(catches[0]).handlers.as_slice(), &[finally]);
        assert!(matches!(body.block(catches[0]).statements[0], BoundStmt::Catch { .. }));
        assert!(body.validate().is_ok());
    }
}
