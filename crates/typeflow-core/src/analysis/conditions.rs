//! Conditions and branch narrowing
//!
//! A condition is visited once per assumed outcome. Short-circuit operators
//! split the state so the right operand only sees the paths on which it
//! executes. After a leaf condition is visited, recognized type-check idioms
//! narrow the tested variable for the assumed outcome.

use super::{Access, ConditionBranch, ExpressionAnalysis};
use crate::bound::{Argument, BinaryOp, BoundExpr, ClassRef, ExprId, Literal, LogicalOp, UnaryOp, VariableHandle};
use crate::symbols::Name;
use crate::types::{TypeRef, TypeRefContext, TypeRefMask};
use std::mem;

/// `is_*` functions understood as type tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeCheck {
    Null,
    Long,
    Double,
    String,
    Bool,
    Array,
    Object,
    Numeric,
}

impl TypeCheck {
    pub(crate) fn from_function(name: &Name) -> Option<Self> {
        let check = match name.key() {
            "is_null" => TypeCheck::Null,
            "is_int" | "is_integer" | "is_long" => TypeCheck::Long,
            "is_float" | "is_double" => TypeCheck::Double,
            "is_string" => TypeCheck::String,
            "is_bool" => TypeCheck::Bool,
            "is_array" => TypeCheck::Array,
            "is_object" => TypeCheck::Object,
            "is_numeric" => TypeCheck::Numeric,
            _ => return None,
        };
        Some(check)
    }

    fn accepts(self, ty: &TypeRef) -> bool {
        match self {
            TypeCheck::Null => matches!(ty, TypeRef::Null),
            TypeCheck::Long => matches!(ty, TypeRef::Long),
            TypeCheck::Double => matches!(ty, TypeRef::Double),
            TypeCheck::String => matches!(ty, TypeRef::String),
            TypeCheck::Bool => matches!(ty, TypeRef::Bool),
            TypeCheck::Array => ty.is_array(),
            TypeCheck::Object => ty.is_class(),
            TypeCheck::Numeric => matches!(ty, TypeRef::Long | TypeRef::Double | TypeRef::String),
        }
    }

    /// Narrowed mask when nothing is known about the value
    fn unknown_mask(self, types: &mut TypeRefContext) -> TypeRefMask {
        match self {
            TypeCheck::Null => types.get_null_type_mask(),
            TypeCheck::Long => types.get_long_type_mask(),
            TypeCheck::Double => types.get_double_type_mask(),
            TypeCheck::String => types.get_string_type_mask(),
            TypeCheck::Bool => types.get_boolean_type_mask(),
            TypeCheck::Array => types.get_generic_array_mask(),
            TypeCheck::Object => TypeRefMask::ANY,
            TypeCheck::Numeric => types.get_number_type_mask() | types.get_string_type_mask(),
        }
    }
}

impl<'a> ExpressionAnalysis<'a> {
    /// Visit `id` assuming `branch`; the state afterwards holds on that branch only
    pub(crate) fn visit_condition(&mut self, id: ExprId, branch: ConditionBranch) -> TypeRefMask {
        if branch == ConditionBranch::Default {
            return self.visit(id, Access::Read);
        }
        match self.expr(id) {
            BoundExpr::Logical { op, left, right } => {
                let mask = self.visit_logical(*op, *left, *right, branch);
                self.flow.record_expr(id, mask);
                mask
            }
            BoundExpr::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                self.visit_condition(*operand, branch.flip());
                let mask = self.flow.types().get_boolean_type_mask();
                self.flow.record_expr(id, mask);
                mask
            }
            _ => {
                let mask = self.visit(id, Access::Read);
                self.narrow(id, branch);
                mask
            }
        }
    }

    /// `left && right` / `left || right` under `branch`
    pub(crate) fn visit_logical(
        &mut self,
        op: LogicalOp,
        left: ExprId,
        right: ExprId,
        branch: ConditionBranch,
    ) -> TypeRefMask {
        // outcome of `left` that makes `right` execute
        let (runs_right, skips_right) = match op {
            LogicalOp::And => (ConditionBranch::ToTrue, ConditionBranch::ToFalse),
            LogicalOp::Or => (ConditionBranch::ToFalse, ConditionBranch::ToTrue),
        };
        if branch == runs_right {
            self.visit_condition(left, runs_right);
            self.visit_condition(right, branch);
        } else {
            let before = self.state.clone();
            self.visit_condition(left, runs_right);
            self.visit_condition(right, branch);
            let evaluated = mem::replace(&mut self.state, before);
            self.visit_condition(left, skips_right);
            self.state.merge_with(&evaluated);
        }
        self.flow.types().get_boolean_type_mask()
    }

    fn narrow(&mut self, id: ExprId, branch: ConditionBranch) {
        let to_true = branch == ConditionBranch::ToTrue;
        match self.expr(id) {
            BoundExpr::Variable(variable) if to_true => self.assume_not_null(*variable),
            BoundExpr::Assign { target, .. } if to_true => {
                if let Some(variable) = self.variable_of(*target) {
                    let mask = self.flow.types().without_null(self.state.get_local_type(variable));
                    self.narrow_to(variable, mask);
                }
            }
            BoundExpr::InstanceOf { operand, class } => {
                let Some(variable) = self.variable_of(*operand) else {
                    return;
                };
                if let Some(class) = self.static_class_name(class) {
                    self.narrow_instance_of(variable, &class, to_true);
                }
            }
            BoundExpr::Isset { operands } => {
                if to_true {
                    for operand in operands {
                        if let Some(variable) = self.variable_of(*operand) {
                            self.assume_not_null(variable);
                        }
                    }
                } else if let [operand] = operands.as_slice() {
                    if let Some(variable) = self.variable_of(*operand) {
                        let types = self.flow.types();
                        if types.may_be_null(self.state.get_local_type(variable)) {
                            let null = types.get_null_type_mask();
                            self.narrow_to(variable, null);
                        }
                    }
                }
            }
            BoundExpr::Empty { operand } if !to_true => {
                if let Some(variable) = self.variable_of(*operand) {
                    self.assume_not_null(variable);
                }
            }
            BoundExpr::Binary { op, left, right } => self.narrow_comparison(*op, *left, *right, to_true),
            BoundExpr::Call { name, args } => {
                if let (Some(check), [argument]) = (TypeCheck::from_function(name), args.as_slice()) {
                    self.narrow_type_check(check, argument, to_true);
                }
            }
            _ => {}
        }
    }

    fn narrow_comparison(&mut self, op: BinaryOp, left: ExprId, right: ExprId, to_true: bool) {
        match op {
            BinaryOp::Identical | BinaryOp::NotIdentical | BinaryOp::Equal | BinaryOp::NotEqual => {
                let variable = if self.is_null_literal(right) {
                    self.variable_of(left)
                } else if self.is_null_literal(left) {
                    self.variable_of(right)
                } else {
                    None
                };
                let Some(variable) = variable else {
                    return;
                };
                let is_null = match op {
                    BinaryOp::Identical => Some(to_true),
                    BinaryOp::NotIdentical => Some(!to_true),
                    // `$x == null` also holds for other falsy values
                    BinaryOp::Equal if !to_true => Some(false),
                    BinaryOp::NotEqual if to_true => Some(false),
                    _ => None,
                };
                match is_null {
                    Some(true) => {
                        let null = self.flow.types().get_null_type_mask();
                        self.narrow_to(variable, null);
                    }
                    Some(false) => self.assume_not_null(variable),
                    None => {}
                }
            }
            BinaryOp::Less if to_true => self.record_upper_bound(left, right),
            BinaryOp::Greater if to_true => self.record_upper_bound(right, left),
            _ => {}
        }
    }

    /// `counter < bound` holds: a long counter stays below `i64::MAX`
    fn record_upper_bound(&mut self, counter: ExprId, bound: ExprId) {
        let Some(variable) = self.variable_of(counter) else {
            return;
        };
        let types = self.flow.types();
        if types.is_long_only(self.state.get_local_type(variable)) && types.is_long_only(self.flow.expr_mask(bound)) {
            self.state.set_less_than_long_max(variable, true);
        }
    }

    fn narrow_instance_of(&mut self, variable: VariableHandle, class: &Name, to_true: bool) {
        let current = self.state.get_local_type(variable);
        let oracle = self.oracle;
        let types = self.flow.types_mut();
        let is_instance = |ty: &TypeRef| match ty {
            TypeRef::Class { name } => oracle.is_subclass_of(name, class),
            _ => false,
        };
        let narrowed = if to_true {
            if current.is_any() || current.is_empty() {
                types.get_class_type_mask(class, true)
            } else {
                let kept = types.filter_types(current, is_instance);
                let classes = types.get_object_types(current).len();
                if types.is_object_only(kept) && classes == kept.type_count() as usize {
                    kept
                } else {
                    kept | types.get_class_type_mask(class, true)
                }
            }
        } else {
            types.filter_types(current, |ty| !is_instance(ty))
        };
        self.narrow_to(variable, narrowed);
    }

    fn narrow_type_check(&mut self, check: TypeCheck, argument: &Argument, to_true: bool) {
        if argument.unpack {
            return;
        }
        let Some(variable) = self.variable_of(argument.value) else {
            return;
        };
        let current = self.state.get_local_type(variable);
        let types = self.flow.types_mut();
        let narrowed = if to_true {
            let kept = types.filter_types(current, |ty| check.accepts(ty));
            if current.is_any() || current.is_empty() {
                check.unknown_mask(types)
            } else if kept.is_empty() {
                current
            } else {
                kept
            }
        } else {
            types.filter_types(current, |ty| !check.accepts(ty))
        };
        if to_true && check != TypeCheck::Null {
            self.state.set_var_initialized(variable);
        }
        self.narrow_to(variable, narrowed);
    }

    /// The value is known to be set and not null
    fn assume_not_null(&mut self, variable: VariableHandle) {
        let mask = self.flow.types().without_null(self.state.get_local_type(variable));
        self.narrow_to(variable, mask);
        self.state.set_var_initialized(variable);
    }

    /// Narrow unless that would leave no possible value
    fn narrow_to(&mut self, variable: VariableHandle, mask: TypeRefMask) {
        if !mask.is_empty() {
            self.state.narrow_local_type(variable, mask);
        }
    }

    fn variable_of(&self, id: ExprId) -> Option<VariableHandle> {
        match self.expr(id) {
            BoundExpr::Variable(variable) => Some(*variable),
            _ => None,
        }
    }

    fn is_null_literal(&self, id: ExprId) -> bool {
        match self.expr(id) {
            BoundExpr::Literal(Literal::Null) => true,
            BoundExpr::Constant { name } => name.matches("null"),
            _ => false,
        }
    }

    /// Class named by `class` when it is known without running code
    fn static_class_name(&self, class: &ClassRef) -> Option<Name> {
        match class {
            ClassRef::Named(name) => Some(name.clone()),
            ClassRef::SelfClass | ClassRef::Static => self.self_class(),
            ClassRef::Parent => {
                let own = self.self_class()?;
                self.oracle.class(&own)?.base.clone()
            }
            ClassRef::Dynamic(_) => None,
        }
    }
}
