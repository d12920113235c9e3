//! Expression dispatch
//!
//! One `match` over the closed set of bound expressions. Every visit records
//! the resulting mask on the node, so repeated visits of the same expression
//! (loops, both outcomes of a condition) widen it.

use super::{operators, Access, ConditionBranch, ExpressionAnalysis};
use crate::bound::{ArrayItem, BinaryOp, BoundExpr, ExprId, Literal, RoutineKind, VariableHandle};
use crate::symbols::Name;
use crate::types::{TypeRef, TypeRefMask};
use std::mem;

impl<'a> ExpressionAnalysis<'a> {
    pub(crate) fn visit(&mut self, id: ExprId, access: Access) -> TypeRefMask {
        let mask = match self.expr(id) {
            BoundExpr::Literal(literal) => self.literal_mask(literal),
            BoundExpr::Variable(variable) => self.visit_variable(id, *variable, access),
            BoundExpr::VariableVariable { name } => {
                self.visit(*name, Access::Read);
                if !access.is_read() {
                    self.state.set_all_unknown(true);
                }
                self.flow.set_uses_dynamic_locals();
                TypeRefMask::ANY
            }
            BoundExpr::Assign { target, value } => self.visit_assign(*target, *value),
            BoundExpr::AssignRef { target, value } => {
                self.visit(*value, Access::ReadRef);
                self.visit(*target, Access::ReadRef);
                TypeRefMask::ANY.with_ref(true)
            }
            BoundExpr::CompoundAssign { op, target, value } => {
                let current = self.visit(*target, Access::Read);
                let operand = self.visit(*value, Access::Read);
                let bounded = *op == BinaryOp::Add && self.is_bounded_increment(*target, *value);
                let result = operators::binary_result(self.flow.types_mut(), *op, current, operand, bounded);
                self.visit(*target, Access::Write(result));
                result
            }
            BoundExpr::IncDec {
                target,
                increment,
                prefix,
            } => {
                let current = self.visit(*target, Access::Read);
                let bounded = *increment && self.is_bounded_counter(*target);
                let updated = operators::inc_dec_result(self.flow.types(), current, *increment, bounded);
                self.visit(*target, Access::Write(updated));
                if *prefix {
                    updated
                } else {
                    current
                }
            }
            BoundExpr::Binary { op, left, right } => {
                let left_mask = self.visit(*left, Access::Read);
                let right_mask = self.visit(*right, Access::Read);
                let bounded = *op == BinaryOp::Add
                    && (self.is_bounded_increment(*left, *right) || self.is_bounded_increment(*right, *left));
                operators::binary_result(self.flow.types_mut(), *op, left_mask, right_mask, bounded)
            }
            BoundExpr::Logical { op, left, right } => self.visit_logical(*op, *left, *right, ConditionBranch::Default),
            BoundExpr::Unary { op, operand } => {
                let operand = self.visit(*operand, Access::Read);
                operators::unary_result(self.flow.types_mut(), *op, operand)
            }
            BoundExpr::Conditional {
                condition,
                if_true,
                if_false,
            } => self.visit_ternary(*condition, *if_true, *if_false),
            BoundExpr::Coalesce { left, right } => {
                let left_mask = self.visit(*left, Access::ReadQuiet);
                let skipped = self.state.clone();
                let right_mask = self.visit(*right, Access::Read);
                self.state.merge_with(&skipped);
                self.flow.types().without_null(left_mask) | right_mask
            }
            BoundExpr::Array { items } => self.visit_array_literal(items),
            BoundExpr::List { items } => {
                if let Access::Write(mask) = access {
                    let element = self.flow.types().get_array_element_mask(mask);
                    for item in items.iter().flatten() {
                        self.visit(*item, Access::Write(element));
                    }
                    mask
                } else {
                    for item in items.iter().flatten() {
                        self.visit(*item, Access::Read);
                    }
                    self.flow.types_mut().get_generic_array_mask()
                }
            }
            BoundExpr::ItemAccess { array, index } => self.visit_item(*array, *index, access),
            BoundExpr::FieldAccess { instance, field } => {
                let receiver = self.visit(*instance, Access::Read);
                match access {
                    Access::Write(mask) => mask,
                    Access::ReadRef => TypeRefMask::ANY.with_ref(true),
                    Access::Read | Access::ReadQuiet => self.instance_field_mask(receiver, field),
                }
            }
            BoundExpr::StaticFieldAccess { class, field } => {
                let resolved = self.resolve_class_ref(class);
                match access {
                    Access::Write(mask) => mask,
                    Access::ReadRef => TypeRefMask::ANY.with_ref(true),
                    Access::Read | Access::ReadQuiet => match resolved {
                        Some((class, _)) => self.declared_field_mask(&class, field),
                        None => TypeRefMask::ANY,
                    },
                }
            }
            BoundExpr::InstanceOf { operand, class } => {
                self.visit(*operand, Access::Read);
                self.resolve_class_ref(class);
                self.flow.types().get_boolean_type_mask()
            }
            BoundExpr::Isset { operands } => {
                for operand in operands {
                    self.visit(*operand, Access::ReadQuiet);
                }
                self.flow.types().get_boolean_type_mask()
            }
            BoundExpr::Empty { operand } => {
                self.visit(*operand, Access::ReadQuiet);
                self.flow.types().get_boolean_type_mask()
            }
            BoundExpr::Call { name, args } => self.visit_function_call(id, name, args),
            BoundExpr::DynamicCall { callee, args } => {
                self.visit(*callee, Access::Read);
                self.visit_dynamic_call(id, args)
            }
            BoundExpr::MethodCall { receiver, name, args } => self.visit_method_call(id, *receiver, name, args),
            BoundExpr::StaticCall { class, name, args } => self.visit_static_call(id, class, name, args),
            BoundExpr::New { class, args } => self.visit_new(id, class, args),
            BoundExpr::Closure { uses, .. } => {
                for capture in uses {
                    if capture.by_ref {
                        self.state.mark_local_by_ref(capture.variable);
                    }
                }
                self.flow.types_mut().get_class_type_mask(&Name::new("Closure"), false)
            }
            BoundExpr::Eval { code: operand } | BoundExpr::Include { path: operand } => {
                self.visit(*operand, Access::Read);
                self.state.set_all_unknown(true);
                self.flow.set_uses_dynamic_locals();
                TypeRefMask::ANY
            }
            BoundExpr::Yield { key, value } => {
                for operand in key.iter().chain(value.iter()) {
                    self.visit(*operand, Access::Read);
                }
                self.flow.set_is_generator();
                TypeRefMask::ANY
            }
            BoundExpr::YieldFrom { source } => {
                self.visit(*source, Access::Read);
                self.flow.set_is_generator();
                TypeRefMask::ANY
            }
            BoundExpr::Constant { name } => self.constant_mask(name),
        };
        self.flow.record_expr(id, mask);
        mask
    }

    fn literal_mask(&self, literal: &Literal) -> TypeRefMask {
        let types = self.flow.types();
        match literal {
            Literal::Null => types.get_null_type_mask(),
            Literal::Bool(_) => types.get_boolean_type_mask(),
            Literal::Long(_) => types.get_long_type_mask(),
            Literal::Double(_) => types.get_double_type_mask(),
            Literal::String(_) => types.get_string_type_mask(),
        }
    }

    fn constant_mask(&self, name: &Name) -> TypeRefMask {
        let types = self.flow.types();
        match name.key() {
            "true" | "false" => types.get_boolean_type_mask(),
            "null" => types.get_null_type_mask(),
            "php_int_max" | "php_int_min" | "php_int_size" => types.get_long_type_mask(),
            "php_eol" | "php_version" | "directory_separator" | "php_os" => types.get_string_type_mask(),
            "m_pi" | "m_e" | "php_float_epsilon" | "php_float_max" | "nan" | "inf" => types.get_double_type_mask(),
            _ => TypeRefMask::ANY,
        }
    }

    fn visit_variable(&mut self, id: ExprId, variable: VariableHandle, access: Access) -> TypeRefMask {
        match access {
            Access::Write(mask) => {
                self.state.set_local_type(variable, mask);
                self.state.get_local_type(variable)
            }
            Access::ReadRef => {
                self.state.mark_local_by_ref(variable);
                self.state.get_local_type(variable)
            }
            Access::Read | Access::ReadQuiet => {
                if self.state.is_local_set(variable) {
                    return self.state.get_local_type(variable);
                }
                if self.flow.kind() == RoutineKind::GlobalCode {
                    self.state.set_local_type(variable, TypeRefMask::ANY);
                    return TypeRefMask::ANY;
                }
                if access == Access::Read {
                    self.flow.mark_maybe_uninitialized(id);
                }
                self.state.get_local_type(variable) | self.flow.types().get_null_type_mask()
            }
        }
    }

    fn visit_assign(&mut self, target: ExprId, value: ExprId) -> TypeRefMask {
        let mask = self.visit(value, Access::Read).with_ref(false);
        self.visit(target, Access::Write(mask));
        if let (BoundExpr::Variable(variable), BoundExpr::Literal(Literal::Long(n))) =
            (self.expr(target), self.expr(value))
        {
            self.state.set_less_than_long_max(*variable, *n < i64::MAX);
        }
        mask
    }

    /// `counter` is a variable holding a long proven below `i64::MAX`
    fn is_bounded_counter(&self, counter: ExprId) -> bool {
        match self.expr(counter) {
            BoundExpr::Variable(variable) => {
                self.state.is_less_than_long_max(*variable)
                    && self.flow.types().is_long_only(self.state.get_local_type(*variable))
            }
            _ => false,
        }
    }

    /// `counter + step` cannot overflow
    fn is_bounded_increment(&self, counter: ExprId, step: ExprId) -> bool {
        matches!(self.expr(step), BoundExpr::Literal(Literal::Long(1))) && self.is_bounded_counter(counter)
    }

    fn visit_ternary(&mut self, condition: ExprId, if_true: Option<ExprId>, if_false: ExprId) -> TypeRefMask {
        let before = self.state.clone();
        let condition_mask = self.visit_condition(condition, ConditionBranch::ToTrue);
        let true_mask = match if_true {
            Some(value) => self.visit(value, Access::Read),
            None => self.flow.types().without_null(condition_mask),
        };
        let true_state = mem::replace(&mut self.state, before);
        self.visit_condition(condition, ConditionBranch::ToFalse);
        let false_mask = self.visit(if_false, Access::Read);
        self.state.merge_with(&true_state);
        true_mask | false_mask
    }

    fn visit_array_literal(&mut self, items: &[ArrayItem]) -> TypeRefMask {
        let mut element = TypeRefMask::EMPTY;
        for item in items {
            if let Some(key) = item.key {
                self.visit(key, Access::Read);
            }
            let access = if item.by_ref { Access::ReadRef } else { Access::Read };
            let value = self.visit(item.value, access);
            element |= if item.unpack {
                self.flow.types().get_array_element_mask(value)
            } else {
                value
            };
        }
        self.flow.types_mut().get_array_type_mask(element)
    }

    fn visit_item(&mut self, array: ExprId, index: Option<ExprId>, access: Access) -> TypeRefMask {
        if let Some(index) = index {
            self.visit(index, Access::Read);
        }
        match access {
            Access::Read | Access::ReadQuiet => {
                let container = self.visit(array, access);
                let types = self.flow.types();
                types.get_array_element_mask(container) | types.get_null_type_mask()
            }
            Access::Write(mask) => {
                self.write_item(array, mask);
                mask
            }
            Access::ReadRef => {
                let mask = TypeRefMask::ANY.with_ref(true);
                self.write_item(array, mask);
                mask
            }
        }
    }

    /// Store `value` into an element of `array` and write the grown
    /// container back to its own location
    fn write_item(&mut self, array: ExprId, value: TypeRefMask) {
        let container = self.peek(array);
        let rebuilt = self.rebuild_container(container, value);
        self.visit(array, Access::Write(rebuilt));
    }

    /// Current mask of an lvalue, without visiting it
    pub(crate) fn peek(&self, id: ExprId) -> TypeRefMask {
        match self.expr(id) {
            BoundExpr::Variable(variable) => self.state.get_local_type(*variable),
            BoundExpr::ItemAccess { array, .. } => self.flow.types().get_array_element_mask(self.peek(*array)),
            _ => TypeRefMask::ANY,
        }
    }

    fn rebuild_container(&mut self, container: TypeRefMask, value: TypeRefMask) -> TypeRefMask {
        if container.is_any() {
            return TypeRefMask::ANY;
        }
        let types = self.flow.types_mut();
        if container.is_empty() {
            // autovivification of an unassigned location
            return types.get_array_type_mask(value);
        }
        let refs: Vec<(usize, TypeRef)> = container
            .types()
            .filter_map(|i| types.type_ref(i).cloned().map(|t| (i, t)))
            .collect();
        let mut result = TypeRefMask::EMPTY;
        for (index, ty) in refs {
            result |= match ty {
                TypeRef::Array { elem } => types.get_array_type_mask(elem | value),
                TypeRef::Null | TypeRef::Bool => types.get_array_type_mask(value),
                // strings, objects (ArrayAccess) and scalars keep their type
                _ => TypeRefMask::from_index(index),
            };
        }
        result
    }

    fn instance_field_mask(&mut self, receiver: TypeRefMask, field: &str) -> TypeRefMask {
        if receiver.is_any() {
            return TypeRefMask::ANY;
        }
        let classes = self.flow.types().get_object_types(receiver);
        if classes.is_empty() {
            return TypeRefMask::ANY;
        }
        let mut mask = TypeRefMask::EMPTY;
        for class in &classes {
            mask |= self.declared_field_mask(class, field);
        }
        mask
    }

    fn declared_field_mask(&mut self, class: &Name, field: &str) -> TypeRefMask {
        match self.oracle.field(class, field).and_then(|f| f.hint.as_ref()) {
            Some(hint) => self.flow.types_mut().type_hint_mask(hint),
            None => TypeRefMask::ANY,
        }
    }
}
