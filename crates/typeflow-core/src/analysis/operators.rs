//! Result types of operators
//!
//! Pure functions over masks of one context. Operand facts that need the
//! flow state (such as a bounded loop counter) are computed by the walker
//! and passed in.

use crate::bound::{BinaryOp, CastKind, UnaryOp};
use crate::symbols::Name;
use crate::types::{TypeRef, TypeRefContext, TypeRefMask};

/// Mask of `left op right`
///
/// `bounded_increment` is set when one operand is a long proven below
/// `i64::MAX` and the other is the literal `1`, so `+` cannot overflow.
pub(crate) fn binary_result(
    types: &mut TypeRefContext,
    op: BinaryOp,
    left: TypeRefMask,
    right: TypeRefMask,
    bounded_increment: bool,
) -> TypeRefMask {
    match op {
        BinaryOp::Add => add_result(types, left, right, bounded_increment),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Pow | BinaryOp::Div => {
            if types.is_double_only(left) || types.is_double_only(right) {
                types.get_double_type_mask()
            } else {
                types.get_number_type_mask()
            }
        }
        BinaryOp::Mod | BinaryOp::ShiftLeft | BinaryOp::ShiftRight | BinaryOp::Spaceship => {
            types.get_long_type_mask()
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            if types.is_string_only(left) && types.is_string_only(right) {
                types.get_string_type_mask()
            } else {
                types.get_long_type_mask()
            }
        }
        BinaryOp::Concat => types.get_string_type_mask(),
        BinaryOp::Equal
        | BinaryOp::NotEqual
        | BinaryOp::Identical
        | BinaryOp::NotIdentical
        | BinaryOp::Less
        | BinaryOp::LessEqual
        | BinaryOp::Greater
        | BinaryOp::GreaterEqual
        | BinaryOp::LogicalXor => types.get_boolean_type_mask(),
    }
}

fn add_result(
    types: &mut TypeRefContext,
    left: TypeRefMask,
    right: TypeRefMask,
    bounded_increment: bool,
) -> TypeRefMask {
    if types.is_array_only(left) && types.is_array_only(right) {
        return (left | right).shape();
    }
    if types.is_double_only(left) || types.is_double_only(right) {
        return types.get_double_type_mask();
    }
    if bounded_increment {
        return types.get_long_type_mask();
    }
    if types.is_number_only(left) || types.is_number_only(right) {
        return types.get_number_type_mask();
    }
    let mut result = types.get_number_type_mask();
    if types.may_be_array(left) && types.may_be_array(right) {
        result |= types.get_generic_array_mask();
    }
    result
}

pub(crate) fn unary_result(types: &mut TypeRefContext, op: UnaryOp, operand: TypeRefMask) -> TypeRefMask {
    match op {
        UnaryOp::Not => types.get_boolean_type_mask(),
        UnaryOp::Minus => {
            if types.is_double_only(operand) {
                types.get_double_type_mask()
            } else {
                types.get_number_type_mask()
            }
        }
        UnaryOp::Plus => {
            if types.is_long_only(operand) {
                types.get_long_type_mask()
            } else if types.is_double_only(operand) {
                types.get_double_type_mask()
            } else {
                types.get_number_type_mask()
            }
        }
        UnaryOp::BitNot => {
            if types.is_string_only(operand) {
                types.get_string_type_mask()
            } else {
                types.get_long_type_mask()
            }
        }
        UnaryOp::Silence => operand,
        UnaryOp::Cast(kind) => cast_result(types, kind, operand),
    }
}

fn cast_result(types: &mut TypeRefContext, kind: CastKind, operand: TypeRefMask) -> TypeRefMask {
    match kind {
        CastKind::Bool => types.get_boolean_type_mask(),
        CastKind::Long => types.get_long_type_mask(),
        CastKind::Double => types.get_double_type_mask(),
        CastKind::String => types.get_string_type_mask(),
        CastKind::Array if types.is_array_only(operand) => operand.shape(),
        CastKind::Array => types.get_generic_array_mask(),
        CastKind::Object if types.is_object_only(operand) => operand.with_ref(false),
        CastKind::Object => types.get_class_type_mask(&Name::new("stdClass"), false),
        CastKind::Unset => types.get_null_type_mask(),
    }
}

/// Mask after `++` / `--` applied to a value of `current`
pub(crate) fn inc_dec_result(
    types: &TypeRefContext,
    current: TypeRefMask,
    increment: bool,
    bounded: bool,
) -> TypeRefMask {
    if current.is_any() {
        return TypeRefMask::ANY;
    }
    let null_result = if increment {
        types.get_long_type_mask()
    } else {
        types.get_null_type_mask()
    };
    if current.is_empty() {
        return null_result;
    }
    let mut result = TypeRefMask::EMPTY;
    for index in current.types() {
        result |= match types.type_ref(index) {
            Some(TypeRef::Long) if bounded => types.get_long_type_mask(),
            Some(TypeRef::Long) => types.get_number_type_mask(),
            Some(TypeRef::Null) => null_result,
            Some(TypeRef::String) => types.get_string_type_mask() | types.get_number_type_mask(),
            // double, bool, arrays, objects and resources keep their type
            _ => TypeRefMask::from_index(index),
        };
    }
    result
}
