//! Bitset masks over a routine's type-ref table
//!
//! A [`TypeRefMask`] is only meaningful together with the
//! [`TypeRefContext`](super::TypeRefContext) that produced it: bit `i` stands
//! for the `i`-th interned type ref of that context. Comparing or combining
//! masks of two different contexts is a precondition violation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Number of type refs a single context can address
pub const MAX_TYPE_REFS: usize = 60;

const TYPES: u64 = (1 << MAX_TYPE_REFS) - 1;
const ANY: u64 = 1 << 60;
const SUBCLASSES: u64 = 1 << 61;
const VOID: u64 = 1 << 62;
const REF: u64 = 1 << 63;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TypeRefMask(u64);

impl TypeRefMask {
    /// No value shape at all (lattice bottom)
    pub const EMPTY: TypeRefMask = TypeRefMask(0);
    /// Any value shape (lattice top)
    pub const ANY: TypeRefMask = TypeRefMask(ANY);

    pub fn from_index(index: usize) -> Self {
        debug_assert!(index < MAX_TYPE_REFS, "type ref index {index} out of range");
        TypeRefMask(1 << index)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub fn is_any(self) -> bool {
        self.0 & ANY != 0
    }

    /// True when no type bit and no ANY bit is set (flags are ignored)
    pub fn is_empty(self) -> bool {
        self.0 & (TYPES | ANY) == 0
    }

    pub fn is_ref(self) -> bool {
        self.0 & REF != 0
    }

    pub fn is_void(self) -> bool {
        self.0 & VOID != 0
    }

    pub fn includes_subclasses(self) -> bool {
        self.0 & SUBCLASSES != 0
    }

    pub fn with_ref(self, is_ref: bool) -> Self {
        self.with_flag(REF, is_ref)
    }

    pub fn with_void(self, is_void: bool) -> Self {
        self.with_flag(VOID, is_void)
    }

    pub fn with_subclasses(self, includes: bool) -> Self {
        self.with_flag(SUBCLASSES, includes)
    }

    fn with_flag(self, flag: u64, set: bool) -> Self {
        if set {
            TypeRefMask(self.0 | flag)
        } else {
            TypeRefMask(self.0 & !flag)
        }
    }

    pub fn has_type(self, index: usize) -> bool {
        index < MAX_TYPE_REFS && self.0 & (1 << index) != 0
    }

    pub fn type_count(self) -> u32 {
        (self.0 & TYPES).count_ones()
    }

    pub fn is_single_type(self) -> bool {
        !self.is_any() && self.type_count() == 1
    }

    /// Indices of the type refs present in this mask
    pub fn types(self) -> TypeIndices {
        TypeIndices(self.0 & TYPES)
    }

    /// Mask with the flags stripped, keeping type bits and ANY
    pub fn shape(self) -> Self {
        TypeRefMask(self.0 & (TYPES | ANY))
    }

    /// Least upper bound; ANY absorbs every type bit
    pub fn union(self, other: TypeRefMask) -> Self {
        normalize(self.0 | other.0)
    }

    /// Clear the type bits of `other`; ANY stays ANY
    pub fn without(self, other: TypeRefMask) -> Self {
        if self.is_any() {
            return self;
        }
        TypeRefMask(self.0 & !(other.0 & TYPES))
    }

    /// Every value shape of `other` is also a shape of `self`
    pub fn contains(self, other: TypeRefMask) -> bool {
        if self.is_any() {
            return true;
        }
        if other.is_any() {
            return false;
        }
        other.0 & TYPES & !self.0 == 0
    }
}

fn normalize(bits: u64) -> TypeRefMask {
    if bits & ANY != 0 {
        TypeRefMask(bits & !TYPES)
    } else {
        TypeRefMask(bits)
    }
}

impl BitOr for TypeRefMask {
    type Output = TypeRefMask;

    fn bitor(self, rhs: TypeRefMask) -> TypeRefMask {
        self.union(rhs)
    }
}

impl BitOrAssign for TypeRefMask {
    fn bitor_assign(&mut self, rhs: TypeRefMask) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for TypeRefMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRefMask({:#x})", self.0)
    }
}

/// Iterator over set type-ref indices, lowest first
#[derive(Debug, Clone)]
pub struct TypeIndices(u64);

impl Iterator for TypeIndices {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        let index = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_any_absorbs_union() {
        let long = TypeRefMask::from_index(2);
        let joined = long | TypeRefMask::ANY;
        assert!(joined.is_any());
        assert_eq!(joined.type_count(), 0);
        assert_eq!(joined, TypeRefMask::ANY);
    }

    #[test]
    fn test_flags_survive_union() {
        let a = TypeRefMask::from_index(0).with_ref(true);
        let b = TypeRefMask::ANY.with_void(true);
        let joined = a | b;
        assert!(joined.is_ref());
        assert!(joined.is_void());
        assert!(joined.is_any());
    }

    #[test]
    fn test_empty_ignores_flags() {
        assert!(TypeRefMask::EMPTY.with_void(true).is_empty());
        assert!(!TypeRefMask::ANY.is_empty());
    }

    #[test]
    fn test_without_keeps_any() {
        let null = TypeRefMask::from_index(0);
        assert_eq!(TypeRefMask::ANY.without(null), TypeRefMask::ANY);
        let both = null | TypeRefMask::from_index(2);
        assert_eq!(both.without(null), TypeRefMask::from_index(2));
    }

    #[test]
    fn test_type_indices_in_order() {
        let mask = TypeRefMask::from_index(4) | TypeRefMask::from_index(1) | TypeRefMask::from_index(59);
        assert_eq!(mask.types().collect::<Vec<_>>(), vec![1, 4, 59]);
    }

    fn any_mask() -> impl Strategy<Value = TypeRefMask> {
        prop_oneof![
            (0u64..(1 << MAX_TYPE_REFS)).prop_map(TypeRefMask),
            Just(TypeRefMask::ANY),
        ]
    }

    proptest! {
        #[test]
        fn prop_union_is_commutative(a in any_mask(), b in any_mask()) {
            prop_assert_eq!(a | b, b | a);
        }

        #[test]
        fn prop_union_is_idempotent(a in any_mask()) {
            prop_assert_eq!(a | a, a);
        }

        #[test]
        fn prop_union_is_upper_bound(a in any_mask(), b in any_mask()) {
            let joined = a | b;
            prop_assert!(joined.contains(a));
            prop_assert!(joined.contains(b));
        }
    }
}
