//! Per-routine registry of type refs
//!
//! Implements the type universe of one routine:
//! - Primitive refs are pre-interned at fixed indices
//! - Classes and arrays are interned on first use
//! - Interning past the cap degrades to ANY
//! - Lattice queries (union, narrowing, subtyping) never intern

use super::mask::{TypeRefMask, MAX_TYPE_REFS};
use crate::symbols::{Name, SymbolOracle, TypeHint};
use fnv::FnvHashMap;
use serde::Serialize;
use tracing::warn;

pub(crate) const NULL_INDEX: usize = 0;
pub(crate) const BOOL_INDEX: usize = 1;
pub(crate) const LONG_INDEX: usize = 2;
pub(crate) const DOUBLE_INDEX: usize = 3;
pub(crate) const STRING_INDEX: usize = 4;
pub(crate) const RESOURCE_INDEX: usize = 5;
const PRIMITIVE_COUNT: usize = 6;

/// Identity of a [`TypeRefContext`]; states and masks never cross it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ContextId(pub u32);

/// One entry of a routine's type universe
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Null,
    Bool,
    Long,
    Double,
    String,
    Resource,
    Array { elem: TypeRefMask },
    Class { name: Name },
}

impl TypeRef {
    pub fn is_array(&self) -> bool {
        matches!(self, TypeRef::Array { .. })
    }

    pub fn is_class(&self) -> bool {
        matches!(self, TypeRef::Class { .. })
    }
}

/// Context-free description of a mask, used to publish results across routines
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TypeSummary {
    pub any: bool,
    pub is_ref: bool,
    pub void: bool,
    pub subclasses: bool,
    pub types: Vec<TypeDesc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TypeDesc {
    Null,
    Bool,
    Long,
    Double,
    String,
    Resource,
    Array(Box<TypeSummary>),
    Class(Name),
}

impl TypeSummary {
    pub fn any() -> Self {
        Self {
            any: true,
            ..Self::default()
        }
    }

    /// Nothing is known yet (the routine has not produced a value)
    pub fn is_empty(&self) -> bool {
        !self.any && self.types.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TypeRefContext {
    id: ContextId,
    refs: Vec<TypeRef>,
    index: FnvHashMap<TypeRef, usize>,
    cap: usize,
    self_class: Option<Name>,
    overflowed: bool,
}

impl TypeRefContext {
    pub fn new(id: ContextId, cap: usize) -> Self {
        let mut context = Self {
            id,
            refs: Vec::with_capacity(PRIMITIVE_COUNT),
            index: FnvHashMap::default(),
            cap: cap.clamp(PRIMITIVE_COUNT + 1, MAX_TYPE_REFS),
            self_class: None,
            overflowed: false,
        };
        for primitive in [
            TypeRef::Null,
            TypeRef::Bool,
            TypeRef::Long,
            TypeRef::Double,
            TypeRef::String,
            TypeRef::Resource,
        ] {
            context.intern(primitive);
        }
        context
    }

    pub fn with_self_class(mut self, class: Option<Name>) -> Self {
        self.self_class = class;
        self
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn self_class(&self) -> Option<&Name> {
        self.self_class.as_ref()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Whether some type ref was dropped because the table was full
    pub fn has_overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn type_ref(&self, index: usize) -> Option<&TypeRef> {
        self.refs.get(index)
    }

    fn intern(&mut self, ty: TypeRef) -> TypeRefMask {
        if let Some(&index) = self.index.get(&ty) {
            return TypeRefMask::from_index(index);
        }
        if self.refs.len() >= self.cap {
            if !self.overflowed {
                warn!(context = self.id.0, cap = self.cap, "type-ref table full, degrading to mixed");
                self.overflowed = true;
            }
            return TypeRefMask::ANY;
        }
        let index = self.refs.len();
        self.refs.push(ty.clone());
        self.index.insert(ty, index);
        TypeRefMask::from_index(index)
    }

    pub fn get_null_type_mask(&self) -> TypeRefMask {
        TypeRefMask::from_index(NULL_INDEX)
    }

    pub fn get_boolean_type_mask(&self) -> TypeRefMask {
        TypeRefMask::from_index(BOOL_INDEX)
    }

    pub fn get_long_type_mask(&self) -> TypeRefMask {
        TypeRefMask::from_index(LONG_INDEX)
    }

    pub fn get_double_type_mask(&self) -> TypeRefMask {
        TypeRefMask::from_index(DOUBLE_INDEX)
    }

    /// `long|double`
    pub fn get_number_type_mask(&self) -> TypeRefMask {
        self.get_long_type_mask() | self.get_double_type_mask()
    }

    pub fn get_string_type_mask(&self) -> TypeRefMask {
        TypeRefMask::from_index(STRING_INDEX)
    }

    pub fn get_resource_type_mask(&self) -> TypeRefMask {
        TypeRefMask::from_index(RESOURCE_INDEX)
    }

    /// Array whose elements are described by `elem`
    pub fn get_array_type_mask(&mut self, elem: TypeRefMask) -> TypeRefMask {
        self.intern(TypeRef::Array { elem: elem.shape() })
    }

    /// Array with unknown elements
    pub fn get_generic_array_mask(&mut self) -> TypeRefMask {
        self.get_array_type_mask(TypeRefMask::ANY)
    }

    pub fn get_class_type_mask(&mut self, name: &Name, include_subclasses: bool) -> TypeRefMask {
        self.intern(TypeRef::Class { name: name.clone() })
            .with_subclasses(include_subclasses)
    }

    /// Class names of the object refs in `mask`
    pub fn get_object_types(&self, mask: TypeRefMask) -> Vec<Name> {
        mask.types()
            .filter_map(|i| match &self.refs[i] {
                TypeRef::Class { name } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Values obtainable by iterating or indexing `mask` (missing keys excluded)
    pub fn get_array_element_mask(&self, mask: TypeRefMask) -> TypeRefMask {
        if mask.is_any() {
            return TypeRefMask::ANY;
        }
        let mut result = TypeRefMask::EMPTY;
        for i in mask.types() {
            result |= match &self.refs[i] {
                TypeRef::Array { elem } => *elem,
                TypeRef::String => self.get_string_type_mask(),
                // ArrayAccess / Traversable objects
                TypeRef::Class { .. } => TypeRefMask::ANY,
                _ => self.get_null_type_mask(),
            };
        }
        result
    }

    /// Union of two masks over this context.
    pub fn union(&self, a: TypeRefMask, b: TypeRefMask) -> TypeRefMask {
        a | b
    }

    pub fn without_null(&self, mask: TypeRefMask) -> TypeRefMask {
        mask.without(self.get_null_type_mask())
    }

    /// Keep the type refs accepted by `keep`; ANY is returned unchanged
    pub fn filter_types(&self, mask: TypeRefMask, mut keep: impl FnMut(&TypeRef) -> bool) -> TypeRefMask {
        if mask.is_any() {
            return mask;
        }
        let mut result = TypeRefMask::from_bits_of_flags(mask);
        for i in mask.types() {
            if keep(&self.refs[i]) {
                result |= TypeRefMask::from_index(i);
            }
        }
        result
    }

    fn all_types(&self, mask: TypeRefMask, pred: impl Fn(&TypeRef) -> bool) -> bool {
        !mask.is_any() && !mask.is_empty() && mask.types().all(|i| pred(&self.refs[i]))
    }

    fn any_type(&self, mask: TypeRefMask, pred: impl Fn(&TypeRef) -> bool) -> bool {
        mask.is_any() || mask.types().any(|i| pred(&self.refs[i]))
    }

    pub fn is_long_only(&self, mask: TypeRefMask) -> bool {
        mask.shape() == self.get_long_type_mask()
    }

    pub fn is_double_only(&self, mask: TypeRefMask) -> bool {
        mask.shape() == self.get_double_type_mask()
    }

    pub fn is_number_only(&self, mask: TypeRefMask) -> bool {
        self.all_types(mask, |t| matches!(t, TypeRef::Long | TypeRef::Double))
    }

    pub fn is_string_only(&self, mask: TypeRefMask) -> bool {
        mask.shape() == self.get_string_type_mask()
    }

    pub fn is_array_only(&self, mask: TypeRefMask) -> bool {
        self.all_types(mask, TypeRef::is_array)
    }

    pub fn is_object_only(&self, mask: TypeRefMask) -> bool {
        self.all_types(mask, TypeRef::is_class)
    }

    pub fn may_be_array(&self, mask: TypeRefMask) -> bool {
        self.any_type(mask, TypeRef::is_array)
    }

    pub fn may_be_null(&self, mask: TypeRefMask) -> bool {
        mask.is_any() || mask.has_type(NULL_INDEX)
    }

    /// Every value in `mask` is an instance of `class`
    pub fn is_a(&self, mask: TypeRefMask, class: &Name, oracle: &dyn SymbolOracle) -> bool {
        self.all_types(mask, |t| match t {
            TypeRef::Class { name } => oracle.is_subclass_of(name, class),
            _ => false,
        })
    }

    /// Mask of the values a declared type accepts
    pub fn type_hint_mask(&mut self, hint: &TypeHint) -> TypeRefMask {
        match hint {
            TypeHint::Bool => self.get_boolean_type_mask(),
            TypeHint::Long => self.get_long_type_mask(),
            TypeHint::Double => self.get_double_type_mask(),
            TypeHint::String => self.get_string_type_mask(),
            TypeHint::Array => self.get_generic_array_mask(),
            TypeHint::Null | TypeHint::Void => self.get_null_type_mask(),
            TypeHint::Iterable => {
                let traversable = Name::new("Traversable");
                self.get_generic_array_mask() | self.get_class_type_mask(&traversable, true)
            }
            TypeHint::SelfType => match self.self_class.clone() {
                Some(class) => self.get_class_type_mask(&class, true),
                None => TypeRefMask::ANY,
            },
            TypeHint::Class(name) => self.get_class_type_mask(name, true),
            TypeHint::Nullable(inner) => self.type_hint_mask(inner) | self.get_null_type_mask(),
            TypeHint::Union(hints) => hints
                .iter()
                .fold(TypeRefMask::EMPTY, |acc, h| acc | self.type_hint_mask(h)),
            TypeHint::Callable | TypeHint::Object | TypeHint::Mixed => TypeRefMask::ANY,
        }
    }

    /// Human readable rendering, e.g. `long|string` or `&mixed`
    pub fn display(&self, mask: TypeRefMask) -> String {
        let mut parts: Vec<String> = Vec::new();
        if mask.is_any() {
            parts.push("mixed".to_string());
        }
        for i in mask.types() {
            parts.push(self.display_ref(&self.refs[i]));
        }
        if mask.is_void() {
            parts.push("void".to_string());
        }
        let body = if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join("|")
        };
        if mask.is_ref() {
            format!("&{body}")
        } else {
            body
        }
    }

    fn display_ref(&self, ty: &TypeRef) -> String {
        match ty {
            TypeRef::Null => "null".to_string(),
            TypeRef::Bool => "bool".to_string(),
            TypeRef::Long => "long".to_string(),
            TypeRef::Double => "double".to_string(),
            TypeRef::String => "string".to_string(),
            TypeRef::Resource => "resource".to_string(),
            TypeRef::Array { elem } if elem.is_any() => "array".to_string(),
            TypeRef::Array { elem } if elem.is_empty() => "[]".to_string(),
            TypeRef::Array { elem } if elem.type_count() > 1 => format!("({})[]", self.display(*elem)),
            TypeRef::Array { elem } => format!("{}[]", self.display(*elem)),
            TypeRef::Class { name } => name.to_string(),
        }
    }

    /// Describe `mask` without reference to this context
    pub fn export(&self, mask: TypeRefMask) -> TypeSummary {
        TypeSummary {
            any: mask.is_any(),
            is_ref: mask.is_ref(),
            void: mask.is_void(),
            subclasses: mask.includes_subclasses(),
            types: mask
                .types()
                .map(|i| match &self.refs[i] {
                    TypeRef::Null => TypeDesc::Null,
                    TypeRef::Bool => TypeDesc::Bool,
                    TypeRef::Long => TypeDesc::Long,
                    TypeRef::Double => TypeDesc::Double,
                    TypeRef::String => TypeDesc::String,
                    TypeRef::Resource => TypeDesc::Resource,
                    TypeRef::Array { elem } => TypeDesc::Array(Box::new(self.export(*elem))),
                    TypeRef::Class { name } => TypeDesc::Class(name.clone()),
                })
                .collect(),
        }
    }

    /// Re-intern an exported summary into this context
    pub fn import(&mut self, summary: &TypeSummary) -> TypeRefMask {
        let mut mask = if summary.any {
            TypeRefMask::ANY
        } else {
            TypeRefMask::EMPTY
        };
        for desc in &summary.types {
            mask |= match desc {
                TypeDesc::Null => self.get_null_type_mask(),
                TypeDesc::Bool => self.get_boolean_type_mask(),
                TypeDesc::Long => self.get_long_type_mask(),
                TypeDesc::Double => self.get_double_type_mask(),
                TypeDesc::String => self.get_string_type_mask(),
                TypeDesc::Resource => self.get_resource_type_mask(),
                TypeDesc::Array(elem) => {
                    let elem = self.import(elem);
                    self.get_array_type_mask(elem)
                }
                TypeDesc::Class(name) => self.intern(TypeRef::Class { name: name.clone() }),
            };
        }
        mask.with_ref(summary.is_ref)
            .with_void(summary.void)
            .with_subclasses(summary.subclasses)
    }
}

impl TypeRefMask {
    /// Flags of `mask` without any type bit
    fn from_bits_of_flags(mask: TypeRefMask) -> TypeRefMask {
        TypeRefMask::EMPTY
            .with_ref(mask.is_ref())
            .with_void(mask.is_void())
            .with_subclasses(mask.includes_subclasses())
    }
}
