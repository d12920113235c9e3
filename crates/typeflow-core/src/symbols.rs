//! Read-only symbol oracle consumed by the analysis
//!
//! The front end declares every routine and class it knows about in a
//! [`SymbolTable`] before analysis starts. The analysis only ever reads it
//! through the [`SymbolOracle`] trait, so embedders can plug in their own
//! storage as long as it is immutable for the duration of a run.

use fnv::FnvHashSet;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Case-insensitive identifier (functions, classes and methods)
#[derive(Clone)]
pub struct Name {
    text: String,
    key: String,
}

impl Name {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let key = text.to_ascii_lowercase();
        Self { text, key }
    }

    /// The name as written in source
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Lowercased lookup key
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn matches(&self, other: &str) -> bool {
        self.key.eq_ignore_ascii_case(other)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.text)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Name::new(text)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

/// Index of a routine in the symbol table's routine arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RoutineId(pub u32);

impl RoutineId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

/// Declared parameter, property or return type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeHint {
    Bool,
    Long,
    Double,
    String,
    Array,
    Iterable,
    Callable,
    Object,
    Mixed,
    Void,
    Null,
    /// `self` / `static` inside a class
    SelfType,
    Class(Name),
    Nullable(Box<TypeHint>),
    Union(Vec<TypeHint>),
}

impl TypeHint {
    pub fn class(name: &str) -> Self {
        TypeHint::Class(Name::new(name))
    }

    pub fn nullable(self) -> Self {
        TypeHint::Nullable(Box::new(self))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSymbol {
    pub name: String,
    pub hint: Option<TypeHint>,
    pub by_ref: bool,
    pub variadic: bool,
    pub optional: bool,
    /// Default value is the `null` literal
    pub default_null: bool,
}

impl ParamSymbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hint: None,
            by_ref: false,
            variadic: false,
            optional: false,
            default_null: false,
        }
    }

    pub fn typed(mut self, hint: TypeHint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn by_ref(mut self) -> Self {
        self.by_ref = true;
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self.optional = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn default_null(mut self) -> Self {
        self.optional = true;
        self.default_null = true;
        self
    }
}

/// A function or method declaration
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineSymbol {
    pub id: RoutineId,
    pub name: Name,
    /// Declaring class for methods
    pub class: Option<Name>,
    pub params: SmallVec<[ParamSymbol; 4]>,
    pub return_hint: Option<TypeHint>,
    pub visibility: Visibility,
    pub is_static: bool,
}

impl RoutineSymbol {
    /// Create a free-standing function declaration; the id is assigned on declaration.
    pub fn function(name: &str) -> Self {
        Self {
            id: RoutineId(u32::MAX),
            name: Name::new(name),
            class: None,
            params: SmallVec::new(),
            return_hint: None,
            visibility: Visibility::Public,
            is_static: false,
        }
    }

    pub fn method(name: &str) -> Self {
        Self::function(name)
    }

    pub fn param(mut self, param: ParamSymbol) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, hint: TypeHint) -> Self {
        self.return_hint = Some(hint);
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn is_variadic(&self) -> bool {
        self.params.last().is_some_and(|p| p.variadic)
    }

    /// Parameters that must be supplied by the caller
    pub fn mandatory_count(&self) -> usize {
        self.params.iter().take_while(|p| !p.optional && !p.variadic).count()
    }

    /// Parameters that take exactly one positional argument each
    pub fn fixed_count(&self) -> usize {
        self.params.iter().filter(|p| !p.variadic).count()
    }

    /// Parameter receiving the argument at `position` (variadic absorbs the tail)
    pub fn param_for_argument(&self, position: usize) -> Option<&ParamSymbol> {
        match self.params.get(position) {
            Some(param) => Some(param),
            None => self.params.last().filter(|p| p.variadic),
        }
    }

    pub fn display_name(&self) -> String {
        match &self.class {
            Some(class) => format!("{}::{}", class, self.name),
            None => self.name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSymbol {
    pub hint: Option<TypeHint>,
    pub is_static: bool,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassSymbol {
    pub name: Name,
    pub base: Option<Name>,
    pub interfaces: Vec<Name>,
    pub fields: IndexMap<String, FieldSymbol>,
    /// Methods keyed by lowercased name
    pub methods: IndexMap<String, RoutineId>,
}

impl ClassSymbol {
    pub fn new(name: &str) -> Self {
        Self {
            name: Name::new(name),
            base: None,
            interfaces: Vec::new(),
            fields: IndexMap::new(),
            methods: IndexMap::new(),
        }
    }

    pub fn extends(mut self, base: &str) -> Self {
        self.base = Some(Name::new(base));
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(Name::new(interface));
        self
    }

    pub fn field(mut self, name: &str, hint: Option<TypeHint>) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldSymbol {
                hint,
                is_static: false,
                visibility: Visibility::Public,
            },
        );
        self
    }

    pub fn static_field(mut self, name: &str, hint: Option<TypeHint>) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldSymbol {
                hint,
                is_static: true,
                visibility: Visibility::Public,
            },
        );
        self
    }
}

/// Read-only view of declared routines and classes
pub trait SymbolOracle {
    fn routine(&self, id: RoutineId) -> Option<&RoutineSymbol>;

    /// Global functions declared under `name` (conditional declarations yield several)
    fn functions(&self, name: &Name) -> &[RoutineId];

    fn class(&self, name: &Name) -> Option<&ClassSymbol>;

    /// Whether `class` is `base` or derives from / implements it
    fn is_subclass_of(&self, class: &Name, base: &Name) -> bool {
        let mut visited: FnvHashSet<String> = FnvHashSet::default();
        let mut stack = vec![class.clone()];
        while let Some(current) = stack.pop() {
            if current == *base {
                return true;
            }
            if !visited.insert(current.key().to_string()) {
                continue;
            }
            if let Some(symbol) = self.class(&current) {
                stack.extend(symbol.base.iter().cloned());
                stack.extend(symbol.interfaces.iter().cloned());
            }
        }
        false
    }

    /// Nearest declaration of `method` in `class` or its ancestors
    fn methods(&self, class: &Name, method: &str) -> SmallVec<[RoutineId; 2]> {
        let key = method.to_ascii_lowercase();
        let mut visited: FnvHashSet<String> = FnvHashSet::default();
        let mut current = Some(class.clone());
        while let Some(name) = current {
            if !visited.insert(name.key().to_string()) {
                break;
            }
            let Some(symbol) = self.class(&name) else {
                break;
            };
            if let Some(&id) = symbol.methods.get(&key) {
                return smallvec::smallvec![id];
            }
            current = symbol.base.clone();
        }
        SmallVec::new()
    }

    /// Nearest declaration of a property in `class` or its ancestors
    fn field(&self, class: &Name, field: &str) -> Option<&FieldSymbol> {
        let mut visited: FnvHashSet<String> = FnvHashSet::default();
        let mut current = Some(class.clone());
        while let Some(name) = current {
            if !visited.insert(name.key().to_string()) {
                return None;
            }
            let symbol = self.class(&name)?;
            if let Some(found) = symbol.fields.get(field) {
                return Some(found);
            }
            current = symbol.base.clone();
        }
        None
    }
}

/// In-memory [`SymbolOracle`] populated by the front end
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    routines: Vec<RoutineSymbol>,
    functions: IndexMap<Name, SmallVec<[RoutineId; 2]>>,
    classes: IndexMap<Name, ClassSymbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_routine(&mut self, mut symbol: RoutineSymbol) -> RoutineId {
        let id = RoutineId(self.routines.len() as u32);
        symbol.id = id;
        self.routines.push(symbol);
        id
    }

    pub fn declare_function(&mut self, symbol: RoutineSymbol) -> RoutineId {
        let name = symbol.name.clone();
        let id = self.push_routine(symbol);
        self.functions.entry(name).or_default().push(id);
        id
    }

    /// Declare a method; the class is created on demand
    pub fn declare_method(&mut self, class: &str, mut symbol: RoutineSymbol) -> RoutineId {
        let class_name = Name::new(class);
        symbol.class = Some(class_name.clone());
        let key = symbol.name.key().to_string();
        let id = self.push_routine(symbol);
        self.classes
            .entry(class_name)
            .or_insert_with(|| ClassSymbol::new(class))
            .methods
            .insert(key, id);
        id
    }

    /// Declare a routine that only exists as an analysis unit (global code, closures)
    pub fn declare_pseudo_routine(&mut self, name: &str, class: Option<&str>) -> RoutineId {
        let mut symbol = RoutineSymbol::function(name);
        symbol.class = class.map(Name::new);
        self.push_routine(symbol)
    }

    /// Declare a class; methods declared earlier for it are kept
    pub fn declare_class(&mut self, class: ClassSymbol) {
        match self.classes.get_mut(&class.name) {
            Some(existing) => {
                let methods = std::mem::take(&mut existing.methods);
                *existing = class;
                for (key, id) in methods {
                    existing.methods.entry(key).or_insert(id);
                }
            }
            None => {
                self.classes.insert(class.name.clone(), class);
            }
        }
    }

    pub fn routines(&self) -> &[RoutineSymbol] {
        &self.routines
    }
}

impl SymbolOracle for SymbolTable {
    fn routine(&self, id: RoutineId) -> Option<&RoutineSymbol> {
        self.routines.get(id.index())
    }

    fn functions(&self, name: &Name) -> &[RoutineId] {
        self.functions.get(name).map(|ids| ids.as_slice()).unwrap_or(&[])
    }

    fn class(&self, name: &Name) -> Option<&ClassSymbol> {
        self.classes.get(name)
    }
}
