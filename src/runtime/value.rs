//! Runtime values.
//!
//! Primitives are stored inline; everything else is a reference-counted [`Object`] whose
//! behaviour is selected by its [`ObjectKind`]. Objects never outlive the interpreter that
//! allocated them: the heap clears every live object when the run ends.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::runtime::interpreter::{Eval, Interpreter};
use crate::runtime::scope::ScopeRef;
use crate::syntax::{ClassDef, FunctionDef, Name, Span};

pub type ObjectRef = Rc<RefCell<Object>>;

/// Property key. Array indices and numeric keys use their canonical decimal text.
pub type PropertyKey = Rc<str>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
}

impl Value {
    pub fn string(text: impl AsRef<str>) -> Self {
        Value::String(Rc::from(text.as_ref()))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        self.as_object()
            .is_some_and(|obj| matches!(obj.borrow().kind, ObjectKind::Function(_)))
    }

    pub fn is_error(&self) -> bool {
        self.as_object()
            .is_some_and(|obj| matches!(obj.borrow().kind, ObjectKind::Error))
    }

    pub fn is_array(&self) -> bool {
        self.as_object()
            .is_some_and(|obj| matches!(obj.borrow().kind, ObjectKind::Array(_)))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) if self.is_callable() => "function",
            Value::Object(_) => "object",
        }
    }

    /// ToBoolean.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn same_object(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Object(obj) => match obj.try_borrow() {
                Ok(obj) => write!(f, "[object {}]", obj.kind.tag()),
                Err(_) => write!(f, "[object <borrowed>]"),
            },
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s.as_str()))
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

// ============================================================================
// OBJECTS
// ============================================================================

pub struct Object {
    pub kind: ObjectKind,
    pub properties: IndexMap<PropertyKey, Value>,
    /// Own keys that are not enumerable: builtin methods, class members, `defineProperty`.
    pub hidden: HashSet<PropertyKey>,
    /// Array slots that were never written (`new Array(3)`, `arr.length = 9`) or were deleted.
    pub holes: BTreeSet<usize>,
    pub prototype: Option<ObjectRef>,
    pub frozen: bool,
}

impl Object {
    pub fn new(kind: ObjectKind, prototype: Option<ObjectRef>) -> Self {
        Self {
            kind,
            properties: IndexMap::new(),
            hidden: HashSet::new(),
            holes: BTreeSet::new(),
            prototype,
            frozen: false,
        }
    }

    /// Inserts a non-enumerable property.
    pub fn define_hidden(&mut self, key: PropertyKey, value: Value) {
        self.hidden.insert(key.clone());
        self.properties.insert(key, value);
    }

    pub fn remove_property(&mut self, key: &str) {
        self.properties.shift_remove(key);
        self.hidden.remove(key);
    }

    /// Own property keys in property order: integer keys ascending, then insertion order.
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        let mut indices: Vec<(u32, PropertyKey)> = Vec::new();
        let mut named = Vec::new();
        for key in self.properties.keys() {
            match array_index(key) {
                Some(index) => indices.push((index, key.clone())),
                None => named.push(key.clone()),
            }
        }
        indices.sort_by_key(|(index, _)| *index);
        let mut keys: Vec<PropertyKey> = match &self.kind {
            ObjectKind::Array(items) => (0..items.len())
                .filter(|index| !self.holes.contains(index))
                .map(index_key)
                .collect(),
            _ => Vec::new(),
        };
        keys.extend(indices.into_iter().map(|(_, key)| key));
        keys.extend(named);
        keys
    }

    /// Keys that exist for the engine but are not listed by `Object.keys` or the inspector.
    pub fn is_internal_key(&self, key: &str) -> bool {
        if self.hidden.contains(key) {
            return true;
        }
        match &self.kind {
            ObjectKind::Function(_) => matches!(key, "prototype" | "name" | "length"),
            ObjectKind::Error => matches!(key, "message" | "name" | "stack" | "cause"),
            _ => key == "constructor" && self.is_prototype_object(),
        }
    }

    fn is_prototype_object(&self) -> bool {
        let Some(Value::Object(ctor)) = self.properties.get("constructor") else {
            return false;
        };
        let Ok(ctor) = ctor.try_borrow() else {
            return true;
        };
        matches!(ctor.properties.get("prototype"), Some(Value::Object(proto))
            if std::ptr::eq(proto.as_ptr() as *const Object, self as *const Object))
    }

    pub fn visible_keys(&self) -> Vec<PropertyKey> {
        self.own_keys()
            .into_iter()
            .filter(|key| !self.is_internal_key(key))
            .collect()
    }
}

pub enum ObjectKind {
    Ordinary,
    Array(Vec<Value>),
    Function(Callable),
    Error,
    Promise(PromiseData),
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    /// `Boolean`, `Number` and `String` wrapper objects.
    Primitive(Value),
}

impl ObjectKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ObjectKind::Ordinary => "Object",
            ObjectKind::Array(_) => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error => "Error",
            ObjectKind::Promise(_) => "Promise",
            ObjectKind::Map(_) => "Map",
            ObjectKind::Set(_) => "Set",
            ObjectKind::Primitive(_) => "Primitive",
        }
    }
}

pub fn array_index(key: &str) -> Option<u32> {
    if key.is_empty() || key.len() > 10 || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|index| *index != u32::MAX)
}

/// `str.length`: the number of UTF-16 code units.
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// `str[index]`: one UTF-16 code unit as a string; half of a surrogate pair reads as U+FFFD.
pub fn code_unit_at(s: &str, index: usize) -> Option<Value> {
    s.encode_utf16()
        .nth(index)
        .map(|unit| Value::string(String::from_utf16_lossy(&[unit])))
}

pub fn index_key(index: usize) -> PropertyKey {
    Rc::from(index.to_string().as_str())
}

// ============================================================================
// FUNCTIONS
// ============================================================================

pub enum Callable {
    Closure(Rc<Closure>),
    Native(NativeFunction),
    Bound(BoundFunction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Normal,
    Arrow,
    Method,
    ClassConstructor,
}

pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub scope: ScopeRef,
    pub kind: FunctionKind,
    /// Object whose prototype `super.x` resolves against.
    pub home: Option<ObjectRef>,
    pub class: Option<Rc<ClassRuntime>>,
}

/// Runtime half of a class: what `super(...)` and instance field initialisation need.
pub struct ClassRuntime {
    pub def: Rc<ClassDef>,
    pub scope: ScopeRef,
    pub parent: Option<Value>,
    pub prototype: ObjectRef,
    /// Instance fields with their keys resolved at class definition time.
    pub fields: Vec<(PropertyKey, usize)>,
}

/// Signature shared by every builtin.
pub type NativeFn = fn(&mut Interpreter, &NativeCall<'_>) -> Eval<Value>;

pub struct NativeCall<'a> {
    pub this: &'a Value,
    pub args: &'a [Value],
    pub data: &'a NativeData,
    /// Set when invoked through `new` or `super(...)`.
    pub new_target: Option<&'a ObjectRef>,
}

impl NativeCall<'_> {
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    pub fn is_construct(&self) -> bool {
        self.new_target.is_some()
    }
}

pub struct NativeFunction {
    pub name: Name,
    pub func: NativeFn,
    pub data: NativeData,
    pub constructor: bool,
    pub arity: usize,
}

pub struct BoundFunction {
    pub target: ObjectRef,
    pub this: Value,
    pub args: Vec<Value>,
}

/// State captured by builtins that are created at runtime (promise resolvers and friends).
#[derive(Clone, Default)]
pub enum NativeData {
    #[default]
    None,
    Resolver {
        promise: ObjectRef,
        reject: bool,
        settled: Rc<Cell<bool>>,
    },
    Aggregate {
        state: Rc<AggregateState>,
        index: usize,
        outcome: AggregateOutcome,
        called: Rc<Cell<bool>>,
    },
    FinallyHandler {
        on_finally: Value,
        rejected: bool,
    },
    ReturnValue(Value),
    ThrowValue(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOutcome {
    /// `Promise.all` element resolved.
    Value,
    /// `Promise.allSettled` element fulfilled.
    Fulfilled,
    /// `Promise.allSettled` element rejected.
    Rejected,
    /// `Promise.any` element rejected.
    Reason,
}

pub struct AggregateState {
    pub values: RefCell<Vec<Value>>,
    pub remaining: Cell<usize>,
    pub promise: ObjectRef,
}

// ============================================================================
// PROMISES
// ============================================================================

pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

pub struct Reaction {
    pub handler: Option<Value>,
    pub derived: Option<ObjectRef>,
}

pub struct PromiseData {
    pub state: PromiseState,
    pub fulfill_reactions: Vec<Reaction>,
    pub reject_reactions: Vec<Reaction>,
    pub handled: bool,
    /// Call expression that rejected the promise, reported if nothing handles it.
    pub rejected_at: Option<Span>,
}

impl PromiseData {
    pub fn new() -> Self {
        Self {
            state: PromiseState::Pending,
            fulfill_reactions: Vec::new(),
            reject_reactions: Vec::new(),
            handled: false,
            rejected_at: None,
        }
    }
}

impl Default for PromiseData {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// PROPERTY HELPERS
// ============================================================================

/// Looks a property up along the prototype chain without invoking any user code.
pub fn lookup_property(obj: &ObjectRef, key: &str) -> Option<Value> {
    let mut current = Some(obj.clone());
    while let Some(object) = current {
        let object = object.borrow();
        if let Some(value) = object.properties.get(key) {
            return Some(value.clone());
        }
        current = object.prototype.clone();
    }
    None
}

/// The name a function reports through `.name`.
pub fn function_name(obj: &ObjectRef) -> Rc<str> {
    let object = obj.borrow();
    if let Some(Value::String(name)) = object.properties.get("name") {
        return name.clone();
    }
    match &object.kind {
        ObjectKind::Function(Callable::Closure(closure)) => {
            closure.def.name.clone().unwrap_or_else(|| Rc::from(""))
        }
        ObjectKind::Function(Callable::Native(native)) => native.name.clone(),
        ObjectKind::Function(Callable::Bound(bound)) => {
            Rc::from(format!("bound {}", function_name(&bound.target)).as_str())
        }
        _ => Rc::from(""),
    }
}

/// Name of the constructor whose `prototype` is the object's prototype, as the inspector
/// prints it (`Point { x: 1 }`).
pub fn constructor_name(obj: &ObjectRef) -> Option<Rc<str>> {
    let mut current = obj.borrow().prototype.clone();
    while let Some(proto) = current {
        if let Some(Value::Object(ctor)) = proto.borrow().properties.get("constructor") {
            let name = function_name(ctor);
            if !name.is_empty() {
                return Some(name);
            }
        }
        current = proto.borrow().prototype.clone();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_indices_only() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("42"), Some(42));
        assert_eq!(array_index("042"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("1.5"), None);
        assert_eq!(array_index(""), None);
    }

    #[test]
    fn integer_keys_come_first() {
        let mut obj = Object::new(ObjectKind::Ordinary, None);
        for key in ["b", "2", "a", "1"] {
            obj.properties.insert(Rc::from(key), Value::Null);
        }
        let keys: Vec<String> = obj.own_keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["1", "2", "b", "a"]);
    }

    #[test]
    fn hidden_keys_are_own_but_not_visible() {
        let mut obj = Object::new(ObjectKind::Ordinary, None);
        obj.properties.insert(Rc::from("shown"), Value::Null);
        obj.define_hidden(Rc::from("method"), Value::Null);
        assert_eq!(obj.own_keys().len(), 2);
        let visible: Vec<String> = obj.visible_keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(visible, vec!["shown"]);

        obj.remove_property("method");
        obj.properties.insert(Rc::from("method"), Value::Null);
        assert_eq!(obj.visible_keys().len(), 2);
    }

    #[test]
    fn string_positions_count_utf16_units() {
        assert_eq!(utf16_len("a😀"), 3);
        assert!(matches!(code_unit_at("a😀", 0), Some(Value::String(s)) if &*s == "a"));
        assert!(code_unit_at("a😀", 3).is_none());
    }

    #[test]
    fn typeof_matches_javascript() {
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::Undefined.type_of(), "undefined");
        assert_eq!(Value::from(1.0).type_of(), "number");
        assert_eq!(Value::from("x").type_of(), "string");
    }
}
