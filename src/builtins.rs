//! # Builtins
//!
//! Every global a snippet can reach without declaring it: `console`, `Math`, `JSON`, the
//! constructors and their prototype methods, timers and the parsing helpers.
//!
//! ## Registration
//!
//! Each domain module contributes [`Builtin`] entries to one [`BuiltinRegistry`], built once
//! per process. [`install`] then materializes the registry into a fresh interpreter: native
//! function objects are allocated per run, so no object is ever shared between two runs.
//!
//! ## Conventions
//!
//! - Natives receive `this`, the arguments and their captured data through [`NativeCall`].
//! - Errors are thrown as snippet exceptions with Node's wording; natives never panic.
//! - Installation order is registration order, so repeated runs see identical globals.

use std::rc::Rc;

use im::{HashMap, Vector};
use once_cell::sync::Lazy;

use crate::runtime::interpreter::{Eval, Interpreter};
use crate::runtime::realm::Proto;
use crate::runtime::scope::lookup;
use crate::runtime::value::{
    Callable, NativeCall, NativeData, NativeFn, NativeFunction, ObjectKind, ObjectRef, Value,
};

pub mod array;
pub mod collections;
pub mod console;
pub mod errors;
pub mod global;
pub mod json;
pub mod math;
pub mod number;
pub mod object;
pub mod promise;
pub mod string;
pub mod timers;

// ============================================================================
// REGISTRY
// ============================================================================

/// Where a builtin lives once installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// A global binding (`parseInt`, `Array`).
    Global,
    /// A property of a plain global namespace object (`Math.max`, `console.log`).
    Namespace(&'static str),
    /// A property of a global constructor (`Object.keys`, `Promise.all`).
    Static(&'static str),
    /// A method shared through an intrinsic prototype (`Array.prototype.map`).
    Prototype(Proto),
}

#[derive(Clone, Copy)]
pub enum BuiltinKind {
    Function { func: NativeFn, arity: usize },
    /// A global constructor whose `prototype` is the given intrinsic.
    Constructor { func: NativeFn, arity: usize, proto: Proto },
    Constant(f64),
}

#[derive(Clone)]
pub struct Builtin {
    pub slot: Slot,
    pub name: &'static str,
    pub kind: BuiltinKind,
}

impl Builtin {
    /// Dotted path as a snippet would spell it.
    pub fn qualified_name(&self) -> String {
        match self.slot {
            Slot::Global => self.name.to_string(),
            Slot::Namespace(owner) | Slot::Static(owner) => format!("{}.{}", owner, self.name),
            Slot::Prototype(proto) => format!("{}.prototype.{}", proto.name(), self.name),
        }
    }
}

/// Registry of every builtin, inspectable by `exemplar list-builtins`.
#[derive(Clone, Default)]
pub struct BuiltinRegistry {
    entries: Vector<Builtin>,
    index: HashMap<String, usize>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, slot: Slot, name: &'static str, kind: BuiltinKind) {
        let builtin = Builtin { slot, name, kind };
        let key = builtin.qualified_name();
        match self.index.get(&key).copied() {
            Some(position) => {
                self.entries.set(position, builtin);
            }
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push_back(builtin);
            }
        }
    }

    pub fn function(&mut self, slot: Slot, name: &'static str, func: NativeFn, arity: usize) {
        self.register(slot, name, BuiltinKind::Function { func, arity });
    }

    pub fn constructor(&mut self, proto: Proto, func: NativeFn, arity: usize) {
        self.register(Slot::Global, proto.name(), BuiltinKind::Constructor { func, arity, proto });
    }

    pub fn constant(&mut self, slot: Slot, name: &'static str, value: f64) {
        self.register(slot, name, BuiltinKind::Constant(value));
    }

    pub fn get(&self, qualified_name: &str) -> Option<&Builtin> {
        self.index.get(qualified_name).and_then(|&i| self.entries.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Builtin> {
        self.entries.iter()
    }

    /// Qualified names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.index.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The process-wide registry.
pub static BUILTINS: Lazy<BuiltinRegistry> = Lazy::new(build_default_registry);

/// Registers the builtins of every domain module. Constructors come first so statics and
/// prototype methods always find their owner.
pub fn build_default_registry() -> BuiltinRegistry {
    let mut registry = BuiltinRegistry::new();
    object::register(&mut registry);
    number::register(&mut registry);
    string::register(&mut registry);
    array::register(&mut registry);
    errors::register(&mut registry);
    collections::register(&mut registry);
    promise::register(&mut registry);
    global::register(&mut registry);
    math::register(&mut registry);
    json::register(&mut registry);
    console::register(&mut registry);
    timers::register(&mut registry);
    registry
}

// ============================================================================
// INSTALLATION
// ============================================================================

/// Materializes every registered builtin into `interp`'s global scope and intrinsics.
pub fn install(interp: &mut Interpreter) {
    for builtin in BUILTINS.iter() {
        let value = match builtin.kind {
            BuiltinKind::Constant(n) => Value::Number(n),
            BuiltinKind::Function { func, arity } => {
                interp.new_native(builtin.name, func, NativeData::None, arity)
            }
            BuiltinKind::Constructor { func, arity, proto } => {
                let ctor = native_constructor(interp, builtin.name, func, arity);
                let prototype = interp.proto(proto);
                prototype
                    .borrow_mut()
                    .define_hidden(Rc::from("constructor"), Value::Object(ctor.clone()));
                ctor.borrow_mut()
                    .define_hidden(Rc::from("prototype"), Value::Object(prototype));
                Value::Object(ctor)
            }
        };
        let owner = match builtin.slot {
            Slot::Global => {
                interp
                    .global
                    .borrow_mut()
                    .declare(Rc::from(builtin.name), Some(value), true);
                continue;
            }
            Slot::Namespace(name) => namespace(interp, name),
            Slot::Static(name) => match lookup(&interp.global, name) {
                Ok(Value::Object(owner)) => owner,
                _ => continue,
            },
            Slot::Prototype(proto) => interp.proto(proto),
        };
        owner.borrow_mut().define_hidden(Rc::from(builtin.name), value);
    }
}

fn native_constructor(interp: &mut Interpreter, name: &str, func: NativeFn, arity: usize) -> ObjectRef {
    let native = NativeFunction {
        name: Rc::from(name),
        func,
        data: NativeData::None,
        constructor: true,
        arity,
    };
    let function_proto = interp.proto(Proto::Function);
    interp.alloc(ObjectKind::Function(Callable::Native(native)), Some(function_proto))
}

/// The namespace object bound to `name`, created on first use.
fn namespace(interp: &mut Interpreter, name: &'static str) -> ObjectRef {
    if let Ok(Value::Object(existing)) = lookup(&interp.global, name) {
        return existing;
    }
    let object = interp.new_object();
    interp
        .global
        .borrow_mut()
        .declare(Rc::from(name), Some(Value::Object(object.clone())), true);
    object
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// The callable argument at `index`, or Node's `x is not a function` TypeError.
pub(crate) fn callback_arg(interp: &mut Interpreter, call: &NativeCall<'_>, index: usize) -> Eval<Value> {
    let value = call.arg(index);
    if value.is_callable() {
        return Ok(value);
    }
    let shown = crate::runtime::inspect::inspect_nested(&value);
    Err(interp.type_error(format!("{} is not a function", shown)))
}

/// A function argument of a Node API (`setTimeout`, `queueMicrotask`), rejected with Node's
/// `ERR_INVALID_ARG_TYPE` wording.
pub(crate) fn function_argument(
    interp: &mut Interpreter,
    call: &NativeCall<'_>,
    index: usize,
    name: &str,
) -> Eval<Value> {
    let value = call.arg(index);
    if value.is_callable() {
        return Ok(value);
    }
    Err(interp.type_error(format!(
        "The \"{}\" argument must be of type function. Received {}",
        name,
        describe_received(&value)
    )))
}

fn describe_received(value: &Value) -> String {
    match value {
        Value::Undefined | Value::Null => crate::runtime::inspect::inspect(value),
        Value::Object(obj) => match crate::runtime::value::constructor_name(obj) {
            Some(name) => format!("an instance of {}", name),
            None => "[Object: null prototype]".to_string(),
        },
        primitive => format!(
            "type {} ({})",
            primitive.type_of(),
            crate::runtime::inspect::inspect_nested(primitive)
        ),
    }
}

/// Numeric argument with JavaScript coercion; missing arguments are `NaN`.
pub(crate) fn number_arg(interp: &mut Interpreter, call: &NativeCall<'_>, index: usize) -> Eval<f64> {
    interp.to_number(&call.arg(index))
}

/// Builds a plain object from key/value pairs.
pub(crate) fn object_from(interp: &mut Interpreter, entries: Vec<(&str, Value)>) -> Value {
    let object = interp.new_object();
    {
        let mut object = object.borrow_mut();
        for (key, value) in entries {
            object.properties.insert(Rc::from(key), value);
        }
    }
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lists_qualified_names() {
        let names = BUILTINS.names();
        for expected in ["Array.prototype.map", "Math.max", "console.log", "parseInt", "Promise.all"] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
        assert!(BUILTINS.get("Object.keys").is_some());
        assert!(BUILTINS.get("Object.nope").is_none());
    }

    #[test]
    fn received_values_follow_node_wording() {
        assert_eq!(describe_received(&Value::Undefined), "undefined");
        assert_eq!(describe_received(&Value::from(5.0)), "type number (5)");
        assert_eq!(describe_received(&Value::from("x")), "type string ('x')");
    }

    #[test]
    fn re_registering_replaces_in_place() {
        fn noop(_: &mut Interpreter, _: &NativeCall<'_>) -> Eval<Value> {
            Ok(Value::Undefined)
        }
        let mut registry = BuiltinRegistry::new();
        registry.function(Slot::Global, "f", noop, 0);
        registry.constant(Slot::Global, "g", 1.0);
        registry.function(Slot::Global, "f", noop, 2);
        assert_eq!(registry.len(), 2);
        assert!(matches!(
            registry.get("f").map(|b| b.kind),
            Some(BuiltinKind::Function { arity: 2, .. })
        ));
    }
}
