//! # Object and Function Builtins
//!
//! `Object` with its reflection statics, `Object.prototype` and `Function.prototype`.
//!
//! ## Builtins Provided
//!
//! - **Statics**: `keys`, `values`, `entries`, `assign`, `freeze`, `isFrozen`, `fromEntries`,
//!   `create`, `getPrototypeOf`, `setPrototypeOf`, `defineProperty`, `getOwnPropertyNames`, `is`
//! - **Object.prototype**: `hasOwnProperty`, `isPrototypeOf`, `toString`, `toLocaleString`, `valueOf`
//! - **Function.prototype**: `call`, `apply`, `bind`, `toString`

use std::rc::Rc;

use crate::builtins::{BuiltinRegistry, Slot};
use crate::runtime::interpreter::{Eval, Interpreter};
use crate::runtime::operators::inherits_from;
use crate::runtime::realm::Proto;
use crate::runtime::value::{
    array_index, function_name, BoundFunction, Callable, NativeCall, ObjectKind, ObjectRef, Value,
};

pub fn register(registry: &mut BuiltinRegistry) {
    registry.constructor(Proto::Object, object_ctor, 1);

    let statics = Slot::Static("Object");
    registry.function(statics, "keys", keys, 1);
    registry.function(statics, "values", values, 1);
    registry.function(statics, "entries", entries, 1);
    registry.function(statics, "assign", assign, 2);
    registry.function(statics, "freeze", freeze, 1);
    registry.function(statics, "isFrozen", is_frozen, 1);
    registry.function(statics, "fromEntries", from_entries, 1);
    registry.function(statics, "create", create, 2);
    registry.function(statics, "getPrototypeOf", get_prototype_of, 1);
    registry.function(statics, "setPrototypeOf", set_prototype_of, 2);
    registry.function(statics, "defineProperty", define_property, 3);
    registry.function(statics, "getOwnPropertyNames", get_own_property_names, 1);
    registry.function(statics, "is", is, 2);

    let proto = Slot::Prototype(Proto::Object);
    registry.function(proto, "hasOwnProperty", has_own_property, 1);
    registry.function(proto, "isPrototypeOf", is_prototype_of, 1);
    registry.function(proto, "toString", object_to_string, 0);
    registry.function(proto, "toLocaleString", object_to_string, 0);
    registry.function(proto, "valueOf", value_of, 0);

    let function = Slot::Prototype(Proto::Function);
    registry.function(function, "call", call, 1);
    registry.function(function, "apply", apply, 2);
    registry.function(function, "bind", bind, 1);
    registry.function(function, "toString", function_to_string, 0);
}

// ============================================================================
// HELPERS
// ============================================================================

/// ToObject for the reflection statics: nullish arguments are a TypeError.
fn require_object_coercible(interp: &mut Interpreter, value: &Value) -> Eval<()> {
    if value.is_nullish() {
        return Err(interp.type_error("Cannot convert undefined or null to object"));
    }
    Ok(())
}

/// Wraps a primitive in its boxed object; objects pass through.
pub(crate) fn to_object(interp: &mut Interpreter, value: &Value) -> Eval<ObjectRef> {
    let proto = match value {
        Value::Object(obj) => return Ok(obj.clone()),
        Value::Undefined | Value::Null => {
            return Err(interp.type_error("Cannot convert undefined or null to object"))
        }
        Value::Bool(_) => Proto::Boolean,
        Value::Number(_) => Proto::Number,
        Value::String(_) => Proto::String,
    };
    let prototype = interp.proto(proto);
    Ok(interp.alloc(ObjectKind::Primitive(value.clone()), Some(prototype)))
}

fn is_own_property(obj: &ObjectRef, key: &str) -> bool {
    let object = obj.borrow();
    match &object.kind {
        ObjectKind::Array(items) => {
            if key == "length" {
                return true;
            }
            if let Some(index) = array_index(key) {
                let index = index as usize;
                return index < items.len() && !object.holes.contains(&index);
            }
        }
        ObjectKind::Primitive(Value::String(s)) => {
            if key == "length" {
                return true;
            }
            if let Some(index) = array_index(key) {
                return (index as usize) < crate::runtime::value::utf16_len(s);
            }
        }
        ObjectKind::Function(_) if matches!(key, "name" | "length") => return true,
        _ => {}
    }
    object.properties.contains_key(key)
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            (x.is_nan() && y.is_nan()) || (x == y && x.is_sign_negative() == y.is_sign_negative())
        }
        _ => crate::runtime::interpreter::strict_equals(a, b),
    }
}

// ============================================================================
// OBJECT
// ============================================================================

fn object_ctor(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let value = call.arg(0);
    if value.is_nullish() {
        let proto = match call.new_target {
            Some(target) => interp.prototype_for(target, Proto::Object),
            None => interp.proto(Proto::Object),
        };
        return Ok(Value::Object(interp.alloc(ObjectKind::Ordinary, Some(proto))));
    }
    Ok(Value::Object(to_object(interp, &value)?))
}

fn keys(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let target = call.arg(0);
    require_object_coercible(interp, &target)?;
    let keys = interp
        .own_enumerable_keys(&target)
        .into_iter()
        .map(Value::String)
        .collect();
    Ok(interp.new_array(keys))
}

fn values(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let target = call.arg(0);
    require_object_coercible(interp, &target)?;
    let mut values = Vec::new();
    for key in interp.own_enumerable_keys(&target) {
        values.push(interp.get(&target, &key)?);
    }
    Ok(interp.new_array(values))
}

fn entries(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let target = call.arg(0);
    require_object_coercible(interp, &target)?;
    let mut entries = Vec::new();
    for key in interp.own_enumerable_keys(&target) {
        let value = interp.get(&target, &key)?;
        entries.push(interp.new_array(vec![Value::String(key), value]));
    }
    Ok(interp.new_array(entries))
}

fn assign(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let target = Value::Object(to_object(interp, &call.arg(0))?);
    for source in call.args.iter().skip(1) {
        if source.is_nullish() {
            continue;
        }
        for key in interp.own_enumerable_keys(source) {
            let value = interp.get(source, &key)?;
            interp.set(&target, &key, value)?;
        }
    }
    Ok(target)
}

/// Shallow freeze: later writes to the object are ignored, nested objects stay mutable.
fn freeze(_interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let target = call.arg(0);
    if let Value::Object(obj) = &target {
        obj.borrow_mut().frozen = true;
    }
    Ok(target)
}

fn is_frozen(_interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Bool(match call.arg(0) {
        Value::Object(obj) => obj.borrow().frozen,
        _ => true,
    }))
}

fn from_entries(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let source = call.arg(0);
    require_object_coercible(interp, &source)?;
    let result = Value::Object(interp.new_object());
    for entry in interp.iterate(&source)? {
        if !matches!(entry, Value::Object(_)) {
            let shown = crate::runtime::inspect::inspect_nested(&entry);
            return Err(interp.type_error(format!("Iterator value {} is not an entry object", shown)));
        }
        let key = interp.get(&entry, "0")?;
        let key = interp.to_property_key(&key)?;
        let value = interp.get(&entry, "1")?;
        interp.set(&result, &key, value)?;
    }
    Ok(result)
}

fn create(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let prototype = match call.arg(0) {
        Value::Object(proto) => Some(proto),
        Value::Null => None,
        other => {
            let shown = crate::runtime::inspect::inspect_nested(&other);
            return Err(interp.type_error(format!(
                "Object prototype may only be an Object or null: {}",
                shown
            )));
        }
    };
    let object = Value::Object(interp.alloc(ObjectKind::Ordinary, prototype));
    let properties = call.arg(1);
    if let Value::Object(_) = &properties {
        for key in interp.own_enumerable_keys(&properties) {
            let descriptor = interp.get(&properties, &key)?;
            let value = interp.get(&descriptor, "value")?;
            interp.set(&object, &key, value)?;
        }
    }
    Ok(object)
}

fn get_prototype_of(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let target = call.arg(0);
    require_object_coercible(interp, &target)?;
    let obj = to_object(interp, &target)?;
    let prototype = obj.borrow().prototype.clone();
    Ok(prototype.map(Value::Object).unwrap_or(Value::Null))
}

fn set_prototype_of(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let target = call.arg(0);
    require_object_coercible(interp, &target)?;
    let prototype = match call.arg(1) {
        Value::Object(proto) => Some(proto),
        Value::Null => None,
        other => {
            let shown = crate::runtime::inspect::inspect_nested(&other);
            return Err(interp.type_error(format!(
                "Object prototype may only be an Object or null: {}",
                shown
            )));
        }
    };
    if let Value::Object(obj) = &target {
        if let Some(proto) = &prototype {
            if Rc::ptr_eq(proto, obj) || inherits_from(proto, obj) {
                return Err(interp.type_error("Cyclic __proto__ value"));
            }
        }
        obj.borrow_mut().prototype = prototype;
    }
    Ok(target)
}

/// Data descriptors only: `value` and `enumerable` are honoured, accessors are rejected.
/// A new property is non-enumerable unless the descriptor says otherwise.
fn define_property(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let target = call.arg(0);
    let Value::Object(obj) = &target else {
        return Err(interp.type_error("Object.defineProperty called on non-object"));
    };
    let key = interp.to_property_key(&call.arg(1))?;
    let descriptor = call.arg(2);
    let Value::Object(descriptor_obj) = &descriptor else {
        let shown = crate::runtime::inspect::inspect_nested(&descriptor);
        return Err(interp.type_error(format!("Property description must be an object: {}", shown)));
    };
    if interp.has_property(descriptor_obj, "get") || interp.has_property(descriptor_obj, "set") {
        return Err(interp.type_error("Accessor properties are not supported"));
    }
    if obj.borrow().frozen {
        return Err(interp.type_error(format!(
            "Cannot define property {}, object is not extensible",
            key
        )));
    }
    let enumerable = if interp.has_property(descriptor_obj, "enumerable") {
        interp.get(&descriptor, "enumerable")?.truthy()
    } else {
        let object = obj.borrow();
        object.properties.contains_key(&*key) && !object.hidden.contains(&*key)
    };
    let value = interp.get(&descriptor, "value")?;
    interp.set(&target, &key, value)?;
    let mut object = obj.borrow_mut();
    if object.properties.contains_key(&*key) {
        if enumerable {
            object.hidden.remove(&*key);
        } else {
            object.hidden.insert(key);
        }
    }
    drop(object);
    Ok(target)
}

fn get_own_property_names(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let target = call.arg(0);
    require_object_coercible(interp, &target)?;
    let obj = to_object(interp, &target)?;
    let mut names: Vec<Value> = {
        let object = obj.borrow();
        object.own_keys().into_iter().map(Value::String).collect()
    };
    if matches!(obj.borrow().kind, ObjectKind::Array(_)) {
        names.push(Value::from("length"));
    }
    Ok(interp.new_array(names))
}

fn is(_interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Bool(same_value(&call.arg(0), &call.arg(1))))
}

// ============================================================================
// OBJECT.PROTOTYPE
// ============================================================================

fn has_own_property(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let key = interp.to_property_key(&call.arg(0))?;
    let obj = to_object(interp, call.this)?;
    Ok(Value::Bool(is_own_property(&obj, &key)))
}

fn is_prototype_of(_interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Bool(match (call.this, call.arg(0)) {
        (Value::Object(proto), Value::Object(obj)) => inherits_from(&obj, proto),
        _ => false,
    }))
}

fn object_to_string(_interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let tag = match call.this {
        Value::Undefined => "Undefined",
        Value::Null => "Null",
        Value::Bool(_) => "Boolean",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Object(obj) => match &obj.borrow().kind {
            ObjectKind::Array(_) => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error => "Error",
            ObjectKind::Primitive(Value::Bool(_)) => "Boolean",
            ObjectKind::Primitive(Value::Number(_)) => "Number",
            ObjectKind::Primitive(Value::String(_)) => "String",
            ObjectKind::Promise(_) => "Promise",
            ObjectKind::Map(_) => "Map",
            ObjectKind::Set(_) => "Set",
            _ => "Object",
        },
    };
    Ok(Value::string(format!("[object {}]", tag)))
}

fn value_of(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Object(to_object(interp, call.this)?))
}

// ============================================================================
// FUNCTION.PROTOTYPE
// ============================================================================

fn require_callable(interp: &mut Interpreter, call: &NativeCall<'_>, method: &str) -> Eval<ObjectRef> {
    match call.this {
        Value::Object(obj) if call.this.is_callable() => Ok(obj.clone()),
        _ => Err(interp.type_error(format!(
            "Function.prototype.{} called on a value that is not a function",
            method
        ))),
    }
}

fn call(interp: &mut Interpreter, native: &NativeCall<'_>) -> Eval<Value> {
    let func = require_callable(interp, native, "call")?;
    let rest = native.args.get(1..).unwrap_or_default();
    interp.call(&Value::Object(func), native.arg(0), rest)
}

fn apply(interp: &mut Interpreter, native: &NativeCall<'_>) -> Eval<Value> {
    let func = require_callable(interp, native, "apply")?;
    let args = match native.arg(1) {
        Value::Undefined | Value::Null => Vec::new(),
        list @ Value::Object(_) => interp.iterate(&list)?,
        _ => return Err(interp.type_error("CreateListFromArrayLike called on non-object")),
    };
    interp.call(&Value::Object(func), native.arg(0), &args)
}

fn bind(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let target = require_callable(interp, call, "bind")?;
    let bound = BoundFunction {
        target,
        this: call.arg(0),
        args: call.args.get(1..).unwrap_or_default().to_vec(),
    };
    let proto = interp.proto(Proto::Function);
    Ok(Value::Object(interp.alloc(
        ObjectKind::Function(Callable::Bound(bound)),
        Some(proto),
    )))
}

/// Source text for closures and classes, Node's placeholder for natives.
fn function_to_string(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let func = require_callable(interp, call, "toString")?;
    let span = match &func.borrow().kind {
        ObjectKind::Function(Callable::Closure(closure)) => Some(match &closure.class {
            Some(class) => class.def.span,
            None => closure.def.span,
        }),
        _ => None,
    };
    Ok(match span {
        Some(span) => Value::string(interp.source_text(span)),
        None => Value::string(format!("function {}() {{ [native code] }}", function_name(&func))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_value_distinguishes_signed_zero_and_nan() {
        assert!(same_value(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
        assert!(!same_value(&Value::Number(0.0), &Value::Number(-0.0)));
        assert!(same_value(&Value::from("a"), &Value::from("a")));
    }
}
