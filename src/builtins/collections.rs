//! `Map` and `Set`.
//!
//! Entries live in insertion order inside the object kind itself and keys compare with
//! SameValueZero, so `NaN` finds `NaN` and `-0` finds `0`. `keys`, `values` and `entries`
//! return arrays, which `for...of` and spread iterate like the real iterators.

use crate::builtins::{callback_arg, BuiltinRegistry, Slot};
use crate::runtime::interpreter::{same_value_zero, Eval, Interpreter};
use crate::runtime::realm::Proto;
use crate::runtime::value::{NativeCall, ObjectKind, ObjectRef, Value};

pub fn register(registry: &mut BuiltinRegistry) {
    registry.constructor(Proto::Map, map_ctor, 0);
    let proto = Slot::Prototype(Proto::Map);
    registry.function(proto, "get", map_get, 1);
    registry.function(proto, "set", map_set, 2);
    registry.function(proto, "has", map_has, 1);
    registry.function(proto, "delete", map_delete, 1);
    registry.function(proto, "clear", map_clear, 0);
    registry.function(proto, "forEach", map_for_each, 1);
    registry.function(proto, "keys", map_keys, 0);
    registry.function(proto, "values", map_values, 0);
    registry.function(proto, "entries", map_entries, 0);

    registry.constructor(Proto::Set, set_ctor, 0);
    let proto = Slot::Prototype(Proto::Set);
    registry.function(proto, "add", set_add, 1);
    registry.function(proto, "has", set_has, 1);
    registry.function(proto, "delete", set_delete, 1);
    registry.function(proto, "clear", set_clear, 0);
    registry.function(proto, "forEach", set_for_each, 1);
    registry.function(proto, "keys", set_values, 0);
    registry.function(proto, "values", set_values, 0);
    registry.function(proto, "entries", set_entries, 0);
}

/// Allocates the collection for `new Map()`/`new Set()`, reusing the instance a subclass
/// constructor already created.
fn collection_instance(
    interp: &mut Interpreter,
    call: &NativeCall<'_>,
    proto: Proto,
    kind: fn() -> ObjectKind,
) -> Eval<ObjectRef> {
    let Some(target) = call.new_target else {
        return Err(interp.type_error(format!("Constructor {} requires 'new'", proto.name())));
    };
    Ok(match call.this {
        Value::Object(existing) => {
            existing.borrow_mut().kind = kind();
            existing.clone()
        }
        _ => {
            let prototype = interp.prototype_for(target, proto);
            interp.alloc(kind(), Some(prototype))
        }
    })
}

/// Receiver check shared by every method: `Method Map.prototype.get called on incompatible receiver`.
fn receiver(interp: &mut Interpreter, call: &NativeCall<'_>, proto: Proto, method: &str) -> Eval<ObjectRef> {
    if let Value::Object(obj) = call.this {
        let matches = match (&obj.borrow().kind, proto) {
            (ObjectKind::Map(_), Proto::Map) | (ObjectKind::Set(_), Proto::Set) => true,
            _ => false,
        };
        if matches {
            return Ok(obj.clone());
        }
    }
    let shown = crate::runtime::inspect::inspect_nested(call.this);
    Err(interp.type_error(format!(
        "Method {}.prototype.{} called on incompatible receiver {}",
        proto.name(),
        method,
        shown
    )))
}

/// Normalizes `-0` so keys print and compare like the engine stores them.
fn normalize_key(key: Value) -> Value {
    match key {
        Value::Number(n) if n == 0.0 => Value::Number(0.0),
        other => other,
    }
}

// ============================================================================
// MAP
// ============================================================================

fn map_ctor(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let map = collection_instance(interp, call, Proto::Map, || ObjectKind::Map(Vec::new()))?;
    let iterable = call.arg(0);
    if !iterable.is_nullish() {
        let receiver = Value::Object(map.clone());
        let adder = interp.get(&receiver, "set")?;
        for entry in interp.iterate(&iterable)? {
            if !matches!(entry, Value::Object(_)) {
                let shown = crate::runtime::inspect::inspect_nested(&entry);
                return Err(interp.type_error(format!("Iterator value {} is not an entry object", shown)));
            }
            let key = interp.get(&entry, "0")?;
            let value = interp.get(&entry, "1")?;
            interp.call(&adder, receiver.clone(), &[key, value])?;
        }
    }
    Ok(Value::Object(map))
}

fn map_entries_snapshot(map: &ObjectRef) -> Vec<(Value, Value)> {
    match &map.borrow().kind {
        ObjectKind::Map(entries) => entries.clone(),
        _ => Vec::new(),
    }
}

fn map_get(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let map = receiver(interp, call, Proto::Map, "get")?;
    let key = call.arg(0);
    let found = match &map.borrow().kind {
        ObjectKind::Map(entries) => entries
            .iter()
            .find(|(k, _)| same_value_zero(k, &key))
            .map(|(_, v)| v.clone()),
        _ => None,
    };
    Ok(found.unwrap_or_default())
}

fn map_set(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let map = receiver(interp, call, Proto::Map, "set")?;
    let key = normalize_key(call.arg(0));
    let value = call.arg(1);
    let len = {
        let mut object = map.borrow_mut();
        let ObjectKind::Map(entries) = &mut object.kind else {
            return Ok(call.this.clone());
        };
        match entries.iter_mut().find(|(k, _)| same_value_zero(k, &key)) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
        entries.len()
    };
    interp.check_array_length(len)?;
    Ok(call.this.clone())
}

fn map_has(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let map = receiver(interp, call, Proto::Map, "has")?;
    let key = call.arg(0);
    let found = match &map.borrow().kind {
        ObjectKind::Map(entries) => entries.iter().any(|(k, _)| same_value_zero(k, &key)),
        _ => false,
    };
    Ok(Value::Bool(found))
}

fn map_delete(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let map = receiver(interp, call, Proto::Map, "delete")?;
    let key = call.arg(0);
    let mut object = map.borrow_mut();
    let ObjectKind::Map(entries) = &mut object.kind else {
        return Ok(Value::Bool(false));
    };
    let position = entries.iter().position(|(k, _)| same_value_zero(k, &key));
    match position {
        Some(position) => {
            entries.remove(position);
            Ok(Value::Bool(true))
        }
        None => Ok(Value::Bool(false)),
    }
}

fn map_clear(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let map = receiver(interp, call, Proto::Map, "clear")?;
    if let ObjectKind::Map(entries) = &mut map.borrow_mut().kind {
        entries.clear();
    }
    Ok(Value::Undefined)
}

/// Visits entries in insertion order, including entries added during the walk.
fn map_for_each(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let map = receiver(interp, call, Proto::Map, "forEach")?;
    let callback = callback_arg(interp, call, 0)?;
    let this_arg = call.arg(1);
    let mut index = 0;
    loop {
        let entry = match &map.borrow().kind {
            ObjectKind::Map(entries) => entries.get(index).cloned(),
            _ => None,
        };
        let Some((key, value)) = entry else {
            break;
        };
        interp.call(&callback, this_arg.clone(), &[value, key, call.this.clone()])?;
        index += 1;
    }
    Ok(Value::Undefined)
}

fn map_keys(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let map = receiver(interp, call, Proto::Map, "keys")?;
    let keys = map_entries_snapshot(&map).into_iter().map(|(k, _)| k).collect();
    Ok(interp.new_array(keys))
}

fn map_values(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let map = receiver(interp, call, Proto::Map, "values")?;
    let values = map_entries_snapshot(&map).into_iter().map(|(_, v)| v).collect();
    Ok(interp.new_array(values))
}

fn map_entries(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let map = receiver(interp, call, Proto::Map, "entries")?;
    let pairs = map_entries_snapshot(&map)
        .into_iter()
        .map(|(k, v)| interp.new_array(vec![k, v]))
        .collect();
    Ok(interp.new_array(pairs))
}

// ============================================================================
// SET
// ============================================================================

fn set_ctor(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let set = collection_instance(interp, call, Proto::Set, || ObjectKind::Set(Vec::new()))?;
    let iterable = call.arg(0);
    if !iterable.is_nullish() {
        let receiver = Value::Object(set.clone());
        let adder = interp.get(&receiver, "add")?;
        for value in interp.iterate(&iterable)? {
            interp.call(&adder, receiver.clone(), &[value])?;
        }
    }
    Ok(Value::Object(set))
}

fn set_snapshot(set: &ObjectRef) -> Vec<Value> {
    match &set.borrow().kind {
        ObjectKind::Set(values) => values.clone(),
        _ => Vec::new(),
    }
}

fn set_add(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let set = receiver(interp, call, Proto::Set, "add")?;
    let value = normalize_key(call.arg(0));
    let len = {
        let mut object = set.borrow_mut();
        let ObjectKind::Set(values) = &mut object.kind else {
            return Ok(call.this.clone());
        };
        if !values.iter().any(|v| same_value_zero(v, &value)) {
            values.push(value);
        }
        values.len()
    };
    interp.check_array_length(len)?;
    Ok(call.this.clone())
}

fn set_has(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let set = receiver(interp, call, Proto::Set, "has")?;
    let value = call.arg(0);
    let found = match &set.borrow().kind {
        ObjectKind::Set(values) => values.iter().any(|v| same_value_zero(v, &value)),
        _ => false,
    };
    Ok(Value::Bool(found))
}

fn set_delete(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let set = receiver(interp, call, Proto::Set, "delete")?;
    let value = call.arg(0);
    let mut object = set.borrow_mut();
    let ObjectKind::Set(values) = &mut object.kind else {
        return Ok(Value::Bool(false));
    };
    let position = values.iter().position(|v| same_value_zero(v, &value));
    match position {
        Some(position) => {
            values.remove(position);
            Ok(Value::Bool(true))
        }
        None => Ok(Value::Bool(false)),
    }
}

fn set_clear(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let set = receiver(interp, call, Proto::Set, "clear")?;
    if let ObjectKind::Set(values) = &mut set.borrow_mut().kind {
        values.clear();
    }
    Ok(Value::Undefined)
}

fn set_for_each(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let set = receiver(interp, call, Proto::Set, "forEach")?;
    let callback = callback_arg(interp, call, 0)?;
    let this_arg = call.arg(1);
    let mut index = 0;
    loop {
        let value = match &set.borrow().kind {
            ObjectKind::Set(values) => values.get(index).cloned(),
            _ => None,
        };
        let Some(value) = value else {
            break;
        };
        interp.call(&callback, this_arg.clone(), &[value.clone(), value, call.this.clone()])?;
        index += 1;
    }
    Ok(Value::Undefined)
}

fn set_values(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let set = receiver(interp, call, Proto::Set, "values")?;
    let values = set_snapshot(&set);
    Ok(interp.new_array(values))
}

fn set_entries(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let set = receiver(interp, call, Proto::Set, "entries")?;
    let pairs = set_snapshot(&set)
        .into_iter()
        .map(|v| interp.new_array(vec![v.clone(), v]))
        .collect();
    Ok(interp.new_array(pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_zero_keys_are_stored_as_zero() {
        assert!(matches!(normalize_key(Value::Number(-0.0)), Value::Number(n) if n.is_sign_positive()));
        assert!(matches!(normalize_key(Value::from("k")), Value::String(_)));
    }
}
