//! # Array Builtins
//!
//! The `Array` constructor, its statics and `Array.prototype`.
//!
//! ## Design Principles
//!
//! - **Live reads**: iteration methods fix the length up front and read elements as they go,
//!   so callbacks that mutate the array see the same results as in Node.
//! - **Frozen arrays**: mutators throw Node's TypeError instead of silently doing nothing.
//! - **Fallible comparisons**: `sort` is a merge sort whose comparator may throw.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::builtins::{callback_arg, BuiltinRegistry, Slot};
use crate::runtime::interpreter::{same_value_zero, strict_equals, Eval, Interpreter, MAX_ARRAY_LENGTH};
use crate::runtime::operators::compare_utf16;
use crate::runtime::realm::Proto;
use crate::runtime::value::{NativeCall, ObjectKind, ObjectRef, Value};

pub fn register(registry: &mut BuiltinRegistry) {
    registry.constructor(Proto::Array, array_ctor, 1);
    let statics = Slot::Static("Array");
    registry.function(statics, "isArray", is_array, 1);
    registry.function(statics, "from", from, 1);
    registry.function(statics, "of", of, 0);

    let proto = Slot::Prototype(Proto::Array);
    registry.function(proto, "at", at, 1);
    registry.function(proto, "concat", concat, 1);
    registry.function(proto, "entries", entries, 0);
    registry.function(proto, "every", every, 1);
    registry.function(proto, "fill", fill, 1);
    registry.function(proto, "filter", filter, 1);
    registry.function(proto, "find", find, 1);
    registry.function(proto, "findIndex", find_index, 1);
    registry.function(proto, "findLast", find_last, 1);
    registry.function(proto, "findLastIndex", find_last_index, 1);
    registry.function(proto, "flat", flat, 0);
    registry.function(proto, "flatMap", flat_map, 1);
    registry.function(proto, "forEach", for_each, 1);
    registry.function(proto, "includes", includes, 1);
    registry.function(proto, "indexOf", index_of, 1);
    registry.function(proto, "join", join, 1);
    registry.function(proto, "keys", keys, 0);
    registry.function(proto, "lastIndexOf", last_index_of, 1);
    registry.function(proto, "map", map, 1);
    registry.function(proto, "pop", pop, 0);
    registry.function(proto, "push", push, 1);
    registry.function(proto, "reduce", reduce, 1);
    registry.function(proto, "reduceRight", reduce_right, 1);
    registry.function(proto, "reverse", reverse, 0);
    registry.function(proto, "shift", shift, 0);
    registry.function(proto, "slice", slice, 2);
    registry.function(proto, "some", some, 1);
    registry.function(proto, "sort", sort, 1);
    registry.function(proto, "splice", splice, 2);
    registry.function(proto, "toString", to_string, 0);
    registry.function(proto, "unshift", unshift, 1);
    registry.function(proto, "values", values, 0);
}

// ============================================================================
// HELPERS
// ============================================================================

fn this_array(interp: &mut Interpreter, call: &NativeCall<'_>, method: &str) -> Eval<ObjectRef> {
    match call.this {
        Value::Object(obj) if matches!(obj.borrow().kind, ObjectKind::Array(_)) => Ok(obj.clone()),
        _ => Err(interp.type_error(format!(
            "Array.prototype.{} called on a value that is not an array",
            method
        ))),
    }
}

fn items(obj: &ObjectRef) -> Vec<Value> {
    match &obj.borrow().kind {
        ObjectKind::Array(items) => items.clone(),
        _ => Vec::new(),
    }
}

fn length(obj: &ObjectRef) -> usize {
    match &obj.borrow().kind {
        ObjectKind::Array(items) => items.len(),
        _ => 0,
    }
}

fn is_hole(obj: &ObjectRef, index: usize) -> bool {
    obj.borrow().holes.contains(&index)
}

fn element(obj: &ObjectRef, index: usize) -> Value {
    match &obj.borrow().kind {
        ObjectKind::Array(items) => items.get(index).cloned().unwrap_or_default(),
        _ => Value::Undefined,
    }
}

/// Runs `edit` on the elements and holes of a non-frozen array; frozen arrays raise `message`.
fn mutate<R>(
    interp: &mut Interpreter,
    obj: &ObjectRef,
    message: impl FnOnce(usize) -> String,
    edit: impl FnOnce(&mut Vec<Value>, &mut BTreeSet<usize>) -> R,
) -> Eval<R> {
    let frozen = obj.borrow().frozen;
    if frozen {
        let len = length(obj);
        return Err(interp.type_error(message(len)));
    }
    let object = &mut *obj.borrow_mut();
    if let ObjectKind::Array(items) = &mut object.kind {
        return Ok(edit(items, &mut object.holes));
    }
    Err(interp.type_error("not an array"))
}

/// Moves every hole at or after `from` by `delta` positions.
fn shift_holes(holes: &mut BTreeSet<usize>, from: usize, delta: isize) {
    let moved = holes.split_off(&from);
    holes.extend(moved.into_iter().filter_map(|hole| hole.checked_add_signed(delta)));
}

fn cannot_add(len: usize) -> String {
    format!("Cannot add property {}, object is not extensible", len)
}

fn cannot_delete(len: usize) -> String {
    format!("Cannot delete property '{}' of [object Array]", len.saturating_sub(1))
}

fn cannot_assign(_: usize) -> String {
    "Cannot assign to read only property '0' of object '[object Array]'".to_string()
}

/// Calls `callback(element, index, array)` with the `thisArg` from argument one.
fn invoke(interp: &mut Interpreter, call: &NativeCall<'_>, callback: &Value, obj: &ObjectRef, index: usize) -> Eval<Value> {
    let args = [element(obj, index), Value::Number(index as f64), Value::Object(obj.clone())];
    interp.call(callback, call.arg(1), &args)
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

fn array_ctor(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let items = match call.args {
        [Value::Number(n)] => {
            let n = *n;
            if n < 0.0 || n.fract() != 0.0 || n > u32::MAX as f64 {
                return Err(interp.range_error("Invalid array length"));
            }
            interp.check_array_length(n as usize)?;
            vec![Value::Undefined; n as usize]
        }
        args => args.to_vec(),
    };
    let sparse = matches!(call.args, [Value::Number(_)]);
    let len = items.len();
    let array = interp.new_array(items);
    if let (true, Value::Object(obj)) = (sparse, &array) {
        obj.borrow_mut().holes.extend(0..len);
    }
    if let (Some(target), Value::Object(obj)) = (call.new_target, &array) {
        let proto = interp.prototype_for(target, Proto::Array);
        obj.borrow_mut().prototype = Some(proto);
    }
    Ok(array)
}

fn is_array(_interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Bool(call.arg(0).is_array()))
}

/// Iterables are iterated; other objects are read as array-likes through `length`.
fn from(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let source = call.arg(0);
    if source.is_nullish() {
        return Err(interp.type_error(format!(
            "{} is not iterable (cannot read property Symbol(Symbol.iterator))",
            crate::runtime::inspect::inspect_nested(&source)
        )));
    }
    let iterable = match &source {
        Value::String(_) => true,
        Value::Object(obj) => matches!(
            obj.borrow().kind,
            ObjectKind::Array(_) | ObjectKind::Map(_) | ObjectKind::Set(_) | ObjectKind::Primitive(Value::String(_))
        ),
        _ => false,
    };
    let mut values = if iterable {
        interp.iterate(&source)?
    } else {
        let len = interp.get(&source, "length")?;
        let len = interp.to_integer(&len)?.clamp(0.0, MAX_ARRAY_LENGTH as f64) as usize;
        interp.check_array_length(len)?;
        let mut values = Vec::with_capacity(len);
        for index in 0..len {
            values.push(interp.get(&source, &index.to_string())?);
        }
        values
    };
    let mapper = call.arg(1);
    if !matches!(mapper, Value::Undefined) {
        let mapper = callback_arg(interp, call, 1)?;
        for (index, value) in values.iter_mut().enumerate() {
            let mapped = interp.call(&mapper, call.arg(2), &[value.clone(), Value::Number(index as f64)])?;
            *value = mapped;
        }
    }
    Ok(interp.new_array(values))
}

fn of(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(interp.new_array(call.args.to_vec()))
}

// ============================================================================
// MUTATORS
// ============================================================================

fn push(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "push")?;
    interp.check_array_length(length(&obj) + call.args.len())?;
    let len = mutate(interp, &obj, cannot_add, |items, _| {
        items.extend_from_slice(call.args);
        items.len()
    })?;
    Ok(Value::Number(len as f64))
}

fn pop(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "pop")?;
    let popped = mutate(interp, &obj, cannot_delete, |items, holes| {
        let popped = items.pop();
        holes.remove(&items.len());
        popped
    })?;
    Ok(popped.unwrap_or_default())
}

fn shift(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "shift")?;
    let removed = mutate(interp, &obj, cannot_delete, |items, holes| {
        holes.remove(&0);
        shift_holes(holes, 1, -1);
        (!items.is_empty()).then(|| items.remove(0))
    })?;
    Ok(removed.unwrap_or_default())
}

fn unshift(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "unshift")?;
    interp.check_array_length(length(&obj) + call.args.len())?;
    let len = mutate(interp, &obj, cannot_add, |items, holes| {
        shift_holes(holes, 0, call.args.len() as isize);
        items.splice(0..0, call.args.iter().cloned());
        items.len()
    })?;
    Ok(Value::Number(len as f64))
}

fn splice(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "splice")?;
    let len = length(&obj);
    let start = interp.relative_index(&call.arg(0), len, 0)?;
    let delete_count = match call.args.len() {
        0 => 0,
        1 => len - start,
        _ => (interp.to_integer(&call.arg(1))?.max(0.0) as usize).min(len - start),
    };
    let inserted: Vec<Value> = call.args.iter().skip(2).cloned().collect();
    interp.check_array_length(len - delete_count + inserted.len())?;
    let removed = mutate(interp, &obj, cannot_assign, |items, holes| {
        let tail = start + delete_count;
        holes.retain(|hole| !(start..tail).contains(hole));
        shift_holes(holes, tail, inserted.len() as isize - delete_count as isize);
        items.splice(start..tail, inserted).collect::<Vec<_>>()
    })?;
    Ok(interp.new_array(removed))
}

fn reverse(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "reverse")?;
    mutate(interp, &obj, cannot_assign, |items, holes| {
        let last = items.len().saturating_sub(1);
        *holes = holes.iter().map(|hole| last - hole).collect();
        items.reverse();
    })?;
    Ok(Value::Object(obj))
}

fn fill(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "fill")?;
    let len = length(&obj);
    let start = interp.relative_index(&call.arg(1), len, 0)?;
    let end = interp.relative_index(&call.arg(2), len, len)?;
    let value = call.arg(0);
    mutate(interp, &obj, cannot_assign, |items, holes| {
        holes.retain(|hole| !(start..end).contains(hole));
        for slot in items.iter_mut().take(end).skip(start) {
            *slot = value.clone();
        }
    })?;
    Ok(Value::Object(obj))
}

fn sort(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "sort")?;
    let comparator = call.arg(0);
    if !matches!(comparator, Value::Undefined) && !comparator.is_callable() {
        return Err(interp.type_error(
            "The comparison function must be either a function or undefined",
        ));
    }
    if obj.borrow().frozen {
        return Err(interp.type_error(cannot_assign(0)));
    }
    let holes = std::mem::take(&mut obj.borrow_mut().holes);
    let present: Vec<Value> = items(&obj)
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !holes.contains(index))
        .map(|(_, value)| value)
        .collect();
    let (mut defined, undefined): (Vec<Value>, Vec<Value>) =
        present.into_iter().partition(|v| !matches!(v, Value::Undefined));
    let mut keys = Vec::new();
    if matches!(comparator, Value::Undefined) {
        for value in &defined {
            keys.push(interp.to_string(value)?);
        }
    }
    let mut order: Vec<usize> = (0..defined.len()).collect();
    merge_sort(&mut order, &mut |a, b| {
        if keys.is_empty() {
            let result = interp.call(&comparator, Value::Undefined, &[defined[a].clone(), defined[b].clone()])?;
            let n = interp.to_number(&result)?;
            Ok(if n > 0.0 { Ordering::Greater } else { Ordering::Less })
        } else {
            Ok(compare_utf16(&keys[a], &keys[b]))
        }
    })?;
    let mut sorted: Vec<Value> = order.into_iter().map(|i| std::mem::take(&mut defined[i])).collect();
    sorted.extend(undefined);
    let present = sorted.len();
    sorted.resize(present + holes.len(), Value::Undefined);
    {
        let object = &mut *obj.borrow_mut();
        object.holes = (present..sorted.len()).collect();
        if let ObjectKind::Array(items) = &mut object.kind {
            *items = sorted;
        }
    }
    Ok(Value::Object(obj))
}

/// Stable merge sort with a fallible comparator; `Greater` moves the left element after the right.
fn merge_sort<F>(items: &mut Vec<usize>, compare: &mut F) -> Eval<()>
where
    F: FnMut(usize, usize) -> Eval<Ordering>,
{
    if items.len() < 2 {
        return Ok(());
    }
    let mut right = items.split_off(items.len() / 2);
    merge_sort(items, compare)?;
    merge_sort(&mut right, compare)?;
    let left = std::mem::take(items);
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if compare(left[i], right[j])? == Ordering::Greater {
            items.push(right[j]);
            j += 1;
        } else {
            items.push(left[i]);
            i += 1;
        }
    }
    items.extend_from_slice(&left[i..]);
    items.extend_from_slice(&right[j..]);
    Ok(())
}

// ============================================================================
// ACCESSORS
// ============================================================================

fn at(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "at")?;
    let len = length(&obj) as f64;
    let n = interp.to_integer(&call.arg(0))?;
    let index = if n < 0.0 { len + n } else { n };
    if index < 0.0 || index >= len {
        return Ok(Value::Undefined);
    }
    Ok(element(&obj, index as usize))
}

fn slice(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "slice")?;
    let items = items(&obj);
    let start = interp.relative_index(&call.arg(0), items.len(), 0)?;
    let end = interp.relative_index(&call.arg(1), items.len(), items.len())?;
    let slice = if start < end { items[start..end].to_vec() } else { Vec::new() };
    Ok(interp.new_array(slice))
}

fn concat(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "concat")?;
    let mut result = items(&obj);
    for arg in call.args {
        match arg {
            Value::Object(other) if arg.is_array() => result.extend(items(other)),
            other => result.push(other.clone()),
        }
        interp.check_array_length(result.len())?;
    }
    Ok(interp.new_array(result))
}

pub(crate) fn join_values(interp: &mut Interpreter, items: &[Value], separator: &str) -> Eval<String> {
    let mut out = String::new();
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push_str(separator);
        }
        if !item.is_nullish() {
            out.push_str(&interp.to_string(item)?);
        }
        interp.check_string_length(out.len())?;
    }
    Ok(out)
}

fn join(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "join")?;
    let separator = match call.arg(0) {
        Value::Undefined => ",".into(),
        value => interp.to_string(&value)?,
    };
    let items = items(&obj);
    Ok(Value::string(join_values(interp, &items, &separator)?))
}

fn to_string(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "toString")?;
    let items = items(&obj);
    Ok(Value::string(join_values(interp, &items, ",")?))
}

fn index_of(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "indexOf")?;
    let items = items(&obj);
    let from = interp.relative_index(&call.arg(1), items.len(), 0)?;
    let target = call.arg(0);
    let found = items.iter().skip(from).position(|v| strict_equals(v, &target));
    Ok(Value::Number(found.map_or(-1.0, |i| (i + from) as f64)))
}

fn last_index_of(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "lastIndexOf")?;
    let items = items(&obj);
    let target = call.arg(0);
    let end = match call.arg(1) {
        Value::Undefined => items.len(),
        value => {
            let n = interp.to_integer(&value)?;
            let n = if n < 0.0 { items.len() as f64 + n } else { n };
            if n < 0.0 {
                return Ok(Value::Number(-1.0));
            }
            (n as usize + 1).min(items.len())
        }
    };
    let found = items[..end].iter().rposition(|v| strict_equals(v, &target));
    Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
}

fn includes(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "includes")?;
    let items = items(&obj);
    let from = interp.relative_index(&call.arg(1), items.len(), 0)?;
    let target = call.arg(0);
    Ok(Value::Bool(items.iter().skip(from).any(|v| same_value_zero(v, &target))))
}

fn flatten_into(out: &mut Vec<Value>, items: Vec<Value>, depth: f64) {
    for item in items {
        match &item {
            Value::Object(obj) if depth >= 1.0 && item.is_array() => {
                let inner = self::items(obj);
                flatten_into(out, inner, depth - 1.0);
            }
            _ => out.push(item),
        }
    }
}

fn flat(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "flat")?;
    let depth = match call.arg(0) {
        Value::Undefined => 1.0,
        value => interp.to_integer(&value)?,
    };
    let mut out = Vec::new();
    flatten_into(&mut out, items(&obj), depth);
    interp.check_array_length(out.len())?;
    Ok(interp.new_array(out))
}

fn keys(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "keys")?;
    let keys = (0..length(&obj)).map(|i| Value::Number(i as f64)).collect();
    Ok(interp.new_array(keys))
}

fn values(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "values")?;
    Ok(interp.new_array(items(&obj)))
}

fn entries(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "entries")?;
    let mut entries = Vec::new();
    for (index, value) in items(&obj).into_iter().enumerate() {
        entries.push(interp.new_array(vec![Value::Number(index as f64), value]));
    }
    Ok(interp.new_array(entries))
}

// ============================================================================
// ITERATION
// ============================================================================

fn for_each(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "forEach")?;
    let callback = callback_arg(interp, call, 0)?;
    for index in 0..length(&obj) {
        if !is_hole(&obj, index) {
            invoke(interp, call, &callback, &obj, index)?;
        }
    }
    Ok(Value::Undefined)
}

fn map(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "map")?;
    let callback = callback_arg(interp, call, 0)?;
    let len = length(&obj);
    let mut out = Vec::with_capacity(len);
    let mut holes = BTreeSet::new();
    for index in 0..len {
        if is_hole(&obj, index) {
            holes.insert(index);
            out.push(Value::Undefined);
        } else {
            out.push(invoke(interp, call, &callback, &obj, index)?);
        }
    }
    let mapped = interp.new_array(out);
    if let Value::Object(array) = &mapped {
        array.borrow_mut().holes = holes;
    }
    Ok(mapped)
}

fn filter(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "filter")?;
    let callback = callback_arg(interp, call, 0)?;
    let mut out = Vec::new();
    for index in 0..length(&obj) {
        if is_hole(&obj, index) {
            continue;
        }
        let value = element(&obj, index);
        if invoke(interp, call, &callback, &obj, index)?.truthy() {
            out.push(value);
        }
    }
    Ok(interp.new_array(out))
}

fn flat_map(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "flatMap")?;
    let callback = callback_arg(interp, call, 0)?;
    let mut mapped = Vec::new();
    for index in 0..length(&obj) {
        mapped.push(invoke(interp, call, &callback, &obj, index)?);
    }
    let mut out = Vec::new();
    flatten_into(&mut out, mapped, 1.0);
    interp.check_array_length(out.len())?;
    Ok(interp.new_array(out))
}

/// First index (or last, scanning backwards) whose callback result is truthy.
fn search(interp: &mut Interpreter, call: &NativeCall<'_>, method: &str, backwards: bool) -> Eval<Option<(usize, Value)>> {
    let obj = this_array(interp, call, method)?;
    let callback = callback_arg(interp, call, 0)?;
    let len = length(&obj);
    let order: Box<dyn Iterator<Item = usize>> = if backwards {
        Box::new((0..len).rev())
    } else {
        Box::new(0..len)
    };
    for index in order {
        let value = element(&obj, index);
        if invoke(interp, call, &callback, &obj, index)?.truthy() {
            return Ok(Some((index, value)));
        }
    }
    Ok(None)
}

fn find(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(search(interp, call, "find", false)?.map(|(_, v)| v).unwrap_or_default())
}

fn find_last(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(search(interp, call, "findLast", true)?.map(|(_, v)| v).unwrap_or_default())
}

fn find_index(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let found = search(interp, call, "findIndex", false)?;
    Ok(Value::Number(found.map_or(-1.0, |(i, _)| i as f64)))
}

fn find_last_index(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let found = search(interp, call, "findLastIndex", true)?;
    Ok(Value::Number(found.map_or(-1.0, |(i, _)| i as f64)))
}

fn some(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Bool(search(interp, call, "some", false)?.is_some()))
}

fn every(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let obj = this_array(interp, call, "every")?;
    let callback = callback_arg(interp, call, 0)?;
    for index in 0..length(&obj) {
        if !invoke(interp, call, &callback, &obj, index)?.truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn fold(interp: &mut Interpreter, call: &NativeCall<'_>, method: &str, backwards: bool) -> Eval<Value> {
    let obj = this_array(interp, call, method)?;
    let callback = callback_arg(interp, call, 0)?;
    let len = length(&obj);
    let mut order: Box<dyn Iterator<Item = usize>> = if backwards {
        Box::new((0..len).rev())
    } else {
        Box::new(0..len)
    };
    let mut accumulator = if call.args.len() >= 2 {
        call.arg(1)
    } else {
        match order.next() {
            Some(index) => element(&obj, index),
            None => return Err(interp.type_error("Reduce of empty array with no initial value")),
        }
    };
    for index in order {
        let args = [
            accumulator,
            element(&obj, index),
            Value::Number(index as f64),
            Value::Object(obj.clone()),
        ];
        accumulator = interp.call(&callback, Value::Undefined, &args)?;
    }
    Ok(accumulator)
}

fn reduce(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    fold(interp, call, "reduce", false)
}

fn reduce_right(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    fold(interp, call, "reduceRight", true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sort_is_stable() {
        let keys = [3, 1, 3, 2, 1];
        let mut order: Vec<usize> = (0..keys.len()).collect();
        merge_sort(&mut order, &mut |a, b| Ok(keys[a].cmp(&keys[b]))).unwrap();
        assert_eq!(order, vec![1, 4, 3, 0, 2]);
    }

    #[test]
    fn merge_sort_stops_on_the_first_error() {
        let mut calls = 0;
        let mut order: Vec<usize> = (0..8).collect();
        let result = merge_sort(&mut order, &mut |_, _| {
            calls += 1;
            Err(crate::runtime::Interrupt::Timeout)
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
