//! # Number and Boolean Builtins
//!
//! The `Number` and `Boolean` constructors, their statics and prototype methods. The text
//! layout rules themselves live in [`crate::runtime::number`].

use crate::builtins::{number_arg, BuiltinRegistry, Slot};
use crate::runtime::interpreter::{Eval, Interpreter};
use crate::runtime::number::{
    format_number, parse_float, parse_int, to_fixed, to_locale_string, to_precision, to_radix,
};
use crate::runtime::realm::Proto;
use crate::runtime::value::{NativeCall, ObjectKind, Value};

/// 2^53 - 1.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub fn register(registry: &mut BuiltinRegistry) {
    registry.constructor(Proto::Number, number_ctor, 1);
    let statics = Slot::Static("Number");
    registry.function(statics, "isInteger", is_integer, 1);
    registry.function(statics, "isSafeInteger", is_safe_integer, 1);
    registry.function(statics, "isFinite", is_finite, 1);
    registry.function(statics, "isNaN", is_nan, 1);
    registry.function(statics, "parseFloat", number_parse_float, 1);
    registry.function(statics, "parseInt", number_parse_int, 2);
    registry.constant(statics, "MAX_SAFE_INTEGER", MAX_SAFE_INTEGER);
    registry.constant(statics, "MIN_SAFE_INTEGER", -MAX_SAFE_INTEGER);
    registry.constant(statics, "EPSILON", f64::EPSILON);
    registry.constant(statics, "MAX_VALUE", f64::MAX);
    registry.constant(statics, "MIN_VALUE", 5e-324);
    registry.constant(statics, "POSITIVE_INFINITY", f64::INFINITY);
    registry.constant(statics, "NEGATIVE_INFINITY", f64::NEG_INFINITY);
    registry.constant(statics, "NaN", f64::NAN);

    let proto = Slot::Prototype(Proto::Number);
    registry.function(proto, "toFixed", number_to_fixed, 1);
    registry.function(proto, "toPrecision", number_to_precision, 1);
    registry.function(proto, "toString", number_to_string, 1);
    registry.function(proto, "toLocaleString", number_to_locale_string, 0);
    registry.function(proto, "valueOf", number_value_of, 0);

    registry.constructor(Proto::Boolean, boolean_ctor, 1);
    let proto = Slot::Prototype(Proto::Boolean);
    registry.function(proto, "toString", boolean_to_string, 0);
    registry.function(proto, "valueOf", boolean_value_of, 0);
}

// ============================================================================
// NUMBER
// ============================================================================

/// `Number(x)` converts; `new Number(x)` boxes.
fn number_ctor(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let n = if call.args.is_empty() { 0.0 } else { number_arg(interp, call, 0)? };
    match call.new_target {
        Some(target) => {
            let proto = interp.prototype_for(target, Proto::Number);
            Ok(Value::Object(interp.alloc(ObjectKind::Primitive(Value::Number(n)), Some(proto))))
        }
        None => Ok(Value::Number(n)),
    }
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        _ => None,
    }
}

fn is_integer(_interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let result = number_of(&call.arg(0)).is_some_and(|n| n.is_finite() && n.trunc() == n);
    Ok(Value::Bool(result))
}

fn is_safe_integer(_interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let result = number_of(&call.arg(0))
        .is_some_and(|n| n.is_finite() && n.trunc() == n && n.abs() <= MAX_SAFE_INTEGER);
    Ok(Value::Bool(result))
}

fn is_finite(_interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Bool(number_of(&call.arg(0)).is_some_and(f64::is_finite)))
}

fn is_nan(_interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Bool(number_of(&call.arg(0)).is_some_and(f64::is_nan)))
}

pub(crate) fn number_parse_float(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let text = interp.to_string(&call.arg(0))?;
    Ok(Value::Number(parse_float(&text)))
}

pub(crate) fn number_parse_int(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let text = interp.to_string(&call.arg(0))?;
    let radix = match call.arg(1) {
        Value::Undefined => None,
        value => {
            let radix = interp.to_integer(&value)?;
            (radix != 0.0).then_some(radix as u32)
        }
    };
    Ok(Value::Number(parse_int(&text, radix)))
}

/// `this` as a number, unboxing `Number` objects.
fn this_number(interp: &mut Interpreter, call: &NativeCall<'_>, method: &str) -> Eval<f64> {
    match call.this {
        Value::Number(n) => return Ok(*n),
        Value::Object(obj) => {
            if let ObjectKind::Primitive(Value::Number(n)) = &obj.borrow().kind {
                return Ok(*n);
            }
        }
        _ => {}
    }
    Err(interp.type_error(format!(
        "Number.prototype.{} requires that 'this' be a Number",
        method
    )))
}

fn digits_arg(interp: &mut Interpreter, call: &NativeCall<'_>, range: std::ops::RangeInclusive<f64>, method: &str) -> Eval<Option<usize>> {
    let value = call.arg(0);
    if matches!(value, Value::Undefined) {
        return Ok(None);
    }
    let digits = interp.to_integer(&value)?;
    if !range.contains(&digits) {
        return Err(interp.range_error(format!(
            "{}() {} must be between {} and {}",
            method,
            if method == "toFixed" { "digits argument" } else { "argument" },
            range.start(),
            range.end()
        )));
    }
    Ok(Some(digits as usize))
}

fn number_to_fixed(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let n = this_number(interp, call, "toFixed")?;
    let digits = digits_arg(interp, call, 0.0..=100.0, "toFixed")?.unwrap_or(0);
    Ok(Value::string(to_fixed(n, digits)))
}

fn number_to_precision(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let n = this_number(interp, call, "toPrecision")?;
    Ok(Value::string(match digits_arg(interp, call, 1.0..=100.0, "toPrecision")? {
        Some(precision) => to_precision(n, precision),
        None => format_number(n),
    }))
}

fn number_to_string(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let n = this_number(interp, call, "toString")?;
    let radix = match call.arg(0) {
        Value::Undefined => 10.0,
        value => interp.to_integer(&value)?,
    };
    if !(2.0..=36.0).contains(&radix) {
        return Err(interp.range_error("toString() radix must be between 2 and 36"));
    }
    Ok(Value::string(to_radix(n, radix as u32)))
}

fn number_to_locale_string(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let n = this_number(interp, call, "toLocaleString")?;
    Ok(Value::string(to_locale_string(n)))
}

fn number_value_of(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Number(this_number(interp, call, "valueOf")?))
}

// ============================================================================
// BOOLEAN
// ============================================================================

fn boolean_ctor(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let b = call.arg(0).truthy();
    match call.new_target {
        Some(target) => {
            let proto = interp.prototype_for(target, Proto::Boolean);
            Ok(Value::Object(interp.alloc(ObjectKind::Primitive(Value::Bool(b)), Some(proto))))
        }
        None => Ok(Value::Bool(b)),
    }
}

fn this_boolean(interp: &mut Interpreter, call: &NativeCall<'_>, method: &str) -> Eval<bool> {
    match call.this {
        Value::Bool(b) => return Ok(*b),
        Value::Object(obj) => {
            if let ObjectKind::Primitive(Value::Bool(b)) = &obj.borrow().kind {
                return Ok(*b);
            }
        }
        _ => {}
    }
    Err(interp.type_error(format!(
        "Boolean.prototype.{} requires that 'this' be a Boolean",
        method
    )))
}

fn boolean_to_string(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let b = this_boolean(interp, call, "toString")?;
    Ok(Value::from(if b { "true" } else { "false" }))
}

fn boolean_value_of(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Bool(this_boolean(interp, call, "valueOf")?))
}
