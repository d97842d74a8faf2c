//! # Error Builtins
//!
//! `Error` and its subclasses. Calling a constructor with or without `new` builds an error
//! object; `class X extends Error` reaches here through `super(...)` with the instance
//! already allocated, which is then turned into an error in place.

use std::rc::Rc;

use crate::builtins::{BuiltinRegistry, Slot};
use crate::runtime::interpreter::{Eval, Interpreter};
use crate::runtime::realm::Proto;
use crate::runtime::value::{NativeCall, ObjectKind, Value};

pub fn register(registry: &mut BuiltinRegistry) {
    registry.constructor(Proto::Error, error_ctor, 1);
    registry.constructor(Proto::TypeError, type_error_ctor, 1);
    registry.constructor(Proto::RangeError, range_error_ctor, 1);
    registry.constructor(Proto::ReferenceError, reference_error_ctor, 1);
    registry.constructor(Proto::SyntaxError, syntax_error_ctor, 1);
    registry.constructor(Proto::AggregateError, aggregate_error_ctor, 2);
    registry.function(Slot::Static("Error"), "captureStackTrace", capture_stack_trace, 1);
    registry.function(Slot::Prototype(Proto::Error), "toString", error_to_string, 0);
}

fn error_ctor(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    construct_error(interp, call, Proto::Error)
}

fn type_error_ctor(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    construct_error(interp, call, Proto::TypeError)
}

fn range_error_ctor(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    construct_error(interp, call, Proto::RangeError)
}

fn reference_error_ctor(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    construct_error(interp, call, Proto::ReferenceError)
}

fn syntax_error_ctor(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    construct_error(interp, call, Proto::SyntaxError)
}

/// `new AggregateError(errors, message)`; `errors` is any iterable.
fn aggregate_error_ctor(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let reasons = interp.iterate(&call.arg(0))?;
    let shifted = NativeCall {
        this: call.this,
        args: call.args.get(1..).unwrap_or_default(),
        data: call.data,
        new_target: call.new_target,
    };
    let error = construct_error(interp, &shifted, Proto::AggregateError)?;
    attach_errors(interp, &error, reasons);
    Ok(error)
}

/// Stores `reasons` as the non-enumerable `errors` array Node shows in brackets.
pub fn attach_errors(interp: &mut Interpreter, error: &Value, reasons: Vec<Value>) {
    let errors = interp.new_array(reasons);
    if let Value::Object(obj) = error {
        obj.borrow_mut().define_hidden(Rc::from("errors"), errors);
    }
}

/// `new E(message, { cause })`, `E(message)` and `super(message)` from a subclass.
fn construct_error(interp: &mut Interpreter, call: &NativeCall<'_>, intrinsic: Proto) -> Eval<Value> {
    let instance = match (call.this, call.new_target) {
        (Value::Object(existing), Some(_)) => {
            existing.borrow_mut().kind = ObjectKind::Error;
            existing.clone()
        }
        (_, Some(target)) => {
            let proto = interp.prototype_for(target, intrinsic);
            interp.alloc(ObjectKind::Error, Some(proto))
        }
        (_, None) => {
            let proto = interp.proto(intrinsic);
            interp.alloc(ObjectKind::Error, Some(proto))
        }
    };

    let message = call.arg(0);
    if !matches!(message, Value::Undefined) {
        let message = interp.to_string(&message)?;
        instance
            .borrow_mut()
            .properties
            .insert(Rc::from("message"), Value::String(message));
    }
    let options = call.arg(1);
    if let Value::Object(options_obj) = &options {
        if interp.has_property(options_obj, "cause") {
            let cause = interp.get(&options, "cause")?;
            instance.borrow_mut().properties.insert(Rc::from("cause"), cause);
        }
    }
    Ok(Value::Object(instance))
}

/// Stack traces are fixed text here; the call only has to exist.
fn capture_stack_trace(_interp: &mut Interpreter, _call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Undefined)
}

fn error_to_string(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let Value::Object(_) = call.this else {
        return Err(interp.type_error("Error.prototype.toString requires that 'this' be an Object"));
    };
    let name = match interp.get(call.this, "name")? {
        Value::Undefined => Rc::from("Error"),
        value => interp.to_string(&value)?,
    };
    let message = match interp.get(call.this, "message")? {
        Value::Undefined => Rc::from(""),
        value => interp.to_string(&value)?,
    };
    Ok(Value::string(match (name.is_empty(), message.is_empty()) {
        (_, true) => name.to_string(),
        (true, false) => message.to_string(),
        (false, false) => format!("{}: {}", name, message),
    }))
}
