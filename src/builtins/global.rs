//! Global functions and constants: `parseInt`, `parseFloat`, `isNaN`, `isFinite`, `NaN`,
//! `Infinity` and `queueMicrotask`.

use crate::builtins::number::{number_parse_float, number_parse_int};
use crate::builtins::{function_argument, number_arg, BuiltinRegistry, Slot};
use crate::runtime::event_loop::Job;
use crate::runtime::interpreter::{Eval, Interpreter};
use crate::runtime::value::{NativeCall, Value};

pub fn register(registry: &mut BuiltinRegistry) {
    registry.function(Slot::Global, "parseInt", number_parse_int, 2);
    registry.function(Slot::Global, "parseFloat", number_parse_float, 1);
    registry.function(Slot::Global, "isNaN", global_is_nan, 1);
    registry.function(Slot::Global, "isFinite", global_is_finite, 1);
    registry.function(Slot::Global, "queueMicrotask", queue_microtask, 1);
    registry.constant(Slot::Global, "NaN", f64::NAN);
    registry.constant(Slot::Global, "Infinity", f64::INFINITY);
}

/// Unlike `Number.isNaN`, coerces first: `isNaN("abc")` is `true`.
fn global_is_nan(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Bool(number_arg(interp, call, 0)?.is_nan()))
}

fn global_is_finite(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Bool(number_arg(interp, call, 0)?.is_finite()))
}

fn queue_microtask(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let callback = function_argument(interp, call, 0, "callback")?;
    interp.event_loop.enqueue(Job::Callback {
        callback,
        args: Vec::new(),
    });
    Ok(Value::Undefined)
}
