//! Timers and clocks on the run's virtual time.
//!
//! `setTimeout` and `setInterval` return numeric ids. `Date.now()` and `performance.now()`
//! read the event loop clock, which only moves when a timer fires, so elapsed-time snippets
//! print the same numbers on every run.

use crate::builtins::{function_argument, BuiltinRegistry, Slot};
use crate::runtime::event_loop::{timer_delay, EPOCH_OFFSET_MS};
use crate::runtime::interpreter::{Eval, Interpreter};
use crate::runtime::value::{NativeCall, Value};

pub fn register(registry: &mut BuiltinRegistry) {
    registry.function(Slot::Global, "setTimeout", set_timeout, 2);
    registry.function(Slot::Global, "setInterval", set_interval, 2);
    registry.function(Slot::Global, "clearTimeout", clear_timer, 1);
    registry.function(Slot::Global, "clearInterval", clear_timer, 1);
    registry.function(Slot::Namespace("Date"), "now", date_now, 0);
    registry.function(Slot::Namespace("performance"), "now", performance_now, 0);
}

fn schedule(interp: &mut Interpreter, call: &NativeCall<'_>, repeat: bool) -> Eval<Value> {
    let callback = function_argument(interp, call, 0, "callback")?;
    let delay = match call.arg(1) {
        Value::Undefined => 1,
        value => timer_delay(interp.to_number(&value)?),
    };
    let args = call.args.get(2..).unwrap_or(&[]).to_vec();
    let id = interp.event_loop.schedule(callback, args, delay, repeat);
    Ok(Value::Number(f64::from(id)))
}

fn set_timeout(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    schedule(interp, call, false)
}

fn set_interval(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    schedule(interp, call, true)
}

/// Unknown ids, `undefined` and already fired timers are ignored.
fn clear_timer(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    if let Value::Number(id) = call.arg(0) {
        if id.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&id) {
            interp.event_loop.clear(id as u32);
        }
    }
    Ok(Value::Undefined)
}

fn date_now(interp: &mut Interpreter, _call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Number(EPOCH_OFFSET_MS + interp.event_loop.now() as f64))
}

fn performance_now(interp: &mut Interpreter, _call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Number(interp.event_loop.now() as f64))
}
