//! # Promise Builtins
//!
//! The `Promise` constructor, `then`/`catch`/`finally` and the combinators. Settlement and
//! reaction scheduling live in [`crate::runtime::promise`]; this module only wires snippet
//! callbacks into it.
//!
//! The combinators share one [`AggregateState`] per call. Every input promise gets an
//! element function carrying its index, so results land in input order no matter which
//! promise settles first.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::builtins::{object_from, BuiltinRegistry, Slot};
use crate::runtime::inspect::inspect_nested;
use crate::runtime::interpreter::{Eval, Interpreter, Interrupt};
use crate::runtime::realm::Proto;
use crate::runtime::value::{
    AggregateOutcome, AggregateState, NativeCall, NativeData, ObjectKind, ObjectRef, PromiseData, Value,
};

pub fn register(registry: &mut BuiltinRegistry) {
    registry.constructor(Proto::Promise, promise_ctor, 1);
    let statics = Slot::Static("Promise");
    registry.function(statics, "resolve", promise_resolve_static, 1);
    registry.function(statics, "reject", promise_reject_static, 1);
    registry.function(statics, "all", promise_all, 1);
    registry.function(statics, "allSettled", promise_all_settled, 1);
    registry.function(statics, "race", promise_race, 1);
    registry.function(statics, "any", promise_any, 1);

    let proto = Slot::Prototype(Proto::Promise);
    registry.function(proto, "then", promise_then, 2);
    registry.function(proto, "catch", promise_catch, 1);
    registry.function(proto, "finally", promise_finally, 1);
}

// ============================================================================
// CONSTRUCTOR AND PROTOTYPE
// ============================================================================

fn promise_ctor(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let Some(target) = call.new_target else {
        return Err(interp.type_error("Promise constructor cannot be invoked without 'new'"));
    };
    let executor = call.arg(0);
    if !executor.is_callable() {
        let shown = inspect_nested(&executor);
        return Err(interp.type_error(format!("Promise resolver {} is not a function", shown)));
    }
    let promise = match call.this {
        Value::Object(existing) => {
            existing.borrow_mut().kind = ObjectKind::Promise(PromiseData::new());
            existing.clone()
        }
        _ => {
            let prototype = interp.prototype_for(target, Proto::Promise);
            interp.new_promise(Some(prototype))
        }
    };
    let (resolve, reject) = interp.resolving_functions(&promise);
    match interp.call(&executor, Value::Undefined, &[resolve, reject.clone()]) {
        Ok(_) => {}
        Err(Interrupt::Throw(thrown)) => {
            interp.call(&reject, Value::Undefined, &[thrown.value])?;
        }
        Err(other) => return Err(other),
    }
    Ok(Value::Object(promise))
}

fn this_promise(interp: &mut Interpreter, call: &NativeCall<'_>, method: &str) -> Eval<ObjectRef> {
    if let Value::Object(obj) = call.this {
        if matches!(obj.borrow().kind, ObjectKind::Promise(_)) {
            return Ok(obj.clone());
        }
    }
    let shown = inspect_nested(call.this);
    Err(interp.type_error(format!(
        "Method Promise.prototype.{} called on incompatible receiver {}",
        method, shown
    )))
}

fn handler(value: Value) -> Option<Value> {
    value.is_callable().then_some(value)
}

fn promise_then(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let promise = this_promise(interp, call, "then")?;
    let derived = interp.new_promise(None);
    interp.perform_then(&promise, handler(call.arg(0)), handler(call.arg(1)), Some(derived.clone()));
    Ok(Value::Object(derived))
}

/// `catch(f)` is `then(undefined, f)` looked up dynamically, as subclasses may override `then`.
fn promise_catch(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let then = interp.get(call.this, "then")?;
    interp.call(&then, call.this.clone(), &[Value::Undefined, call.arg(0)])
}

fn promise_finally(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let promise = this_promise(interp, call, "finally")?;
    let on_finally = call.arg(0);
    let (on_fulfilled, on_rejected) = if on_finally.is_callable() {
        let fulfilled = interp.new_native(
            "",
            finally_handler,
            NativeData::FinallyHandler {
                on_finally: on_finally.clone(),
                rejected: false,
            },
            1,
        );
        let rejected = interp.new_native(
            "",
            finally_handler,
            NativeData::FinallyHandler {
                on_finally,
                rejected: true,
            },
            1,
        );
        (Some(fulfilled), Some(rejected))
    } else {
        (None, None)
    };
    let derived = interp.new_promise(None);
    interp.perform_then(&promise, on_fulfilled, on_rejected, Some(derived.clone()));
    Ok(Value::Object(derived))
}

/// Runs the `finally` callback, waits for whatever it returns, then passes the original
/// outcome through.
fn finally_handler(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let NativeData::FinallyHandler { on_finally, rejected } = call.data else {
        return Ok(Value::Undefined);
    };
    let result = interp.call(on_finally, Value::Undefined, &[])?;
    let waited = interp.promise_resolve(result)?;
    let data = if *rejected {
        NativeData::ThrowValue(call.arg(0))
    } else {
        NativeData::ReturnValue(call.arg(0))
    };
    let passthrough = interp.new_native("", passthrough, data, 0);
    let derived = interp.new_promise(None);
    interp.perform_then(&waited, Some(passthrough), None, Some(derived.clone()));
    Ok(Value::Object(derived))
}

fn passthrough(_interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    match call.data {
        NativeData::ReturnValue(value) => Ok(value.clone()),
        NativeData::ThrowValue(reason) => Err(Interrupt::throw(reason.clone())),
        _ => Ok(Value::Undefined),
    }
}

// ============================================================================
// STATICS
// ============================================================================

fn promise_resolve_static(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Object(interp.promise_resolve(call.arg(0))?))
}

fn promise_reject_static(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let promise = interp.new_promise(None);
    interp.reject_promise(&promise, call.arg(0));
    Ok(Value::Object(promise))
}

/// Collects the inputs of a combinator. A non-iterable argument rejects the returned
/// promise instead of throwing.
fn combinator_inputs(interp: &mut Interpreter, call: &NativeCall<'_>, result: &ObjectRef) -> Eval<Option<Vec<ObjectRef>>> {
    let items = match interp.iterate(&call.arg(0)) {
        Ok(items) => items,
        Err(Interrupt::Throw(thrown)) => {
            interp.reject_promise(result, thrown.value);
            return Ok(None);
        }
        Err(other) => return Err(other),
    };
    let mut promises = Vec::with_capacity(items.len());
    for item in items {
        promises.push(interp.promise_resolve(item)?);
    }
    Ok(Some(promises))
}

fn aggregate_state(result: &ObjectRef, len: usize) -> Rc<AggregateState> {
    Rc::new(AggregateState {
        values: RefCell::new(vec![Value::Undefined; len]),
        remaining: Cell::new(len),
        promise: result.clone(),
    })
}

fn element_function(interp: &mut Interpreter, state: &Rc<AggregateState>, index: usize, outcome: AggregateOutcome, called: &Rc<Cell<bool>>) -> Value {
    interp.new_native(
        "",
        aggregate_element,
        NativeData::Aggregate {
            state: state.clone(),
            index,
            outcome,
            called: called.clone(),
        },
        1,
    )
}

fn promise_all(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let result = interp.new_promise(None);
    let Some(promises) = combinator_inputs(interp, call, &result)? else {
        return Ok(Value::Object(result));
    };
    if promises.is_empty() {
        let empty = interp.new_array(Vec::new());
        interp.resolve_promise(&result, empty)?;
        return Ok(Value::Object(result));
    }
    let state = aggregate_state(&result, promises.len());
    let (_, reject) = interp.resolving_functions(&result);
    for (index, promise) in promises.iter().enumerate() {
        let called = Rc::new(Cell::new(false));
        let on_fulfilled = element_function(interp, &state, index, AggregateOutcome::Value, &called);
        interp.perform_then(promise, Some(on_fulfilled), Some(reject.clone()), None);
    }
    Ok(Value::Object(result))
}

fn promise_all_settled(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let result = interp.new_promise(None);
    let Some(promises) = combinator_inputs(interp, call, &result)? else {
        return Ok(Value::Object(result));
    };
    if promises.is_empty() {
        let empty = interp.new_array(Vec::new());
        interp.resolve_promise(&result, empty)?;
        return Ok(Value::Object(result));
    }
    let state = aggregate_state(&result, promises.len());
    for (index, promise) in promises.iter().enumerate() {
        let called = Rc::new(Cell::new(false));
        let on_fulfilled = element_function(interp, &state, index, AggregateOutcome::Fulfilled, &called);
        let on_rejected = element_function(interp, &state, index, AggregateOutcome::Rejected, &called);
        interp.perform_then(promise, Some(on_fulfilled), Some(on_rejected), None);
    }
    Ok(Value::Object(result))
}

fn promise_race(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let result = interp.new_promise(None);
    let Some(promises) = combinator_inputs(interp, call, &result)? else {
        return Ok(Value::Object(result));
    };
    let (resolve, reject) = interp.resolving_functions(&result);
    for promise in &promises {
        interp.perform_then(promise, Some(resolve.clone()), Some(reject.clone()), None);
    }
    Ok(Value::Object(result))
}

fn promise_any(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let result = interp.new_promise(None);
    let Some(promises) = combinator_inputs(interp, call, &result)? else {
        return Ok(Value::Object(result));
    };
    if promises.is_empty() {
        let error = aggregate_error(interp, Vec::new());
        interp.reject_promise(&result, error);
        return Ok(Value::Object(result));
    }
    let state = aggregate_state(&result, promises.len());
    let (resolve, _) = interp.resolving_functions(&result);
    for (index, promise) in promises.iter().enumerate() {
        let called = Rc::new(Cell::new(false));
        let on_rejected = element_function(interp, &state, index, AggregateOutcome::Reason, &called);
        interp.perform_then(promise, Some(resolve.clone()), Some(on_rejected), None);
    }
    Ok(Value::Object(result))
}

/// Records one settled input; the last one settles the combined promise.
fn aggregate_element(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let NativeData::Aggregate {
        state,
        index,
        outcome,
        called,
    } = call.data
    else {
        return Ok(Value::Undefined);
    };
    if called.replace(true) {
        return Ok(Value::Undefined);
    }
    let argument = call.arg(0);
    let recorded = match outcome {
        AggregateOutcome::Value | AggregateOutcome::Reason => argument,
        AggregateOutcome::Fulfilled => object_from(
            interp,
            vec![("status", Value::from("fulfilled")), ("value", argument)],
        ),
        AggregateOutcome::Rejected => object_from(
            interp,
            vec![("status", Value::from("rejected")), ("reason", argument)],
        ),
    };
    if let Some(slot) = state.values.borrow_mut().get_mut(*index) {
        *slot = recorded;
    }
    let remaining = state.remaining.get().saturating_sub(1);
    state.remaining.set(remaining);
    if remaining > 0 {
        return Ok(Value::Undefined);
    }

    let values = state.values.borrow().clone();
    if *outcome == AggregateOutcome::Reason {
        let error = aggregate_error(interp, values);
        interp.reject_promise(&state.promise, error);
    } else {
        let array = interp.new_array(values);
        interp.resolve_promise(&state.promise, array)?;
    }
    Ok(Value::Undefined)
}

/// `AggregateError: All promises were rejected` with the reasons in `errors`.
fn aggregate_error(interp: &mut Interpreter, reasons: Vec<Value>) -> Value {
    let error = interp.make_error(Proto::AggregateError, "All promises were rejected");
    crate::builtins::errors::attach_errors(interp, &error, reasons);
    error
}
