//! Promise settlement and reaction scheduling.

use std::cell::Cell;
use std::rc::Rc;

use crate::runtime::event_loop::Job;
use crate::runtime::interpreter::{Eval, Interpreter};
use crate::runtime::realm::Proto;
use crate::runtime::value::{
    NativeCall, NativeData, ObjectKind, ObjectRef, PromiseData, PromiseState, Reaction, Value,
};

impl Interpreter {
    pub fn new_promise(&mut self, prototype: Option<ObjectRef>) -> ObjectRef {
        let prototype = prototype.unwrap_or_else(|| self.proto(Proto::Promise));
        self.alloc(ObjectKind::Promise(PromiseData::new()), Some(prototype))
    }

    /// The `resolve`/`reject` pair handed to an executor; only the first call has an effect.
    pub fn resolving_functions(&mut self, promise: &ObjectRef) -> (Value, Value) {
        let settled = Rc::new(Cell::new(false));
        let resolve = self.new_native(
            "",
            resolver,
            NativeData::Resolver {
                promise: promise.clone(),
                reject: false,
                settled: settled.clone(),
            },
            1,
        );
        let reject = self.new_native(
            "",
            resolver,
            NativeData::Resolver {
                promise: promise.clone(),
                reject: true,
                settled,
            },
            1,
        );
        (resolve, reject)
    }

    /// Resolves `promise` with `value`, adopting the state of thenables.
    pub fn resolve_promise(&mut self, promise: &ObjectRef, value: Value) -> Eval<()> {
        if let Value::Object(obj) = &value {
            if Rc::ptr_eq(obj, promise) {
                let error = self.make_error(Proto::TypeError, "Chaining cycle detected for promise #<Promise>");
                self.reject_promise(promise, error);
                return Ok(());
            }
            let then = self.get(&value, "then")?;
            if then.is_callable() {
                self.event_loop.enqueue(Job::ResolveThenable {
                    promise: promise.clone(),
                    thenable: value,
                    then,
                });
                return Ok(());
            }
        }
        self.settle(promise, Ok(value));
        Ok(())
    }

    pub fn reject_promise(&mut self, promise: &ObjectRef, reason: Value) {
        self.settle(promise, Err(reason));
    }

    fn settle(&mut self, promise: &ObjectRef, outcome: Result<Value, Value>) {
        let (reactions, argument, rejected, unhandled) = {
            let mut object = promise.borrow_mut();
            let ObjectKind::Promise(data) = &mut object.kind else {
                return;
            };
            if !matches!(data.state, PromiseState::Pending) {
                return;
            }
            let fulfill = std::mem::take(&mut data.fulfill_reactions);
            let reject = std::mem::take(&mut data.reject_reactions);
            match outcome {
                Ok(value) => {
                    data.state = PromiseState::Fulfilled(value.clone());
                    (fulfill, value, false, false)
                }
                Err(reason) => {
                    data.state = PromiseState::Rejected(reason.clone());
                    data.rejected_at = self.call_site;
                    (reject, reason, true, !data.handled)
                }
            }
        };
        if unhandled {
            self.event_loop.track_rejection(promise);
        }
        for reaction in reactions {
            self.event_loop.enqueue(Job::Reaction {
                handler: reaction.handler,
                argument: argument.clone(),
                derived: reaction.derived,
                rejected,
            });
        }
    }

    /// Registers reactions on `promise`; settled promises schedule them immediately.
    pub fn perform_then(
        &mut self,
        promise: &ObjectRef,
        on_fulfilled: Option<Value>,
        on_rejected: Option<Value>,
        derived: Option<ObjectRef>,
    ) {
        let job = {
            let mut object = promise.borrow_mut();
            let ObjectKind::Promise(data) = &mut object.kind else {
                return;
            };
            data.handled = true;
            match &data.state {
                PromiseState::Pending => {
                    data.fulfill_reactions.push(Reaction {
                        handler: on_fulfilled,
                        derived: derived.clone(),
                    });
                    data.reject_reactions.push(Reaction {
                        handler: on_rejected,
                        derived,
                    });
                    None
                }
                PromiseState::Fulfilled(value) => Some(Job::Reaction {
                    handler: on_fulfilled,
                    argument: value.clone(),
                    derived,
                    rejected: false,
                }),
                PromiseState::Rejected(reason) => Some(Job::Reaction {
                    handler: on_rejected,
                    argument: reason.clone(),
                    derived,
                    rejected: true,
                }),
            }
        };
        if let Some(job) = job {
            self.event_loop.enqueue(job);
        }
    }

    /// `Promise.resolve(value)`: promises pass through, anything else is wrapped.
    pub fn promise_resolve(&mut self, value: Value) -> Eval<ObjectRef> {
        if let Value::Object(obj) = &value {
            if matches!(obj.borrow().kind, ObjectKind::Promise(_)) {
                return Ok(obj.clone());
            }
        }
        let promise = self.new_promise(None);
        self.resolve_promise(&promise, value)?;
        Ok(promise)
    }
}

fn resolver(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let NativeData::Resolver {
        promise,
        reject,
        settled,
    } = call.data
    else {
        return Ok(Value::Undefined);
    };
    if settled.replace(true) {
        return Ok(Value::Undefined);
    }
    if *reject {
        interp.reject_promise(promise, call.arg(0));
    } else {
        interp.resolve_promise(promise, call.arg(0))?;
    }
    Ok(Value::Undefined)
}
