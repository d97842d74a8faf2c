//! Intrinsic prototypes shared by every object of a run.

use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::value::{Object, ObjectKind, ObjectRef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Proto {
    Object,
    Function,
    Array,
    String,
    Number,
    Boolean,
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
    AggregateError,
    Promise,
    Map,
    Set,
}

impl Proto {
    pub const ERRORS: [Proto; 5] = [
        Proto::TypeError,
        Proto::RangeError,
        Proto::ReferenceError,
        Proto::SyntaxError,
        Proto::AggregateError,
    ];

    /// Global constructor name for the prototype.
    pub fn name(self) -> &'static str {
        match self {
            Proto::Object => "Object",
            Proto::Function => "Function",
            Proto::Array => "Array",
            Proto::String => "String",
            Proto::Number => "Number",
            Proto::Boolean => "Boolean",
            Proto::Error => "Error",
            Proto::TypeError => "TypeError",
            Proto::RangeError => "RangeError",
            Proto::ReferenceError => "ReferenceError",
            Proto::SyntaxError => "SyntaxError",
            Proto::AggregateError => "AggregateError",
            Proto::Promise => "Promise",
            Proto::Map => "Map",
            Proto::Set => "Set",
        }
    }

    fn parent(self) -> Option<Proto> {
        match self {
            Proto::Object => None,
            proto if Proto::ERRORS.contains(&proto) => Some(Proto::Error),
            _ => Some(Proto::Object),
        }
    }

    fn all() -> [Proto; 15] {
        [
            Proto::Object,
            Proto::Function,
            Proto::Array,
            Proto::String,
            Proto::Number,
            Proto::Boolean,
            Proto::Error,
            Proto::TypeError,
            Proto::RangeError,
            Proto::ReferenceError,
            Proto::SyntaxError,
            Proto::AggregateError,
            Proto::Promise,
            Proto::Map,
            Proto::Set,
        ]
    }
}

pub struct Realm {
    /// Indexed by `Proto as usize`.
    prototypes: Vec<ObjectRef>,
}

impl Realm {
    /// Allocates the intrinsic prototypes; `track` registers each with the owning heap.
    pub fn new(mut track: impl FnMut(&ObjectRef)) -> Self {
        let mut prototypes: Vec<ObjectRef> = Vec::with_capacity(Proto::all().len());
        for proto in Proto::all() {
            let parent = proto.parent().map(|parent| prototypes[parent as usize].clone());
            let kind = match proto {
                Proto::Array => ObjectKind::Array(Vec::new()),
                _ => ObjectKind::Ordinary,
            };
            let obj = Rc::new(RefCell::new(Object::new(kind, parent)));
            if proto == Proto::Error || Proto::ERRORS.contains(&proto) {
                let mut object = obj.borrow_mut();
                object.define_hidden(Rc::from("name"), Value::string(proto.name()));
                object.define_hidden(Rc::from("message"), Value::string(""));
            }
            track(&obj);
            prototypes.push(obj);
        }
        Self { prototypes }
    }

    pub fn get(&self, proto: Proto) -> ObjectRef {
        self.prototypes[proto as usize].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_prototypes_chain_to_error() {
        let realm = Realm::new(|_| {});
        let type_error = realm.get(Proto::TypeError);
        let parent = type_error.borrow().prototype.clone();
        assert!(parent.is_some_and(|p| Rc::ptr_eq(&p, &realm.get(Proto::Error))));
        assert!(realm.get(Proto::Object).borrow().prototype.is_none());
    }
}
