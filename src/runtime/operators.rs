//! Type coercion and the binary operators.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::runtime::interpreter::{strict_equals, Eval, Interpreter};
use crate::runtime::number::{format_number, string_to_number};
use crate::runtime::value::{lookup_property, Callable, ObjectKind, ObjectRef, PropertyKey, Value};
use crate::syntax::BinaryOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    Default,
    Number,
    String,
}

impl Interpreter {
    /// ToPrimitive: `valueOf`/`toString` in hint order, whichever yields a primitive first.
    pub fn to_primitive(&mut self, value: &Value, hint: Hint) -> Eval<Value> {
        let Value::Object(obj) = value else {
            return Ok(value.clone());
        };
        if let ObjectKind::Primitive(inner) = &obj.borrow().kind {
            return Ok(inner.clone());
        }
        let order = match hint {
            Hint::String => ["toString", "valueOf"],
            Hint::Default | Hint::Number => ["valueOf", "toString"],
        };
        for name in order {
            let method = self.get(value, name)?;
            if method.is_callable() {
                let result = self.call(&method, value.clone(), &[])?;
                if !matches!(result, Value::Object(_)) {
                    return Ok(result);
                }
            }
        }
        Err(self.type_error("Cannot convert object to primitive value"))
    }

    pub fn to_number(&mut self, value: &Value) -> Eval<f64> {
        Ok(match value {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Object(_) => {
                let primitive = self.to_primitive(value, Hint::Number)?;
                return self.to_number(&primitive);
            }
        })
    }

    pub fn to_string(&mut self, value: &Value) -> Eval<Rc<str>> {
        Ok(match value {
            Value::Undefined => Rc::from("undefined"),
            Value::Null => Rc::from("null"),
            Value::Bool(b) => Rc::from(if *b { "true" } else { "false" }),
            Value::Number(n) => Rc::from(format_number(*n).as_str()),
            Value::String(s) => s.clone(),
            Value::Object(_) => {
                let primitive = self.to_primitive(value, Hint::String)?;
                return self.to_string(&primitive);
            }
        })
    }

    pub fn to_property_key(&mut self, value: &Value) -> Eval<PropertyKey> {
        self.to_string(value)
    }

    /// ToIntegerOrInfinity.
    pub fn to_integer(&mut self, value: &Value) -> Eval<f64> {
        let n = self.to_number(value)?;
        Ok(if n.is_nan() { 0.0 } else { n.trunc() })
    }

    /// Resolves a relative index argument (`slice`, `at`, `splice`) against `len`.
    pub fn relative_index(&mut self, value: &Value, len: usize, default: usize) -> Eval<usize> {
        if matches!(value, Value::Undefined) {
            return Ok(default);
        }
        let n = self.to_integer(value)?;
        let len = len as f64;
        Ok(if n < 0.0 { (len + n).max(0.0) } else { n.min(len) } as usize)
    }

    pub fn binary_op(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Eval<Value> {
        match op {
            BinaryOp::Add => self.add(left, right),
            BinaryOp::Sub => self.arithmetic(left, right, |a, b| a - b),
            BinaryOp::Mul => self.arithmetic(left, right, |a, b| a * b),
            BinaryOp::Div => self.arithmetic(left, right, |a, b| a / b),
            BinaryOp::Mod => self.arithmetic(left, right, |a, b| a % b),
            BinaryOp::Exp => self.arithmetic(left, right, power),
            BinaryOp::StrictEq => Ok(Value::Bool(strict_equals(left, right))),
            BinaryOp::StrictNe => Ok(Value::Bool(!strict_equals(left, right))),
            BinaryOp::Eq => Ok(Value::Bool(self.loose_equals(left, right)?)),
            BinaryOp::Ne => Ok(Value::Bool(!self.loose_equals(left, right)?)),
            BinaryOp::Lt => self.relational(left, right, |o| o == Ordering::Less),
            BinaryOp::Le => self.relational(left, right, |o| o != Ordering::Greater),
            BinaryOp::Gt => self.relational(left, right, |o| o == Ordering::Greater),
            BinaryOp::Ge => self.relational(left, right, |o| o != Ordering::Less),
            BinaryOp::InstanceOf => Ok(Value::Bool(self.instance_of(left, right)?)),
            BinaryOp::In => {
                let Value::Object(obj) = right else {
                    let key = self.to_string(left)?;
                    let shown = crate::runtime::inspect::inspect_nested(right);
                    return Err(self.type_error(format!(
                        "Cannot use 'in' operator to search for '{}' in {}",
                        key, shown
                    )));
                };
                let key = self.to_property_key(left)?;
                Ok(Value::Bool(self.has_property(obj, &key)))
            }
        }
    }

    fn add(&mut self, left: &Value, right: &Value) -> Eval<Value> {
        let left = self.to_primitive(left, Hint::Default)?;
        let right = self.to_primitive(right, Hint::Default)?;
        if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
            let mut text = self.to_string(&left)?.to_string();
            text.push_str(&self.to_string(&right)?);
            self.check_string_length(text.len())?;
            return Ok(Value::string(text));
        }
        Ok(Value::Number(self.to_number(&left)? + self.to_number(&right)?))
    }

    fn arithmetic(&mut self, left: &Value, right: &Value, op: fn(f64, f64) -> f64) -> Eval<Value> {
        let a = self.to_number(left)?;
        let b = self.to_number(right)?;
        Ok(Value::Number(op(a, b)))
    }

    fn relational(&mut self, left: &Value, right: &Value, test: fn(Ordering) -> bool) -> Eval<Value> {
        let left = self.to_primitive(left, Hint::Number)?;
        let right = self.to_primitive(right, Hint::Number)?;
        let ordering = match (&left, &right) {
            (Value::String(a), Value::String(b)) => Some(compare_utf16(a, b)),
            _ => {
                let a = self.to_number(&left)?;
                let b = self.to_number(&right)?;
                a.partial_cmp(&b)
            }
        };
        Ok(Value::Bool(ordering.is_some_and(test)))
    }

    /// `==`.
    pub fn loose_equals(&mut self, left: &Value, right: &Value) -> Eval<bool> {
        Ok(match (left, right) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Number(a), Value::String(b)) => *a == string_to_number(b),
            (Value::String(a), Value::Number(b)) => string_to_number(a) == *b,
            (Value::Bool(b), other) | (other, Value::Bool(b)) if !matches!(other, Value::Bool(_)) => {
                let n = Value::Number(f64::from(u8::from(*b)));
                return self.loose_equals(&n, other);
            }
            (Value::Object(_), Value::Object(_)) => strict_equals(left, right),
            (Value::Object(_), _) => {
                let primitive = self.to_primitive(left, Hint::Default)?;
                return self.loose_equals(&primitive, right);
            }
            (_, Value::Object(_)) => {
                let primitive = self.to_primitive(right, Hint::Default)?;
                return self.loose_equals(left, &primitive);
            }
            _ => strict_equals(left, right),
        })
    }

    pub fn instance_of(&mut self, value: &Value, constructor: &Value) -> Eval<bool> {
        let Value::Object(ctor) = constructor else {
            return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
        };
        if !constructor.is_callable() {
            return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
        }
        let bound_target = match &ctor.borrow().kind {
            ObjectKind::Function(Callable::Bound(bound)) => Some(bound.target.clone()),
            _ => None,
        };
        if let Some(target) = bound_target {
            return self.instance_of(value, &Value::Object(target));
        }
        let Value::Object(obj) = value else {
            return Ok(false);
        };
        let Some(Value::Object(prototype)) = lookup_property(ctor, "prototype") else {
            return Err(self.type_error(
                "Function has non-object prototype 'undefined' in instanceof check",
            ));
        };
        Ok(inherits_from(obj, &prototype))
    }
}

/// True when `prototype` is on `obj`'s prototype chain.
pub fn inherits_from(obj: &ObjectRef, prototype: &ObjectRef) -> bool {
    let mut current = obj.borrow().prototype.clone();
    while let Some(proto) = current {
        if Rc::ptr_eq(&proto, prototype) {
            return true;
        }
        current = proto.borrow().prototype.clone();
    }
    false
}

/// String comparison by UTF-16 code units, as `<` and the default sort order compare.
pub fn compare_utf16(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

/// `**`, shared with `Math.pow`.
pub fn power(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponent_edge_cases_follow_javascript() {
        assert!(power(1.0, f64::INFINITY).is_nan());
        assert_eq!(power(f64::NAN, 0.0), 1.0);
        assert_eq!(power(2.0, 10.0), 1024.0);
    }

    #[test]
    fn strings_compare_by_code_unit() {
        assert_eq!(compare_utf16("B", "a"), Ordering::Less);
        assert_eq!(compare_utf16("apple", "apricot"), Ordering::Less);
        assert_eq!(compare_utf16("10", "9"), Ordering::Less);
    }
}
