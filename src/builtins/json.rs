//! # JSON
//!
//! `JSON.stringify` walks snippet values directly so `toJSON`, replacers and cycle errors
//! behave like Node; string quoting is delegated to `serde_json`. `JSON.parse` parses with
//! `serde_json` (insertion order preserved) and converts the tree into snippet values.

use std::rc::Rc;

use crate::builtins::{BuiltinRegistry, Slot};
use crate::runtime::interpreter::{Eval, Interpreter};
use crate::runtime::number::format_number;
use crate::runtime::value::{constructor_name, ObjectKind, ObjectRef, NativeCall, PropertyKey, Value};

const JSON: Slot = Slot::Namespace("JSON");

pub fn register(registry: &mut BuiltinRegistry) {
    registry.function(JSON, "stringify", json_stringify, 3);
    registry.function(JSON, "parse", json_parse, 2);
}

// ============================================================================
// STRINGIFY
// ============================================================================

fn json_stringify(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let replacer = call.arg(1);
    let mut serializer = Serializer {
        replacer: None,
        allow_list: None,
        gap: gap(interp, &call.arg(2))?,
        indent: String::new(),
        stack: Vec::new(),
    };
    if replacer.is_callable() {
        serializer.replacer = Some(replacer);
    } else if let Value::Object(list) = &replacer {
        let items = match &list.borrow().kind {
            ObjectKind::Array(items) => Some(items.clone()),
            _ => None,
        };
        if let Some(items) = items {
            let mut keys: Vec<PropertyKey> = Vec::new();
            for item in items {
                let key = match item {
                    Value::String(s) => Some(s),
                    Value::Number(_) => Some(interp.to_string(&item)?),
                    _ => None,
                };
                if let Some(key) = key {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
            }
            serializer.allow_list = Some(keys);
        }
    }

    let holder = interp.new_object();
    holder
        .borrow_mut()
        .properties
        .insert(Rc::from(""), call.arg(0));
    match serializer.property(interp, &Value::Object(holder), Rc::from(""), call.arg(0))? {
        Some(text) => Ok(Value::string(text)),
        None => Ok(Value::Undefined),
    }
}

/// `JSON.stringify` for `%j` in `console.log`.
pub(crate) fn stringify(interp: &mut Interpreter, value: &Value) -> Eval<Option<String>> {
    let mut serializer = Serializer {
        replacer: None,
        allow_list: None,
        gap: String::new(),
        indent: String::new(),
        stack: Vec::new(),
    };
    let holder = interp.new_object();
    serializer.property(interp, &Value::Object(holder), Rc::from(""), value.clone())
}

/// The indentation unit from the `space` argument: up to ten spaces or ten characters.
fn gap(interp: &mut Interpreter, space: &Value) -> Eval<String> {
    let space = match space {
        Value::Object(obj) => match &obj.borrow().kind {
            ObjectKind::Primitive(inner) => inner.clone(),
            _ => space.clone(),
        },
        _ => space.clone(),
    };
    Ok(match &space {
        Value::Number(_) => {
            let width = interp.to_integer(&space)?.clamp(0.0, 10.0) as usize;
            " ".repeat(width)
        }
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    })
}

struct Serializer {
    replacer: Option<Value>,
    allow_list: Option<Vec<PropertyKey>>,
    gap: String,
    indent: String,
    /// Objects being serialized, with the key that led into each, for cycle messages.
    stack: Vec<(ObjectRef, PropertyKey)>,
}

impl Serializer {
    /// Serializes `holder[key]`; `None` means the value is skipped (`undefined`, functions).
    fn property(&mut self, interp: &mut Interpreter, holder: &Value, key: PropertyKey, value: Value) -> Eval<Option<String>> {
        let mut value = value;
        if let Value::Object(_) = &value {
            let to_json = interp.get(&value, "toJSON")?;
            if to_json.is_callable() {
                value = interp.call(&to_json, value.clone(), &[Value::String(key.clone())])?;
            }
        }
        if let Some(replacer) = self.replacer.clone() {
            value = interp.call(&replacer, holder.clone(), &[Value::String(key.clone()), value])?;
        }
        if let Value::Object(obj) = &value {
            let unboxed = match &obj.borrow().kind {
                ObjectKind::Primitive(inner) => Some(inner.clone()),
                _ => None,
            };
            if let Some(inner) = unboxed {
                value = inner;
            }
        }

        match &value {
            Value::Null => Ok(Some("null".to_string())),
            Value::Bool(b) => Ok(Some(b.to_string())),
            Value::Number(n) if n.is_finite() => Ok(Some(format_number(*n))),
            Value::Number(_) => Ok(Some("null".to_string())),
            Value::String(s) => Ok(Some(quote(s))),
            Value::Undefined => Ok(None),
            Value::Object(_) if value.is_callable() => Ok(None),
            Value::Object(obj) => {
                self.enter(interp, obj, key)?;
                let text = if value.is_array() {
                    self.array(interp, &value)
                } else {
                    self.object(interp, &value)
                };
                self.stack.pop();
                text.map(Some)
            }
        }
    }

    fn enter(&mut self, interp: &mut Interpreter, obj: &ObjectRef, key: PropertyKey) -> Eval<()> {
        if let Some(start) = self.stack.iter().position(|(seen, _)| Rc::ptr_eq(seen, obj)) {
            let message = self.cycle_message(start, &key);
            return Err(interp.type_error(message));
        }
        self.stack.push((obj.clone(), key));
        Ok(())
    }

    fn cycle_message(&self, start: usize, closing: &str) -> String {
        let mut lines = vec![
            "Converting circular structure to JSON".to_string(),
            format!(
                "    --> starting at object with constructor '{}'",
                constructor_of(&self.stack[start].0)
            ),
        ];
        for (obj, key) in &self.stack[start + 1..] {
            lines.push(format!(
                "    |     {} -> object with constructor '{}'",
                describe_key(key),
                constructor_of(obj)
            ));
        }
        lines.push(format!(
            "    --- {} closes the circle",
            describe_key(closing)
        ));
        lines.join("\n")
    }

    fn array(&mut self, interp: &mut Interpreter, value: &Value) -> Eval<String> {
        let stepback = self.indent.clone();
        self.indent.push_str(&self.gap);
        let len = match value {
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Array(items) => items.len(),
                _ => 0,
            },
            _ => 0,
        };
        let mut parts = Vec::with_capacity(len);
        for index in 0..len {
            let key: PropertyKey = Rc::from(index.to_string().as_str());
            let element = interp.get(value, &key)?;
            let text = self.property(interp, value, key, element)?;
            parts.push(text.unwrap_or_else(|| "null".to_string()));
        }
        let text = self.wrap(&parts, &stepback, '[', ']');
        self.indent = stepback;
        Ok(text)
    }

    fn object(&mut self, interp: &mut Interpreter, value: &Value) -> Eval<String> {
        let stepback = self.indent.clone();
        self.indent.push_str(&self.gap);
        let keys = match &self.allow_list {
            Some(keys) => keys.clone(),
            None => interp.own_enumerable_keys(value),
        };
        let separator = if self.gap.is_empty() { ":" } else { ": " };
        let mut parts = Vec::with_capacity(keys.len());
        for key in keys {
            let member = interp.get(value, &key)?;
            if let Some(text) = self.property(interp, value, key.clone(), member)? {
                parts.push(format!("{}{}{}", quote(&key), separator, text));
            }
        }
        let text = self.wrap(&parts, &stepback, '{', '}');
        self.indent = stepback;
        Ok(text)
    }

    fn wrap(&self, parts: &[String], stepback: &str, open: char, close: char) -> String {
        if parts.is_empty() {
            return format!("{}{}", open, close);
        }
        if self.gap.is_empty() {
            return format!("{}{}{}", open, parts.join(","), close);
        }
        let separator = format!(",\n{}", self.indent);
        format!(
            "{}\n{}{}\n{}{}",
            open,
            self.indent,
            parts.join(&separator),
            stepback,
            close
        )
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

fn constructor_of(obj: &ObjectRef) -> String {
    constructor_name(obj)
        .map(|name| name.to_string())
        .unwrap_or_else(|| "Object".to_string())
}

/// `property 'x'` for object keys, `index 0` for array slots.
fn describe_key(key: &str) -> String {
    if crate::runtime::value::array_index(key).is_some() {
        format!("index {}", key)
    } else {
        format!("property '{}'", key)
    }
}

// ============================================================================
// PARSE
// ============================================================================

fn json_parse(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let text = interp.to_string(&call.arg(0))?;
    let parsed: serde_json::Value = match serde_json::from_str(&text) {
        Ok(parsed) => parsed,
        Err(error) => {
            let message = parse_error_message(&text, &error);
            return Err(interp.error(crate::runtime::realm::Proto::SyntaxError, message));
        }
    };
    let value = from_json(interp, parsed);
    let reviver = call.arg(1);
    if !reviver.is_callable() {
        return Ok(value);
    }
    let root = interp.new_object();
    root.borrow_mut().properties.insert(Rc::from(""), value);
    revive(interp, &reviver, &Value::Object(root), Rc::from(""))
}

fn from_json(interp: &mut Interpreter, value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::from(s),
        serde_json::Value::Array(items) => {
            let items = items.into_iter().map(|item| from_json(interp, item)).collect();
            interp.new_array(items)
        }
        serde_json::Value::Object(map) => {
            let object = interp.new_object();
            for (key, item) in map {
                let item = from_json(interp, item);
                object
                    .borrow_mut()
                    .properties
                    .insert(Rc::from(key.as_str()), item);
            }
            Value::Object(object)
        }
    }
}

/// Bottom-up reviver walk; returning `undefined` deletes the property.
fn revive(interp: &mut Interpreter, reviver: &Value, holder: &Value, key: PropertyKey) -> Eval<Value> {
    let value = interp.get(holder, &key)?;
    if let Value::Object(_) = &value {
        let keys: Vec<PropertyKey> = if value.is_array() {
            let length = interp.get(&value, "length")?;
            let len = interp.to_integer(&length)? as usize;
            (0..len).map(crate::runtime::value::index_key).collect()
        } else {
            interp.own_enumerable_keys(&value)
        };
        for child in keys {
            let revived = revive(interp, reviver, &value, child.clone())?;
            if matches!(revived, Value::Undefined) {
                interp.delete_property(&value, &child)?;
            } else {
                interp.set(&value, &child, revived)?;
            }
        }
    }
    interp.call(reviver, holder.clone(), &[Value::String(key), value])
}

/// Node 20's wording for `JSON.parse` failures.
fn parse_error_message(text: &str, error: &serde_json::Error) -> String {
    if error.is_eof() {
        return "Unexpected end of JSON input".to_string();
    }
    let position = byte_position(text, error.line(), error.column());
    let offending = text[position.min(text.len())..].chars().next();
    if error.to_string().starts_with("trailing characters") {
        let index = text[..position.min(text.len())].chars().count();
        return format!("Unexpected non-whitespace character after JSON at position {}", index);
    }
    match offending {
        Some(c) => format!("Unexpected token '{}', {} is not valid JSON", c, shorten(text)),
        None => "Unexpected end of JSON input".to_string(),
    }
}

/// Byte offset of serde's one-based line and column, which point at the offending character.
fn byte_position(text: &str, line: usize, column: usize) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    let line_text = &text[line_start..];
    let offset = line_text
        .char_indices()
        .nth(column.saturating_sub(1))
        .map(|(offset, _)| offset)
        .unwrap_or(line_text.len());
    line_start + offset
}

/// Quotes the input for the message, cutting long texts short.
fn shorten(text: &str) -> String {
    const SHOWN: usize = 30;
    if text.chars().count() <= SHOWN {
        return format!("\"{}\"", text);
    }
    let head: String = text.chars().take(SHOWN).collect();
    format!("\"{}\"...", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_quoted_like_javascript() {
        assert_eq!(quote("a\"b\n"), "\"a\\\"b\\n\"");
        assert_eq!(quote("é/"), "\"é/\"");
    }

    #[test]
    fn parse_errors_use_node_wording() {
        let error = serde_json::from_str::<serde_json::Value>("{\"a\":").unwrap_err();
        assert_eq!(parse_error_message("{\"a\":", &error), "Unexpected end of JSON input");

        let error = serde_json::from_str::<serde_json::Value>("{x}").unwrap_err();
        assert_eq!(
            parse_error_message("{x}", &error),
            "Unexpected token 'x', \"{x}\" is not valid JSON"
        );

        let error = serde_json::from_str::<serde_json::Value>("[1] 2").unwrap_err();
        assert_eq!(
            parse_error_message("[1] 2", &error),
            "Unexpected non-whitespace character after JSON at position 4"
        );
    }
}
