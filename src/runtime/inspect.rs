//! Rendering values the way Node's `util.inspect` does for `console.log`.
//!
//! Layout follows Node's defaults: depth 2, 80-column break length, compact level 3,
//! arrays of more than six entries grouped into aligned columns, and at most 100 array
//! or collection items before an ellipsis.

use std::collections::BTreeSet;
use std::rc::Rc;

use unicode_width::UnicodeWidthStr;

use crate::runtime::number::format_number;
use crate::runtime::value::{
    array_index, constructor_name, function_name, lookup_property, Callable, FunctionKind, Object, ObjectKind,
    ObjectRef, PromiseState, Value,
};

const MAX_DEPTH: usize = 2;
const BREAK_LENGTH: usize = 80;
const MAX_ARRAY_LENGTH: usize = 100;

/// Inspects a value as a top-level `console.log` argument; strings print raw.
pub fn inspect(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_string(),
        _ => Inspector::default().format_value(value, 0, true),
    }
}

/// Inspects a value as it appears nested inside another, strings quoted.
pub fn inspect_nested(value: &Value) -> String {
    Inspector::default().format_value(value, 0, false)
}

/// `Name: message` of an error object, read without running user code.
pub fn error_summary(obj: &ObjectRef) -> String {
    let name = match lookup_property(obj, "name") {
        Some(Value::String(name)) => name.to_string(),
        Some(Value::Undefined) | None => "Error".to_string(),
        Some(other) => inspect_nested(&other),
    };
    let message = match lookup_property(obj, "message") {
        Some(Value::String(message)) => message.to_string(),
        Some(Value::Undefined) | None => String::new(),
        Some(other) => inspect_nested(&other),
    };
    match (name.is_empty(), message.is_empty()) {
        (_, true) => name,
        (true, false) => message,
        (false, false) => format!("{}: {}", name, message),
    }
}

#[derive(Default)]
struct Inspector {
    seen: Vec<*const Object>,
    circular: Vec<(*const Object, usize)>,
    indentation: usize,
}

/// Which wrapping style the collected entries use.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Shape {
    Object,
    Array,
}

struct Formatted {
    base: String,
    braces: (String, String),
    entries: Vec<String>,
    shape: Shape,
    /// Entries that are array elements (candidates for column grouping).
    grouped_len: usize,
}

impl Inspector {
    fn format_value(&mut self, value: &Value, depth: usize, top_level: bool) -> String {
        match value {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_primitive_number(*n),
            Value::String(s) => quote_string(s),
            Value::Object(obj) => self.format_object(obj, depth, top_level),
        }
    }

    fn format_object(&mut self, obj: &ObjectRef, depth: usize, top_level: bool) -> String {
        let ptr = obj.as_ptr() as *const Object;
        if self.seen.contains(&ptr) {
            let index = self.circular_index(ptr);
            return format!("[Circular *{}]", index);
        }

        self.seen.push(ptr);
        let formatted = self.describe(obj, depth, top_level);
        self.seen.pop();
        let Some(formatted) = formatted else {
            return self.short_form(obj);
        };

        let mut result = self.reduce_to_single_string(&formatted);
        if let Some((_, index)) = self.circular.iter().find(|(p, _)| *p == ptr) {
            result = format!("<ref *{}> {}", index, result);
        }
        result
    }

    fn circular_index(&mut self, ptr: *const Object) -> usize {
        if let Some((_, index)) = self.circular.iter().find(|(p, _)| *p == ptr) {
            return *index;
        }
        let index = self.circular.len() + 1;
        self.circular.push((ptr, index));
        index
    }

    /// `[Object]`, `[Array]` and friends for values past the depth limit.
    fn short_form(&self, obj: &ObjectRef) -> String {
        let object = obj.borrow();
        let name = match &object.kind {
            ObjectKind::Array(_) => "Array".to_string(),
            _ => match (object.prototype.is_none(), constructor_name(obj)) {
                (true, _) => "Object: null prototype".to_string(),
                (false, Some(name)) => name.to_string(),
                (false, None) => "Object".to_string(),
            },
        };
        format!("[{}]", name)
    }

    /// Collects the pieces of an object's rendering; `None` when it is past the depth limit.
    fn describe(&mut self, obj: &ObjectRef, depth: usize, top_level: bool) -> Option<Formatted> {
        enum Body {
            Plain,
            Function,
            Error,
            Boxed(Value),
            Array(Vec<Value>, BTreeSet<usize>),
            Map(Vec<(Value, Value)>),
            Set(Vec<Value>),
            Promise(Option<(bool, Value)>),
        }

        let keys = obj.borrow().visible_keys();
        let prefix = self.prefix(obj);
        let body = match &obj.borrow().kind {
            ObjectKind::Ordinary => Body::Plain,
            ObjectKind::Function(_) => Body::Function,
            ObjectKind::Error => Body::Error,
            ObjectKind::Primitive(inner) => Body::Boxed(inner.clone()),
            ObjectKind::Array(items) => Body::Array(items.clone(), obj.borrow().holes.clone()),
            ObjectKind::Map(entries) => Body::Map(entries.clone()),
            ObjectKind::Set(items) => Body::Set(items.clone()),
            ObjectKind::Promise(data) => Body::Promise(match &data.state {
                PromiseState::Pending => None,
                PromiseState::Fulfilled(value) => Some((false, value.clone())),
                PromiseState::Rejected(value) => Some((true, value.clone())),
            }),
        };
        let base = match &body {
            Body::Function => function_base(obj),
            Body::Error => error_base(obj, top_level),
            Body::Boxed(inner) => {
                let tag = match inner {
                    Value::String(_) => "String",
                    Value::Number(_) => "Number",
                    _ => "Boolean",
                };
                format!("[{}: {}]", tag, inspect_nested(inner))
            }
            _ => String::new(),
        };

        let empty_body = match &body {
            Body::Array(items, _) | Body::Set(items) => items.is_empty(),
            Body::Map(entries) => entries.is_empty(),
            Body::Promise(_) => false,
            _ => true,
        };

        // Keyless values print in full at any depth.
        if keys.is_empty() && empty_body {
            let text = match &body {
                Body::Array(..) => format!("{}[]", prefix),
                _ if !base.is_empty() => base,
                _ => format!("{}{{}}", prefix),
            };
            return Some(Formatted {
                base: String::new(),
                braces: (text, String::new()),
                entries: Vec::new(),
                shape: Shape::Object,
                grouped_len: 0,
            });
        }

        if depth > MAX_DEPTH {
            return None;
        }

        let mut entries = Vec::new();
        let mut grouped_len = 0;
        let (braces, shape) = match body {
            Body::Array(items, holes) => {
                self.indentation += 2;
                let mut index = 0;
                while index < items.len().min(MAX_ARRAY_LENGTH) {
                    if holes.contains(&index) {
                        let run = (index..items.len()).take_while(|i| holes.contains(i)).count();
                        entries.push(empty_items(run));
                        index += run;
                    } else {
                        entries.push(self.format_value(&items[index], depth + 1, false));
                        index += 1;
                    }
                }
                self.indentation -= 2;
                grouped_len = entries.len();
                if index < items.len() {
                    entries.push(more_items(items.len() - index));
                }
                let named: Vec<_> = keys.iter().filter(|key| array_index(key).is_none()).cloned().collect();
                self.push_properties(obj, &named, depth, &mut entries);
                ((format!("{}[", prefix), "]".to_string()), Shape::Array)
            }
            Body::Map(pairs) => {
                self.indentation += 2;
                for (key, value) in pairs.iter().take(MAX_ARRAY_LENGTH) {
                    let key = self.format_value(key, depth + 1, false);
                    let value = self.format_value(value, depth + 1, false);
                    entries.push(format!("{} => {}", key, value));
                }
                self.indentation -= 2;
                if pairs.len() > MAX_ARRAY_LENGTH {
                    entries.push(more_items(pairs.len() - MAX_ARRAY_LENGTH));
                }
                self.push_properties(obj, &keys, depth, &mut entries);
                ((format!("{}{{", prefix), "}".to_string()), Shape::Object)
            }
            Body::Set(items) => {
                self.indentation += 2;
                for item in items.iter().take(MAX_ARRAY_LENGTH) {
                    entries.push(self.format_value(item, depth + 1, false));
                }
                self.indentation -= 2;
                if items.len() > MAX_ARRAY_LENGTH {
                    entries.push(more_items(items.len() - MAX_ARRAY_LENGTH));
                }
                self.push_properties(obj, &keys, depth, &mut entries);
                ((format!("{}{{", prefix), "}".to_string()), Shape::Object)
            }
            Body::Promise(state) => {
                let shown = match state {
                    None => "<pending>".to_string(),
                    Some((rejected, value)) => {
                        self.indentation += 2;
                        let shown = self.format_value(&value, depth + 1, false);
                        self.indentation -= 2;
                        if rejected {
                            format!("<rejected> {}", shown)
                        } else {
                            shown
                        }
                    }
                };
                entries.push(shown);
                self.push_properties(obj, &keys, depth, &mut entries);
                ((format!("{}{{", prefix), "}".to_string()), Shape::Object)
            }
            Body::Plain | Body::Function | Body::Error | Body::Boxed(_) => {
                self.push_properties(obj, &keys, depth, &mut entries);
                let open = if base.is_empty() {
                    format!("{}{{", prefix)
                } else {
                    "{".to_string()
                };
                ((open, "}".to_string()), Shape::Object)
            }
        };

        Some(Formatted {
            base,
            braces,
            entries,
            shape,
            grouped_len,
        })
    }

    fn push_properties(&mut self, obj: &ObjectRef, keys: &[Rc<str>], depth: usize, entries: &mut Vec<String>) {
        for key in keys {
            let value = obj.borrow().properties.get(key).cloned().unwrap_or_default();
            self.indentation += 2;
            let shown = self.format_value(&value, depth + 1, false);
            self.indentation -= 2;
            entries.push(format!("{}: {}", format_key(key), shown));
        }
    }

    /// `Foo `, `Map(2) `, `[Object: null prototype] ` and similar leaders before the brace.
    fn prefix(&self, obj: &ObjectRef) -> String {
        let object = obj.borrow();
        let ctor = constructor_name(obj);
        let ctor = ctor.as_deref();
        match &object.kind {
            ObjectKind::Array(items) => match ctor {
                Some("Array") => String::new(),
                Some(name) => format!("{}({}) ", name, items.len()),
                None => format!("[Array({}): null prototype] ", items.len()),
            },
            ObjectKind::Map(entries) => format!("{}({}) ", ctor.unwrap_or("Map"), entries.len()),
            ObjectKind::Set(items) => format!("{}({}) ", ctor.unwrap_or("Set"), items.len()),
            ObjectKind::Promise(_) => format!("{} ", ctor.unwrap_or("Promise")),
            _ if object.prototype.is_none() => "[Object: null prototype] ".to_string(),
            _ => match ctor {
                Some("Object") | None => String::new(),
                Some(name) => format!("{} ", name),
            },
        }
    }

    /// Node's `reduceToSingleString`: one line when the entries fit, otherwise one entry
    /// (or one aligned row of array entries) per line.
    fn reduce_to_single_string(&self, formatted: &Formatted) -> String {
        let Formatted {
            base,
            braces,
            entries,
            shape,
            grouped_len,
        } = formatted;
        let base = base.as_str();
        let output = entries.as_slice();
        if output.is_empty() {
            return match (base.is_empty(), braces.1.is_empty()) {
                (_, true) => braces.0.clone(),
                (true, false) => format!("{}{}", braces.0, braces.1),
                (false, false) => format!("{} {}{}", base, braces.0, braces.1),
            };
        }

        let lines = if *shape == Shape::Array && output.len() > 6 {
            self.group_array_elements(output, *grouped_len)
        } else {
            output.to_vec()
        };
        let leader = if base.is_empty() {
            String::new()
        } else {
            format!("{} ", base)
        };

        if lines.len() == output.len() {
            let start = output.len() + self.indentation + braces.0.len() + base.len() + 10;
            if self.is_below_break_length(output, start, base) {
                let joined = output.join(", ");
                if !joined.contains('\n') {
                    return format!("{}{} {} {}", leader, braces.0, joined, braces.1);
                }
            }
        }

        let indentation = format!("\n{}", " ".repeat(self.indentation));
        format!(
            "{}{}{}  {}{}{}",
            leader,
            braces.0,
            indentation,
            lines.join(&format!(",{}  ", indentation)),
            indentation,
            braces.1
        )
    }

    fn is_below_break_length(&self, output: &[String], start: usize, base: &str) -> bool {
        let mut total = output.len() + start;
        if total + output.len() > BREAK_LENGTH {
            return false;
        }
        for entry in output {
            total += entry.width();
            if total > BREAK_LENGTH {
                return false;
            }
        }
        base.is_empty() || !base.contains('\n')
    }

    /// Node's `groupArrayElements`: lays long arrays of short entries out in columns.
    fn group_array_elements(&self, output: &[String], grouped_len: usize) -> Vec<String> {
        let mut total_length = 0;
        let mut max_length = 0;
        let separator_space = 2;
        let mut data_len = Vec::with_capacity(grouped_len);
        for entry in &output[..grouped_len] {
            let len = entry.width();
            data_len.push(len);
            total_length += len + separator_space;
            if max_length < len {
                max_length = len;
            }
        }
        let actual_max = max_length + separator_space;
        if actual_max * 3 + self.indentation >= BREAK_LENGTH
            || (total_length as f64 / actual_max as f64 <= 5.0 && max_length > 6)
        {
            return output.to_vec();
        }

        let approx_char_heights = 2.5;
        let average_bias = (actual_max as f64 - total_length as f64 / output.len() as f64).sqrt();
        let biased_max = (actual_max as f64 - 3.0 - average_bias).max(1.0);
        let columns = ((approx_char_heights * biased_max * output.len() as f64).sqrt() / biased_max)
            .round()
            .min(((BREAK_LENGTH - self.indentation) / actual_max) as f64)
            .min(12.0)
            .min(15.0) as usize;
        if columns <= 1 {
            return output.to_vec();
        }

        let mut max_line_length = Vec::with_capacity(columns);
        for column in 0..columns {
            let mut line_length = 0;
            let mut index = column;
            while index < grouped_len {
                line_length = line_length.max(data_len[index] + separator_space);
                index += columns;
            }
            max_line_length.push(line_length);
        }

        let numeric = output[..grouped_len]
            .iter()
            .all(|entry| entry.parse::<f64>().is_ok() || entry == "NaN" || entry.ends_with("Infinity"));

        let mut grouped = Vec::new();
        let mut index = 0;
        while index < grouped_len {
            let max = (index + columns).min(grouped_len);
            let mut line = String::new();
            let mut j = index;
            while j < max - 1 {
                let padding = max_line_length[j - index] + output[j].len() - data_len[j];
                line.push_str(&pad(&format!("{}, ", output[j]), padding, numeric));
                j += 1;
            }
            if numeric {
                let padding = max_line_length[j - index] + output[j].len() - data_len[j] - separator_space;
                line.push_str(&pad(&output[j], padding, true));
            } else {
                line.push_str(&output[j]);
            }
            grouped.push(line);
            index += columns;
        }
        grouped.extend(output[grouped_len..].iter().cloned());
        grouped
    }
}

fn pad(text: &str, width: usize, start: bool) -> String {
    let len = text.width();
    if len >= width {
        return text.to_string();
    }
    let fill = " ".repeat(width - len);
    if start {
        format!("{}{}", fill, text)
    } else {
        format!("{}{}", text, fill)
    }
}

fn empty_items(count: usize) -> String {
    format!("<{} empty item{}>", count, if count == 1 { "" } else { "s" })
}

fn more_items(count: usize) -> String {
    format!("... {} more item{}", count, if count == 1 { "" } else { "s" })
}

fn format_primitive_number(n: f64) -> String {
    if n == 0.0 && n.is_sign_negative() {
        "-0".to_string()
    } else {
        format_number(n)
    }
}

fn function_base(obj: &ObjectRef) -> String {
    let name = function_name(obj);
    let object = obj.borrow();
    if let ObjectKind::Function(Callable::Closure(closure)) = &object.kind {
        if closure.kind == FunctionKind::ClassConstructor {
            let mut base = if name.is_empty() {
                "[class (anonymous)".to_string()
            } else {
                format!("[class {}", name)
            };
            if let Some(Value::Object(parent)) = closure.class.as_ref().and_then(|c| c.parent.clone()) {
                let parent_name = function_name(&parent);
                if !parent_name.is_empty() {
                    base.push_str(&format!(" extends {}", parent_name));
                }
            }
            base.push(']');
            return base;
        }
    }
    if name.is_empty() {
        "[Function (anonymous)]".to_string()
    } else {
        format!("[Function: {}]", name)
    }
}

fn error_base(obj: &ObjectRef, top_level: bool) -> String {
    let name = match lookup_property(obj, "name") {
        Some(Value::String(name)) => name.to_string(),
        _ => "Error".to_string(),
    };
    let message = match obj.borrow().properties.get("message") {
        Some(Value::String(message)) => message.to_string(),
        Some(other) => inspect_nested(other),
        None => String::new(),
    };
    let name = match constructor_name(obj) {
        Some(ctor) if name.ends_with("Error") && *ctor != *name && ctor.contains(name.as_str()) => ctor.to_string(),
        Some(ctor) if name.ends_with("Error") && *ctor != *name && !ctor.ends_with("Error") => {
            format!("{} [{}]", ctor, name)
        }
        _ => name,
    };
    let summary = if message.is_empty() {
        name
    } else {
        format!("{}: {}", name, message)
    };
    let summary = match lookup_property(obj, "cause") {
        Some(cause) if obj.borrow().properties.contains_key("cause") => {
            format!("{} {{ [cause]: {} }}", summary, inspect_nested(&cause))
        }
        _ => summary,
    };
    if top_level {
        summary
    } else {
        format!("[{}]", summary)
    }
}

fn format_key(key: &str) -> String {
    let mut chars = key.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        key.to_string()
    } else {
        quote_string(key)
    }
}

/// Quotes a string the way Node does: single quotes unless the text contains one, then
/// double quotes, then backticks.
pub fn quote_string(s: &str) -> String {
    let quote = if !s.contains('\'') {
        '\''
    } else if !s.contains('"') {
        '"'
    } else if !s.contains('`') && !s.contains("${") {
        '`'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\u{b}' => out.push_str("\\x0B"),
            '\\' => out.push_str("\\\\"),
            '\'' if quote == '\'' => out.push_str("\\'"),
            c if (c as u32) < 0x20 || (0x7f..=0x9f).contains(&(c as u32)) => {
                out.push_str(&format!("\\x{:02X}", c as u32))
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::{Object, ObjectKind};
    use std::cell::RefCell;

    fn object(pairs: &[(&str, Value)]) -> Value {
        let mut obj = Object::new(ObjectKind::Ordinary, None);
        for (key, value) in pairs {
            obj.properties.insert(Rc::from(*key), value.clone());
        }
        Value::Object(Rc::new(RefCell::new(obj)))
    }

    fn array(items: Vec<Value>) -> Value {
        Value::Object(Rc::new(RefCell::new(Object::new(ObjectKind::Array(items), None))))
    }

    #[test]
    fn strings_pick_their_quotes() {
        assert_eq!(quote_string("plain"), "'plain'");
        assert_eq!(quote_string("it's"), "\"it's\"");
        assert_eq!(quote_string("it's \"x\""), "`it's \"x\"`");
        assert_eq!(quote_string("a\nb"), "'a\\nb'");
    }

    #[test]
    fn keys_are_quoted_only_when_needed() {
        assert_eq!(format_key("name"), "name");
        assert_eq!(format_key("_private1"), "_private1");
        assert_eq!(format_key("with-dash"), "'with-dash'");
        assert_eq!(format_key("1"), "'1'");
    }

    #[test]
    fn negative_zero_keeps_its_sign() {
        assert_eq!(inspect(&Value::Number(-0.0)), "-0");
        assert_eq!(inspect(&Value::Number(1.5)), "1.5");
    }

    #[test]
    fn long_arrays_of_numbers_are_grouped_in_columns() {
        let items = (1..=30).map(|n| Value::Number(n as f64)).collect();
        let shown = inspect_nested(&array(items));
        let lines: Vec<&str> = shown.lines().collect();
        assert_eq!(lines.first(), Some(&"[Array(30): null prototype] ["));
        assert!(lines.len() > 2);
        assert!(lines[1].starts_with("   1,  2,"));
    }

    #[test]
    fn holes_print_as_empty_item_runs() {
        let value = array(vec![Value::Undefined, Value::Undefined, Value::Number(1.0), Value::Undefined]);
        if let Value::Object(obj) = &value {
            obj.borrow_mut().holes.extend([0, 1, 3]);
        }
        assert_eq!(
            inspect_nested(&value),
            "[Array(4): null prototype] [ <2 empty items>, 1, <1 empty item> ]"
        );
    }

    #[test]
    fn wide_objects_break_across_lines() {
        let long = Value::string("x".repeat(40));
        let shown = inspect_nested(&object(&[("first", long.clone()), ("second", long)]));
        assert!(shown.contains('\n'));
        assert!(shown.contains("\n  first: '"));
    }

    #[test]
    fn cycles_are_marked() {
        let value = object(&[("name", Value::string("loop"))]);
        if let Value::Object(obj) = &value {
            obj.borrow_mut().properties.insert(Rc::from("self"), value.clone());
        }
        let shown = inspect_nested(&value);
        assert_eq!(
            shown,
            "<ref *1> [Object: null prototype] { name: 'loop', self: [Circular *1] }"
        );
        if let Value::Object(obj) = &value {
            obj.borrow_mut().properties.clear();
        }
    }
}
