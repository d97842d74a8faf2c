//! # String Builtins
//!
//! The `String` constructor and `String.prototype`. Indices count UTF-16 code units, the same
//! unit `str.length` and `str[i]` use. Patterns are plain strings: regular expressions are
//! outside the snippet language.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::builtins::{BuiltinRegistry, Slot};
use crate::runtime::interpreter::{Eval, Interpreter};
use crate::runtime::realm::Proto;
use crate::runtime::value::{NativeCall, ObjectKind, Value};

pub fn register(registry: &mut BuiltinRegistry) {
    registry.constructor(Proto::String, string_ctor, 1);
    registry.function(Slot::Static("String"), "fromCharCode", from_char_code, 1);

    let proto = Slot::Prototype(Proto::String);
    registry.function(proto, "at", at, 1);
    registry.function(proto, "charAt", char_at, 1);
    registry.function(proto, "charCodeAt", char_code_at, 1);
    registry.function(proto, "codePointAt", code_point_at, 1);
    registry.function(proto, "concat", concat, 1);
    registry.function(proto, "endsWith", ends_with, 1);
    registry.function(proto, "includes", includes, 1);
    registry.function(proto, "indexOf", index_of, 1);
    registry.function(proto, "lastIndexOf", last_index_of, 1);
    registry.function(proto, "localeCompare", locale_compare, 1);
    registry.function(proto, "padEnd", pad_end, 2);
    registry.function(proto, "padStart", pad_start, 2);
    registry.function(proto, "repeat", repeat, 1);
    registry.function(proto, "replace", replace, 2);
    registry.function(proto, "replaceAll", replace_all, 2);
    registry.function(proto, "slice", slice, 2);
    registry.function(proto, "split", split, 2);
    registry.function(proto, "startsWith", starts_with, 1);
    registry.function(proto, "substring", substring, 2);
    registry.function(proto, "substr", substr, 2);
    registry.function(proto, "toLowerCase", to_lower_case, 0);
    registry.function(proto, "toUpperCase", to_upper_case, 0);
    registry.function(proto, "toString", to_string, 0);
    registry.function(proto, "trim", trim, 0);
    registry.function(proto, "trimEnd", trim_end, 0);
    registry.function(proto, "trimStart", trim_start, 0);
    registry.function(proto, "valueOf", to_string, 0);
}

// ============================================================================
// HELPERS
// ============================================================================

/// `this` coerced to a string; nullish receivers are a TypeError.
fn this_string(interp: &mut Interpreter, call: &NativeCall<'_>, method: &str) -> Eval<Rc<str>> {
    if call.this.is_nullish() {
        return Err(interp.type_error(format!(
            "String.prototype.{} called on null or undefined",
            method
        )));
    }
    interp.to_string(call.this)
}

/// `this` as UTF-16 code units, the unit every index and length is measured in.
fn this_units(interp: &mut Interpreter, call: &NativeCall<'_>, method: &str) -> Eval<Vec<u16>> {
    Ok(this_string(interp, call, method)?.encode_utf16().collect())
}

fn arg_units(interp: &mut Interpreter, call: &NativeCall<'_>, index: usize) -> Eval<Vec<u16>> {
    Ok(interp.to_string(&call.arg(index))?.encode_utf16().collect())
}

/// Integer position argument clamped to `0..=len`; `undefined` yields `default`.
fn position(interp: &mut Interpreter, value: &Value, len: usize, default: usize) -> Eval<usize> {
    if matches!(value, Value::Undefined) {
        return Ok(default);
    }
    let n = interp.to_integer(value)?;
    Ok(n.clamp(0.0, len as f64) as usize)
}

fn find(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return (from <= haystack.len()).then_some(from);
    }
    (from..=haystack.len().saturating_sub(needle.len()))
        .find(|&start| haystack[start..].starts_with(needle))
}

fn rfind(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    let last = from.min(haystack.len() - needle.len());
    (0..=last).rev().find(|&start| haystack[start..].starts_with(needle))
}

/// Lone surrogates left by a split pair become U+FFFD.
fn text(units: &[u16]) -> Value {
    Value::string(String::from_utf16_lossy(units))
}

// ============================================================================
// CONSTRUCTOR
// ============================================================================

fn string_ctor(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let s = if call.args.is_empty() {
        Rc::from("")
    } else {
        interp.to_string(&call.arg(0))?
    };
    match call.new_target {
        Some(target) => {
            let proto = interp.prototype_for(target, Proto::String);
            Ok(Value::Object(interp.alloc(ObjectKind::Primitive(Value::String(s)), Some(proto))))
        }
        None => Ok(Value::String(s)),
    }
}

fn from_char_code(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let mut units = Vec::with_capacity(call.args.len());
    for arg in call.args {
        units.push(interp.to_number(arg)? as i64 as u16);
    }
    let s: String = char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    Ok(Value::string(s))
}

// ============================================================================
// ACCESS AND SEARCH
// ============================================================================

fn at(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let units = this_units(interp, call, "at")?;
    let n = interp.to_integer(&call.arg(0))?;
    let index = if n < 0.0 { units.len() as f64 + n } else { n };
    if index < 0.0 || index >= units.len() as f64 {
        return Ok(Value::Undefined);
    }
    let index = index as usize;
    Ok(text(&units[index..index + 1]))
}

fn char_at(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let units = this_units(interp, call, "charAt")?;
    let n = interp.to_integer(&call.arg(0))?;
    if n < 0.0 || n >= units.len() as f64 {
        return Ok(Value::from(""));
    }
    let n = n as usize;
    Ok(text(&units[n..n + 1]))
}

fn char_code_at(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let units = this_units(interp, call, "charCodeAt")?;
    let n = interp.to_integer(&call.arg(0))?;
    if n < 0.0 || n >= units.len() as f64 {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(f64::from(units[n as usize])))
}

fn code_point_at(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let units = this_units(interp, call, "codePointAt")?;
    let n = interp.to_integer(&call.arg(0))?;
    if n < 0.0 || n >= units.len() as f64 {
        return Ok(Value::Undefined);
    }
    let n = n as usize;
    let code = char::decode_utf16(units[n..].iter().copied())
        .next()
        .and_then(Result::ok)
        .map_or(u32::from(units[n]), u32::from);
    Ok(Value::Number(f64::from(code)))
}

fn index_of(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let units = this_units(interp, call, "indexOf")?;
    let needle = arg_units(interp, call, 0)?;
    let from = position(interp, &call.arg(1), units.len(), 0)?;
    Ok(Value::Number(find(&units, &needle, from).map_or(-1.0, |i| i as f64)))
}

fn last_index_of(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let units = this_units(interp, call, "lastIndexOf")?;
    let needle = arg_units(interp, call, 0)?;
    let from = match call.arg(1) {
        Value::Undefined => units.len(),
        value => {
            let n = interp.to_number(&value)?;
            if n.is_nan() {
                units.len()
            } else {
                n.clamp(0.0, units.len() as f64) as usize
            }
        }
    };
    Ok(Value::Number(rfind(&units, &needle, from).map_or(-1.0, |i| i as f64)))
}

fn includes(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let units = this_units(interp, call, "includes")?;
    let needle = arg_units(interp, call, 0)?;
    let from = position(interp, &call.arg(1), units.len(), 0)?;
    Ok(Value::Bool(find(&units, &needle, from).is_some()))
}

fn starts_with(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let units = this_units(interp, call, "startsWith")?;
    let needle = arg_units(interp, call, 0)?;
    let from = position(interp, &call.arg(1), units.len(), 0)?;
    Ok(Value::Bool(units[from..].starts_with(&needle)))
}

fn ends_with(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let units = this_units(interp, call, "endsWith")?;
    let needle = arg_units(interp, call, 0)?;
    let end = position(interp, &call.arg(1), units.len(), units.len())?;
    Ok(Value::Bool(units[..end].ends_with(&needle)))
}

/// Orders like the `en` collation for ASCII text: letters case-insensitively, lowercase first on ties.
fn locale_compare(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let a = this_string(interp, call, "localeCompare")?;
    let b = interp.to_string(&call.arg(0))?;
    let folded = a.to_lowercase().cmp(&b.to_lowercase());
    let ordering = folded.then_with(|| b.cmp(&a));
    Ok(Value::Number(match ordering {
        Ordering::Less => -1.0,
        Ordering::Equal => 0.0,
        Ordering::Greater => 1.0,
    }))
}

// ============================================================================
// EXTRACTION
// ============================================================================

fn slice(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let units = this_units(interp, call, "slice")?;
    let start = interp.relative_index(&call.arg(0), units.len(), 0)?;
    let end = interp.relative_index(&call.arg(1), units.len(), units.len())?;
    Ok(text(if start < end { &units[start..end] } else { &[] }))
}

fn substring(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let units = this_units(interp, call, "substring")?;
    let a = position(interp, &call.arg(0), units.len(), 0)?;
    let b = position(interp, &call.arg(1), units.len(), units.len())?;
    Ok(text(&units[a.min(b)..a.max(b)]))
}

fn substr(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let units = this_units(interp, call, "substr")?;
    let start = interp.relative_index(&call.arg(0), units.len(), 0)?;
    let length = match call.arg(1) {
        Value::Undefined => units.len(),
        value => interp.to_integer(&value)?.max(0.0) as usize,
    };
    let end = start.saturating_add(length).min(units.len());
    Ok(text(&units[start..end]))
}

fn split(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let s = this_string(interp, call, "split")?;
    let limit = match call.arg(1) {
        Value::Undefined => usize::MAX,
        value => interp.to_number(&value)? as u32 as usize,
    };
    let parts: Vec<Value> = match call.arg(0) {
        Value::Undefined => vec![Value::String(s)],
        separator => {
            let separator = interp.to_string(&separator)?;
            if separator.is_empty() {
                s.encode_utf16().map(|c| text(&[c])).collect()
            } else {
                s.split(&*separator).map(Value::from).collect()
            }
        }
    };
    let parts = parts.into_iter().take(limit).collect();
    Ok(interp.new_array(parts))
}

fn concat(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let mut s = this_string(interp, call, "concat")?.to_string();
    for arg in call.args {
        s.push_str(&interp.to_string(arg)?);
        interp.check_string_length(s.len())?;
    }
    Ok(Value::string(s))
}

// ============================================================================
// TRANSFORMATION
// ============================================================================

fn to_upper_case(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::string(this_string(interp, call, "toUpperCase")?.to_uppercase()))
}

fn to_lower_case(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::string(this_string(interp, call, "toLowerCase")?.to_lowercase()))
}

fn trim(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::string(this_string(interp, call, "trim")?.trim()))
}

fn trim_start(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::string(this_string(interp, call, "trimStart")?.trim_start()))
}

fn trim_end(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::string(this_string(interp, call, "trimEnd")?.trim_end()))
}

fn pad(interp: &mut Interpreter, call: &NativeCall<'_>, method: &str, at_start: bool) -> Eval<Value> {
    let units = this_units(interp, call, method)?;
    let target = interp.to_integer(&call.arg(0))?.max(0.0) as usize;
    let filler: Vec<u16> = match call.arg(1) {
        Value::Undefined => vec![u16::from(b' ')],
        value => interp.to_string(&value)?.encode_utf16().collect(),
    };
    if target <= units.len() || filler.is_empty() {
        return Ok(text(&units));
    }
    interp.check_string_length(target)?;
    let padding: Vec<u16> = filler.iter().copied().cycle().take(target - units.len()).collect();
    let combined: Vec<u16> = if at_start {
        padding.into_iter().chain(units).collect()
    } else {
        units.into_iter().chain(padding).collect()
    };
    Ok(text(&combined))
}

fn pad_start(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    pad(interp, call, "padStart", true)
}

fn pad_end(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    pad(interp, call, "padEnd", false)
}

fn repeat(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let s = this_string(interp, call, "repeat")?;
    let count = interp.to_integer(&call.arg(0))?;
    if count < 0.0 || count.is_infinite() {
        let shown = crate::runtime::format_number(count);
        return Err(interp.range_error(format!("Invalid count value: {}", shown)));
    }
    interp.check_string_length(s.len().saturating_mul(count as usize))?;
    Ok(Value::string(s.repeat(count as usize)))
}

/// Expands `$&`, `$$` and the positional patterns of a replacement string.
fn expand_replacement(template: &str, matched: &str, before: &str, after: &str) -> String {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => out.push('$'),
            Some('&') => out.push_str(matched),
            Some('`') => out.push_str(before),
            Some('\'') => out.push_str(after),
            _ => {
                out.push('$');
                continue;
            }
        }
        chars.next();
    }
    out
}

fn replace_impl(interp: &mut Interpreter, call: &NativeCall<'_>, method: &str, all: bool) -> Eval<Value> {
    let s = this_string(interp, call, method)?;
    let pattern = interp.to_string(&call.arg(0))?;
    let replacement = call.arg(1);

    let mut matches = Vec::new();
    let mut from = 0;
    while let Some(found) = s.get(from..).and_then(|rest| rest.find(&*pattern)) {
        let at = from + found;
        matches.push(at);
        if !all {
            break;
        }
        from = at + pattern.len().max(1);
        if pattern.is_empty() {
            from = at + s[at..].chars().next().map_or(1, char::len_utf8);
        }
        if from > s.len() {
            break;
        }
    }

    let mut out = String::new();
    let mut last = 0;
    for at in matches {
        out.push_str(&s[last..at]);
        let matched = &s[at..at + pattern.len()];
        if replacement.is_callable() {
            let offset = s[..at].encode_utf16().count() as f64;
            let args = [Value::from(matched), Value::Number(offset), Value::String(s.clone())];
            let produced = interp.call(&replacement, Value::Undefined, &args)?;
            out.push_str(&interp.to_string(&produced)?);
        } else {
            let template = interp.to_string(&replacement)?;
            out.push_str(&expand_replacement(&template, matched, &s[..at], &s[at + pattern.len()..]));
        }
        last = at + pattern.len();
        interp.check_string_length(out.len())?;
    }
    out.push_str(&s[last..]);
    Ok(Value::string(out))
}

fn replace(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    replace_impl(interp, call, "replace", false)
}

fn replace_all(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    replace_impl(interp, call, "replaceAll", true)
}

fn to_string(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    match call.this {
        Value::String(s) => return Ok(Value::String(s.clone())),
        Value::Object(obj) => {
            if let ObjectKind::Primitive(Value::String(s)) = &obj.borrow().kind {
                return Ok(Value::String(s.clone()));
            }
        }
        _ => {}
    }
    Err(interp.type_error("String.prototype.toString requires that 'this' be a String"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_search_respects_start_positions() {
        let hay: Vec<u16> = "banana".encode_utf16().collect();
        let na: Vec<u16> = "na".encode_utf16().collect();
        assert_eq!(find(&hay, &na, 0), Some(2));
        assert_eq!(find(&hay, &na, 3), Some(4));
        assert_eq!(rfind(&hay, &na, 6), Some(4));
        assert_eq!(rfind(&hay, &na, 3), Some(2));
        assert_eq!(find(&hay, &[], 6), Some(6));
    }

    #[test]
    fn replacement_patterns_expand() {
        assert_eq!(expand_replacement("[$&]", "cat", "a ", " b"), "[cat]");
        assert_eq!(expand_replacement("$$1", "x", "", ""), "$1");
        assert_eq!(expand_replacement("$`|$'", "x", "pre", "post"), "pre|post");
    }
}
