//! # Console
//!
//! `console.log` and its aliases format their arguments the way Node's `util.format` does
//! and hand one string per call to the run's output sink. `warn` and `error` land in the
//! same stream as `log`, so an example's expected output lists them in call order.
//! `console.group` indents every later line by two spaces until the matching `groupEnd`.

use crate::builtins::json::stringify;
use crate::builtins::{BuiltinRegistry, Slot};
use crate::runtime::inspect::{inspect, inspect_nested};
use crate::runtime::interpreter::{Eval, Interpreter, Interrupt};
use crate::runtime::number::{parse_float, parse_int};
use crate::runtime::value::{NativeCall, Value};

const CONSOLE: Slot = Slot::Namespace("console");
const GROUP_INDENT: usize = 2;

pub fn register(registry: &mut BuiltinRegistry) {
    for name in ["log", "info", "debug", "warn", "error"] {
        registry.function(CONSOLE, name, console_log, 0);
    }
    registry.function(CONSOLE, "group", console_group, 0);
    registry.function(CONSOLE, "groupCollapsed", console_group, 0);
    registry.function(CONSOLE, "groupEnd", console_group_end, 0);
}

fn console_log(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let text = format_args(interp, call.args)?;
    print(interp, &text);
    Ok(Value::Undefined)
}

fn console_group(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    if !call.args.is_empty() {
        let label = format_args(interp, call.args)?;
        print(interp, &label);
    }
    interp.console_indent += GROUP_INDENT;
    Ok(Value::Undefined)
}

fn console_group_end(interp: &mut Interpreter, _call: &NativeCall<'_>) -> Eval<Value> {
    interp.console_indent = interp.console_indent.saturating_sub(GROUP_INDENT);
    Ok(Value::Undefined)
}

/// Emits `text` with the current group indentation applied to every line.
fn print(interp: &mut Interpreter, text: &str) {
    if interp.console_indent == 0 {
        interp.emit(text, None);
        return;
    }
    let pad = " ".repeat(interp.console_indent);
    let indented: Vec<String> = text.split('\n').map(|line| format!("{}{}", pad, line)).collect();
    interp.emit(&indented.join("\n"), None);
}

/// `util.format(...args)`.
pub(crate) fn format_args(interp: &mut Interpreter, args: &[Value]) -> Eval<String> {
    let Some(Value::String(template)) = args.first() else {
        let parts: Vec<String> = args.iter().map(inspect).collect();
        return Ok(parts.join(" "));
    };

    let mut out = String::new();
    let mut rest = args[1..].iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(&spec) = chars.peek() else {
            out.push('%');
            break;
        };
        if spec == '%' {
            chars.next();
            out.push('%');
            continue;
        }
        if !matches!(spec, 's' | 'd' | 'i' | 'f' | 'j' | 'o' | 'O' | 'c') {
            out.push('%');
            continue;
        }
        let Some(arg) = rest.next() else {
            out.push('%');
            continue;
        };
        chars.next();
        out.push_str(&format_specifier(interp, spec, arg)?);
    }
    for arg in rest {
        out.push(' ');
        out.push_str(&inspect(arg));
    }
    Ok(out)
}

fn format_specifier(interp: &mut Interpreter, spec: char, arg: &Value) -> Eval<String> {
    Ok(match spec {
        's' => match arg {
            Value::String(s) => s.to_string(),
            Value::Object(_) => inspect_nested(arg),
            other => inspect(other),
        },
        'd' => match arg {
            Value::Object(_) => "NaN".to_string(),
            other => inspect(&Value::Number(interp.to_number(other)?)),
        },
        'i' => match arg {
            Value::Object(_) => "NaN".to_string(),
            other => {
                let text = interp.to_string(other)?;
                inspect(&Value::Number(parse_int(&text, None)))
            }
        },
        'f' => {
            let text = interp.to_string(arg)?;
            inspect(&Value::Number(parse_float(&text)))
        }
        'j' => match stringify(interp, arg) {
            Ok(text) => text.unwrap_or_else(|| "undefined".to_string()),
            Err(Interrupt::Throw(_)) => "[Circular]".to_string(),
            Err(other) => return Err(other),
        },
        'o' | 'O' => inspect_nested(arg),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::output::SharedOutput;
    use crate::runtime::InterpreterOptions;

    fn format(args: &[Value]) -> String {
        let mut interp = Interpreter::new("", Box::new(SharedOutput::new()), InterpreterOptions::default());
        format_args(&mut interp, args).unwrap()
    }

    #[test]
    fn specifiers_consume_arguments() {
        let args = [Value::from("%s is %d years"), Value::from("Ada"), Value::from(36.0)];
        assert_eq!(format(&args), "Ada is 36 years");
    }

    #[test]
    fn leftover_arguments_are_appended() {
        let args = [Value::from("a"), Value::from("b"), Value::from(1.0)];
        assert_eq!(format(&args), "a b 1");
    }

    #[test]
    fn unmatched_specifiers_stay_literal() {
        assert_eq!(format(&[Value::from("100%")]), "100%");
        assert_eq!(format(&[Value::from("%d%%"), Value::from(5.0)]), "5%");
        assert_eq!(format(&[Value::from("%s")]), "%s");
        assert_eq!(format(&[Value::from("%c styled"), Value::from("color: red")]), " styled");
    }

    #[test]
    fn non_string_first_argument_is_inspected() {
        assert_eq!(format(&[Value::from(1.0), Value::from("x")]), "1 x");
    }
}
