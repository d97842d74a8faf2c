//! The `Math` namespace. `Math.random` draws from the run's seeded generator, so a suite
//! produces the same numbers on every run.

use rand::Rng;

use crate::builtins::{number_arg, BuiltinRegistry, Slot};
use crate::runtime::interpreter::{Eval, Interpreter};
use crate::runtime::operators::power;
use crate::runtime::value::{NativeCall, Value};

const MATH: Slot = Slot::Namespace("Math");

/// Defines a one-argument `Math` function over `f64`.
macro_rules! unary {
    ($($name:ident => $op:expr),* $(,)?) => {
        $(
            fn $name(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
                let x = number_arg(interp, call, 0)?;
                let op: fn(f64) -> f64 = $op;
                Ok(Value::Number(op(x)))
            }
        )*
    };
}

unary! {
    math_abs => f64::abs,
    math_ceil => f64::ceil,
    math_floor => f64::floor,
    math_round => js_round,
    math_trunc => f64::trunc,
    math_sign => js_sign,
    math_sqrt => f64::sqrt,
    math_cbrt => f64::cbrt,
    math_exp => f64::exp,
    math_expm1 => f64::exp_m1,
    math_log => f64::ln,
    math_log2 => f64::log2,
    math_log10 => f64::log10,
    math_log1p => f64::ln_1p,
    math_sin => f64::sin,
    math_cos => f64::cos,
    math_tan => f64::tan,
    math_asin => f64::asin,
    math_acos => f64::acos,
    math_atan => f64::atan,
    math_sinh => f64::sinh,
    math_cosh => f64::cosh,
    math_tanh => f64::tanh,
    math_fround => |x| x as f32 as f64,
}

pub fn register(registry: &mut BuiltinRegistry) {
    let unary: [(&'static str, crate::runtime::value::NativeFn); 24] = [
        ("abs", math_abs),
        ("ceil", math_ceil),
        ("floor", math_floor),
        ("round", math_round),
        ("trunc", math_trunc),
        ("sign", math_sign),
        ("sqrt", math_sqrt),
        ("cbrt", math_cbrt),
        ("exp", math_exp),
        ("expm1", math_expm1),
        ("log", math_log),
        ("log2", math_log2),
        ("log10", math_log10),
        ("log1p", math_log1p),
        ("sin", math_sin),
        ("cos", math_cos),
        ("tan", math_tan),
        ("asin", math_asin),
        ("acos", math_acos),
        ("atan", math_atan),
        ("sinh", math_sinh),
        ("cosh", math_cosh),
        ("tanh", math_tanh),
        ("fround", math_fround),
    ];
    for (name, func) in unary {
        registry.function(MATH, name, func, 1);
    }
    registry.function(MATH, "atan2", math_atan2, 2);
    registry.function(MATH, "pow", math_pow, 2);
    registry.function(MATH, "max", math_max, 2);
    registry.function(MATH, "min", math_min, 2);
    registry.function(MATH, "hypot", math_hypot, 2);
    registry.function(MATH, "random", math_random, 0);

    registry.constant(MATH, "PI", std::f64::consts::PI);
    registry.constant(MATH, "E", std::f64::consts::E);
    registry.constant(MATH, "LN2", std::f64::consts::LN_2);
    registry.constant(MATH, "LN10", std::f64::consts::LN_10);
    registry.constant(MATH, "LOG2E", std::f64::consts::LOG2_E);
    registry.constant(MATH, "LOG10E", std::f64::consts::LOG10_E);
    registry.constant(MATH, "SQRT2", std::f64::consts::SQRT_2);
    registry.constant(MATH, "SQRT1_2", std::f64::consts::FRAC_1_SQRT_2);
}

/// Rounds half up, toward positive infinity, keeping the sign of zero.
fn js_round(x: f64) -> f64 {
    if !x.is_finite() || x.fract() == 0.0 {
        return x;
    }
    if (-0.5..0.0).contains(&x) {
        return -0.0;
    }
    (x + 0.5).floor()
}

fn js_sign(x: f64) -> f64 {
    if x.is_nan() || x == 0.0 {
        x
    } else {
        x.signum()
    }
}

fn math_pow(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let base = number_arg(interp, call, 0)?;
    let exponent = number_arg(interp, call, 1)?;
    Ok(Value::Number(power(base, exponent)))
}

fn math_atan2(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let y = number_arg(interp, call, 0)?;
    let x = number_arg(interp, call, 1)?;
    Ok(Value::Number(y.atan2(x)))
}

/// Coerces every argument before folding, so `valueOf` side effects all happen.
fn numeric_args(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Vec<f64>> {
    call.args.iter().map(|arg| interp.to_number(arg)).collect()
}

fn math_max(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let mut result = f64::NEG_INFINITY;
    for n in numeric_args(interp, call)? {
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        if n > result || (n == 0.0 && result == 0.0 && n.is_sign_positive()) {
            result = n;
        }
    }
    Ok(Value::Number(result))
}

fn math_min(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let mut result = f64::INFINITY;
    for n in numeric_args(interp, call)? {
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        if n < result || (n == 0.0 && result == 0.0 && n.is_sign_negative()) {
            result = n;
        }
    }
    Ok(Value::Number(result))
}

fn math_hypot(interp: &mut Interpreter, call: &NativeCall<'_>) -> Eval<Value> {
    let values = numeric_args(interp, call)?;
    if values.iter().any(|n| n.is_infinite()) {
        return Ok(Value::Number(f64::INFINITY));
    }
    Ok(Value::Number(values.iter().map(|n| n * n).sum::<f64>().sqrt()))
}

fn math_random(interp: &mut Interpreter, _call: &NativeCall<'_>) -> Eval<Value> {
    Ok(Value::Number(interp.rng.gen::<f64>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_goes_half_up() {
        assert_eq!(js_round(2.5), 3.0);
        assert_eq!(js_round(-2.5), -2.0);
        assert_eq!(js_round(-0.4), 0.0);
        assert!(js_round(-0.4).is_sign_negative());
        assert_eq!(js_round(7.0), 7.0);
    }

    #[test]
    fn sign_keeps_zero() {
        assert!(js_sign(-0.0).is_sign_negative());
        assert_eq!(js_sign(-3.0), -1.0);
    }
}
