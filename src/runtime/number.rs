//! Number to text conversions with JavaScript's layout rules.

/// `Number.prototype.toString()` for radix 10.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value < 0.0 {
        return format!("-{}", format_number(-value));
    }

    let (digits, exponent) = shortest_digits(value);
    let k = digits.len() as i32;
    let n = exponent + 1;

    if k <= n && n <= 21 {
        let mut out = digits;
        out.extend(std::iter::repeat('0').take((n - k) as usize));
        out
    } else if 0 < n && n <= 21 {
        format!("{}.{}", &digits[..n as usize], &digits[n as usize..])
    } else if -6 < n && n <= 0 {
        format!("0.{}{}", "0".repeat((-n) as usize), digits)
    } else {
        let sign = if n - 1 >= 0 { '+' } else { '-' };
        let magnitude = (n - 1).abs();
        if k == 1 {
            format!("{}e{}{}", digits, sign, magnitude)
        } else {
            format!("{}.{}e{}{}", &digits[..1], &digits[1..], sign, magnitude)
        }
    }
}

/// Shortest round-tripping decimal digits and the exponent of the first digit.
fn shortest_digits(value: f64) -> (String, i32) {
    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = digits.trim_end_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };
    (digits.to_string(), exponent.parse().unwrap_or(0))
}

/// `Number.prototype.toFixed`. Exact ties round away from zero.
pub fn to_fixed(value: f64, fraction_digits: usize) -> String {
    if !value.is_finite() || value.abs() >= 1e21 {
        return format_number(value);
    }
    let scale = 10f64.powi(fraction_digits as i32);
    let scaled = value.abs() * scale;
    let is_tie = scaled.fract() == 0.5 && (scaled.trunc() + 0.5) / scale == value.abs();
    let magnitude = if is_tie {
        (scaled.trunc() + 1.0) / scale
    } else {
        value.abs()
    };
    let text = format!("{:.*}", fraction_digits, magnitude);
    if value < 0.0 {
        format!("-{}", text)
    } else {
        text
    }
}

/// `Number.prototype.toPrecision`.
pub fn to_precision(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return format_number(value);
    }
    if value == 0.0 {
        return if precision > 1 {
            format!("0.{}", "0".repeat(precision - 1))
        } else {
            "0".to_string()
        };
    }
    let scientific = format!("{:.*e}", precision.saturating_sub(1), value.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let sign = if value < 0.0 { "-" } else { "" };

    if exponent < -6 || exponent >= precision as i32 {
        let mut out = format!("{}{}", sign, &digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let exp_sign = if exponent >= 0 { '+' } else { '-' };
        return format!("{}e{}{}", out, exp_sign, exponent.abs());
    }
    if exponent >= 0 {
        let split = exponent as usize + 1;
        if split >= digits.len() {
            format!("{}{}", sign, digits)
        } else {
            format!("{}{}.{}", sign, &digits[..split], &digits[split..])
        }
    } else {
        format!("{}0.{}{}", sign, "0".repeat((-exponent - 1) as usize), digits)
    }
}

/// `Number.prototype.toString(radix)` for radix 2..=36.
pub fn to_radix(value: f64, radix: u32) -> String {
    if radix == 10 || !value.is_finite() {
        return format_number(value);
    }
    let negative = value < 0.0;
    let mut integer = value.abs().trunc();
    let mut fraction = value.abs() - integer;

    let mut int_digits = Vec::new();
    if integer == 0.0 {
        int_digits.push('0');
    }
    while integer >= 1.0 {
        let digit = (integer % radix as f64) as u32;
        int_digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        integer = (integer / radix as f64).trunc();
    }
    int_digits.reverse();

    let mut out: String = int_digits.into_iter().collect();
    if fraction > 0.0 {
        out.push('.');
        for _ in 0..52 {
            fraction *= radix as f64;
            let digit = fraction.trunc() as u32;
            out.push(std::char::from_digit(digit, radix).unwrap_or('0'));
            fraction -= digit as f64;
            if fraction <= 0.0 {
                break;
            }
        }
    }
    if negative {
        out.insert(0, '-');
    }
    out
}

/// `Number.prototype.toLocaleString()` in the `en-US` locale.
pub fn to_locale_string(value: f64) -> String {
    if !value.is_finite() {
        return if value.is_nan() { "NaN".into() } else if value > 0.0 { "∞".into() } else { "-∞".into() };
    }
    let fixed = to_fixed(value.abs(), 3);
    let (integer, fraction) = fixed.split_once('.').unwrap_or((&fixed, ""));
    let fraction = fraction.trim_end_matches('0');

    let mut grouped = String::new();
    for (index, ch) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 && (grouped != "0" || !fraction.is_empty()) { "-" } else { "" };
    if fraction.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, fraction)
    }
}

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{feff}'
}

/// `Number(string)`: the whole trimmed string must be a numeric literal.
pub fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim_matches(is_js_whitespace);
    if trimmed.is_empty() {
        return 0.0;
    }
    let radix = match trimmed.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0b" | "0B") => Some(2),
        Some("0o" | "0O") => Some(8),
        _ => None,
    };
    if let Some(radix) = radix {
        let body = &trimmed[2..];
        if body.is_empty() {
            return f64::NAN;
        }
        return body.chars().try_fold(0f64, |acc, c| {
            c.to_digit(radix).map(|d| acc * radix as f64 + d as f64)
        }).unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let valid = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !valid {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Global `parseFloat`: longest decimal prefix.
pub fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim_start_matches(is_js_whitespace);
    let unsigned = trimmed.trim_start_matches(['+', '-']);
    if unsigned.starts_with("Infinity") {
        return if trimmed.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
    }

    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let mut seen_digit = false;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return f64::NAN;
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }
    trimmed[..end].parse::<f64>().unwrap_or(f64::NAN)
}

/// Global `parseInt` with an optional radix.
pub fn parse_int(text: &str, radix: Option<u32>) -> f64 {
    let mut rest = text.trim_start_matches(is_js_whitespace);
    let mut sign = 1.0;
    if let Some(stripped) = rest.strip_prefix('-') {
        sign = -1.0;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    }

    let mut radix = radix.unwrap_or(0);
    if radix != 0 && !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    if (radix == 0 || radix == 16) && (rest.starts_with("0x") || rest.starts_with("0X")) {
        rest = &rest[2..];
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }

    let digits: Vec<u32> = rest.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    sign * digits.iter().fold(0f64, |acc, d| acc * radix as f64 + *d as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_and_fractions() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-42.0), "-42");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(-0.0), "0");
    }

    #[test]
    fn exponent_thresholds() {
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(0.000001), "0.000001");
        assert_eq!(format_number(0.0000001), "1e-7");
        assert_eq!(format_number(1.5e-10), "1.5e-10");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn fixed_and_precision() {
        assert_eq!(to_fixed(3.14159, 2), "3.14");
        assert_eq!(to_fixed(2.5, 0), "3");
        assert_eq!(to_fixed(-1.5, 0), "-2");
        assert_eq!(to_fixed(1.005, 2), "1.00");
        assert_eq!(to_fixed(10.0, 2), "10.00");
        assert_eq!(to_precision(123.456, 4), "123.5");
        assert_eq!(to_precision(0.00012, 2), "0.00012");
        assert_eq!(to_precision(123456.0, 2), "1.2e+5");
    }

    #[test]
    fn radix_and_locale() {
        assert_eq!(to_radix(255.0, 16), "ff");
        assert_eq!(to_radix(5.0, 2), "101");
        assert_eq!(to_radix(-8.0, 8), "-10");
        assert_eq!(to_locale_string(1234567.891), "1,234,567.891");
        assert_eq!(to_locale_string(1000.0), "1,000");
    }

    #[test]
    fn parsing_helpers() {
        assert_eq!(string_to_number("  42  "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1F"), 31.0);
        assert!(string_to_number("12px").is_nan());
        assert!(string_to_number("inf").is_nan());
        assert_eq!(parse_int("12px", None), 12.0);
        assert_eq!(parse_int("ff", Some(16)), 255.0);
        assert_eq!(parse_int("-0x10", None), -16.0);
        assert!(parse_int("px", None).is_nan());
        assert_eq!(parse_float("3.14abc"), 3.14);
        assert_eq!(parse_float(".5"), 0.5);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert!(parse_float("abc").is_nan());
    }
}
