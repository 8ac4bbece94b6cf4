//! Decoding of literal text: quoted strings, rune constants and numbers.

use crate::language::ast::NumberNode;
use std::{iter::Peekable, str::Chars};

pub fn unquote(text: &str) -> Result<String, String> {
    if let Some(raw) = text.strip_prefix('`').and_then(|rest| rest.strip_suffix('`')) {
        return Ok(raw.replace('\r', ""));
    }
    let Some(body) = text.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) else {
        return Err(format!("invalid quoted string {text}"));
    };
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push(read_escape(&mut chars, text)?),
            '"' | '\n' => return Err(format!("invalid quoted string {text}")),
            other => out.push(other),
        }
    }
    Ok(out)
}

pub fn unquote_char(text: &str) -> Result<char, String> {
    let Some(body) = text.strip_prefix('\'').and_then(|rest| rest.strip_suffix('\'')) else {
        return Err(format!("malformed character constant: {text}"));
    };
    let mut chars = body.chars().peekable();
    let value = match chars.next() {
        Some('\\') => read_escape(&mut chars, text)?,
        Some('\'') | None => return Err(format!("malformed character constant: {text}")),
        Some(other) => other,
    };
    if chars.next().is_some() {
        return Err(format!("malformed character constant: {text}"));
    }
    Ok(value)
}

fn read_escape(chars: &mut Peekable<Chars<'_>>, text: &str) -> Result<char, String> {
    let invalid = || format!("invalid escape sequence in {text}");
    let escape = chars.next().ok_or_else(invalid)?;
    let value = match escape {
        'a' => '\u{07}',
        'b' => '\u{08}',
        'f' => '\u{0C}',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\u{0B}',
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        'x' => read_code_point(chars, 2, 16).ok_or_else(invalid)?,
        'u' => read_code_point(chars, 4, 16).ok_or_else(invalid)?,
        'U' => read_code_point(chars, 8, 16).ok_or_else(invalid)?,
        '0'..='7' => {
            let mut digits = String::from(escape);
            for _ in 0..2 {
                digits.push(chars.next().ok_or_else(invalid)?);
            }
            u32::from_str_radix(&digits, 8)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(invalid)?
        }
        _ => return Err(invalid()),
    };
    Ok(value)
}

fn read_code_point(chars: &mut Peekable<Chars<'_>>, len: usize, radix: u32) -> Option<char> {
    let mut digits = String::with_capacity(len);
    for _ in 0..len {
        digits.push(chars.next()?);
    }
    u32::from_str_radix(&digits, radix).ok().and_then(char::from_u32)
}

/// Builds a number node the way the template runtime interprets the text:
/// integer parses first, then the float fallback, then complex forms.
pub fn parse_number(text: &str, is_char: bool) -> Result<NumberNode, String> {
    let mut node = NumberNode {
        text: text.to_string(),
        ..NumberNode::default()
    };
    if is_char {
        let rune = unquote_char(text)?;
        let value = u32::from(rune);
        node.is_int = true;
        node.int64 = i64::from(value);
        node.is_uint = true;
        node.uint64 = u64::from(value);
        node.is_float = true;
        node.float64 = f64::from(value);
        return Ok(node);
    }
    if let Some(imaginary) = text.strip_suffix('i') {
        let parts = parse_float(imaginary)
            .map(|im| (0.0, im))
            .or_else(|| parse_complex(imaginary));
        let Some(value) = parts else {
            return Err(format!("illegal number syntax: {text:?}"));
        };
        node.is_complex = true;
        node.complex128 = value;
        simplify_complex(&mut node);
        return Ok(node);
    }

    if let Some(value) = parse_uint(text) {
        node.is_uint = true;
        node.uint64 = value;
    }
    if let Some(value) = parse_int(text) {
        node.is_int = true;
        node.int64 = value;
    }
    if node.is_int {
        node.is_float = true;
        node.float64 = node.int64 as f64;
    } else if node.is_uint {
        node.is_float = true;
        node.float64 = node.uint64 as f64;
    } else if let Some(value) = parse_float(text) {
        if !text.contains(['.', 'e', 'E', 'p', 'P']) {
            return Err(format!("integer overflow: {text:?}"));
        }
        node.is_float = true;
        node.float64 = value;
        if let Some(int) = exact_i64(value) {
            node.is_int = true;
            node.int64 = int;
        }
        if let Some(uint) = exact_u64(value) {
            node.is_uint = true;
            node.uint64 = uint;
        }
    }
    if !node.is_int && !node.is_uint && !node.is_float {
        return Err(format!("illegal number syntax: {text:?}"));
    }
    Ok(node)
}

fn simplify_complex(node: &mut NumberNode) {
    let (real, imaginary) = node.complex128;
    node.is_float = imaginary == 0.0;
    if node.is_float {
        node.float64 = real;
        if let Some(int) = exact_i64(real) {
            node.is_int = true;
            node.int64 = int;
        }
        if let Some(uint) = exact_u64(real) {
            node.is_uint = true;
            node.uint64 = uint;
        }
    }
}

fn exact_i64(value: f64) -> Option<i64> {
    let in_range = (-9.223_372_036_854_776e18..9.223_372_036_854_776e18).contains(&value);
    (in_range && value.fract() == 0.0).then_some(value as i64)
}

fn exact_u64(value: f64) -> Option<u64> {
    let in_range = (0.0..1.844_674_407_370_955_2e19).contains(&value);
    (in_range && value.fract() == 0.0).then_some(value as u64)
}

fn split_radix(text: &str) -> (u32, &str) {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'0' {
        match bytes[1] {
            b'x' | b'X' => return (16, &text[2..]),
            b'o' | b'O' => return (8, &text[2..]),
            b'b' | b'B' => return (2, &text[2..]),
            _ => return (8, &text[1..]),
        }
    }
    (10, text)
}

/// Underscores may only separate digits, or follow a base prefix.
fn underscores_ok(text: &str) -> bool {
    let text = text.strip_prefix(['+', '-']).unwrap_or(text);
    let bytes = text.as_bytes();
    let mut index = 0;
    let mut hex = false;
    // '^' start, '0' digit or prefix, '_' underscore, '!' anything else
    let mut saw = b'^';
    if bytes.len() >= 2
        && bytes[0] == b'0'
        && matches!(bytes[1].to_ascii_lowercase(), b'b' | b'o' | b'x')
    {
        index = 2;
        saw = b'0';
        hex = bytes[1].to_ascii_lowercase() == b'x';
    }
    for &byte in &bytes[index..] {
        if byte.is_ascii_digit() || (hex && byte.is_ascii_hexdigit()) {
            saw = b'0';
        } else if byte == b'_' {
            if saw != b'0' {
                return false;
            }
            saw = b'_';
        } else if saw == b'_' {
            return false;
        } else {
            saw = b'!';
        }
    }
    saw != b'_'
}

pub fn parse_uint(text: &str) -> Option<u64> {
    if !underscores_ok(text) {
        return None;
    }
    let (radix, digits) = split_radix(text);
    let digits: String = digits.chars().filter(|ch| *ch != '_').collect();
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_digit(radix)) {
        return None;
    }
    u64::from_str_radix(&digits, radix).ok()
}

pub fn parse_int(text: &str) -> Option<i64> {
    let (negative, magnitude) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let value = parse_uint(magnitude)?;
    if negative {
        if value > i64::MAX as u64 + 1 {
            return None;
        }
        Some((value as i64).wrapping_neg())
    } else {
        i64::try_from(value).ok()
    }
}

pub fn parse_float(text: &str) -> Option<f64> {
    if !underscores_ok(text) {
        return None;
    }
    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let body: String = body.chars().filter(|ch| *ch != '_').collect();
    let value = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        parse_hex_float(hex)?
    } else {
        let allowed = body
            .chars()
            .all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E' | '+' | '-'));
        if body.is_empty() || !allowed || !body.chars().any(|ch| ch.is_ascii_digit()) {
            return None;
        }
        body.parse::<f64>().ok()?
    };
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

fn parse_hex_float(text: &str) -> Option<f64> {
    let (mantissa, exponent) = text.split_once(['p', 'P'])?;
    let exponent: i32 = exponent.parse().ok()?;
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    let mut value = 0f64;
    for ch in whole.chars() {
        value = value * 16.0 + f64::from(ch.to_digit(16)?);
    }
    let mut scale = 1.0 / 16.0;
    for ch in fraction.chars() {
        value += f64::from(ch.to_digit(16)?) * scale;
        scale /= 16.0;
    }
    Some(value * 2f64.powi(exponent))
}

/// Splits `a+b` / `a-b` (the imaginary suffix already removed).
fn parse_complex(text: &str) -> Option<(f64, f64)> {
    let bytes = text.as_bytes();
    let split = (1..bytes.len()).rev().find(|&idx| {
        matches!(bytes[idx], b'+' | b'-') && !matches!(bytes[idx - 1], b'e' | b'E' | b'p' | b'P')
    })?;
    let real = parse_float(&text[..split])?;
    let imaginary = parse_float(&text[split..])?;
    Some((real, imaginary))
}
