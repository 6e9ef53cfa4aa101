//! Built-in functions, namespaces and methods.
//!
//! Each entry point receives already-evaluated arguments and returns
//! `Option<Result<Value, String>>`: `None` when the name is not a built-in
//! (the interpreter then reports a reference or type error), `Some(Err)` when
//! the call itself failed.  Callback-taking array methods (`map`, `filter`,
//! …) live in the interpreter because they need to evaluate arrow functions.

use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;

use super::value::{format_number, HostFunction, Value};

const FUNCTIONS: &[&str] = &[
    "String", "Number", "Boolean", "parseInt", "parseFloat", "isNaN", "isFinite", "matches",
];
const AMBIENT_FUNCTIONS: &[&str] = &["env"];
const NAMESPACES: &[&str] = &["Math", "JSON", "Object", "Array", "Number"];
const AMBIENT_NAMESPACES: &[&str] = &["Date"];

/// Upper bound, in bytes, for strings built by `repeat` and the pad methods.
pub const MAX_STRING_LEN: usize = 1 << 24;

pub fn is_namespace(name: &str, ambient: bool) -> bool {
    NAMESPACES.contains(&name) || (ambient && AMBIENT_NAMESPACES.contains(&name))
}

fn is_function(name: &str, ambient: bool) -> bool {
    FUNCTIONS.contains(&name) || (ambient && AMBIENT_FUNCTIONS.contains(&name))
}

/// A global built-in function as a first-class value (`items.map(String)`).
pub fn function_value(name: &str, ambient: bool) -> Option<Value> {
    if !is_function(name, ambient) {
        return None;
    }
    let owned = name.to_owned();
    Some(Value::Function(HostFunction::sync(name, move |args| {
        call_function(&owned, args, ambient).unwrap_or_else(|| Err(format!("{owned} is not a function")))
    })))
}

/// Constant properties of a namespace (`Math.PI`).
pub fn namespace_property(ns: &str, prop: &str) -> Option<Value> {
    match (ns, prop) {
        ("Math", "PI") => Some(Value::Float(std::f64::consts::PI)),
        ("Math", "E") => Some(Value::Float(std::f64::consts::E)),
        ("Number", "MAX_SAFE_INTEGER") => Some(Value::Int(9_007_199_254_740_991)),
        ("Number", "MIN_SAFE_INTEGER") => Some(Value::Int(-9_007_199_254_740_991)),
        _ => None,
    }
}

// ── Global functions ──────────────────────────────────────────────────────────

/// Dispatch a global function call (`String(x)`, `parseInt(s)`).
pub fn call_function(name: &str, args: Vec<Value>, ambient: bool) -> Option<Result<Value, String>> {
    fn inner(name: &str, args: Vec<Value>, ambient: bool) -> Result<Option<Value>, String> {
        Ok(Some(match name {
            "String" => Value::Str(args.first().map(Value::to_string).unwrap_or_default()),
            "Number" => args.first().map_or(Value::Int(0), |v| Value::number(v.as_float())),
            "Boolean" => Value::Bool(args.first().is_some_and(Value::as_bool)),
            "parseInt" => {
                let s = get_str(&args, 0, name)?;
                let radix = args.get(1).map_or(10, |v| v.as_int());
                parse_int(&s, radix as u32)
            }
            "parseFloat" => parse_float(&get_str(&args, 0, name)?),
            "isNaN" => Value::Bool(get_float(&args, 0, name)?.is_nan()),
            "isFinite" => Value::Bool(get_float(&args, 0, name)?.is_finite()),
            "matches" => {
                let text = get_str(&args, 0, name)?;
                let pattern = get_str(&args, 1, name)?;
                let re = Regex::new(&pattern).map_err(|e| format!("matches: {e}"))?;
                Value::Bool(re.is_match(&text))
            }
            "env" if ambient => {
                let var = get_str(&args, 0, name)?;
                std::env::var(var).map_or(Value::Undefined, Value::Str)
            }
            _ => return Ok(None),
        }))
    }
    inner(name, args, ambient).transpose()
}

fn parse_int(s: &str, radix: u32) -> Value {
    if !(2..=36).contains(&radix) {
        return Value::Float(f64::NAN);
    }
    let t = s.trim_start();
    let (neg, body) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let body = if radix == 16 {
        body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")).unwrap_or(body)
    } else {
        body
    };
    let digits: String = body.chars().take_while(|c| c.is_digit(radix)).collect();
    match i64::from_str_radix(&digits, radix) {
        Ok(n) => Value::Int(if neg { -n } else { n }),
        Err(_) => Value::Float(f64::NAN),
    }
}

fn parse_float(s: &str) -> Value {
    let t = s.trim_start();
    // Longest prefix that parses as a float.
    let end = (1..=t.len())
        .rev()
        .filter(|&i| t.is_char_boundary(i))
        .find(|&i| t[..i].parse::<f64>().is_ok() && !t[..i].ends_with(|c: char| c.is_alphabetic()));
    match end {
        Some(i) => t[..i].parse::<f64>().map_or(Value::Float(f64::NAN), Value::number),
        None => Value::Float(f64::NAN),
    }
}

// ── Namespaces ────────────────────────────────────────────────────────────────

/// Dispatch `Namespace.fn(args)`.
pub fn call_namespace(ns: &str, name: &str, args: Vec<Value>, ambient: bool) -> Option<Result<Value, String>> {
    fn inner(ns: &str, name: &str, args: Vec<Value>, ambient: bool) -> Result<Option<Value>, String> {
        Ok(Some(match (ns, name) {
            ("Math", "abs") => match args.first() {
                Some(Value::Int(n)) => Value::Int(n.abs()),
                _ => Value::number(get_float(&args, 0, name)?.abs()),
            },
            ("Math", "ceil") => Value::number(get_float(&args, 0, name)?.ceil()),
            ("Math", "floor") => Value::number(get_float(&args, 0, name)?.floor()),
            ("Math", "round") => Value::number((get_float(&args, 0, name)? + 0.5).floor()),
            ("Math", "trunc") => Value::number(get_float(&args, 0, name)?.trunc()),
            ("Math", "sign") => {
                let x = get_float(&args, 0, name)?;
                Value::number(if x == 0.0 || x.is_nan() { x } else { x.signum() })
            }
            ("Math", "sqrt") => Value::number(get_float(&args, 0, name)?.sqrt()),
            ("Math", "pow") => Value::number(get_float(&args, 0, name)?.powf(get_float(&args, 1, name)?)),
            ("Math", "max") => fold_numbers(&args, f64::NEG_INFINITY, f64::max),
            ("Math", "min") => fold_numbers(&args, f64::INFINITY, f64::min),

            ("JSON", "stringify") => {
                let json = args.first().map(Value::to_json).unwrap_or(serde_json::Value::Null);
                let pretty = args.get(2).is_some_and(|v| v.as_int() > 0);
                let out = if pretty {
                    serde_json::to_string_pretty(&json)
                } else {
                    serde_json::to_string(&json)
                };
                Value::Str(out.map_err(|e| format!("JSON.stringify: {e}"))?)
            }
            ("JSON", "parse") => {
                let s = get_str(&args, 0, name)?;
                let json: serde_json::Value =
                    serde_json::from_str(&s).map_err(|e| format!("JSON.parse: {e}"))?;
                Value::from(json)
            }

            ("Object", "keys") => match args.first() {
                Some(Value::Object(map)) => map.keys().map(|k| Value::Str(k.clone())).collect::<Vec<_>>().into(),
                Some(Value::Array(items)) => (0..items.len()).map(|i| Value::Str(i.to_string())).collect::<Vec<_>>().into(),
                _ => Value::Array(Vec::new()),
            },
            ("Object", "values") => match args.first() {
                Some(Value::Object(map)) => Value::Array(map.values().cloned().collect()),
                Some(Value::Array(items)) => Value::Array(items.clone()),
                _ => Value::Array(Vec::new()),
            },
            ("Object", "entries") => match args.first() {
                Some(Value::Object(map)) => Value::Array(
                    map.iter()
                        .map(|(k, v)| Value::Array(vec![Value::Str(k.clone()), v.clone()]))
                        .collect(),
                ),
                _ => Value::Array(Vec::new()),
            },
            ("Object", "assign") => {
                let mut out = std::collections::BTreeMap::new();
                for a in &args {
                    if let Value::Object(map) = a {
                        out.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                }
                Value::Object(out)
            }

            ("Array", "isArray") => Value::Bool(matches!(args.first(), Some(Value::Array(_)))),
            ("Array", "from") => match args.first() {
                Some(Value::Array(items)) => Value::Array(items.clone()),
                Some(Value::Str(s)) => s.chars().map(|c| Value::Str(c.to_string())).collect::<Vec<_>>().into(),
                _ => Value::Array(Vec::new()),
            },

            ("Number", "isInteger") => Value::Bool(match args.first() {
                Some(Value::Int(_)) => true,
                Some(Value::Float(x)) => x.is_finite() && x.fract() == 0.0,
                _ => false,
            }),
            ("Number", "isFinite") => {
                Value::Bool(matches!(args.first(), Some(Value::Int(_))) || matches!(args.first(), Some(Value::Float(x)) if x.is_finite()))
            }
            ("Number", "parseInt") => parse_int(&get_str(&args, 0, name)?, args.get(1).map_or(10, |v| v.as_int()) as u32),
            ("Number", "parseFloat") => parse_float(&get_str(&args, 0, name)?),

            ("Date", "now") if ambient => {
                let ms = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0);
                Value::Int(ms)
            }
            _ => return Ok(None),
        }))
    }
    inner(ns, name, args, ambient).transpose()
}

fn fold_numbers(args: &[Value], init: f64, f: fn(f64, f64) -> f64) -> Value {
    let mut acc = init;
    for a in args {
        let x = a.as_float();
        if x.is_nan() {
            return Value::Float(f64::NAN);
        }
        acc = f(acc, x);
    }
    Value::number(acc)
}

// ── Methods ───────────────────────────────────────────────────────────────────

/// Dispatch `receiver.method(args)` for strings, numbers and arrays.
pub fn call_method(recv: &Value, name: &str, args: Vec<Value>) -> Option<Result<Value, String>> {
    let result = match recv {
        Value::Str(s) => string_method(s, name, &args),
        Value::Int(_) | Value::Float(_) => number_method(recv.as_float(), name, &args),
        Value::Array(items) => array_method(items, name, &args),
        _ => Ok(None),
    };
    match result {
        Ok(None) if name == "toString" => Some(Ok(Value::Str(recv.to_string()))),
        other => other.transpose(),
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Option<Value>, String> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let substring = |from: usize, to: usize| -> Value { Value::Str(chars[from..to.max(from)].iter().collect()) };

    Ok(Some(match name {
        "toUpperCase" => Value::Str(s.to_uppercase()),
        "toLowerCase" => Value::Str(s.to_lowercase()),
        "trim" => Value::Str(s.trim().to_owned()),
        "trimStart" => Value::Str(s.trim_start().to_owned()),
        "trimEnd" => Value::Str(s.trim_end().to_owned()),
        "includes" => Value::Bool(s.contains(get_str(args, 0, name)?.as_str())),
        "startsWith" => Value::Bool(s.starts_with(get_str(args, 0, name)?.as_str())),
        "endsWith" => Value::Bool(s.ends_with(get_str(args, 0, name)?.as_str())),
        "indexOf" => {
            let needle = get_str(args, 0, name)?;
            Value::Int(s.find(&needle).map_or(-1, |b| s[..b].chars().count() as i64))
        }
        "lastIndexOf" => {
            let needle = get_str(args, 0, name)?;
            Value::Int(s.rfind(&needle).map_or(-1, |b| s[..b].chars().count() as i64))
        }
        "slice" => {
            let (from, to) = js_range(len, args.first(), args.get(1));
            substring(from, to)
        }
        "substring" => {
            let clamp = |v: Option<&Value>, dflt: i64| v.map_or(dflt, |v| v.as_int()).clamp(0, len) as usize;
            let (a, b) = (clamp(args.first(), 0), clamp(args.get(1), len));
            substring(a.min(b), a.max(b))
        }
        "charAt" => {
            let i = args.first().map_or(0, |v| v.as_int());
            Value::Str(chars.get(i as usize).filter(|_| i >= 0).map(|c| c.to_string()).unwrap_or_default())
        }
        "at" => {
            let i = args.first().map_or(0, |v| v.as_int());
            let i = if i < 0 { len + i } else { i };
            chars
                .get(i as usize)
                .filter(|_| i >= 0)
                .map_or(Value::Undefined, |c| Value::Str(c.to_string()))
        }
        "split" => match args.first() {
            None | Some(Value::Undefined) => Value::Array(vec![Value::Str(s.to_owned())]),
            Some(sep) => {
                let sep = sep.as_str();
                if sep.is_empty() {
                    chars.iter().map(|c| Value::Str(c.to_string())).collect::<Vec<_>>().into()
                } else {
                    s.split(sep.as_str()).map(Value::from).collect::<Vec<_>>().into()
                }
            }
        },
        "replace" => {
            let from = get_str(args, 0, name)?;
            let to = get_str(args, 1, name)?;
            Value::Str(s.replacen(&from, &to, 1))
        }
        "replaceAll" => {
            let from = get_str(args, 0, name)?;
            let to = get_str(args, 1, name)?;
            if from.is_empty() {
                Value::Str(s.to_owned())
            } else {
                Value::Str(s.replace(&from, &to))
            }
        }
        "padStart" | "padEnd" => {
            let width = get_int(args, 0, name)?.max(0);
            let fill = args.get(1).map_or_else(|| " ".to_owned(), Value::as_str);
            let missing = usize::try_from(width).unwrap_or(usize::MAX).saturating_sub(chars.len());
            let longest = fill.chars().map(char::len_utf8).max().unwrap_or(0);
            if missing.saturating_mul(longest).saturating_add(s.len()) > MAX_STRING_LEN {
                return Err(format!("{name}: width {width} exceeds the string size limit"));
            }
            let pad = make_padding(missing, &fill);
            if name == "padStart" {
                Value::Str(pad + s)
            } else {
                Value::Str(s.to_owned() + &pad)
            }
        }
        "repeat" => {
            let n = get_int(args, 0, name)?;
            if n < 0 {
                return Err(format!("repeat: invalid count {n}"));
            }
            let n = usize::try_from(n).map_err(|_| format!("repeat: invalid count {n}"))?;
            match n.checked_mul(s.len()) {
                Some(len) if len <= MAX_STRING_LEN => Value::Str(s.repeat(n)),
                _ => return Err(format!("repeat: count {n} exceeds the string size limit")),
            }
        }
        "concat" => {
            let mut out = s.to_owned();
            for a in args {
                out.push_str(&a.as_str());
            }
            Value::Str(out)
        }
        _ => return Ok(None),
    }))
}

fn make_padding(n: usize, fill: &str) -> String {
    if fill.is_empty() {
        return String::new();
    }
    fill.chars().cycle().take(n).collect()
}

fn number_method(x: f64, name: &str, args: &[Value]) -> Result<Option<Value>, String> {
    Ok(Some(match name {
        "toFixed" => {
            let digits = args.first().map_or(0, |v| v.as_int());
            if !(0..=100).contains(&digits) {
                return Err(format!("toFixed: digits {digits} out of range"));
            }
            // Round half away from zero before formatting.
            let scale = 10f64.powi(digits as i32);
            let rounded = (x * scale).round() / scale;
            Value::Str(format!("{rounded:.prec$}", prec = digits as usize))
        }
        "toString" => Value::Str(format_number(x)),
        _ => return Ok(None),
    }))
}

fn array_method(items: &[Value], name: &str, args: &[Value]) -> Result<Option<Value>, String> {
    let len = items.len() as i64;
    Ok(Some(match name {
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Undefined) => ",".to_owned(),
                Some(v) => v.as_str(),
            };
            let parts: Vec<String> = items
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
                .collect();
            Value::Str(parts.join(&sep))
        }
        "includes" => {
            let needle = args.first().cloned().unwrap_or_default();
            Value::Bool(items.iter().any(|v| v.strict_eq(&needle)))
        }
        "indexOf" => {
            let needle = args.first().cloned().unwrap_or_default();
            Value::Int(items.iter().position(|v| v.strict_eq(&needle)).map_or(-1, |i| i as i64))
        }
        "slice" => {
            let (from, to) = js_range(len, args.first(), args.get(1));
            Value::Array(items[from..to.max(from)].to_vec())
        }
        "concat" => {
            let mut out = items.to_vec();
            for a in args {
                match a {
                    Value::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Value::Array(out)
        }
        "reverse" => Value::Array(items.iter().rev().cloned().collect()),
        "at" => {
            let i = args.first().map_or(0, |v| v.as_int());
            let i = if i < 0 { len + i } else { i };
            items.get(i as usize).filter(|_| i >= 0).cloned().unwrap_or_default()
        }
        "flat" => {
            let mut out = Vec::new();
            for v in items {
                match v {
                    Value::Array(inner) => out.extend(inner.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Value::Array(out)
        }
        "sort" => {
            let mut out = items.to_vec();
            out.sort_by_key(|v| v.to_string());
            Value::Array(out)
        }
        _ => return Ok(None),
    }))
}

/// Resolve JS `slice(start, end)` arguments against a length.
fn js_range(len: i64, start: Option<&Value>, end: Option<&Value>) -> (usize, usize) {
    let norm = |v: Option<&Value>, dflt: i64| -> usize {
        let i = match v {
            None | Some(Value::Undefined) => dflt,
            Some(v) => v.as_int(),
        };
        let i = if i < 0 { len + i } else { i };
        i.clamp(0, len) as usize
    };
    (norm(start, 0), norm(end, len))
}

// ── Argument accessors ────────────────────────────────────────────────────────

fn get_str(args: &[Value], idx: usize, name: &str) -> Result<String, String> {
    args.get(idx)
        .map(|v| v.as_str())
        .ok_or_else(|| format!("{name}: argument {idx} missing"))
}

fn get_int(args: &[Value], idx: usize, name: &str) -> Result<i64, String> {
    args.get(idx)
        .map(|v| v.as_int())
        .ok_or_else(|| format!("{name}: argument {idx} missing"))
}

fn get_float(args: &[Value], idx: usize, name: &str) -> Result<f64, String> {
    args.get(idx)
        .map(|v| v.as_float())
        .ok_or_else(|| format!("{name}: argument {idx} missing"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
