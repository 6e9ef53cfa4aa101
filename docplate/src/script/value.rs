//! Runtime value type for template expressions.
//!
//! Values follow JavaScript conventions closely enough that templates written
//! for JS-evaluated report engines behave the same: `undefined` and `null`
//! are distinct, truthiness is JS truthiness, numbers print without a
//! trailing `.0`, and arrays stringify as comma-joined lists.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use super::expr::Expr;

/// Future returned by a host function.
pub type HostFuture = BoxFuture<'static, Result<Value, String>>;

type HostFn = dyn Fn(Vec<Value>) -> HostFuture + Send + Sync;

/// A function supplied by the caller (through data or additional context).
///
/// Host functions may be asynchronous; evaluation suspends on them.
#[derive(Clone)]
pub struct HostFunction {
    name: Arc<str>,
    func: Arc<HostFn>,
}

impl HostFunction {
    pub fn new<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        HostFunction {
            name: name.into(),
            func: Arc::new(move |args| f(args).boxed()),
        }
    }

    /// Wrap a synchronous function.
    pub fn sync<F>(name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self::new(name, move |args| futures_util::future::ready(f(args)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: Vec<Value>) -> HostFuture {
        (self.func)(args)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunction({})", self.name)
    }
}

impl PartialEq for HostFunction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

/// An arrow function created by template code.
#[derive(Debug)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Expr,
    /// Local bindings visible where the arrow was written.
    pub captured: BTreeMap<String, Value>,
}

/// A template-expression runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// Raw binary payload (image data).
    Bytes(Vec<u8>),
    Function(HostFunction),
    Lambda(Arc<Lambda>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Lambda(a), Value::Lambda(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    /// JavaScript `String(value)` semantics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => f.write_str(&format_number(*x)),
            Value::Str(s) => f.write_str(s),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    // Nullish elements print as empty strings.
                    if !item.is_nullish() {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Bytes(b) => write!(f, "[{} bytes]", b.len()),
            Value::Function(h) => write!(f, "function {}() {{ [native code] }}", h.name()),
            Value::Lambda(_) => f.write_str("(arrow function)"),
        }
    }
}

/// Format a float the way JavaScript does for ordinary magnitudes.
pub fn format_number(x: f64) -> String {
    if x.is_nan() {
        "NaN".into()
    } else if x.is_infinite() {
        if x > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if x.fract() == 0.0 && x.abs() < 1e21 {
        format!("{x:.0}")
    } else {
        format!("{x}")
    }
}

impl Value {
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// JavaScript truthiness.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0 && !x.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_)
            | Value::Object(_)
            | Value::Bytes(_)
            | Value::Function(_)
            | Value::Lambda(_) => true,
        }
    }

    /// JavaScript `Number(value)`.
    pub fn as_float(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Int(n) => *n as f64,
            Value::Float(x) => *x,
            Value::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [one] => one.as_float(),
                _ => f64::NAN,
            },
            _ => f64::NAN,
        }
    }

    /// Integer coercion (truncating; NaN becomes 0).
    pub fn as_int(&self) -> i64 {
        match self {
            Value::Int(n) => *n,
            other => {
                let x = other.as_float();
                if x.is_nan() { 0 } else { x as i64 }
            }
        }
    }

    pub fn as_str(&self) -> String {
        self.to_string()
    }

    /// `typeof` result.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) | Value::Object(_) | Value::Bytes(_) => "object",
            Value::Function(_) | Value::Lambda(_) => "function",
        }
    }

    /// Build a number, collapsing integral floats to `Int`.
    pub fn number(x: f64) -> Value {
        if x.fract() == 0.0 && x.is_finite() && x.abs() < 9.007_199_254_740_992e15 {
            Value::Int(x as i64)
        } else {
            Value::Float(x)
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    fn is_primitive(&self) -> bool {
        !matches!(
            self,
            Value::Array(_) | Value::Object(_) | Value::Bytes(_) | Value::Function(_) | Value::Lambda(_)
        )
    }

    // ── Property access ───────────────────────────────────────────────────────

    /// Own property lookup (`obj.key`, `arr[0]`, `str.length`).  Returns
    /// `None` when the property does not exist.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.get(key).cloned(),
            Value::Array(items) => {
                if key == "length" {
                    return Some(Value::Int(items.len() as i64));
                }
                key.parse::<usize>().ok().and_then(|i| items.get(i).cloned())
            }
            Value::Str(s) => {
                if key == "length" {
                    return Some(Value::Int(s.chars().count() as i64));
                }
                key.parse::<usize>()
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::Str(c.to_string()))
            }
            Value::Bytes(b) if key == "length" => Some(Value::Int(b.len() as i64)),
            _ => None,
        }
    }

    /// Borrowing variant of [`get`](Self::get) for containers.
    pub fn get_ref(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Property key for an index expression (`a[1]`, `o["k"]`).
    pub fn property_key(&self) -> String {
        match self {
            Value::Float(x) if x.fract() == 0.0 => format!("{x:.0}"),
            other => other.to_string(),
        }
    }

    // ── Arithmetic ────────────────────────────────────────────────────────────

    pub fn arith_add(&self, rhs: &Value) -> Value {
        if !self.is_primitive()
            || !rhs.is_primitive()
            || matches!(self, Value::Str(_))
            || matches!(rhs, Value::Str(_))
        {
            return Value::Str(format!("{self}{rhs}"));
        }
        if let (Value::Int(a), Value::Int(b)) = (self, rhs) {
            if let Some(n) = a.checked_add(*b) {
                return Value::Int(n);
            }
        }
        Value::number(self.as_float() + rhs.as_float())
    }

    pub fn arith_sub(&self, rhs: &Value) -> Value {
        if let (Value::Int(a), Value::Int(b)) = (self, rhs) {
            if let Some(n) = a.checked_sub(*b) {
                return Value::Int(n);
            }
        }
        Value::number(self.as_float() - rhs.as_float())
    }

    pub fn arith_mul(&self, rhs: &Value) -> Value {
        if let (Value::Int(a), Value::Int(b)) = (self, rhs) {
            if let Some(n) = a.checked_mul(*b) {
                return Value::Int(n);
            }
        }
        Value::number(self.as_float() * rhs.as_float())
    }

    pub fn arith_div(&self, rhs: &Value) -> Result<Value, String> {
        let b = rhs.as_float();
        if b == 0.0 {
            return Err("division by zero".into());
        }
        Ok(Value::number(self.as_float() / b))
    }

    pub fn arith_rem(&self, rhs: &Value) -> Result<Value, String> {
        if let (Value::Int(a), Value::Int(b)) = (self, rhs) {
            if *b == 0 {
                return Err("modulo by zero".into());
            }
            return Ok(Value::Int(a.wrapping_rem(*b)));
        }
        let b = rhs.as_float();
        if b == 0.0 {
            return Err("modulo by zero".into());
        }
        Ok(Value::number(self.as_float() % b))
    }

    pub fn arith_neg(&self) -> Value {
        match self {
            Value::Int(n) => n.checked_neg().map_or(Value::Float(-(*n as f64)), Value::Int),
            other => Value::number(-other.as_float()),
        }
    }

    // ── Comparison ────────────────────────────────────────────────────────────

    /// `===`
    pub fn strict_eq(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_float() == b.as_float(),
            (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
                // Identity cannot be observed on owned values; fall back to structure.
                self == rhs
            }
            _ => self == rhs,
        }
    }

    /// `==` with the common coercions (nullish pair, number/string/bool).
    pub fn loose_eq(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (a, b) if a.is_primitive() && b.is_primitive() => a.as_float() == b.as_float(),
            (a, b) if a.is_primitive() || b.is_primitive() => a.to_string() == b.to_string(),
            _ => self.strict_eq(rhs),
        }
    }

    /// Relational comparison; `None` when the operands are unordered (NaN).
    pub fn cmp_value(&self, rhs: &Value) -> Option<std::cmp::Ordering> {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => self.as_float().partial_cmp(&rhs.as_float()),
        }
    }

    // ── JSON bridge ───────────────────────────────────────────────────────────

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Undefined | Value::Null | Value::Function(_) | Value::Lambda(_) => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Int(n) => J::from(*n),
            Value::Float(x) => serde_json::Number::from_f64(*x).map_or(J::Null, J::Number),
            Value::Str(s) => J::String(s.clone()),
            Value::Array(items) => J::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => J::Object(
                map.iter()
                    .filter(|(_, v)| !matches!(v, Value::Undefined | Value::Function(_) | Value::Lambda(_)))
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Bytes(b) => J::Array(b.iter().map(|&x| J::from(x)).collect()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match json {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            J::String(s) => Value::Str(s),
            J::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            J::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<HostFunction> for Value {
    fn from(f: HostFunction) -> Self {
        Value::Function(f)
    }
}

impl FromIterator<(String, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Value::Object(iter.into_iter().collect())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_numbers() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        assert_eq!(Value::Float(1.0).to_string(), "1");
        assert_eq!(Value::Float(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::Float(0.1 + 0.2).to_string(), "0.30000000000000004");
    }

    #[test]
    fn display_containers() {
        let arr = Value::Array(vec![1i64.into(), Value::Null, "x".into()]);
        assert_eq!(arr.to_string(), "1,,x");
        assert_eq!(Value::from(json!({"a": 1})).to_string(), "[object Object]");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Undefined.as_bool());
        assert!(!Value::Null.as_bool());
        assert!(!Value::Str(String::new()).as_bool());
        assert!(Value::Str("0".into()).as_bool());
        assert!(!Value::Int(0).as_bool());
        assert!(Value::Array(vec![]).as_bool());
        assert!(!Value::Float(f64::NAN).as_bool());
    }

    #[test]
    fn arithmetic() {
        let a = Value::Int(10);
        let b = Value::Int(4);
        assert_eq!(a.arith_add(&b), Value::Int(14));
        assert_eq!(a.arith_sub(&b), Value::Int(6));
        assert_eq!(a.arith_mul(&b), Value::Int(40));
        assert_eq!(a.arith_div(&b), Ok(Value::Float(2.5)));
        assert_eq!(Value::Int(8).arith_div(&b), Ok(Value::Int(2)));
        assert_eq!(a.arith_rem(&b), Ok(Value::Int(2)));
    }

    #[test]
    fn string_concat() {
        assert_eq!(Value::from("a").arith_add(&Value::Int(1)), Value::from("a1"));
        assert_eq!(Value::Int(1).arith_add(&Value::from("2")), Value::from("12"));
    }

    #[test]
    fn div_by_zero() {
        assert!(Value::Int(1).arith_div(&Value::Int(0)).is_err());
        assert!(Value::Int(1).arith_rem(&Value::Int(0)).is_err());
    }

    #[test]
    fn equality() {
        assert!(Value::Int(1).strict_eq(&Value::Float(1.0)));
        assert!(!Value::Int(1).strict_eq(&Value::from("1")));
        assert!(Value::Int(1).loose_eq(&Value::from("1")));
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(!Value::Null.strict_eq(&Value::Undefined));
    }

    #[test]
    fn member_access() {
        let v = Value::from(json!({"items": [10, 20]}));
        let items = v.get("items").unwrap();
        assert_eq!(items.get("length"), Some(Value::Int(2)));
        assert_eq!(items.get("1"), Some(Value::Int(20)));
        assert_eq!(v.get("missing"), None);
        assert_eq!(Value::from("héllo").get("length"), Some(Value::Int(5)));
    }

    #[test]
    fn json_round_trip() {
        let src = json!({"a": [1, 2.5, "x", null, true]});
        assert_eq!(Value::from(src.clone()).to_json(), src);
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Undefined.type_name(), "undefined");
        assert_eq!(Value::Null.type_name(), "object");
        assert_eq!(Value::Float(1.5).type_name(), "number");
        let f = HostFunction::sync("f", |_| Ok(Value::Null));
        assert_eq!(Value::Function(f).type_name(), "function");
    }
}
