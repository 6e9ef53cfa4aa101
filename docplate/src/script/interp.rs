//! Asynchronous tree-walking evaluator for template expressions.
//!
//! Evaluation is `async` only so that host functions (and the QUERY
//! resolver) may suspend; pure expressions never yield.  Recursion goes
//! through boxed futures, which keeps the evaluator `Send` for use on a
//! multi-threaded runtime.
//!
//! Identifier lookup order: arrow-function locals → sandbox → scope (data,
//! then additional context) → built-in namespaces and functions.  Unknown
//! identifiers are a [`EvalError::Reference`], which is what lets collect-all
//! mode report misspelled variables.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use super::builtins;
use super::expr::{parse_program, AssignOp, BinOp, Expr, UnaryOp};
use super::sandbox::Sandbox;
use super::value::{Lambda, Value};
use super::EvalError;

// ── Scope ─────────────────────────────────────────────────────────────────────

/// Read-only variable source consulted after the sandbox.
pub trait Scope: Send + Sync {
    fn lookup(&self, name: &str) -> Option<&Value>;
}

/// A scope with nothing in it.
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn lookup(&self, _name: &str) -> Option<&Value> {
        None
    }
}

impl Scope for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

// ── Policy ────────────────────────────────────────────────────────────────────

/// What an evaluation may do.
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    /// Evaluation-step budget; `None` means unbounded.
    pub max_steps: Option<usize>,
    /// Expose ambient built-ins (`env`, `Date`).
    pub ambient: bool,
}

impl Policy {
    pub fn sandboxed(max_steps: usize) -> Self {
        Policy {
            max_steps: Some(max_steps),
            ambient: false,
        }
    }

    pub fn trusted() -> Self {
        Policy {
            max_steps: None,
            ambient: true,
        }
    }
}

/// Array methods that take a callback and therefore need the evaluator.
const CALLBACK_METHODS: &[&str] = &[
    "map", "filter", "find", "findIndex", "some", "every", "forEach", "reduce", "sort", "flatMap",
];

// ── Interpreter ───────────────────────────────────────────────────────────────

pub struct Interpreter<'c> {
    sandbox: Sandbox,
    scope: &'c dyn Scope,
    locals: Vec<BTreeMap<String, Value>>,
    policy: Policy,
    steps: usize,
}

impl<'c> Interpreter<'c> {
    pub fn new(sandbox: Sandbox, scope: &'c dyn Scope, policy: Policy) -> Self {
        Interpreter {
            sandbox,
            scope,
            locals: Vec::new(),
            policy,
            steps: 0,
        }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn into_sandbox(self) -> Sandbox {
        self.sandbox
    }

    /// Parse and evaluate command code.
    pub async fn run(&mut self, code: &str) -> Result<Value, EvalError> {
        let expr = parse_program(code).map_err(EvalError::Syntax)?;
        self.eval(&expr).await
    }

    fn tick(&mut self) -> Result<(), EvalError> {
        self.steps += 1;
        match self.policy.max_steps {
            Some(max) if self.steps > max => Err(EvalError::StepLimit(max)),
            _ => Ok(()),
        }
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    fn lookup_ref(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .or_else(|| self.sandbox.get(name))
            .or_else(|| self.scope.lookup(name))
    }

    fn is_user_defined(&self, name: &str) -> bool {
        self.lookup_ref(name).is_some()
    }

    fn lookup_var(&self, name: &str) -> Result<Value, EvalError> {
        if let Some(v) = self.lookup_ref(name) {
            return Ok(v.clone());
        }
        if builtins::is_namespace(name, self.policy.ambient) {
            return Ok(Value::Object(BTreeMap::new()));
        }
        if let Some(f) = builtins::function_value(name, self.policy.ambient) {
            return Ok(f);
        }
        Err(EvalError::Reference(name.to_owned()))
    }

    fn assign(&mut self, name: &str, value: Value) {
        for frame in self.locals.iter_mut().rev() {
            if let Some(slot) = frame.get_mut(name) {
                *slot = value;
                return;
            }
        }
        self.sandbox.set(name, value);
    }

    /// Borrow the value of a plain access path (`a.b[0].c`) without cloning
    /// intermediate containers.
    fn resolve_ref(&self, expr: &Expr) -> Option<&Value> {
        match expr {
            Expr::Var(name) => self.lookup_ref(name),
            Expr::Member { object, property, .. } => self.resolve_ref(object)?.get_ref(property),
            Expr::Index { object, index, .. } => match index.as_ref() {
                Expr::Literal(key) => self.resolve_ref(object)?.get_ref(&key.property_key()),
                _ => None,
            },
            _ => None,
        }
    }

    fn namespace_of<'e>(&self, object: &'e Expr) -> Option<&'e str> {
        match object {
            Expr::Var(ns)
                if builtins::is_namespace(ns, self.policy.ambient) && !self.is_user_defined(ns) =>
            {
                Some(ns)
            }
            _ => None,
        }
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    /// Evaluate an [`Expr`] AST node.
    pub fn eval<'s>(&'s mut self, expr: &'s Expr) -> BoxFuture<'s, Result<Value, EvalError>> {
        async move {
            self.tick()?;
            match expr {
                Expr::Literal(v) => Ok(v.clone()),

                Expr::Var(name) => self.lookup_var(name),

                Expr::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.eval(item).await?);
                    }
                    Ok(Value::Array(out))
                }

                Expr::Object(fields) => {
                    let mut map = BTreeMap::new();
                    for (key, value) in fields {
                        let v = self.eval(value).await?;
                        map.insert(key.clone(), v);
                    }
                    Ok(Value::Object(map))
                }

                Expr::Template(parts) => {
                    let mut out = String::new();
                    for part in parts {
                        let v = self.eval(part).await?;
                        out.push_str(&v.to_string());
                    }
                    Ok(Value::Str(out))
                }

                Expr::Member { object, property, optional } => {
                    if let Some(v) = self.resolve_ref(expr) {
                        return Ok(v.clone());
                    }
                    if let Some(ns) = self.namespace_of(object) {
                        return Ok(builtins::namespace_property(ns, property).unwrap_or_default());
                    }
                    let obj = self.eval(object).await?;
                    member(obj, property, *optional)
                }

                Expr::Index { object, index, optional } => {
                    if let Some(v) = self.resolve_ref(expr) {
                        return Ok(v.clone());
                    }
                    let obj = self.eval(object).await?;
                    if obj.is_nullish() && *optional {
                        return Ok(Value::Undefined);
                    }
                    let key = self.eval(index).await?.property_key();
                    member(obj, &key, *optional)
                }

                Expr::Call { callee, args, optional } => self.eval_call(callee, args, *optional).await,

                Expr::Arrow { params, body } => {
                    let mut captured = BTreeMap::new();
                    for frame in &self.locals {
                        captured.extend(frame.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                    Ok(Value::Lambda(Arc::new(Lambda {
                        params: params.clone(),
                        body: body.as_ref().clone(),
                        captured,
                    })))
                }

                Expr::Unary(UnaryOp::TypeOf, inner) => {
                    if let Expr::Var(name) = inner.as_ref() {
                        if let Err(EvalError::Reference(_)) = self.lookup_var(name) {
                            return Ok(Value::from("undefined"));
                        }
                    }
                    let v = self.eval(inner).await?;
                    Ok(Value::from(v.type_name()))
                }

                Expr::Unary(op, inner) => {
                    let v = self.eval(inner).await?;
                    Ok(match op {
                        UnaryOp::Neg => v.arith_neg(),
                        UnaryOp::Plus => match v {
                            Value::Int(n) => Value::Int(n),
                            other => Value::number(other.as_float()),
                        },
                        UnaryOp::Not => Value::Bool(!v.as_bool()),
                        UnaryOp::TypeOf => Value::from(v.type_name()),
                    })
                }

                Expr::Binary(op, lhs, rhs) => {
                    // Short-circuit operators return an operand, as in JS.
                    match op {
                        BinOp::And => {
                            let l = self.eval(lhs).await?;
                            return if l.as_bool() { self.eval(rhs).await } else { Ok(l) };
                        }
                        BinOp::Or => {
                            let l = self.eval(lhs).await?;
                            return if l.as_bool() { Ok(l) } else { self.eval(rhs).await };
                        }
                        BinOp::Nullish => {
                            let l = self.eval(lhs).await?;
                            return if l.is_nullish() { self.eval(rhs).await } else { Ok(l) };
                        }
                        _ => {}
                    }
                    let l = self.eval(lhs).await?;
                    let r = self.eval(rhs).await?;
                    eval_binop(*op, &l, &r)
                }

                Expr::Ternary(cond, then, else_) => {
                    let c = self.eval(cond).await?;
                    if c.as_bool() {
                        self.eval(then).await
                    } else {
                        self.eval(else_).await
                    }
                }

                Expr::Assign(name, op, rhs) => {
                    let rval = self.eval(rhs).await?;
                    let new_val = if let AssignOp::Set = op {
                        rval
                    } else {
                        let cur = self.lookup_var(name)?;
                        match op {
                            AssignOp::Add => cur.arith_add(&rval),
                            AssignOp::Sub => cur.arith_sub(&rval),
                            AssignOp::Mul => cur.arith_mul(&rval),
                            AssignOp::Div => cur.arith_div(&rval).map_err(EvalError::Runtime)?,
                            AssignOp::Rem => cur.arith_rem(&rval).map_err(EvalError::Runtime)?,
                            AssignOp::Set => rval,
                        }
                    };
                    self.assign(name, new_val.clone());
                    Ok(new_val)
                }

                Expr::Sequence(exprs) => {
                    let mut last = Value::Undefined;
                    for e in exprs {
                        last = self.eval(e).await?;
                    }
                    Ok(last)
                }
            }
        }
        .boxed()
    }

    async fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, EvalError> {
        let mut out = Vec::with_capacity(args.len());
        for a in args {
            out.push(self.eval(a).await?);
        }
        Ok(out)
    }

    async fn eval_call(&mut self, callee: &Expr, args: &[Expr], optional: bool) -> Result<Value, EvalError> {
        match callee {
            Expr::Member { object, property, optional: member_optional } => {
                if let Some(ns) = self.namespace_of(object) {
                    let ns = ns.to_owned();
                    let args = self.eval_args(args).await?;
                    return builtins::call_namespace(&ns, property, args, self.policy.ambient)
                        .unwrap_or_else(|| Err(format!("{ns}.{property} is not a function")))
                        .map_err(EvalError::Runtime);
                }

                let recv = self.eval(object).await?;
                if recv.is_nullish() {
                    if optional || *member_optional {
                        return Ok(Value::Undefined);
                    }
                    return Err(EvalError::Type(format!(
                        "cannot read properties of {recv} (reading '{property}')"
                    )));
                }

                if let Some(f @ (Value::Function(_) | Value::Lambda(_))) = recv.get(property) {
                    let args = self.eval_args(args).await?;
                    return self.apply(f, args).await;
                }

                let args = self.eval_args(args).await?;
                if let Value::Array(items) = &recv {
                    if CALLBACK_METHODS.contains(&property.as_str())
                        && matches!(args.first(), Some(Value::Function(_) | Value::Lambda(_)))
                    {
                        return self.call_with_callback(items.clone(), property, args).await;
                    }
                }
                builtins::call_method(&recv, property, args)
                    .unwrap_or_else(|| Err(format!("{}.{property} is not a function", recv.type_name())))
                    .map_err(EvalError::Runtime)
            }

            Expr::Var(name) if !self.is_user_defined(name) => {
                let args = self.eval_args(args).await?;
                match builtins::call_function(name, args, self.policy.ambient) {
                    Some(result) => result.map_err(EvalError::Runtime),
                    None => Err(EvalError::Reference(name.clone())),
                }
            }

            _ => {
                let f = self.eval(callee).await?;
                if f.is_nullish() && optional {
                    return Ok(Value::Undefined);
                }
                let args = self.eval_args(args).await?;
                self.apply(f, args).await
            }
        }
    }

    /// Call a host function or arrow function value.
    pub async fn apply(&mut self, f: Value, args: Vec<Value>) -> Result<Value, EvalError> {
        match f {
            Value::Function(h) => h.call(args).await.map_err(EvalError::Runtime),
            Value::Lambda(l) => self.call_lambda(l, args).await,
            other => Err(EvalError::Type(format!("{} is not a function", other.type_name()))),
        }
    }

    fn call_lambda(&mut self, lambda: Arc<Lambda>, args: Vec<Value>) -> BoxFuture<'_, Result<Value, EvalError>> {
        async move {
            let mut frame = lambda.captured.clone();
            for (i, param) in lambda.params.iter().enumerate() {
                frame.insert(param.clone(), args.get(i).cloned().unwrap_or_default());
            }
            self.locals.push(frame);
            let result = self.eval(&lambda.body).await;
            self.locals.pop();
            result
        }
        .boxed()
    }

    async fn call_with_callback(
        &mut self,
        items: Vec<Value>,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, EvalError> {
        let mut args = args.into_iter();
        let callback = args.next().unwrap_or_default();

        match method {
            "map" | "flatMap" => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let v = self.apply(callback.clone(), vec![item, Value::Int(i as i64)]).await?;
                    match v {
                        Value::Array(inner) if method == "flatMap" => out.extend(inner),
                        v => out.push(v),
                    }
                }
                Ok(Value::Array(out))
            }
            "filter" => {
                let mut out = Vec::new();
                for (i, item) in items.into_iter().enumerate() {
                    let keep = self.apply(callback.clone(), vec![item.clone(), Value::Int(i as i64)]).await?;
                    if keep.as_bool() {
                        out.push(item);
                    }
                }
                Ok(Value::Array(out))
            }
            "find" | "findIndex" | "some" | "every" => {
                for (i, item) in items.into_iter().enumerate() {
                    let hit = self
                        .apply(callback.clone(), vec![item.clone(), Value::Int(i as i64)])
                        .await?
                        .as_bool();
                    match (method, hit) {
                        ("find", true) => return Ok(item),
                        ("findIndex", true) => return Ok(Value::Int(i as i64)),
                        ("some", true) => return Ok(Value::Bool(true)),
                        ("every", false) => return Ok(Value::Bool(false)),
                        _ => {}
                    }
                }
                Ok(match method {
                    "find" => Value::Undefined,
                    "findIndex" => Value::Int(-1),
                    "some" => Value::Bool(false),
                    _ => Value::Bool(true),
                })
            }
            "forEach" => {
                for (i, item) in items.into_iter().enumerate() {
                    self.apply(callback.clone(), vec![item, Value::Int(i as i64)]).await?;
                }
                Ok(Value::Undefined)
            }
            "reduce" => {
                let mut iter = items.into_iter().enumerate();
                let mut acc = match args.next() {
                    Some(init) => init,
                    None => match iter.next() {
                        Some((_, first)) => first,
                        None => {
                            return Err(EvalError::Type("reduce of empty array with no initial value".into()))
                        }
                    },
                };
                for (i, item) in iter {
                    acc = self
                        .apply(callback.clone(), vec![acc, item, Value::Int(i as i64)])
                        .await?;
                }
                Ok(acc)
            }
            "sort" => {
                // Insertion sort: the comparator is async, so `sort_by` is out.
                let mut sorted: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    let mut pos = sorted.len();
                    while pos > 0 {
                        let order = self
                            .apply(callback.clone(), vec![sorted[pos - 1].clone(), item.clone()])
                            .await?
                            .as_float();
                        if order > 0.0 {
                            pos -= 1;
                        } else {
                            break;
                        }
                    }
                    sorted.insert(pos, item);
                }
                Ok(Value::Array(sorted))
            }
            other => Err(EvalError::Type(format!("array.{other} is not a function"))),
        }
    }
}

fn member(obj: Value, property: &str, optional: bool) -> Result<Value, EvalError> {
    if obj.is_nullish() {
        if optional {
            return Ok(Value::Undefined);
        }
        return Err(EvalError::Type(format!(
            "cannot read properties of {obj} (reading '{property}')"
        )));
    }
    Ok(obj.get(property).unwrap_or_default())
}

fn eval_binop(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    use std::cmp::Ordering;
    let ord = || l.cmp_value(r);
    Ok(match op {
        BinOp::Add => l.arith_add(r),
        BinOp::Sub => l.arith_sub(r),
        BinOp::Mul => l.arith_mul(r),
        BinOp::Div => l.arith_div(r).map_err(EvalError::Runtime)?,
        BinOp::Rem => l.arith_rem(r).map_err(EvalError::Runtime)?,
        BinOp::Eq => Value::Bool(l.loose_eq(r)),
        BinOp::Ne => Value::Bool(!l.loose_eq(r)),
        BinOp::StrictEq => Value::Bool(l.strict_eq(r)),
        BinOp::StrictNe => Value::Bool(!l.strict_eq(r)),
        BinOp::Lt => Value::Bool(ord() == Some(Ordering::Less)),
        BinOp::Le => Value::Bool(matches!(ord(), Some(Ordering::Less | Ordering::Equal))),
        BinOp::Gt => Value::Bool(ord() == Some(Ordering::Greater)),
        BinOp::Ge => Value::Bool(matches!(ord(), Some(Ordering::Greater | Ordering::Equal))),
        BinOp::And | BinOp::Or | BinOp::Nullish => {
            return Err(EvalError::Runtime("short-circuit operator evaluated eagerly".into()))
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::value::HostFunction;
    use serde_json::json;

    fn scope(json: serde_json::Value) -> BTreeMap<String, Value> {
        match Value::from(json) {
            Value::Object(map) => map,
            _ => BTreeMap::new(),
        }
    }

    fn eval_in(src: &str, scope: &BTreeMap<String, Value>) -> Result<Value, EvalError> {
        let mut interp = Interpreter::new(Sandbox::new(), scope, Policy::sandboxed(10_000));
        futures_util::FutureExt::now_or_never(interp.run(src)).expect("pure expression suspended")
    }

    fn eval(src: &str) -> Value {
        eval_in(src, &BTreeMap::new()).expect("eval failed")
    }

    #[test]
    fn literals_and_arithmetic() {
        assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval("(1 + 2) * 3"), Value::Int(9));
        assert_eq!(eval("7 / 2"), Value::Float(3.5));
        assert_eq!(eval("'a' + 1"), Value::from("a1"));
        assert_eq!(eval("-(3)"), Value::Int(-3));
    }

    #[test]
    fn comparison_and_logic() {
        assert_eq!(eval("3 > 2 && 'x'"), Value::from("x"));
        assert_eq!(eval("0 || 'fallback'"), Value::from("fallback"));
        assert_eq!(eval("null ?? 5"), Value::Int(5));
        assert_eq!(eval("0 ?? 5"), Value::Int(0));
        assert_eq!(eval("1 == '1'"), Value::Bool(true));
        assert_eq!(eval("1 === '1'"), Value::Bool(false));
        assert_eq!(eval("!0"), Value::Bool(true));
    }

    #[test]
    fn ternary_and_typeof() {
        assert_eq!(eval("1 ? 'a' : 'b'"), Value::from("a"));
        assert_eq!(eval("typeof nothing_here"), Value::from("undefined"));
        assert_eq!(eval("typeof 1"), Value::from("number"));
    }

    #[test]
    fn data_lookup_and_members() {
        let s = scope(json!({"user": {"name": "Ada", "tags": ["x", "y"]}}));
        assert_eq!(eval_in("user.name", &s).unwrap(), Value::from("Ada"));
        assert_eq!(eval_in("user.tags[1]", &s).unwrap(), Value::from("y"));
        assert_eq!(eval_in("user.tags.length", &s).unwrap(), Value::Int(2));
        assert_eq!(eval_in("user.missing", &s).unwrap(), Value::Undefined);
        assert_eq!(eval_in("user.missing?.deeper.still", &s).unwrap(), Value::Undefined);
    }

    #[test]
    fn unknown_identifier_is_reference_error() {
        assert_eq!(eval_in("nope", &BTreeMap::new()), Err(EvalError::Reference("nope".into())));
    }

    #[test]
    fn member_of_undefined_is_type_error() {
        let s = scope(json!({"a": null}));
        assert!(matches!(eval_in("a.b", &s), Err(EvalError::Type(_))));
    }

    #[test]
    fn assignments_persist_in_sandbox() {
        let empty = BTreeMap::new();
        let mut interp = Interpreter::new(Sandbox::new(), &empty, Policy::sandboxed(1000));
        let v = futures_util::FutureExt::now_or_never(interp.run("x = 2; x += 3; x * 2")).unwrap();
        assert_eq!(v, Ok(Value::Int(10)));
        assert_eq!(interp.into_sandbox().get("x"), Some(&Value::Int(5)));
    }

    #[test]
    fn arrow_functions_with_array_methods() {
        let s = scope(json!({"items": [{"n": 1}, {"n": 2}, {"n": 3}]}));
        assert_eq!(eval_in("items.map(i => i.n * 10).join('-')", &s).unwrap(), Value::from("10-20-30"));
        assert_eq!(eval_in("items.filter(i => i.n > 1).length", &s).unwrap(), Value::Int(2));
        assert_eq!(eval_in("items.find(i => i.n == 2).n", &s).unwrap(), Value::Int(2));
        assert_eq!(eval_in("items.reduce((a, i) => a + i.n, 0)", &s).unwrap(), Value::Int(6));
        assert_eq!(eval_in("items.some(i => i.n > 2)", &s).unwrap(), Value::Bool(true));
        assert_eq!(
            eval_in("items.sort((a, b) => b.n - a.n).map(i => i.n).join()", &s).unwrap(),
            Value::from("3,2,1")
        );
    }

    #[test]
    fn closures_capture_outer_params() {
        assert_eq!(eval("[1, 2].map(x => [10, 20].map(y => x + y).join('/')).join(' ')"), Value::from("11/21 12/22"));
    }

    #[test]
    fn namespaces() {
        assert_eq!(eval("Math.max(1, 5, 3)"), Value::Int(5));
        assert_eq!(eval("Math.round(2.5)"), Value::Int(3));
        assert_eq!(eval("JSON.stringify({a: [1, 'x']})"), Value::from(r#"{"a":[1,"x"]}"#));
        assert_eq!(eval("Object.keys({b: 1, a: 2}).join()"), Value::from("a,b"));
        assert_eq!(eval("Array.isArray([])"), Value::Bool(true));
    }

    #[test]
    fn template_strings() {
        let s = scope(json!({"n": 3}));
        assert_eq!(eval_in("`n is ${n + 1}!`", &s).unwrap(), Value::from("n is 4!"));
    }

    #[test]
    fn step_budget_enforced() {
        let empty = BTreeMap::new();
        let mut interp = Interpreter::new(Sandbox::new(), &empty, Policy::sandboxed(50));
        let src = format!("[{}1].map(x => x + 1)", "1,".repeat(100));
        let v = futures_util::FutureExt::now_or_never(interp.run(&src)).unwrap();
        assert_eq!(v, Err(EvalError::StepLimit(50)));
    }

    #[test]
    fn ambient_builtins_only_when_trusted() {
        let empty = BTreeMap::new();
        let mut sandboxed = Interpreter::new(Sandbox::new(), &empty, Policy::sandboxed(100));
        let v = futures_util::FutureExt::now_or_never(sandboxed.run("env('PATH')")).unwrap();
        assert_eq!(v, Err(EvalError::Reference("env".into())));

        let mut trusted = Interpreter::new(Sandbox::new(), &empty, Policy::trusted());
        let v = futures_util::FutureExt::now_or_never(trusted.run("typeof Date.now()")).unwrap();
        assert_eq!(v, Ok(Value::from("number")));
    }

    #[tokio::test]
    async fn async_host_function_is_awaited() {
        let slow = HostFunction::new("slow", |args: Vec<Value>| async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            Ok(Value::Int(args.first().map(Value::as_int).unwrap_or(0) * 2))
        });
        let mut s = BTreeMap::new();
        s.insert("slow".to_owned(), Value::Function(slow));
        let mut interp = Interpreter::new(Sandbox::new(), &s, Policy::sandboxed(100));
        assert_eq!(interp.run("slow(21) + 0").await, Ok(Value::Int(42)));
    }

    #[test]
    fn host_function_errors_are_runtime_errors() {
        let failing = HostFunction::sync("boom", |_| Err("kaboom".into()));
        let mut s = BTreeMap::new();
        s.insert("boom".to_owned(), Value::Function(failing));
        assert_eq!(eval_in("boom()", &s), Err(EvalError::Runtime("kaboom".into())));
    }
}
