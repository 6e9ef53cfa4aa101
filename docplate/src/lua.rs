//! Optional Lua 5.4 code runner via the `mlua` crate.
//!
//! Enabled with the `lua` Cargo feature:
//! ```text
//! cargo build --features lua
//! cargo test  --features lua
//! ```
//!
//! Command code is run as a Lua chunk.  A bare expression (`name .. "!"`) is
//! tried first as `return <code>`; anything else runs as-is and its first
//! `return` value becomes the result.
//!
//! # Names
//!
//! | Template name          | Lua global                         |
//! |------------------------|------------------------------------|
//! | data / context field   | same name, read-only copy          |
//! | sandbox variable `x`   | `x`                                |
//! | loop binding `$item`   | `_G["$item"]`                      |
//!
//! Globals that are new or changed after the chunk runs are copied back into
//! the sandbox; a sandbox variable set to `nil` is removed.  Host functions
//! are callable from Lua as long as they complete without suspending.

#[cfg(feature = "lua")]
pub use lua_impl::LuaRunner;

#[cfg(feature = "lua")]
mod lua_impl {
    use std::collections::{BTreeMap, HashSet};

    use futures_util::future::{self, BoxFuture, FutureExt};
    use mlua::prelude::*;
    use mlua::StdLib;

    use crate::script::{CodeRunner, EvalError, HostFunction, RunOutcome, Sandbox, Scope, Value};

    /// Nested tables deeper than this are rejected when converting back.
    const MAX_DEPTH: usize = 64;

    fn identifiers(code: &str) -> impl Iterator<Item = &str> {
        code.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .filter(|w| w.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_'))
    }

    // ── LuaRunner ─────────────────────────────────────────────────────────

    /// Runs command code in a fresh Lua state per command.
    ///
    /// [`LuaRunner::new`] loads only the `table`, `string`, `math` and `utf8`
    /// libraries; [`LuaRunner::trusted`] adds `io`, `os` and the rest of the
    /// safe standard library.
    #[derive(Debug, Clone, Copy)]
    pub struct LuaRunner {
        trusted: bool,
    }

    impl LuaRunner {
        pub fn new() -> Self {
            LuaRunner { trusted: false }
        }

        pub fn trusted() -> Self {
            LuaRunner { trusted: true }
        }

        fn state(&self) -> LuaResult<Lua> {
            if self.trusted {
                Ok(Lua::new())
            } else {
                let libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8;
                Lua::new_with(libs, LuaOptions::default())
            }
        }

        fn run_sync(&self, code: &str, mut sandbox: Sandbox, scope: &dyn Scope) -> RunOutcome {
            let lua = match self.state() {
                Ok(lua) => lua,
                Err(e) => {
                    return RunOutcome {
                        sandbox,
                        result: Err(EvalError::Runtime(e.to_string())),
                    }
                }
            };
            let result = match bind(&lua, code, &sandbox, scope) {
                Ok(bound) => {
                    let result = eval_chunk(&lua, code);
                    if let Err(e) = write_back(&lua, &bound, &mut sandbox) {
                        tracing::warn!(error = %e, "lua: could not copy globals back");
                    }
                    result
                }
                Err(e) => Err(EvalError::Runtime(e.to_string())),
            };
            RunOutcome { sandbox, result }
        }
    }

    impl Default for LuaRunner {
        fn default() -> Self {
            Self::new()
        }
    }

    impl CodeRunner for LuaRunner {
        fn run<'a>(&'a self, code: &'a str, sandbox: Sandbox, scope: &'a dyn Scope) -> BoxFuture<'a, RunOutcome> {
            // The Lua state never crosses an await point.
            future::ready(self.run_sync(code, sandbox, scope)).boxed()
        }

        fn name(&self) -> &str {
            "lua"
        }
    }

    // ── Globals ───────────────────────────────────────────────────────────

    /// Global names owned by the Lua state, and the value of every name we bound.
    struct Bound {
        builtin: HashSet<String>,
        tracked: BTreeMap<String, Value>,
    }

    fn bind(lua: &Lua, code: &str, sandbox: &Sandbox, scope: &dyn Scope) -> LuaResult<Bound> {
        let globals = lua.globals();
        let mut builtin = HashSet::new();
        for pair in globals.clone().pairs::<LuaValue, LuaValue>() {
            if let (LuaValue::String(key), _) = pair? {
                builtin.insert((*key.to_str()?).to_owned());
            }
        }

        let mut tracked = BTreeMap::new();
        for (name, value) in sandbox.iter() {
            let v = to_lua(lua, value)?;
            tracked.insert(name.clone(), from_lua(&v, 0).unwrap_or_default());
            globals.raw_set(name.as_str(), v)?;
        }
        // Context is looked up only for identifiers the code mentions.
        for name in identifiers(code) {
            if builtin.contains(name) || tracked.contains_key(name) {
                continue;
            }
            if let Some(value) = scope.lookup(name) {
                let v = to_lua(lua, value)?;
                tracked.insert(name.to_owned(), from_lua(&v, 0).unwrap_or_default());
                globals.raw_set(name, v)?;
            }
        }
        Ok(Bound { builtin, tracked })
    }

    fn write_back(lua: &Lua, bound: &Bound, sandbox: &mut Sandbox) -> LuaResult<()> {
        let globals = lua.globals();
        for pair in globals.clone().pairs::<LuaValue, LuaValue>() {
            let (key, value) = pair?;
            let LuaValue::String(key) = key else { continue };
            let key = (*key.to_str()?).to_owned();
            if bound.builtin.contains(&key) {
                continue;
            }
            let Ok(after) = from_lua(&value, 0) else { continue };
            let changed = bound.tracked.get(&key).map_or(true, |before| *before != after);
            if changed && !matches!(after, Value::Undefined) {
                sandbox.set(key, after);
            }
        }
        // Assigning nil removes the global, so it never shows up in pairs().
        for (name, before) in &bound.tracked {
            if sandbox.contains(name) && !before.is_nullish() && globals.raw_get::<LuaValue>(name.as_str())?.is_nil() {
                sandbox.remove(name);
            }
        }
        Ok(())
    }

    // ── Evaluation ────────────────────────────────────────────────────────

    fn eval_chunk(lua: &Lua, code: &str) -> Result<Value, EvalError> {
        let value = match lua.load(format!("return {code}")).eval::<LuaValue>() {
            Err(LuaError::SyntaxError { .. }) => lua.load(code).eval::<LuaValue>(),
            other => other,
        };
        match value {
            Ok(v) => from_lua(&v, 0),
            Err(e) => Err(eval_error(e)),
        }
    }

    fn eval_error(e: LuaError) -> EvalError {
        match e {
            LuaError::SyntaxError { message, .. } => EvalError::Syntax(message),
            LuaError::RuntimeError(message) => EvalError::Runtime(message),
            LuaError::CallbackError { cause, .. } => eval_error((*cause).clone()),
            other => EvalError::Runtime(other.to_string()),
        }
    }

    // ── Conversion ────────────────────────────────────────────────────────

    fn to_lua(lua: &Lua, value: &Value) -> LuaResult<LuaValue> {
        Ok(match value {
            Value::Undefined | Value::Null | Value::Lambda(_) => LuaValue::Nil,
            Value::Bool(b) => LuaValue::Boolean(*b),
            Value::Int(n) => LuaValue::Integer(*n),
            Value::Float(x) => LuaValue::Number(*x),
            Value::Str(s) => LuaValue::String(lua.create_string(s)?),
            Value::Bytes(b) => LuaValue::String(lua.create_string(b)?),
            Value::Array(items) => {
                let t = lua.create_table()?;
                for (i, item) in items.iter().enumerate() {
                    t.raw_set(i + 1, to_lua(lua, item)?)?;
                }
                LuaValue::Table(t)
            }
            Value::Object(map) => {
                let t = lua.create_table()?;
                for (k, v) in map {
                    t.raw_set(k.as_str(), to_lua(lua, v)?)?;
                }
                LuaValue::Table(t)
            }
            Value::Function(f) => LuaValue::Function(host_function(lua, f.clone())?),
        })
    }

    fn host_function(lua: &Lua, f: HostFunction) -> LuaResult<LuaFunction> {
        lua.create_function(move |lua, args: LuaMultiValue| {
            let args = args
                .iter()
                .map(|a| from_lua(a, 0))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| LuaError::RuntimeError(e.to_string()))?;
            match f.call(args).now_or_never() {
                Some(Ok(v)) => to_lua(lua, &v),
                Some(Err(e)) => Err(LuaError::RuntimeError(e)),
                None => Err(LuaError::RuntimeError(format!("{} suspends and cannot be called from Lua", f.name()))),
            }
        })
    }

    fn from_lua(value: &LuaValue, depth: usize) -> Result<Value, EvalError> {
        if depth > MAX_DEPTH {
            return Err(EvalError::Type("table nesting too deep".into()));
        }
        Ok(match value {
            LuaValue::Nil => Value::Null,
            LuaValue::Boolean(b) => Value::Bool(*b),
            LuaValue::Integer(n) => Value::Int(*n),
            LuaValue::Number(x) => Value::number(*x),
            LuaValue::String(s) => match s.to_str() {
                Ok(s) => Value::Str((*s).to_owned()),
                Err(_) => Value::Bytes(s.as_bytes().to_vec()),
            },
            LuaValue::Table(t) => table_value(t, depth)?,
            _ => Value::Undefined,
        })
    }

    /// A table with keys exactly `1..=n` is an array; anything else an object.
    fn table_value(t: &LuaTable, depth: usize) -> Result<Value, EvalError> {
        let mut entries = Vec::new();
        for pair in t.clone().pairs::<LuaValue, LuaValue>() {
            let (k, v) = pair.map_err(|e| EvalError::Type(e.to_string()))?;
            entries.push((k, from_lua(&v, depth + 1)?));
        }
        let len = t.raw_len();
        if len > 0 && len == entries.len() {
            let mut items = vec![Value::Undefined; len];
            let mut dense = true;
            for (k, v) in &entries {
                match k {
                    LuaValue::Integer(i) if *i >= 1 && (*i as usize) <= len => items[*i as usize - 1] = v.clone(),
                    _ => dense = false,
                }
            }
            if dense {
                return Ok(Value::Array(items));
            }
        }
        let mut map = BTreeMap::new();
        for (k, v) in entries {
            let key = match k {
                LuaValue::String(s) => s.to_str().map(|s| (*s).to_owned()).unwrap_or_default(),
                LuaValue::Integer(i) => i.to_string(),
                LuaValue::Number(x) => Value::number(x).to_string(),
                LuaValue::Boolean(b) => b.to_string(),
                _ => continue,
            };
            map.insert(key, v);
        }
        Ok(Value::Object(map))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(all(test, feature = "lua"))]
mod tests {
    use super::lua_impl::*;
    use crate::context::Context;
    use crate::script::{CodeRunner, EmptyScope, EvalError, HostFunction, RunOutcome, Sandbox, Scope, Value};
    use futures_util::FutureExt;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn run(runner: &LuaRunner, code: &str, sandbox: Sandbox, scope: &dyn Scope) -> RunOutcome {
        runner.run(code, sandbox, scope).now_or_never().unwrap()
    }

    #[test]
    fn expression_sees_sandbox() {
        let mut sandbox = Sandbox::new();
        sandbox.set("x", Value::Int(6));
        let out = run(&LuaRunner::new(), "x * 7", sandbox, &EmptyScope);
        assert_eq!(out.result, Ok(Value::Int(42)));
    }

    #[test]
    fn chunk_assignments_copied_back() {
        let out = run(&LuaRunner::new(), "y = 2 return y + 1", Sandbox::new(), &EmptyScope);
        assert_eq!(out.result, Ok(Value::Int(3)));
        assert_eq!(out.sandbox.get("y"), Some(&Value::Int(2)));
        assert!(!out.sandbox.contains("string"));
    }

    #[test]
    fn nil_assignment_removes_variable() {
        let mut sandbox = Sandbox::new();
        sandbox.set("gone", Value::from("soon"));
        let out = run(&LuaRunner::new(), "gone = nil return 1", sandbox, &EmptyScope);
        assert_eq!(out.result, Ok(Value::Int(1)));
        assert!(!out.sandbox.contains("gone"));
    }

    #[test]
    fn context_fields_visible() {
        let ctx = Context::new(Value::from(json!({"name": "Ann", "tags": ["a", "b"]})), BTreeMap::new());
        let out = run(&LuaRunner::new(), "string.upper(name) .. #tags", Sandbox::new(), &ctx);
        assert_eq!(out.result, Ok(Value::from("ANN2")));
        assert!(out.sandbox.is_empty());
    }

    #[test]
    fn loop_bindings_through_globals_table() {
        let mut sandbox = Sandbox::new();
        sandbox.set("$idx", Value::Int(1));
        let out = run(&LuaRunner::new(), "_G['$idx'] + 1", sandbox, &EmptyScope);
        assert_eq!(out.result, Ok(Value::Int(2)));
    }

    #[test]
    fn tables_convert_to_arrays_and_objects() {
        let out = run(&LuaRunner::new(), "{1, 2, 3}", Sandbox::new(), &EmptyScope);
        assert_eq!(out.result, Ok(Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])));

        let out = run(&LuaRunner::new(), "{url = 'https://x', label = 'X'}", Sandbox::new(), &EmptyScope);
        let Ok(Value::Object(map)) = out.result else { panic!("expected object") };
        assert_eq!(map.get("label"), Some(&Value::from("X")));
    }

    #[test]
    fn host_functions_callable() {
        let mut extra = BTreeMap::new();
        extra.insert(
            "double".to_owned(),
            Value::from(HostFunction::sync("double", |args| Ok(Value::Int(args[0].as_int() * 2)))),
        );
        let ctx = Context::new(Value::Undefined, extra);
        let out = run(&LuaRunner::new(), "double(21)", Sandbox::new(), &ctx);
        assert_eq!(out.result, Ok(Value::Int(42)));
    }

    #[test]
    fn errors_map_to_eval_errors() {
        let out = run(&LuaRunner::new(), "1 +", Sandbox::new(), &EmptyScope);
        assert!(matches!(out.result, Err(EvalError::Syntax(_))));

        let out = run(&LuaRunner::new(), "error('boom')", Sandbox::new(), &EmptyScope);
        match out.result {
            Err(EvalError::Runtime(msg)) => assert!(msg.contains("boom")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn restricted_state_has_no_os() {
        let out = run(&LuaRunner::new(), "os == nil and io == nil", Sandbox::new(), &EmptyScope);
        assert_eq!(out.result, Ok(Value::Bool(true)));

        let out = run(&LuaRunner::trusted(), "type(os.time())", Sandbox::new(), &EmptyScope);
        assert_eq!(out.result, Ok(Value::from("number")));
    }
}
