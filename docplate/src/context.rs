//! Read-only evaluation context and data sources.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use crate::error::ReportError;
use crate::script::{EvalError, Scope, Value};

// ── Data sources ──────────────────────────────────────────────────────────────

/// Fetches report data from the template's QUERY.
///
/// Receives the QUERY code (if the template has one) and the caller's
/// `query_vars`.  Closures of the right shape implement this directly.
pub trait QueryResolver: Send + Sync {
    fn resolve(&self, query: Option<String>, vars: Value) -> BoxFuture<'static, Result<Value, String>>;
}

impl<F, Fut> QueryResolver for F
where
    F: Fn(Option<String>, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    fn resolve(&self, query: Option<String>, vars: Value) -> BoxFuture<'static, Result<Value, String>> {
        self(query, vars).boxed()
    }
}

/// Where the data object comes from.
#[derive(Clone, Default)]
pub enum DataSource {
    /// No data; only additional context and the sandbox are visible.
    #[default]
    Empty,
    Static(Value),
    Resolver(Arc<dyn QueryResolver>),
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Empty => f.write_str("Empty"),
            DataSource::Static(v) => f.debug_tuple("Static").field(v).finish(),
            DataSource::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

impl From<Value> for DataSource {
    fn from(v: Value) -> Self {
        DataSource::Static(v)
    }
}

impl From<serde_json::Value> for DataSource {
    fn from(v: serde_json::Value) -> Self {
        DataSource::Static(Value::from(v))
    }
}

impl DataSource {
    pub fn resolver<R: QueryResolver + 'static>(r: R) -> Self {
        DataSource::Resolver(Arc::new(r))
    }

    pub fn is_resolver(&self) -> bool {
        matches!(self, DataSource::Resolver(_))
    }

    /// Produce the data object.  A resolver failure is fatal.
    pub async fn load(&self, query: Option<&str>, vars: &Value) -> Result<Value, ReportError> {
        match self {
            DataSource::Empty => Ok(Value::Object(BTreeMap::new())),
            DataSource::Static(v) => Ok(v.clone()),
            DataSource::Resolver(r) => r
                .resolve(query.map(str::to_owned), vars.clone())
                .await
                .map_err(|msg| ReportError::CommandExecution {
                    command: format!("QUERY {}", query.unwrap_or_default()).trim_end().to_owned(),
                    source: EvalError::Runtime(msg),
                }),
        }
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Data object plus additional context, as seen by command code.
#[derive(Debug, Clone, Default)]
pub struct Context {
    data: Value,
    extra: BTreeMap<String, Value>,
}

impl Context {
    pub fn new(data: Value, extra: BTreeMap<String, Value>) -> Self {
        Context { data, extra }
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn extra(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }
}

impl Scope for Context {
    fn lookup(&self, name: &str) -> Option<&Value> {
        let from_data = match &self.data {
            Value::Object(map) => map.get(name),
            _ => None,
        };
        from_data.or_else(|| self.extra.get(name))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
