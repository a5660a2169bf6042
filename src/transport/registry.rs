// Functions available in the execution environment
#![allow(dead_code)]

use crate::executor::{Kwargs, TaskContext, TaskError};
use crate::transport::error::{Result, TransportError};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Signature of a task function: context, positional args, keyword args
pub type TaskFn = Arc<
    dyn Fn(&TaskContext, &[Value], &Kwargs) -> std::result::Result<Value, TaskError> + Send + Sync,
>;

/// A callable resolved against the environment
#[derive(Clone)]
pub struct ResolvedFunction {
    name: String,
    func: TaskFn,
}

impl ResolvedFunction {
    pub fn new(name: impl Into<String>, func: TaskFn) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function synchronously
    pub fn call(
        &self,
        context: &TaskContext,
        args: &[Value],
        kwargs: &Kwargs,
    ) -> std::result::Result<Value, TaskError> {
        (self.func)(context, args, kwargs)
    }
}

impl fmt::Debug for ResolvedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registry of functions that transportable callables may refer to
#[derive(Default)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, TaskFn>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under a name, replacing any previous one
    pub fn register<F>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(&TaskContext, &[Value], &Kwargs) -> std::result::Result<Value, TaskError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        debug!(function = %name, "registering function");
        self.functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(func));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn resolve(&self, name: &str) -> Result<ResolvedFunction> {
        let functions = self.functions.read().unwrap_or_else(PoisonError::into_inner);
        functions
            .get(name)
            .cloned()
            .map(|func| ResolvedFunction::new(name, func))
            .ok_or_else(|| TransportError::MissingDependency(name.to_string()))
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let functions = self.functions.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}
