// Example executor plugin
//
// Runs the task locally and doubles numeric results, for illustration.
// Copy this file as a starting point for a new executor.
#![allow(dead_code)]

use crate::executor::config::{BaseExecutorConfig, PluginOptions, merge_options};
use crate::executor::console::TaskContext;
use crate::executor::error::{ExecutorError, Result};
use crate::executor::plugin::{BaseExecutor, Executor};
use crate::executor::registry::{LoadContext, PluginRegistry};
use crate::executor::runner::invoke;
use crate::executor::types::{ExecutionConstraints, FailureKind, Kwargs, TaskFailure};
use crate::transport::{FunctionRegistry, ResolvedFunction};
use async_trait::async_trait;
use serde_json::{Number, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Name this plugin is registered under
pub const EXECUTOR_PLUGIN_NAME: &str = "CustomExecutor";

/// Defaults applied before config-file and caller options
pub fn plugin_defaults() -> PluginOptions {
    PluginOptions::from([
        ("executor_input1".to_string(), Value::from("")),
        ("executor_input2".to_string(), Value::from(0)),
    ])
}

/// Register the plugin. `ExternalObject` is a helper and is not registered.
pub fn register(registry: &PluginRegistry) {
    registry.register(EXECUTOR_PLUGIN_NAME, load);
}

fn load(options: PluginOptions, context: LoadContext) -> Result<Arc<dyn Executor>> {
    let executor = CustomExecutor::from_options(merge_options([plugin_defaults(), options]))?
        .with_environment(context.environment)
        .with_constraints(context.constraints);
    Ok(Arc::new(executor))
}

/// Transform applied to successful results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostProcess {
    /// Return results unchanged
    Identity,
    /// Multiply numeric results by two
    #[default]
    Double,
}

impl PostProcess {
    pub fn apply(&self, value: Value) -> std::result::Result<Value, TaskFailure> {
        match self {
            PostProcess::Identity => Ok(value),
            PostProcess::Double => double(value),
        }
    }
}

fn double(value: Value) -> std::result::Result<Value, TaskFailure> {
    let overflow = || TaskFailure::new(FailureKind::PostProcess, "doubled result overflows");

    let Value::Number(n) = &value else {
        return Err(TaskFailure::new(
            FailureKind::PostProcess,
            format!("cannot double non-numeric result: {}", value),
        ));
    };

    if let Some(i) = n.as_i64() {
        i.checked_mul(2).map(Value::from).ok_or_else(overflow)
    } else if let Some(u) = n.as_u64() {
        u.checked_mul(2).map(Value::from).ok_or_else(overflow)
    } else {
        n.as_f64()
            .and_then(|f| Number::from_f64(f * 2.0))
            .map(Value::Number)
            .ok_or_else(overflow)
    }
}

/// Helper used by the executor; not a plugin itself
#[derive(Debug, Clone, Copy)]
pub struct ExternalObject {
    pub multiplier: i64,
}

impl ExternalObject {
    pub fn new(multiplier: i64) -> Self {
        Self { multiplier }
    }
}

impl fmt::Display for ExternalObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "external multiplier: {}", self.multiplier)
    }
}

/// Example executor plugin
#[derive(Debug)]
pub struct CustomExecutor {
    executor_input1: String,
    executor_input2: i64,
    /// Options not forwarded to the base configuration
    extra: PluginOptions,
    post_process: PostProcess,
    base: BaseExecutor,
}

impl CustomExecutor {
    /// Create the executor; allow-listed options go to the base configuration
    pub fn new(
        executor_input1: impl Into<String>,
        executor_input2: i64,
        options: PluginOptions,
    ) -> Result<Self> {
        let (config, extra) = BaseExecutorConfig::split_options(options)?;
        let executor_input1 = executor_input1.into();

        debug!(
            executor_input1 = %executor_input1,
            executor_input2 = executor_input2,
            extra = ?extra.keys().collect::<Vec<_>>(),
            "initializing custom executor"
        );

        Ok(Self {
            executor_input1,
            executor_input2,
            extra,
            post_process: PostProcess::default(),
            base: BaseExecutor::new(config),
        })
    }

    /// Create the executor from a flat option map, as loaded from config
    pub fn from_options(mut options: PluginOptions) -> Result<Self> {
        let executor_input1 = match options.remove("executor_input1") {
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(ExecutorError::InvalidOption(
                    "executor_input1".to_string(),
                    format!("expected a string, got {}", other),
                ));
            }
            None => {
                return Err(ExecutorError::InvalidOption(
                    "executor_input1".to_string(),
                    "missing required option".to_string(),
                ));
            }
        };

        let executor_input2 = match options.remove("executor_input2") {
            None | Some(Value::Null) => 0,
            Some(v) => v.as_i64().ok_or_else(|| {
                ExecutorError::InvalidOption(
                    "executor_input2".to_string(),
                    format!("expected an integer, got {}", v),
                )
            })?,
        };

        Self::new(executor_input1, executor_input2, options)
    }

    pub fn with_environment(mut self, environment: Arc<FunctionRegistry>) -> Self {
        self.base = self.base.with_environment(environment);
        self
    }

    pub fn with_constraints(mut self, constraints: ExecutionConstraints) -> Self {
        self.base = self.base.with_constraints(constraints);
        self
    }

    pub fn with_post_process(mut self, post_process: PostProcess) -> Self {
        self.post_process = post_process;
        self
    }

    pub fn executor_input1(&self) -> &str {
        &self.executor_input1
    }

    pub fn executor_input2(&self) -> i64 {
        self.executor_input2
    }

    pub fn extra(&self) -> &PluginOptions {
        &self.extra
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

#[async_trait]
impl Executor for CustomExecutor {
    fn name(&self) -> &str {
        EXECUTOR_PLUGIN_NAME
    }

    fn base(&self) -> &BaseExecutor {
        &self.base
    }

    async fn run(
        &self,
        function: ResolvedFunction,
        args: Vec<Value>,
        kwargs: Kwargs,
        context: TaskContext,
    ) -> std::result::Result<Value, TaskFailure> {
        // Executor-specific work goes here: ship the task to another
        // machine, rewrite its inputs, and so on. This one runs locally.
        let external_object = ExternalObject::new(context.metadata().node_id);

        // Printed output is captured and returned to the host with the result
        context.println(external_object.to_string());
        debug!(
            function = %function.name(),
            multiplier = external_object.multiplier,
            executor_input1 = %self.executor_input1,
            "running task locally"
        );

        invoke(function, args, kwargs, context, self.base.constraints().timeout()).await
    }

    fn post_process(&self, result: Value) -> std::result::Result<Value, TaskFailure> {
        self.post_process.apply(result)
    }
}
