// Executor plugin trait and shared base state
#![allow(dead_code)]

use crate::executor::config::BaseExecutorConfig;
use crate::executor::console::{CancelFlag, TaskContext};
use crate::executor::error::Result;
use crate::executor::runner::{execute_with, invoke};
use crate::executor::types::{
    ExecutionConstraints, ExecutionOutput, Kwargs, STATUS_KEY, Status, StatusInfo, StatusSender,
    TaskFailure, TaskMetadata,
};
use crate::transport::{
    FunctionRegistry, ResolvedFunction, TransportableCallable, TransportableObject,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Keyword arguments as handed over by the host
pub type TransportableKwargs = HashMap<String, TransportableObject>;

/// Everything the host hands over for one task instance
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub function: TransportableCallable,
    pub args: Vec<TransportableObject>,
    pub kwargs: TransportableKwargs,
    pub metadata: TaskMetadata,
    pub status_channel: Option<StatusSender>,
    pub results_dir: Option<PathBuf>,
}

impl ExecutionRequest {
    pub fn new(function: TransportableCallable, metadata: TaskMetadata) -> Self {
        Self {
            function,
            args: Vec::new(),
            kwargs: TransportableKwargs::new(),
            metadata,
            status_channel: None,
            results_dir: None,
        }
    }

    pub fn args(mut self, args: Vec<TransportableObject>) -> Self {
        self.args = args;
        self
    }

    pub fn kwargs(mut self, kwargs: TransportableKwargs) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn status_channel(mut self, channel: StatusSender) -> Self {
        self.status_channel = Some(channel);
        self
    }

    pub fn results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = Some(dir.into());
        self
    }
}

/// Running tasks and cancellations that arrived before their task started
#[derive(Debug, Default)]
struct TaskTable {
    running: HashMap<TaskMetadata, CancelFlag>,
    cancelled: HashSet<TaskMetadata>,
}

/// State every plugin carries: base configuration, constraints, the
/// functions available where it runs, and the tasks it is running
#[derive(Debug)]
pub struct BaseExecutor {
    config: BaseExecutorConfig,
    constraints: ExecutionConstraints,
    environment: Arc<FunctionRegistry>,
    tasks: Mutex<TaskTable>,
}

impl BaseExecutor {
    pub fn new(config: BaseExecutorConfig) -> Self {
        Self {
            config,
            constraints: ExecutionConstraints::default(),
            environment: Arc::new(FunctionRegistry::new()),
            tasks: Mutex::new(TaskTable::default()),
        }
    }

    pub fn with_constraints(mut self, constraints: ExecutionConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_environment(mut self, environment: Arc<FunctionRegistry>) -> Self {
        self.environment = environment;
        self
    }

    pub fn config(&self) -> &BaseExecutorConfig {
        &self.config
    }

    pub fn constraints(&self) -> &ExecutionConstraints {
        &self.constraints
    }

    pub fn environment(&self) -> &FunctionRegistry {
        &self.environment
    }

    /// Register a running task; it is removed again when the guard drops
    ///
    /// Returns `None` when the task was cancelled before it started. The
    /// pending cancellation is consumed.
    pub fn track(&self, metadata: &TaskMetadata) -> Option<InflightGuard<'_>> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.cancelled.remove(metadata) {
            return None;
        }

        let flag = CancelFlag::new();
        tasks.running.insert(metadata.clone(), flag.clone());
        Some(InflightGuard {
            base: self,
            metadata: metadata.clone(),
            flag,
        })
    }

    /// Cancel a task. A running task has its flag raised; otherwise the
    /// cancellation is held until the task is executed.
    ///
    /// Returns true if a running task was signalled.
    pub fn cancel_task(&self, metadata: &TaskMetadata) -> bool {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        match tasks.running.get(metadata) {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => {
                tasks.cancelled.insert(metadata.clone());
                false
            }
        }
    }

    pub fn inflight_count(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running
            .len()
    }

    pub fn pending_cancel_count(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancelled
            .len()
    }
}

/// Keeps a task registered as in flight for its lifetime
pub struct InflightGuard<'a> {
    base: &'a BaseExecutor,
    metadata: TaskMetadata,
    flag: CancelFlag,
}

impl InflightGuard<'_> {
    pub fn flag(&self) -> &CancelFlag {
        &self.flag
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let mut tasks = self.base.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        // A newer run of the same task may have replaced our entry
        if tasks
            .running
            .get(&self.metadata)
            .is_some_and(|flag| flag.same_as(&self.flag))
        {
            tasks.running.remove(&self.metadata);
        }
    }
}

/// An executor plugin
///
/// Implementors provide `name` and `base`; `run` and `post_process` are
/// the hooks meant to be overridden. `execute` implements the full
/// contract on top of them.
///
/// Cancellation is cooperative: `cancel` raises a flag the task function
/// can poll via [`TaskContext::is_cancelled`]. A task that was cancelled
/// while running is reported as `CANCELLED` and its result is discarded.
/// A cancel that arrives before the task starts is held until `execute`,
/// which then skips the function.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Name the plugin is registered under
    fn name(&self) -> &str;

    fn base(&self) -> &BaseExecutor;

    /// Run the deserialized function. The default runs it locally.
    async fn run(
        &self,
        function: ResolvedFunction,
        args: Vec<Value>,
        kwargs: Kwargs,
        context: TaskContext,
    ) -> std::result::Result<Value, TaskFailure> {
        invoke(function, args, kwargs, context, self.base().constraints().timeout()).await
    }

    /// Transform a successful, non-null result
    fn post_process(&self, result: Value) -> std::result::Result<Value, TaskFailure> {
        Ok(result)
    }

    /// Execute one task instance
    ///
    /// Returns `Err` only when the function cannot be deserialized.
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutput> {
        execute_with(self, request).await
    }

    /// Status recorded in `info`, or `NOT_STARTED`
    fn get_status(&self, info: &StatusInfo) -> Status {
        info.get(STATUS_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(Status::NotStarted)
    }

    /// Request cancellation of the task identified by `info`
    ///
    /// A running task is signalled; a task that has not started yet is
    /// reported `CANCELLED` when the host executes it. Always returns a
    /// cancelled output.
    fn cancel(&self, info: &StatusInfo) -> ExecutionOutput {
        match TaskMetadata::from_info(info) {
            Some(metadata) => {
                let running = self.base().cancel_task(&metadata);
                info!(
                    executor = self.name(),
                    dispatch_id = %metadata.dispatch_id,
                    node_id = metadata.node_id,
                    running = running,
                    "cancellation requested"
                );
            }
            None => debug!(executor = self.name(), "cancel called without task metadata"),
        }
        ExecutionOutput::cancelled()
    }
}
