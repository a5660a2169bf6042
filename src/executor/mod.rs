// Executor module - executor plugin contract and the example plugin
#![allow(unused_imports)]

pub mod config;
pub mod console;
pub mod custom;
pub mod error;
pub mod plugin;
pub mod registry;
pub mod runner;
pub mod types;

pub use config::{BaseExecutorConfig, PluginOptions, load_plugin_options, merge_options};
pub use console::{CancelFlag, ConsoleCapture, TaskContext};
pub use custom::{
    CustomExecutor, EXECUTOR_PLUGIN_NAME, ExternalObject, PostProcess, plugin_defaults,
};
pub use error::{ExecutorError, Result};
pub use plugin::{BaseExecutor, ExecutionRequest, Executor, TransportableKwargs};
pub use registry::{LoadContext, PluginRegistry};
pub use types::{
    ExecutionConstraints, ExecutionOutput, FailureKind, Kwargs, OutputParts, STATUS_KEY, Status,
    StatusInfo, StatusSender, StatusUpdate, TaskError, TaskFailure, TaskMetadata,
};
