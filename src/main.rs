mod executor;
mod transport;

use clap::Parser;
use executor::{
    ExecutionConstraints, ExecutionRequest, LoadContext, PluginRegistry, Status, TaskMetadata,
    load_plugin_options,
};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Level, info};
use tracing_subscriber::fmt;
use transport::{FunctionRegistry, TransportableCallable, TransportableObject};

/// CLI arguments
#[derive(Debug, Parser)]
#[command(name = "executor-demo")]
#[command(about = "Run one task through an executor plugin")]
struct Args {
    /// Executor config file
    #[arg(short, long, default_value = "executors.toml")]
    config: PathBuf,

    /// Plugin to load
    #[arg(short, long, default_value = executor::EXECUTOR_PLUGIN_NAME)]
    plugin: String,

    /// Input passed to the task
    #[arg(short, long, default_value = "5")]
    input: i64,

    /// Node id of the task within the dispatch
    #[arg(long, default_value = "0")]
    node_id: i64,

    /// Results directory handed to the executor
    #[arg(long)]
    results_dir: Option<PathBuf>,
}

/// Functions available to tasks in this process
fn demo_environment() -> FunctionRegistry {
    let environment = FunctionRegistry::new();
    environment.register("simple_task", |ctx, args, _kwargs| {
        let x = args.first().cloned().unwrap_or(Value::Null);
        ctx.println(format!("simple_task called with {}", x));
        Ok(x)
    });
    environment
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_max_level(Level::DEBUG)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!(plugin = %args.plugin, config = %args.config.display(), "Starting executor demo...");

    let context = LoadContext {
        environment: Arc::new(demo_environment()),
        constraints: ExecutionConstraints::from_env(),
    };
    let options = load_plugin_options(&args.config, &args.plugin)?;

    let registry = PluginRegistry::with_builtin();
    let executor = registry.load(&args.plugin, options, context)?;

    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    let metadata = TaskMetadata::new(uuid::Uuid::new_v4().to_string(), args.node_id);

    let mut request = ExecutionRequest::new(TransportableCallable::new("simple_task")?, metadata)
        .args(vec![TransportableObject::new(&args.input)?])
        .status_channel(status_tx);
    if let Some(dir) = args.results_dir {
        request = request.results_dir(dir);
    }

    let output = executor.execute(request).await?;

    // The sender went away with the request, so this drains and stops
    let mut last = Status::NotStarted;
    while let Some(update) = status_rx.recv().await {
        info!(status = %update.status, at = %update.timestamp, "status update");
        last = update.status;
    }
    let status = executor.get_status(&last.to_info());

    let (result, stdout, stderr, error) = output.into_parts();
    let failed = error.is_some();
    let summary = json!({
        "status": status,
        "result": result,
        "stdout": stdout,
        "stderr": stderr,
        "error": error,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if failed {
        process::exit(1);
    }
    Ok(())
}
