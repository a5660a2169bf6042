// Task invocation shared by every executor plugin

use crate::executor::console::{ConsoleCapture, TaskContext};
use crate::executor::error::Result;
use crate::executor::plugin::{ExecutionRequest, Executor, TransportableKwargs};
use crate::executor::types::{
    ExecutionOutput, FailureKind, Kwargs, Status, StatusSender, StatusUpdate, TaskFailure,
    TaskMetadata,
};
use crate::transport::{ResolvedFunction, TransportableObject};
use serde_json::Value;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Run a task function on the blocking pool, capturing errors and panics
///
/// Panic messages go to the context's captured stderr. On timeout the
/// context's cancel flag is raised so a cooperative task can stop; the
/// blocking thread itself is not interrupted.
pub async fn invoke(
    function: ResolvedFunction,
    args: Vec<Value>,
    kwargs: Kwargs,
    context: TaskContext,
    timeout: Option<Duration>,
) -> std::result::Result<Value, TaskFailure> {
    let name = function.name().to_string();

    let handle = tokio::task::spawn_blocking({
        let context = context.clone();
        move || {
            let _scope = context.console().enter();
            function.call(&context, &args, &kwargs)
        }
    });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                context.cancel_flag().time_out();
                warn!(function = %name, timeout_secs = limit.as_secs(), "task timed out");
                return Err(TaskFailure::new(
                    FailureKind::Timeout,
                    format!("task '{}' timed out after {} seconds", name, limit.as_secs()),
                ));
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.into()),
        Err(err) if err.is_panic() => Err(TaskFailure::new(
            FailureKind::Panic,
            panic_message(err.into_panic().as_ref()),
        )),
        Err(err) => Err(TaskFailure::new(FailureKind::Execution, err.to_string())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("task panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("task panicked: {}", s)
    } else {
        "task panicked".to_string()
    }
}

/// Apply the executor's result transform without letting it escape
///
/// A null result counts as no result.
fn post_process<E: Executor + ?Sized>(
    executor: &E,
    value: Value,
    console: &ConsoleCapture,
) -> std::result::Result<Value, TaskFailure> {
    if value.is_null() {
        return Err(TaskFailure::new(
            FailureKind::NoResult,
            "task returned no result",
        ));
    }

    let _scope = console.enter();
    match catch_unwind(AssertUnwindSafe(|| executor.post_process(value))) {
        Ok(result) => result,
        Err(payload) => Err(TaskFailure::new(
            FailureKind::PostProcess,
            panic_message(payload.as_ref()),
        )),
    }
}

/// Decode the host's argument payloads
fn decode_arguments(
    args: &[TransportableObject],
    kwargs: &TransportableKwargs,
) -> crate::transport::Result<(Vec<Value>, Kwargs)> {
    let args = args
        .iter()
        .map(TransportableObject::get_deserialized::<Value>)
        .collect::<crate::transport::Result<Vec<Value>>>()?;
    let kwargs = kwargs
        .iter()
        .map(|(key, value)| Ok((key.clone(), value.get_deserialized::<Value>()?)))
        .collect::<crate::transport::Result<Kwargs>>()?;
    Ok((args, kwargs))
}

/// Push a status update to the host, if it supplied a channel
pub fn report_status(channel: Option<&StatusSender>, metadata: &TaskMetadata, status: Status) {
    let Some(channel) = channel else {
        return;
    };

    let update = StatusUpdate {
        metadata: metadata.clone(),
        status,
        timestamp: chrono::Utc::now(),
    };

    if channel.send(update).is_err() {
        warn!(
            dispatch_id = %metadata.dispatch_id,
            node_id = metadata.node_id,
            status = %status,
            "status channel closed, update dropped"
        );
    } else {
        debug!(
            dispatch_id = %metadata.dispatch_id,
            node_id = metadata.node_id,
            status = %status,
            "status reported"
        );
    }
}

async fn append_stream_log(path: &Path, text: &str) {
    if text.is_empty() {
        return;
    }

    let result = async {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "failed to write stream log");
    }
}

/// The execute contract: deserialize, report, invoke, transform, report
///
/// Only deserialization failures are returned as errors; everything that
/// goes wrong after that is carried in the output. A task cancelled before
/// it started is never invoked.
pub async fn execute_with<E: Executor + ?Sized>(
    executor: &E,
    request: ExecutionRequest,
) -> Result<ExecutionOutput> {
    let ExecutionRequest {
        function,
        args,
        kwargs,
        metadata,
        status_channel,
        results_dir,
    } = request;

    let base = executor.base();

    let (resolved, args, kwargs) = function
        .get_deserialized(base.environment())
        .and_then(|resolved| {
            let (args, kwargs) = decode_arguments(&args, &kwargs)?;
            Ok((resolved, args, kwargs))
        })
        .inspect_err(|e| {
            warn!(
                dispatch_id = %metadata.dispatch_id,
                node_id = metadata.node_id,
                error = %e,
                "failed to deserialize task"
            );
        })?;
    let function_name = resolved.name().to_string();

    debug!(
        executor = executor.name(),
        function = %function_name,
        dispatch_id = %metadata.dispatch_id,
        node_id = metadata.node_id,
        "deserialized task function"
    );

    let Some(inflight) = base.track(&metadata) else {
        info!(
            executor = executor.name(),
            function = %function_name,
            dispatch_id = %metadata.dispatch_id,
            node_id = metadata.node_id,
            "task cancelled before it started"
        );
        report_status(status_channel.as_ref(), &metadata, Status::Cancelled);
        return Ok(ExecutionOutput::cancelled());
    };
    report_status(status_channel.as_ref(), &metadata, Status::Running);

    let console = ConsoleCapture::new();
    let context = TaskContext::new(metadata.clone(), console.clone(), inflight.flag().clone());

    let start = Instant::now();
    let outcome = executor.run(resolved, args, kwargs, context).await;

    let outcome = if inflight.flag().is_cancelled() {
        Err(TaskFailure::cancelled())
    } else {
        outcome.and_then(|value| post_process(executor, value, &console))
    };
    drop(inflight);

    let (stdout, stderr) = console.drain(base.constraints().max_output_bytes);

    if let Some(path) = &base.config().log_stdout {
        append_stream_log(path, &stdout).await;
    }
    if let Some(path) = &base.config().log_stderr {
        append_stream_log(path, &stderr).await;
    }

    let output = match outcome {
        Ok(value) => ExecutionOutput::success(value, stdout, stderr),
        Err(failure) => ExecutionOutput::failure(failure, stdout, stderr),
    };

    let status = output.status();
    report_status(status_channel.as_ref(), &metadata, status);

    let duration_ms = start.elapsed().as_millis() as u64;
    match output.error() {
        None => info!(
            executor = executor.name(),
            function = %function_name,
            dispatch_id = %metadata.dispatch_id,
            node_id = metadata.node_id,
            duration_ms = duration_ms,
            "task completed"
        ),
        Some(failure) => warn!(
            executor = executor.name(),
            function = %function_name,
            dispatch_id = %metadata.dispatch_id,
            node_id = metadata.node_id,
            duration_ms = duration_ms,
            status = %status,
            error = %failure,
            "task did not complete"
        ),
    }

    debug!(
        "Function '{}' was executed on node {} with results dir {:?}",
        function_name,
        metadata.node_id,
        results_dir.as_deref().map(|p| p.display().to_string())
    );

    Ok(output)
}
