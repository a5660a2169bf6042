// Console capture and task context handed to task functions
#![allow(dead_code)]

use crate::executor::types::TaskMetadata;
use std::cell::RefCell;
use std::fmt::Write as _;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Once, PoisonError, TryLockError};

const FLAG_LIVE: u8 = 0;
const FLAG_CANCELLED: u8 = 1;
const FLAG_TIMED_OUT: u8 = 2;

/// Marker appended to a stream cut at `max_output_bytes`
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

thread_local! {
    /// Capture that panics on this thread are written to
    static ACTIVE_CONSOLE: RefCell<Option<ConsoleCapture>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a panic hook that sends panic messages to the active capture
///
/// Threads without an active capture keep the previous hook's behaviour.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if !route_panic(&format!("{}\n", info)) {
                previous(info);
            }
        }));
    });
}

/// Write a panic message to this thread's active capture, if any
pub(crate) fn route_panic(message: &str) -> bool {
    ACTIVE_CONSOLE
        .try_with(|active| match active.try_borrow() {
            Ok(active) => active
                .as_ref()
                .is_some_and(|console| console.try_write_stderr(message)),
            Err(_) => false,
        })
        .unwrap_or(false)
}

#[derive(Debug, Default)]
struct Buffers {
    stdout: String,
    stderr: String,
}

/// In-memory stdout/stderr buffers for one invocation
///
/// Clones share the same buffers, so the executor can still read what was
/// written after the task function panicked.
#[derive(Debug, Clone, Default)]
pub struct ConsoleCapture {
    buffers: Arc<Mutex<Buffers>>,
}

impl ConsoleCapture {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_buffers<R>(&self, f: impl FnOnce(&mut Buffers) -> R) -> R {
        let mut guard = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn write_stdout(&self, text: &str) {
        self.with_buffers(|b| b.stdout.push_str(text));
    }

    pub fn write_stderr(&self, text: &str) {
        self.with_buffers(|b| b.stderr.push_str(text));
    }

    /// Non-blocking write used from the panic hook
    fn try_write_stderr(&self, text: &str) -> bool {
        let mut guard = match self.buffers.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        guard.stderr.push_str(text);
        true
    }

    /// Make this the capture for panics on the current thread until the
    /// returned scope drops
    pub fn enter(&self) -> ConsoleScope {
        install_panic_hook();
        let previous = ACTIVE_CONSOLE.with(|active| active.replace(Some(self.clone())));
        ConsoleScope {
            previous,
            _not_send: PhantomData,
        }
    }

    /// Take everything captured so far, leaving the buffers empty
    pub fn drain(&self, max_bytes: usize) -> (String, String) {
        self.with_buffers(|b| {
            let stdout = truncate_output(std::mem::take(&mut b.stdout), max_bytes);
            let stderr = truncate_output(std::mem::take(&mut b.stderr), max_bytes);
            (stdout, stderr)
        })
    }
}

/// Restores the previously active capture on drop
pub struct ConsoleScope {
    previous: Option<ConsoleCapture>,
    // Bound to the thread whose thread-local it set
    _not_send: PhantomData<*const ()>,
}

impl Drop for ConsoleScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let _ = ACTIVE_CONSOLE.try_with(|active| *active.borrow_mut() = previous);
    }
}

/// Cut `text` to at most `max_bytes`, on a char boundary
fn truncate_output(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(TRUNCATION_MARKER);
    text
}

/// Cooperative cancellation flag shared between executor and task
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    state: Arc<AtomicU8>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns false if the flag was already raised.
    pub fn cancel(&self) -> bool {
        self.raise(FLAG_CANCELLED)
    }

    pub(crate) fn time_out(&self) -> bool {
        self.raise(FLAG_TIMED_OUT)
    }

    fn raise(&self, state: u8) -> bool {
        self.state
            .compare_exchange(FLAG_LIVE, state, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// True once cancellation or a timeout has been signalled
    pub fn is_raised(&self) -> bool {
        self.state.load(Ordering::Acquire) != FLAG_LIVE
    }

    /// True only when the host explicitly cancelled
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == FLAG_CANCELLED
    }

    pub fn same_as(&self, other: &CancelFlag) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Context passed to a task function for the duration of one invocation
#[derive(Debug, Clone)]
pub struct TaskContext {
    metadata: TaskMetadata,
    console: ConsoleCapture,
    cancel: CancelFlag,
}

impl TaskContext {
    pub fn new(metadata: TaskMetadata, console: ConsoleCapture, cancel: CancelFlag) -> Self {
        Self {
            metadata,
            console,
            cancel,
        }
    }

    pub fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    /// Write to captured stdout
    pub fn print(&self, text: impl AsRef<str>) {
        self.console.write_stdout(text.as_ref());
    }

    pub fn println(&self, text: impl AsRef<str>) {
        let mut line = String::with_capacity(text.as_ref().len() + 1);
        let _ = writeln!(line, "{}", text.as_ref());
        self.console.write_stdout(&line);
    }

    /// Write to captured stderr
    pub fn eprint(&self, text: impl AsRef<str>) {
        self.console.write_stderr(text.as_ref());
    }

    pub fn eprintln(&self, text: impl AsRef<str>) {
        let mut line = String::with_capacity(text.as_ref().len() + 1);
        let _ = writeln!(line, "{}", text.as_ref());
        self.console.write_stderr(&line);
    }

    /// Task functions should return early once this is true
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_raised()
    }

    pub(crate) fn console(&self) -> &ConsoleCapture {
        &self.console
    }

    pub(crate) fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> (TaskContext, ConsoleCapture, CancelFlag) {
        let console = ConsoleCapture::new();
        let cancel = CancelFlag::new();
        let ctx = TaskContext::new(TaskMetadata::new("d", 0), console.clone(), cancel.clone());
        (ctx, console, cancel)
    }

    #[test]
    fn test_capture_and_drain() {
        let (ctx, console, _) = context();
        ctx.print("a");
        ctx.println("b");
        ctx.eprintln("warn");

        let (stdout, stderr) = console.drain(1024);
        assert_eq!(stdout, "ab\n");
        assert_eq!(stderr, "warn\n");

        // Drained buffers start empty
        assert_eq!(console.drain(1024), (String::new(), String::new()));
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        let (ctx, console, _) = context();
        ctx.print("ab你好");

        // "你" spans bytes 2..5, so a 3-byte cut falls back to 2
        let (stdout, _) = console.drain(3);
        assert_eq!(stdout, format!("ab{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_panic_routed_to_active_capture() {
        let (_, console, _) = context();

        // No active capture: the previous hook handles it
        assert!(!route_panic("outside\n"));

        {
            let _scope = console.enter();
            assert!(route_panic("inside\n"));

            let nested = ConsoleCapture::new();
            {
                let _inner = nested.enter();
                assert!(route_panic("nested\n"));
            }
            assert_eq!(nested.drain(1024).1, "nested\n");

            // Outer capture is active again
            assert!(route_panic("outer again\n"));
        }
        assert!(!route_panic("after\n"));

        let (stdout, stderr) = console.drain(1024);
        assert!(stdout.is_empty());
        assert_eq!(stderr, "inside\nouter again\n");
    }

    #[test]
    fn test_panic_message_captured_not_printed() {
        let (_, console, _) = context();

        let result: std::thread::Result<()> = {
            let _scope = console.enter();
            std::panic::catch_unwind(|| panic!("captured panic"))
        };
        assert!(result.is_err());

        let (_, stderr) = console.drain(1024);
        assert!(stderr.contains("captured panic"), "stderr was {:?}", stderr);
    }

    #[test]
    fn test_cancel_flag_first_signal_wins() {
        let (ctx, _, cancel) = context();
        assert!(!ctx.is_cancelled());

        assert!(cancel.time_out());
        assert!(!cancel.cancel());
        assert!(ctx.is_cancelled());
        assert!(!cancel.is_cancelled());

        let flag = CancelFlag::new();
        assert!(flag.cancel());
        assert!(flag.is_cancelled());
    }
}
