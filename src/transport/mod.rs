// Transport module - serialized task payloads handed over by the host
// Stand-in for the host's wire format so the executor contract can be exercised

pub mod codec;
pub mod error;
pub mod registry;
pub mod types;

pub use error::{Result, TransportError};
pub use registry::{FunctionRegistry, ResolvedFunction, TaskFn};
pub use types::{CallableRef, TransportableCallable, TransportableObject};
