//! Logging abstractions

mod traits;
mod noop;
mod tracing_logger;

pub use traits::Logger;
pub use noop::{NoOpLogger, RecordingLogger};
pub use tracing_logger::{init_tracing, TracingLogger};
