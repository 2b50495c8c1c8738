//! Job execution infrastructure.
//!
//! The admission gate bounding concurrency, the panic-isolating execution
//! wrapper, and the external command job.

mod command;
mod gate;
mod guard;

pub use command::{CommandJob, CommandJobBuilder, CommandOutput};
pub use gate::{AdmissionGate, GateError, GatePermit};
pub use guard::{JobFailure, execute_guarded};
pub(crate) use guard::panic_message;
