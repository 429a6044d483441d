//! Command workflows layered over the pipeline.
//!
//! Each command owns its own store for the lifetime of the process; nothing
//! is persisted between invocations.
mod align;
mod console;
mod context;
mod session;
mod translate;

pub use align::run_align;
pub use session::run_session;
pub use translate::run_translate;
