//! Capture pipeline
//!
//! Port Reader -> Line Assembler -> Timestamp Annotator -> Sink Writer,
//! driven by the Session Controller.

pub mod assembler;
pub mod session;
pub mod sink;
pub mod timestamp;

pub use session::{CancelToken, FinishReason, SessionController, SessionOutcome};
pub use sink::SinkWriter;
pub use timestamp::SystemClock;
