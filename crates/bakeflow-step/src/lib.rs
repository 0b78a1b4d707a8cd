//! bakeflow step engine
//!
//! This crate provides the orchestration core used by the image builder:
//! a typed state bag shared between steps, the [`Step`] contract with a
//! forward action and a compensating cleanup, the sequential [`Runner`],
//! a cancellable task wrapper and a fixed-interval poller for long-running
//! remote operations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                     Runner                        │
//! │   run: step 1 → step 2 → ... → step k (halt)      │
//! │   cleanup: step k → ... → step 2 → step 1         │
//! └───────┬───────────────────────────────┬──────────┘
//!         │ &mut StateBag                 │ CancellationToken
//! ┌───────▼────────┐             ┌────────▼─────────┐
//! │    StateBag     │             │ run_interruptible │
//! │ StateKey<T> → T │             │   └─ Poller       │
//! └────────────────┘             └──────────────────┘
//! ```

pub mod error;
pub mod poll;
pub mod report;
pub mod runner;
pub mod state;
pub mod step;
pub mod task;

// Re-exports
pub use error::{MultiError, Result, RunnerError};
pub use poll::{DEFAULT_POLL_INTERVAL, PollStatus, Poller};
pub use report::{CleanupEntry, CleanupReport, RunReport, RunState};
pub use runner::Runner;
pub use state::{CANCELLED, ERROR, HALTED, StateBag, StateKey};
pub use step::{Step, StepAction, StepState, halt};
pub use task::{TaskOutcome, run_interruptible};
pub use tokio_util::sync::CancellationToken;
