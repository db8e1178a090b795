//!
//! # Task System
//!
//! A small keyed background task runner. Every long operation of the gallery engine (repository
//! scans, calibration passes, rename campaigns) is dispatched under a [`TaskKey`] and runs on its
//! own tokio task, so the caller is never blocked.
//!
//! Some guarantees the runner gives:
//! - At most one task may be running for a given key, a second dispatch for the same key is
//!   rejected instead of queued;
//! - Cancellation is cooperative, tasks poll their [`Interrupter`] at safe points and finish with
//!   [`ExecStatus::Canceled`], which is reported apart from failures;
//! - Every key has an observable [`TaskState`] and [`TaskProgress`], and state transitions are
//!   broadcast to subscribers;
//! - A panicking task is reported as [`TaskState::Failed`] instead of taking the runner down.
//!
//!
//! ## Basic example
//!
//! ```
//! use gg_task_system::{ExecStatus, Interrupter, Task, TaskOutput, TaskStatus, TaskSystem};
//! use async_trait::async_trait;
//! use thiserror::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum SampleError {
//!     #[error("Sample error")]
//!     SampleError,
//! }
//!
//! #[derive(Debug)]
//! pub struct ReadyTask;
//!
//! #[async_trait]
//! impl Task<SampleError> for ReadyTask {
//!     async fn run(&mut self, _interrupter: &Interrupter) -> Result<ExecStatus, SampleError> {
//!         Ok(ExecStatus::Done(TaskOutput::Empty))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let system = TaskSystem::<SampleError>::new();
//!
//!     let handle = system.dispatch("ready", ReadyTask).expect("key is idle");
//!
//!     assert!(matches!(handle.await, Ok(TaskStatus::Done(TaskOutput::Empty))));
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod error;
mod system;
mod task;

pub use error::{RunError, SystemError as TaskSystemError};
pub use system::{System as TaskSystem, TaskEvent};
pub use task::{
	AnyTaskOutput, ExecStatus, Interrupter, InterruptionKind, IntoAnyTaskOutput, IntoTask,
	ProgressUpdate, Task, TaskHandle, TaskKey, TaskOutput, TaskProgress, TaskState, TaskStatus,
};
