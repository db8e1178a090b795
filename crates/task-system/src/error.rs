use std::{error::Error, fmt};

use thiserror::Error;

use super::task::TaskKey;

/// Marker for the unified error type every task of a [`TaskSystem`](crate::TaskSystem) returns.
pub trait RunError: Error + fmt::Debug + Send + Sync + 'static {}

impl<T: Error + fmt::Debug + Send + Sync + 'static> RunError for T {}

#[derive(Debug, Error)]
pub enum SystemError {
	#[error("task already running: <key='{0}'>")]
	AlreadyRunning(TaskKey),
	#[error("task not found: <key='{0}'>")]
	TaskNotFound(TaskKey),
	#[error("task join error <key='{0}'>")]
	TaskJoin(TaskKey),
}
