use std::{
	borrow::Cow,
	fmt,
	future::{Future, IntoFuture},
	pin::Pin,
	sync::{
		atomic::{AtomicBool, AtomicU8, Ordering},
		Arc,
	},
	task::{Context, Poll},
};

use async_trait::async_trait;
use downcast_rs::{impl_downcast, Downcast};
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tracing::trace;

use super::error::{RunError, SystemError};

/// Name under which a task is dispatched. At most one task per key may be running at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey(Cow<'static, str>);

impl TaskKey {
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<&'static str> for TaskKey {
	fn from(key: &'static str) -> Self {
		Self(Cow::Borrowed(key))
	}
}

impl From<String> for TaskKey {
	fn from(key: String) -> Self {
		Self(Cow::Owned(key))
	}
}

impl fmt::Display for TaskKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// A trait that represents any kind of output that a task can return.
///
/// The user will downcast it to the concrete type that the task returns.
pub trait AnyTaskOutput: Send + Downcast + 'static {}

impl fmt::Debug for Box<dyn AnyTaskOutput> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<AnyTaskOutput>")
	}
}

impl_downcast!(AnyTaskOutput);

impl<T: Send + 'static> AnyTaskOutput for T {}

/// A helper trait to convert any type that implements [`AnyTaskOutput`] into a [`TaskOutput`], boxing it.
pub trait IntoAnyTaskOutput {
	fn into_output(self) -> TaskOutput;
}

impl<T: AnyTaskOutput + 'static> IntoAnyTaskOutput for T {
	fn into_output(self) -> TaskOutput {
		TaskOutput::Out(Box::new(self))
	}
}

/// An enum representing whether a task returned anything or not.
#[derive(Debug)]
pub enum TaskOutput {
	Out(Box<dyn AnyTaskOutput>),
	Empty,
}

impl From<()> for TaskOutput {
	fn from((): ()) -> Self {
		Self::Empty
	}
}

/// All possible outcomes of a task, as seen by whoever awaits its [`TaskHandle`].
#[derive(Debug)]
pub enum TaskStatus<E: RunError> {
	/// The task has finished successfully and maybe has some output for the user.
	Done(TaskOutput),
	/// Task was gracefully cancelled by the user.
	Canceled,
	/// Task returned an error, handed back so the user can handle it appropriately.
	Error(E),
}

/// What a [`Task::run`] call ended with.
#[derive(Debug)]
pub enum ExecStatus {
	Done(TaskOutput),
	Canceled,
}

/// Observable lifecycle of a task key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
	Idle = 0,
	Running = 1,
	Completed = 2,
	Canceled = 3,
	Failed = 4,
}

impl TaskState {
	const fn from_u8(value: u8) -> Self {
		match value {
			1 => Self::Running,
			2 => Self::Completed,
			3 => Self::Canceled,
			4 => Self::Failed,
			_ => Self::Idle,
		}
	}

	#[must_use]
	pub const fn is_finished(self) -> bool {
		matches!(self, Self::Completed | Self::Canceled | Self::Failed)
	}
}

impl fmt::Display for TaskState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Idle => "idle",
			Self::Running => "running",
			Self::Completed => "completed",
			Self::Canceled => "canceled",
			Self::Failed => "failed",
		})
	}
}

#[derive(Debug)]
pub enum ProgressUpdate {
	TaskCount(u64),
	CompletedTaskCount(u64),
	Message(String),
	Phase(String),
}

impl ProgressUpdate {
	pub fn message(message: impl Into<String>) -> Self {
		Self::Message(message.into())
	}

	pub fn phase(phase: impl Into<String>) -> Self {
		Self::Phase(phase.into())
	}
}

/// Last progress reported by a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskProgress {
	pub total: u64,
	pub completed: u64,
	pub message: String,
	pub phase: String,
}

impl TaskProgress {
	fn apply(&mut self, update: ProgressUpdate) {
		match update {
			ProgressUpdate::TaskCount(total) => self.total = total,
			ProgressUpdate::CompletedTaskCount(completed) => self.completed = completed,
			ProgressUpdate::Message(message) => self.message = message,
			ProgressUpdate::Phase(phase) => self.phase = phase,
		}
	}
}

/// A helper trait to convert any type that implements [`Task<E>`] into a [`Box<dyn Task<E>>`], boxing it.
pub trait IntoTask<E>: Send {
	fn into_task(self) -> Box<dyn Task<E>>;
}

impl<T: Task<E> + 'static, E: RunError> IntoTask<E> for T {
	fn into_task(self) -> Box<dyn Task<E>> {
		Box::new(self)
	}
}

/// The main trait that represents a task that can be dispatched to the task system.
///
/// All tasks of a system return the same error type, so callers get unified error handling.
#[async_trait]
pub trait Task<E: RunError>: Send + 'static {
	/// Runs the task until completion or until the [`Interrupter`] asks it to stop.
	///
	/// Implementations should check the interrupter at safe points, usually with
	/// [`check_interruption!`](crate::check_interruption), so that a cancellation never leaves
	/// persisted data half written.
	async fn run(&mut self, interrupter: &Interrupter) -> Result<ExecStatus, E>;
}

/// Shared state between the system, the running task and its handles.
#[derive(Debug)]
pub(crate) struct TaskWorktable {
	state: AtomicU8,
	cancel_requested: AtomicBool,
	cancel_notify: Notify,
	progress: Mutex<TaskProgress>,
}

impl TaskWorktable {
	pub(crate) fn new() -> Self {
		Self {
			state: AtomicU8::new(TaskState::Idle as u8),
			cancel_requested: AtomicBool::new(false),
			cancel_notify: Notify::new(),
			progress: Mutex::new(TaskProgress::default()),
		}
	}

	pub(crate) fn state(&self) -> TaskState {
		TaskState::from_u8(self.state.load(Ordering::Acquire))
	}

	pub(crate) fn set_state(&self, state: TaskState) {
		self.state.store(state as u8, Ordering::Release);
	}

	pub(crate) fn request_cancel(&self) {
		self.cancel_requested.store(true, Ordering::Release);
		self.cancel_notify.notify_waiters();
	}

	fn is_cancel_requested(&self) -> bool {
		self.cancel_requested.load(Ordering::Acquire)
	}

	pub(crate) fn progress(&self) -> TaskProgress {
		self.progress.lock().clone()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionKind {
	Cancel,
}

/// Handed to [`Task::run`] so the task can decide the appropriate moment to stop, and to report
/// progress while it works.
#[derive(Debug, Clone)]
pub struct Interrupter {
	worktable: Arc<TaskWorktable>,
}

impl Interrupter {
	pub(crate) const fn new(worktable: Arc<TaskWorktable>) -> Self {
		Self { worktable }
	}

	/// An interrupter that is never triggered, for running a task body inline outside any system.
	#[must_use]
	pub fn detached() -> Self {
		Self::new(Arc::new(TaskWorktable::new()))
	}

	/// A detached interrupter whose cancellation was already requested.
	#[must_use]
	pub fn canceled() -> Self {
		let interrupter = Self::detached();
		interrupter.worktable.request_cancel();
		interrupter
	}

	/// Check if the user requested a cancellation, without blocking.
	#[must_use]
	pub fn try_check_interrupt(&self) -> Option<InterruptionKind> {
		self.worktable
			.is_cancel_requested()
			.then_some(InterruptionKind::Cancel)
	}

	pub fn report(&self, updates: impl IntoIterator<Item = ProgressUpdate>) {
		let mut progress = self.worktable.progress.lock();
		for update in updates {
			progress.apply(update);
		}
	}

	pub fn report_message(&self, message: impl Into<String>) {
		self.report([ProgressUpdate::message(message)]);
	}
}

/// Awaiting a `&Interrupter` completes once a cancellation is requested.
impl<'int> IntoFuture for &'int Interrupter {
	type Output = InterruptionKind;

	type IntoFuture = Pin<Box<dyn Future<Output = InterruptionKind> + Send + 'int>>;

	fn into_future(self) -> Self::IntoFuture {
		let worktable = &*self.worktable;
		Box::pin(async move {
			loop {
				// Registered before the flag check so a concurrent `notify_waiters` isn't missed
				let notified = worktable.cancel_notify.notified();
				if worktable.is_cancel_requested() {
					trace!("Running task received interruption request");
					return InterruptionKind::Cancel;
				}
				notified.await;
			}
		})
	}
}

/// Returns `Ok(ExecStatus::Canceled)` from the enclosing `run` if a cancellation was requested.
#[macro_export]
macro_rules! check_interruption {
	($interrupter:ident) => {
		let interrupter: &$crate::Interrupter = $interrupter;

		if let Some($crate::InterruptionKind::Cancel) = interrupter.try_check_interrupt() {
			::tracing::trace!("Task was canceled by the user");
			return Ok($crate::ExecStatus::Canceled);
		}
	};
}

/// A handle returned when a task is dispatched, it can be used to cancel the task or to wait
/// until it gets completed.
#[derive(Debug)]
pub struct TaskHandle<E: RunError> {
	pub(crate) key: TaskKey,
	pub(crate) worktable: Arc<TaskWorktable>,
	pub(crate) done_rx: oneshot::Receiver<Result<TaskStatus<E>, SystemError>>,
}

impl<E: RunError> Future for TaskHandle<E> {
	type Output = Result<TaskStatus<E>, SystemError>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = &mut *self;
		Pin::new(&mut this.done_rx)
			.poll(cx)
			.map(|res| res.unwrap_or_else(|_| Err(SystemError::TaskJoin(this.key.clone()))))
	}
}

impl<E: RunError> TaskHandle<E> {
	#[must_use]
	pub const fn key(&self) -> &TaskKey {
		&self.key
	}

	#[must_use]
	pub fn state(&self) -> TaskState {
		self.worktable.state()
	}

	#[must_use]
	pub fn progress(&self) -> TaskProgress {
		self.worktable.progress()
	}

	/// Gracefully cancel the task at a safe point defined by the task using the [`Interrupter`]
	pub fn cancel(&self) {
		if self.worktable.state() == TaskState::Running {
			trace!(key = %self.key, "Received cancel command task");
			self.worktable.request_cancel();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn progress_updates_accumulate() {
		let interrupter = Interrupter::detached();
		interrupter.report([
			ProgressUpdate::TaskCount(10),
			ProgressUpdate::phase("scanning"),
		]);
		interrupter.report([ProgressUpdate::CompletedTaskCount(3)]);
		interrupter.report_message("3 of 10");

		assert_eq!(
			interrupter.worktable.progress(),
			TaskProgress {
				total: 10,
				completed: 3,
				message: "3 of 10".to_string(),
				phase: "scanning".to_string(),
			}
		);
	}

	#[test]
	fn detached_interrupter_never_fires() {
		assert_eq!(Interrupter::detached().try_check_interrupt(), None);
	}

	#[test]
	fn canceled_interrupter_fires_immediately() {
		assert_eq!(
			Interrupter::canceled().try_check_interrupt(),
			Some(InterruptionKind::Cancel)
		);
	}

	#[test]
	fn state_survives_atomic_round_trip() {
		let worktable = TaskWorktable::new();
		assert_eq!(worktable.state(), TaskState::Idle);
		worktable.set_state(TaskState::Failed);
		assert_eq!(worktable.state(), TaskState::Failed);
		assert!(worktable.state().is_finished());
	}
}
