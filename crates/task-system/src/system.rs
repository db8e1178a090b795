use std::{collections::HashMap, fmt, marker::PhantomData, sync::Arc};

use parking_lot::Mutex;
use tokio::{
	spawn,
	sync::{broadcast, oneshot},
};
use tracing::{error, instrument, trace, Instrument};

use super::{
	error::{RunError, SystemError},
	task::{
		ExecStatus, Interrupter, IntoTask, Task, TaskHandle, TaskKey, TaskProgress, TaskState,
		TaskStatus, TaskWorktable,
	},
};

const EVENTS_CAPACITY: usize = 64;

/// A state transition of some task key, broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
	pub key: TaskKey,
	pub state: TaskState,
}

struct Inner {
	tasks: Mutex<HashMap<TaskKey, Arc<TaskWorktable>>>,
	events_tx: broadcast::Sender<TaskEvent>,
}

impl Inner {
	fn emit(&self, key: &TaskKey, state: TaskState) {
		// No subscribers is fine
		let _ = self.events_tx.send(TaskEvent {
			key: key.clone(),
			state,
		});
	}
}

/// Runs each dispatched task on its own tokio task, keeping per key bookkeeping of state and
/// progress. Cloning is cheap and every clone sees the same tasks.
pub struct System<E: RunError> {
	inner: Arc<Inner>,
	_error: PhantomData<fn() -> E>,
}

impl<E: RunError> Clone for System<E> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
			_error: PhantomData,
		}
	}
}

impl<E: RunError> fmt::Debug for System<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("System")
			.field("tasks", &self.inner.tasks.lock().len())
			.finish_non_exhaustive()
	}
}

impl<E: RunError> Default for System<E> {
	fn default() -> Self {
		Self::new()
	}
}

impl<E: RunError> System<E> {
	#[must_use]
	pub fn new() -> Self {
		let (events_tx, _) = broadcast::channel(EVENTS_CAPACITY);

		Self {
			inner: Arc::new(Inner {
				tasks: Mutex::new(HashMap::new()),
				events_tx,
			}),
			_error: PhantomData,
		}
	}

	/// Dispatches a task under `key`, failing if a task with the same key is still running.
	///
	/// Must be called from within a tokio runtime.
	#[instrument(skip(self, into_task), fields(key = %key), err)]
	pub fn dispatch(
		&self,
		key: impl Into<TaskKey> + fmt::Display,
		into_task: impl IntoTask<E>,
	) -> Result<TaskHandle<E>, SystemError> {
		let key = key.into();

		let worktable = {
			let mut tasks = self.inner.tasks.lock();

			if tasks
				.get(&key)
				.is_some_and(|worktable| worktable.state() == TaskState::Running)
			{
				return Err(SystemError::AlreadyRunning(key));
			}

			let worktable = Arc::new(TaskWorktable::new());
			worktable.set_state(TaskState::Running);
			tasks.insert(key.clone(), Arc::clone(&worktable));

			worktable
		};

		self.inner.emit(&key, TaskState::Running);
		trace!("Dispatched task");

		let (done_tx, done_rx) = oneshot::channel();

		spawn(
			run_single_task(
				key.clone(),
				into_task.into_task(),
				Arc::clone(&worktable),
				Arc::clone(&self.inner),
				done_tx,
			)
			.in_current_span(),
		);

		Ok(TaskHandle {
			key,
			worktable,
			done_rx,
		})
	}

	/// Requests cooperative cancellation of the task running under `key`.
	///
	/// Keys that are known but not running are left untouched.
	pub fn cancel(&self, key: &TaskKey) -> Result<(), SystemError> {
		let tasks = self.inner.tasks.lock();
		let worktable = tasks
			.get(key)
			.ok_or_else(|| SystemError::TaskNotFound(key.clone()))?;

		if worktable.state() == TaskState::Running {
			trace!(%key, "Requesting task cancellation");
			worktable.request_cancel();
		}

		Ok(())
	}

	/// Current state of `key`, [`TaskState::Idle`] for keys never dispatched.
	#[must_use]
	pub fn status(&self, key: &TaskKey) -> TaskState {
		self.inner
			.tasks
			.lock()
			.get(key)
			.map_or(TaskState::Idle, |worktable| worktable.state())
	}

	#[must_use]
	pub fn progress(&self, key: &TaskKey) -> Option<TaskProgress> {
		self.inner
			.tasks
			.lock()
			.get(key)
			.map(|worktable| worktable.progress())
	}

	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
		self.inner.events_tx.subscribe()
	}

	/// Requests cancellation of every running task.
	pub fn cancel_all(&self) {
		for worktable in self.inner.tasks.lock().values() {
			if worktable.state() == TaskState::Running {
				worktable.request_cancel();
			}
		}
	}
}

async fn run_single_task<E: RunError>(
	key: TaskKey,
	mut task: Box<dyn Task<E>>,
	worktable: Arc<TaskWorktable>,
	inner: Arc<Inner>,
	done_tx: oneshot::Sender<Result<TaskStatus<E>, SystemError>>,
) {
	let interrupter = Interrupter::new(Arc::clone(&worktable));

	// Running on an inner task so a panic comes back as a JoinError instead of unwinding here
	let handle = spawn(async move { task.run(&interrupter).await }.in_current_span());

	let (state, res) = match handle.await {
		Ok(Ok(ExecStatus::Done(out))) => (TaskState::Completed, Ok(TaskStatus::Done(out))),
		Ok(Ok(ExecStatus::Canceled)) => (TaskState::Canceled, Ok(TaskStatus::Canceled)),
		Ok(Err(e)) => {
			error!(%key, ?e, "Task failed");
			(TaskState::Failed, Ok(TaskStatus::Error(e)))
		}
		Err(e) => {
			error!(%key, ?e, "Task panicked or was aborted");
			(TaskState::Failed, Err(SystemError::TaskJoin(key.clone())))
		}
	};

	worktable.set_state(state);
	inner.emit(&key, state);

	if done_tx.send(res).is_err() {
		trace!(%key, "Task handle dropped before completion");
	}
}
