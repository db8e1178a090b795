use gg_task_system::{
	check_interruption, ExecStatus, Interrupter, InterruptionKind, IntoAnyTaskOutput,
	ProgressUpdate, Task, TaskOutput,
};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::{sync::oneshot, time::sleep};
use tracing::info;

#[derive(Debug, Error)]
pub enum SampleError {
	#[error("Sample error")]
	SampleError,
}

/// Only ever finishes through cancellation.
#[derive(Debug, Default)]
pub struct NeverTask;

#[async_trait]
impl Task<SampleError> for NeverTask {
	async fn run(&mut self, interrupter: &Interrupter) -> Result<ExecStatus, SampleError> {
		match interrupter.await {
			InterruptionKind::Cancel => {
				info!("Canceling NeverTask");
				Ok(ExecStatus::Canceled)
			}
		}
	}
}

#[derive(Debug, Default)]
pub struct ReadyTask;

#[async_trait]
impl Task<SampleError> for ReadyTask {
	async fn run(&mut self, _interrupter: &Interrupter) -> Result<ExecStatus, SampleError> {
		Ok(ExecStatus::Done(TaskOutput::Empty))
	}
}

#[derive(Debug, Default)]
pub struct BogusTask;

#[async_trait]
impl Task<SampleError> for BogusTask {
	async fn run(&mut self, _interrupter: &Interrupter) -> Result<ExecStatus, SampleError> {
		Err(SampleError::SampleError)
	}
}

#[derive(Debug, Default)]
pub struct BrokenTask;

#[async_trait]
impl Task<SampleError> for BrokenTask {
	async fn run(&mut self, _interrupter: &Interrupter) -> Result<ExecStatus, SampleError> {
		panic!("Broken task");
	}
}

/// Counts up to `steps`, reporting progress and checking for cancellation between steps.
#[derive(Debug)]
pub struct CountingTask {
	pub steps: u64,
	pub step_duration: Duration,
}

#[derive(Debug, PartialEq, Eq)]
pub struct CountingOutput(pub u64);

#[async_trait]
impl Task<SampleError> for CountingTask {
	async fn run(&mut self, interrupter: &Interrupter) -> Result<ExecStatus, SampleError> {
		interrupter.report([
			ProgressUpdate::TaskCount(self.steps),
			ProgressUpdate::phase("counting"),
		]);

		for step in 1..=self.steps {
			check_interruption!(interrupter);
			sleep(self.step_duration).await;
			interrupter.report([ProgressUpdate::CompletedTaskCount(step)]);
		}

		Ok(ExecStatus::Done(CountingOutput(self.steps).into_output()))
	}
}

/// Finishes once the paired sender fires, letting a test hold a key in the running state.
#[derive(Debug)]
pub struct WaitSignalTask {
	signal_rx: Option<oneshot::Receiver<()>>,
}

impl WaitSignalTask {
	pub fn new() -> (Self, oneshot::Sender<()>) {
		let (tx, rx) = oneshot::channel();
		(Self { signal_rx: Some(rx) }, tx)
	}
}

#[async_trait]
impl Task<SampleError> for WaitSignalTask {
	async fn run(&mut self, _interrupter: &Interrupter) -> Result<ExecStatus, SampleError> {
		if let Some(signal_rx) = self.signal_rx.take() {
			signal_rx.await.ok();
		}

		Ok(ExecStatus::Done(TaskOutput::Empty))
	}
}
