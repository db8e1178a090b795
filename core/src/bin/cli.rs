use gg_core::{
	calibration::{BackfillReport, MissingFilesReport, RemoveReport, UntrackedReport, VerifyReport},
	config::{self, AppConfig, EngineOptions},
	jobs::GalleryJob,
	sequence::{ApplyReport, SequenceReport},
	Gallery,
};
use gg_task_system::{TaskOutput, TaskStatus};

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "gugu", version, about = "Gallery storagebox maintenance")]
struct Args {
	/// Directory holding this tool's own config and logs
	#[arg(long, env = "GUGU_DATA_DIR")]
	data_dir: Option<PathBuf>,

	/// Primary repository root, remembered for later runs
	#[arg(long, short)]
	root: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// List the detected repositories in resolution order
	Repos,
	/// Find the physical file behind a logical path
	Resolve {
		logical_path: String,
		#[arg(long)]
		repository: Option<String>,
	},
	/// Report entries whose file is gone
	Missing {
		/// Also drop the reported entries from the metadata document
		#[arg(long)]
		remove: bool,
	},
	/// Point every entry at the repository actually holding its file
	Backfill,
	/// Report numbering issues in image folders
	Sequence {
		/// Rename files to fix the reported issues
		#[arg(long)]
		apply: bool,
	},
	/// Re-hash files and compare with recorded digests
	Verify,
	/// List images not yet in the metadata document
	Untracked,
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();

	let data_dir = match args.data_dir {
		Some(data_dir) => data_dir,
		None => config::default_data_dir()?,
	};

	let mut app_config = AppConfig::load_or_create(&data_dir)?;
	let _guard = init_tracing(&data_dir, &app_config.log_level)?;

	if let Some(root) = args.root {
		if app_config.primary_root.as_ref() != Some(&root) {
			app_config.primary_root = Some(root);
			app_config.save(&data_dir)?;
		}
	}

	let Some(primary_root) = app_config.primary_root.clone() else {
		bail!("no primary root configured, pass one with --root");
	};

	let gallery = Gallery::open(&primary_root, EngineOptions::from(&app_config))
		.await
		.with_context(|| format!("failed to open gallery at {}", primary_root.display()))?;

	match args.command {
		Command::Repos => print_json(&*gallery.repositories()),
		Command::Resolve {
			logical_path,
			repository,
		} => print_json(&gallery.resolve(&logical_path, repository.as_deref()).await?),
		Command::Missing { remove } => {
			let Some(report) =
				run_job::<MissingFilesReport>(&gallery, GalleryJob::ScanMissingFiles).await?
			else {
				return Ok(());
			};
			print_json(&report)?;

			if remove && !report.missing.is_empty() {
				let logical_paths = report
					.missing
					.into_iter()
					.map(|entry| entry.logical_path)
					.collect();
				if let Some(removed) = run_job::<RemoveReport>(
					&gallery,
					GalleryJob::RemoveEntries { logical_paths },
				)
				.await?
				{
					print_json(&removed)?;
				}
			}

			Ok(())
		}
		Command::Backfill => {
			run_and_print::<BackfillReport>(
				&gallery,
				GalleryJob::BackfillOwningRepository,
			)
			.await
		}
		Command::Sequence { apply } => {
			let Some(report) =
				run_job::<SequenceReport>(&gallery, GalleryJob::ScanSequenceIssues).await?
			else {
				return Ok(());
			};
			print_json(&report)?;

			if apply && !report.plan.is_empty() {
				run_and_print::<ApplyReport>(
					&gallery,
					GalleryJob::ApplyFixPlan { plan: report.plan },
				)
				.await?;
			}

			Ok(())
		}
		Command::Verify => {
			run_and_print::<VerifyReport>(
				&gallery,
				GalleryJob::VerifyChecksums,
			)
			.await
		}
		Command::Untracked => {
			run_and_print::<UntrackedReport>(
				&gallery,
				GalleryJob::ScanUntrackedImages,
			)
			.await
		}
	}
}

fn init_tracing(data_dir: &Path, log_level: &str) -> Result<WorkerGuard> {
	let logs_dir = data_dir.join("logs");
	std::fs::create_dir_all(&logs_dir)
		.with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

	let (file_writer, guard) = tracing_appender::non_blocking(rolling::daily(logs_dir, "gugu.log"));

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		EnvFilter::new(format!(
			"gg_core={log_level},gg_task_system={log_level},gugu={log_level}"
		))
	});

	tracing_subscriber::registry()
		.with(env_filter)
		// Reports go to stdout, keep it clean
		.with(fmt::layer().with_writer(std::io::stderr))
		.with(fmt::layer().with_ansi(false).with_writer(file_writer))
		.try_init()?;

	Ok(guard)
}

fn print_json(value: &impl Serialize) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

async fn run_and_print<T: Serialize + Send + 'static>(
	gallery: &Gallery,
	job: GalleryJob,
) -> Result<()> {
	if let Some(report) = run_job::<T>(gallery, job).await? {
		print_json(&report)?;
	}
	Ok(())
}

/// Runs `job` in the background, turning Ctrl-C into a cancellation request. `None` when the
/// job was canceled.
async fn run_job<T: Send + 'static>(gallery: &Gallery, job: GalleryJob) -> Result<Option<T>> {
	let key = job.key();
	let mut handle = gallery.start_task(job)?;

	let finished = tokio::select! {
		status = &mut handle => Some(status),
		res = signal::ctrl_c() => {
			res?;
			None
		}
	};

	let status = match finished {
		Some(status) => status?,
		None => {
			warn!(%key, "Interrupted, waiting for the task to stop");
			gallery.cancel_task(&key)?;
			handle.await?
		}
	};

	match status {
		TaskStatus::Done(TaskOutput::Out(output)) => output
			.downcast::<T>()
			.map(|report| Some(*report))
			.map_err(|_| anyhow::anyhow!("unexpected output type from task {key}")),
		TaskStatus::Done(TaskOutput::Empty) => {
			bail!("task {key} finished without output")
		}
		TaskStatus::Canceled => {
			info!(%key, "Task canceled");
			Ok(None)
		}
		TaskStatus::Error(e) => Err(e.into()),
	}
}
