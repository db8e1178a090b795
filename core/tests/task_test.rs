//! Integration tests for long operations run through the background task runner.

mod helpers;

use helpers::*;

use gg_core::{
	calibration::MissingFilesReport,
	jobs::GalleryJob,
	sequence::{ApplyReport, SequenceReport},
	Interrupter,
};
use gg_task_system::{TaskOutput, TaskState, TaskStatus};

use pretty_assertions::assert_eq;
use tokio::fs;

fn output<T: Send + 'static>(status: TaskStatus<gg_core::Error>) -> T {
	match status {
		TaskStatus::Done(TaskOutput::Out(output)) => *output.downcast::<T>().unwrap(),
		other => panic!("unexpected task status: {other:?}"),
	}
}

#[tokio::test]
async fn alice_gap_is_fixed_in_the_background() {
	let harness = GalleryHarness::new().await;
	for (name, contents) in [
		("AliceGu1.webp", "one"),
		("AliceGu3.webp", "three"),
		("AliceGu4.webp", "four"),
	] {
		harness
			.write_image(
				PRIMARY,
				&format!("gs-character/Alice/{name}"),
				contents.as_bytes(),
			)
			.await;
	}
	let gallery = harness.open().await;

	let scan = gallery.start_task(GalleryJob::ScanSequenceIssues).unwrap();
	let key = scan.key().clone();
	let report = output::<SequenceReport>(scan.await.unwrap());

	assert_eq!(gallery.task_status(&key), TaskState::Completed);
	assert_eq!(report.folders.len(), 1);
	assert_eq!(report.plan.len(), 2);

	let apply = gallery
		.start_task(GalleryJob::ApplyFixPlan { plan: report.plan })
		.unwrap();
	let applied = output::<ApplyReport>(apply.await.unwrap());

	assert_eq!(applied.renamed, 2);
	assert!(applied.errors.is_empty());

	let folder = harness.root(PRIMARY).join("gs-character/Alice");
	assert_eq!(
		file_names(&folder).await,
		vec!["AliceGu1.webp", "AliceGu2.webp", "AliceGu3.webp"]
	);
	assert_eq!(
		fs::read_to_string(folder.join("AliceGu2.webp")).await.unwrap(),
		"three"
	);
	assert_eq!(
		fs::read_to_string(folder.join("AliceGu3.webp")).await.unwrap(),
		"four"
	);

	// Nothing left to fix
	let rescan = gallery
		.scan_sequence_issues(&Interrupter::detached())
		.await
		.unwrap();
	assert!(rescan.folders.is_empty());
}

#[tokio::test]
async fn renumbering_keeps_all_data() {
	let harness = GalleryHarness::new().await;
	// Named 2 and 10 on disk, so collation puts them in the opposite order of a plain sort
	harness
		.write_image(SECOND, "sr-character/Dan/DanGu10.png", b"ten")
		.await;
	harness
		.write_image(SECOND, "sr-character/Dan/DanGu2.png", b"two")
		.await;
	let gallery = harness.open().await;

	let report = gallery
		.scan_sequence_issues(&Interrupter::detached())
		.await
		.unwrap();
	assert_eq!(report.plan.len(), 2);

	let applied = gallery
		.apply_fix_plan(&report.plan, &Interrupter::detached())
		.await
		.unwrap();
	assert_eq!(applied.renamed, 2);

	let folder = harness.root(SECOND).join("sr-character/Dan");
	assert_eq!(
		file_names(&folder).await,
		vec!["DanGu1.png", "DanGu2.png"]
	);
	assert_eq!(fs::read(folder.join("DanGu1.png")).await.unwrap(), b"two");
	assert_eq!(fs::read(folder.join("DanGu2.png")).await.unwrap(), b"ten");
}

#[tokio::test]
async fn task_progress_and_events_are_observable() {
	let harness = GalleryHarness::new().await;
	harness
		.write_document(&[
			entry("1000000001", "gs-character/Alice/AliceGu1.webp", None),
			entry("1000000002", "gs-character/Bob/BobGu1.webp", None),
		])
		.await;
	let gallery = harness.open().await;
	let mut events = gallery.subscribe_tasks();

	let handle = gallery.start_task(GalleryJob::ScanMissingFiles).unwrap();
	let key = handle.key().clone();
	let report = output::<MissingFilesReport>(handle.await.unwrap());
	assert_eq!(report.missing.len(), 2);

	let progress = gallery.task_progress(&key).unwrap();
	assert_eq!(progress.total, 2);
	assert_eq!(progress.phase, "checking files");

	let first = events.recv().await.unwrap();
	assert_eq!((first.key.clone(), first.state), (key.clone(), TaskState::Running));
	let second = events.recv().await.unwrap();
	assert_eq!((second.key, second.state), (key, TaskState::Completed));
}

#[tokio::test]
async fn unknown_task_key_cannot_be_canceled() {
	let harness = GalleryHarness::new().await;
	let gallery = harness.open().await;

	let key = GalleryJob::VerifyChecksums.key();
	assert_eq!(gallery.task_status(&key), TaskState::Idle);
	assert!(gallery.cancel_task(&key).is_err());
	assert!(gallery.task_progress(&key).is_none());
}
