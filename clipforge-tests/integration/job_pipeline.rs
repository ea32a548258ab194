//! Pipeline properties: artifact lifecycle across success and every
//! failure stage.

use std::sync::Arc;

use clipforge_core::job::{JobError, JobOrchestrator, JobRequest, JobStage};
use clipforge_core::mux::{SimulationMuxer, TrimRange};
use clipforge_core::resolver::{AuthContext, BEST_AUDIO_SELECTOR, SimulationResolver};
use clipforge_core::store::ArtifactStore;
use tempfile::TempDir;
use tokio_test::assert_ok;

struct Pipeline {
    orchestrator: JobOrchestrator,
    muxer: Arc<SimulationMuxer>,
    dir: TempDir,
}

fn pipeline(resolver: SimulationResolver, muxer: SimulationMuxer) -> Pipeline {
    let dir = TempDir::new().unwrap();
    let muxer = Arc::new(muxer);
    let orchestrator = JobOrchestrator::new(
        Arc::new(resolver),
        muxer.clone(),
        ArtifactStore::new(dir.path()),
        AuthContext::default(),
    );
    Pipeline {
        orchestrator,
        muxer,
        dir,
    }
}

fn request(output_name: &str, trim: Option<TrimRange>) -> JobRequest {
    JobRequest {
        source_url: "https://example.com/watch?v=abc".to_string(),
        format_id: "18".to_string(),
        output_name: output_name.to_string(),
        trim,
    }
}

#[tokio::test]
async fn successful_job_produces_output_and_removes_temps() {
    let pipeline = pipeline(SimulationResolver::new(), SimulationMuxer::new());

    let path = assert_ok!(pipeline.orchestrator.run_job(&request("clip", None)).await);

    assert!(path.exists());
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
    assert!(!pipeline.dir.path().join("clip_video.mp4").exists());
    assert!(!pipeline.dir.path().join("clip_audio.m4a").exists());
}

#[tokio::test]
async fn audio_failure_leaves_no_files_at_all() {
    let pipeline = pipeline(
        SimulationResolver::new().failing_selector(BEST_AUDIO_SELECTOR),
        SimulationMuxer::new(),
    );

    let err = pipeline
        .orchestrator
        .run_job(&request("clip", None))
        .await
        .unwrap_err();

    assert!(matches!(err, JobError::AudioDownload { .. }));
    assert_eq!(err.stage(), Some(JobStage::DownloadingAudio));

    let entries: Vec<_> = std::fs::read_dir(pipeline.dir.path())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(
        entries.is_empty(),
        "store should be empty, found: {entries:?}"
    );
}

#[tokio::test]
async fn one_sided_trim_muxes_untrimmed() {
    let pipeline = pipeline(SimulationResolver::new(), SimulationMuxer::new());

    let trim = TrimRange::from_bounds(Some("00:00:05"), None);
    assert!(trim.is_none());
    assert_ok!(pipeline.orchestrator.run_job(&request("clip", trim)).await);

    assert_eq!(pipeline.muxer.recorded_trims(), vec![None]);
}

#[tokio::test]
async fn both_sided_trim_reaches_muxer() {
    let pipeline = pipeline(SimulationResolver::new(), SimulationMuxer::new());

    let trim = TrimRange::from_bounds(Some("00:00:05"), Some("00:00:15"));
    assert_ok!(pipeline
        .orchestrator
        .run_job(&request("clip", trim.clone()))
        .await);

    assert_eq!(pipeline.muxer.recorded_trims(), vec![trim]);
}

#[tokio::test]
async fn concurrent_jobs_with_distinct_names_do_not_interfere() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());

    let make = |name: &str| {
        let orchestrator = JobOrchestrator::new(
            Arc::new(SimulationResolver::new()),
            Arc::new(SimulationMuxer::new()),
            store.clone(),
            AuthContext::default(),
        );
        let request = request(name, None);
        async move { orchestrator.run_job(&request).await }
    };

    let (a, b, c) = tokio::join!(make("job_a"), make("job_b"), make("job_c"));
    let a = assert_ok!(a);
    let b = assert_ok!(b);
    let c = assert_ok!(c);

    assert!(a.exists() && b.exists() && c.exists());
    // only the three final outputs remain
    let count = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn listing_is_idempotent_up_to_ordering() {
    let pipeline = pipeline(SimulationResolver::new(), SimulationMuxer::new());

    let url = "https://example.com/watch?v=abc";
    let first = assert_ok!(pipeline.orchestrator.list_formats(url).await);
    let second = assert_ok!(pipeline.orchestrator.list_formats(url).await);

    assert_eq!(first, second);
}
