//! End-to-end pipeline tests with a scripted encoder.
//!
//! The encoder seam lets these tests drive the whole confirm -> compress ->
//! terminal-state flow without ffmpeg: the scripted encoder just reports
//! whatever output sizes (or failures) a scenario needs.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use msz_engine::{
    CompressionEngine, Confirmed, EngineConfig, EventBroadcaster, JobRegistry, Mailer,
};
use msz_media::{EncodeOutcome, EncodeRequest, Encoder, MediaError, MediaResult, ProgressFn};
use msz_models::{JobId, JobStatus, Provider, Upsells};

const MB: u64 = 1024 * 1024;

/// Encoder that works through a script of per-attempt outcomes.
struct ScriptedEncoder {
    script: Mutex<VecDeque<MediaResult<u64>>>,
    calls: AtomicU32,
    requested_kbps: Mutex<Vec<u32>>,
    write_output: bool,
}

impl ScriptedEncoder {
    fn sizes(sizes: &[u64]) -> Self {
        Self {
            script: Mutex::new(sizes.iter().map(|s| Ok(*s)).collect()),
            calls: AtomicU32::new(0),
            requested_kbps: Mutex::new(Vec::new()),
            write_output: false,
        }
    }

    fn failing(err: MediaError) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Err(err)])),
            calls: AtomicU32::new(0),
            requested_kbps: Mutex::new(Vec::new()),
            write_output: false,
        }
    }

    fn writing_output(mut self) -> Self {
        self.write_output = true;
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn kbps_history(&self) -> Vec<u32> {
        self.requested_kbps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Encoder for ScriptedEncoder {
    async fn encode(&self, req: &EncodeRequest, on_progress: ProgressFn) -> MediaResult<EncodeOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested_kbps.lock().unwrap().push(req.video_kbps);

        on_progress(0.25);
        on_progress(0.6);
        on_progress(1.0);

        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(10 * MB));
        let output_bytes = next?;
        if self.write_output {
            std::fs::write(&req.output, vec![0u8; 16]).unwrap();
        }
        Ok(EncodeOutcome { output_bytes })
    }
}

struct Harness {
    registry: Arc<JobRegistry>,
    broadcaster: Arc<EventBroadcaster>,
    engine: Arc<CompressionEngine>,
    encoder: Arc<ScriptedEncoder>,
}

fn harness(encoder: ScriptedEncoder, config: EngineConfig) -> Harness {
    let registry = Arc::new(JobRegistry::new());
    let broadcaster = Arc::new(EventBroadcaster::new());
    let encoder = Arc::new(encoder);
    let engine = Arc::new(CompressionEngine::new(
        Arc::clone(&registry),
        Arc::clone(&broadcaster),
        Arc::clone(&encoder) as Arc<dyn Encoder>,
        Mailer::disabled(),
        config,
    ));
    Harness {
        registry,
        broadcaster,
        engine,
        encoder,
    }
}

fn create_paid_job(h: &Harness, dir: &Path) -> JobId {
    let source = dir.join("upload.mp4");
    std::fs::write(&source, b"source bytes").unwrap();
    let output = dir.join("compressed.mp4");

    let ticket = h
        .registry
        .create(&source, &output, 400 * MB, 480, Provider::Gmail)
        .unwrap();
    let confirmed = h
        .registry
        .confirm_paid(&ticket.job_id, Upsells::default(), None)
        .unwrap();
    assert!(matches!(confirmed, Confirmed::Started(_)));
    ticket.job_id
}

#[tokio::test]
async fn first_fit_encode_reaches_done_with_token() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(ScriptedEncoder::sizes(&[23 * MB]), EngineConfig::default());
    let job_id = create_paid_job(&h, dir.path());

    let mut sub = h.broadcaster.subscribe(&job_id);
    h.engine.run(job_id.clone()).await;

    let job = h.registry.get(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.progress_pct, 100);
    assert!(job.download_token.is_some());
    assert!(job.completed_at.is_some());
    assert!(job.cleanup_scheduled);
    assert_eq!(h.encoder.calls(), 1);

    // The event stream is ordered and ends with the terminal frame
    let mut statuses = Vec::new();
    let mut last_progress = 0u8;
    while let Ok(event) = sub.receiver.recv().await {
        assert!(event.progress >= last_progress, "progress went backward");
        last_progress = event.progress;
        statuses.push(event.status);
    }
    assert_eq!(statuses.first(), Some(&JobStatus::Processing));
    assert_eq!(statuses.last(), Some(&JobStatus::Done));
    assert!(statuses.contains(&JobStatus::Compressing));
    assert!(statuses.contains(&JobStatus::Finalizing));
}

#[tokio::test]
async fn overshoot_retries_at_reduced_bitrate_then_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    // 27MB against a 25MB gmail target, then 23MB on the retry
    let h = harness(
        ScriptedEncoder::sizes(&[27 * MB, 23 * MB]),
        EngineConfig::default(),
    );
    let job_id = create_paid_job(&h, dir.path());

    h.engine.run(job_id.clone()).await;

    assert_eq!(h.encoder.calls(), 2);
    let kbps = h.encoder.kbps_history();
    assert_eq!(kbps.len(), 2);
    assert_eq!(kbps[1], msz_media::backoff_kbps(kbps[0]));

    let job = h.registry.get(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Done);
}

#[tokio::test]
async fn overshoot_budget_exhaustion_is_terminal_error() {
    let dir = tempfile::tempdir().unwrap();
    // Never fits: initial attempt plus two retries, then give up
    let h = harness(
        ScriptedEncoder::sizes(&[30 * MB, 29 * MB, 28 * MB, 27 * MB]),
        EngineConfig::default(),
    );
    let job_id = create_paid_job(&h, dir.path());

    h.engine.run(job_id.clone()).await;

    assert_eq!(h.encoder.calls(), 3);
    let job = h.registry.get(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.message, "Processing failed");
    assert!(job.error.as_deref().unwrap_or("").contains("over the"));
    assert!(job.download_token.is_none());
    assert!(job.cleanup_scheduled);
}

#[tokio::test]
async fn encoder_timeout_fails_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        ScriptedEncoder::failing(MediaError::Timeout(1200)),
        EngineConfig::default(),
    );
    let job_id = create_paid_job(&h, dir.path());

    h.engine.run(job_id.clone()).await;

    assert_eq!(h.encoder.calls(), 1);
    let job = h.registry.get(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn empty_output_fails_despite_clean_exit() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        ScriptedEncoder::failing(MediaError::EmptyOutput("out.mp4".into())),
        EngineConfig::default(),
    );
    let job_id = create_paid_job(&h, dir.path());

    h.engine.run(job_id.clone()).await;

    let job = h.registry.get(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.message, "Processing failed");
}

#[tokio::test]
async fn concurrent_confirmations_run_one_compression_task() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(ScriptedEncoder::sizes(&[23 * MB]), EngineConfig::default());

    let source = dir.path().join("upload.mp4");
    std::fs::write(&source, b"source").unwrap();
    let ticket = h
        .registry
        .create(&source, dir.path().join("out.mp4"), 100 * MB, 120, Provider::Gmail)
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = Arc::clone(&h.engine);
        let registry = Arc::clone(&h.registry);
        let job_id = ticket.job_id.clone();
        handles.push(tokio::spawn(async move {
            match registry.confirm_paid(&job_id, Upsells::default(), None) {
                Ok(Confirmed::Started(_)) => {
                    engine.run(job_id).await;
                    true
                }
                Ok(Confirmed::AlreadyPaid(_)) => false,
                Err(err) => panic!("confirm failed: {err}"),
            }
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(h.encoder.calls(), 1);
    assert_eq!(h.registry.get(&ticket.job_id).unwrap().status, JobStatus::Done);
}

#[tokio::test]
async fn mid_flight_subscriber_replays_current_state_before_live_events() {
    let broadcaster = EventBroadcaster::new();
    let job_id = JobId::new();

    // Job already progressed before this client connects
    broadcaster.publish(
        &job_id,
        msz_models::ProgressEvent {
            status: JobStatus::Compressing,
            progress: 42,
            message: "Compressing video".to_string(),
            download_url: None,
        },
    );

    let mut sub = broadcaster.subscribe(&job_id);
    let replay = sub.replay.expect("must replay current state");
    assert_eq!(replay.status, JobStatus::Compressing);
    assert_eq!(replay.progress, 42);

    broadcaster.publish(
        &job_id,
        msz_models::ProgressEvent {
            status: JobStatus::Compressing,
            progress: 50,
            message: "Compressing video".to_string(),
            download_url: None,
        },
    );
    assert_eq!(sub.receiver.recv().await.unwrap().progress, 50);
}

#[tokio::test]
async fn terminal_jobs_are_purged_after_the_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        ttl: Duration::from_millis(20),
        ..Default::default()
    };
    let h = harness(ScriptedEncoder::sizes(&[23 * MB]).writing_output(), config);
    let job_id = create_paid_job(&h, dir.path());

    h.engine.run(job_id.clone()).await;
    assert!(dir.path().join("compressed.mp4").exists());

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(h.registry.get(&job_id).is_none());
    assert!(!dir.path().join("upload.mp4").exists());
    assert!(!dir.path().join("compressed.mp4").exists());
}

#[tokio::test]
async fn failed_jobs_are_also_scheduled_for_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        ttl: Duration::from_millis(20),
        ..Default::default()
    };
    let h = harness(
        ScriptedEncoder::failing(MediaError::ffmpeg_failed("boom", None, Some(1))),
        config,
    );
    let job_id = create_paid_job(&h, dir.path());

    h.engine.run(job_id.clone()).await;
    assert_eq!(h.registry.get(&job_id).unwrap().status, JobStatus::Error);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(h.registry.get(&job_id).is_none());
    assert!(!dir.path().join("upload.mp4").exists());
}
