//! Server-sent progress events with a snapshot replay.
//!
//! Every new subscriber receives the job's current state as its first
//! frame, then live events until a terminal frame ends the stream.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing::debug;

use msz_engine::{EventBroadcaster, JobRegistry};
use msz_models::{JobId, ProgressEvent};

use crate::state::AppState;

/// `GET /events/{job_id}` — SSE stream of progress frames.
pub async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let job_id = JobId::from_string(job_id);
    let frames = progress_frames(&state.registry, &state.broadcaster, &job_id);
    Sse::new(frames.map(|event| Ok(frame(&event)))).keep_alive(KeepAlive::default())
}

/// Assemble one job's frame stream: its current state first, then live
/// events until the terminal frame.
///
/// Subscribes before reading the registry. A terminal transition landing
/// between the two then shows up in the snapshot; one landing after is
/// delivered through the receiver. A snapshot read first could miss both
/// and leave the client waiting on a channel that never fires again.
fn progress_frames(
    registry: &JobRegistry,
    broadcaster: &EventBroadcaster,
    job_id: &JobId,
) -> BoxStream<'static, ProgressEvent> {
    let subscription = broadcaster.subscribe(job_id);

    let Some(snapshot) = registry.get(job_id) else {
        debug!(job_id = %job_id, "events requested for unknown job");
        drop(subscription);
        broadcaster.forget_if_idle(job_id);
        return stream::once(async { ProgressEvent::not_found() }).boxed();
    };

    if snapshot.status.is_terminal() {
        // Already over; one terminal frame, and the channel the subscribe
        // call recreated goes away with us
        drop(subscription);
        broadcaster.forget_if_idle(job_id);
        return stream::once(async move { ProgressEvent::of_job(&snapshot) }).boxed();
    }

    let replay = subscription
        .replay
        .unwrap_or_else(|| ProgressEvent::of_job(&snapshot));
    stream::once(async move { replay })
        .chain(live_frames(subscription.receiver))
        .boxed()
}

/// Drain the broadcast receiver, stopping after the terminal event.
/// Lagged receivers skip to the channel head.
fn live_frames(receiver: Receiver<ProgressEvent>) -> impl Stream<Item = ProgressEvent> {
    stream::unfold(Some(receiver), |state| async move {
        let mut receiver = state?;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let next = if event.is_terminal() { None } else { Some(receiver) };
                    return Some((event, next));
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

fn frame(event: &ProgressEvent) -> Event {
    Event::default()
        .json_data(event)
        .unwrap_or_else(|_| Event::default().data("{}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use msz_engine::{JobRegistry, StageUpdate};
    use msz_models::{JobStatus, Provider, Upsells};

    const MB: u64 = 1024 * 1024;

    fn finished_job(registry: &JobRegistry) -> JobId {
        let job_id = registry
            .create("in.mp4", "out.mp4", 100 * MB, 120, Provider::Gmail)
            .unwrap()
            .job_id;
        registry
            .confirm_paid(&job_id, Upsells::default(), None)
            .unwrap();
        for (status, pct) in [
            (JobStatus::Compressing, 5),
            (JobStatus::Finalizing, 90),
        ] {
            registry
                .transition(&job_id, status, StageUpdate::progress(pct, "m"))
                .unwrap();
        }
        registry
            .transition(
                &job_id,
                JobStatus::Done,
                StageUpdate {
                    progress_pct: Some(100),
                    message: Some("Your video is ready".to_string()),
                    download_token: Some("tok".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        job_id
    }

    #[tokio::test]
    async fn finished_job_yields_one_terminal_frame_without_a_lingering_channel() {
        let registry = JobRegistry::new();
        let broadcaster = EventBroadcaster::new();
        let job_id = finished_job(&registry);
        // The terminal publish already happened and tore the channel down
        broadcaster.publish(
            &job_id,
            ProgressEvent::of_job(&registry.get(&job_id).unwrap()),
        );
        assert_eq!(broadcaster.channel_count(), 0);

        let frames: Vec<_> = progress_frames(&registry, &broadcaster, &job_id)
            .collect()
            .await;

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].status, JobStatus::Done);
        assert!(frames[0].download_url.is_some());
        // The subscribe call's recreated channel was reclaimed
        assert_eq!(broadcaster.channel_count(), 0);
    }

    #[tokio::test]
    async fn terminal_between_snapshot_paths_still_ends_the_stream() {
        // Terminal transition recorded but its event not yet published:
        // the snapshot alone must carry the stream to completion
        let registry = JobRegistry::new();
        let broadcaster = EventBroadcaster::new();
        let job_id = finished_job(&registry);

        let frames: Vec<_> = progress_frames(&registry, &broadcaster, &job_id)
            .collect()
            .await;

        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_terminal());
        assert_eq!(broadcaster.channel_count(), 0);
    }

    #[tokio::test]
    async fn unknown_job_yields_a_single_error_frame_and_no_channel() {
        let registry = JobRegistry::new();
        let broadcaster = EventBroadcaster::new();
        let job_id = JobId::new();

        let frames: Vec<_> = progress_frames(&registry, &broadcaster, &job_id)
            .collect()
            .await;

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].status, JobStatus::Error);
        assert_eq!(broadcaster.channel_count(), 0);
    }

    #[tokio::test]
    async fn live_stream_replays_then_follows_events_to_the_terminal_frame() {
        let registry = JobRegistry::new();
        let broadcaster = EventBroadcaster::new();
        let job_id = registry
            .create("in.mp4", "out.mp4", 100 * MB, 120, Provider::Gmail)
            .unwrap()
            .job_id;
        registry
            .confirm_paid(&job_id, Upsells::default(), None)
            .unwrap();

        let frames = progress_frames(&registry, &broadcaster, &job_id);

        // Events published after subscription are buffered for the stream
        let compressing = registry
            .transition(
                &job_id,
                JobStatus::Compressing,
                StageUpdate::progress(50, "Compressing video"),
            )
            .unwrap();
        broadcaster.publish(&job_id, ProgressEvent::of_job(&compressing));
        for status in [JobStatus::Finalizing, JobStatus::Done] {
            let snap = registry
                .transition(&job_id, status, StageUpdate::progress(100, "m"))
                .unwrap();
            broadcaster.publish(&job_id, ProgressEvent::of_job(&snap));
        }

        let collected: Vec<_> = frames.collect().await;
        assert_eq!(collected.first().unwrap().status, JobStatus::Processing);
        assert_eq!(collected.last().unwrap().status, JobStatus::Done);
        assert!(collected.iter().any(|f| f.progress == 50));
    }
}
