//! End-to-end runs of the capture pipeline against scripted collaborators.

use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use voxswitch::audio::source::{MockChunkSource, MockEndpoints, MockRead};
use voxswitch::config::Config;
use voxswitch::dispatch::MockPublisher;
use voxswitch::error::Result;
use voxswitch::pipeline::error::CollectingReporter;
use voxswitch::pipeline::types::Chunk;
use voxswitch::pipeline::{Pipeline, PipelineConfig, StationError};
use voxswitch::stt::transcriber::{MockTranscriber, Transcriber};
use voxswitch::supervisor::SupervisorState::{Capturing, Discovering, Draining, Terminated};
use voxswitch::supervisor::{StopSignal, SupervisorState};

/// 8 Hz, 4-sample chunks: two chunks per second of pre-roll, two listening.
fn config() -> PipelineConfig {
    let mut config = Config::default();
    config.trigger.sample_rate = 8;
    config.trigger.chunk_size = 4;
    config.trigger.listen_seconds = 1.0;
    config.trigger.history_seconds = 4;
    config.trigger.trigger_volume = 1000;
    config.serial.read_timeout_ms = 5;
    config.supervisor.discovery_backoff_ms = 5;
    config.supervisor.release_pause_ms = 5;
    config.mqtt.device_id = "shellyplus1-hall".to_string();
    config.validate().unwrap();
    PipelineConfig::from_config(&config).unwrap()
}

fn quiet() -> Chunk {
    Chunk::new(vec![10, -10, 10, -10])
}

fn loud() -> Chunk {
    Chunk::new(vec![0, 4000, -4000, 0])
}

/// Quiet lead-in, one trigger, then enough quiet chunks to close the window.
fn utterance() -> Vec<Chunk> {
    vec![quiet(), quiet(), quiet(), loud(), quiet(), quiet()]
}

/// A trigger whose listening window never completes.
fn cut_off_utterance() -> Vec<Chunk> {
    vec![quiet(), quiet(), quiet(), loud()]
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Holds every call until released, like a recognizer on a slow network.
struct GatedTranscriber {
    calls: Arc<AtomicUsize>,
    release: Receiver<()>,
}

impl GatedTranscriber {
    fn new() -> (Self, Arc<AtomicUsize>, Sender<()>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam_channel::unbounded();
        let transcriber = Self {
            calls: calls.clone(),
            release: rx,
        };
        (transcriber, calls, tx)
    }
}

impl Transcriber for GatedTranscriber {
    fn transcribe(&self, _audio: &[i16], _sample_rate: u32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // A dropped sender releases every later call too.
        let _released = self.release.recv();
        Ok("accendi la luce".to_string())
    }

    fn name(&self) -> &str {
        "gated"
    }
}

#[test]
fn silence_never_reaches_the_recognizer() {
    let stop = StopSignal::new();
    let source = MockChunkSource::new("/dev/ttyACM0")
        .with_chunks(std::iter::repeat_n(quiet(), 200))
        .stop_when_exhausted(stop.clone());
    let transcriber = MockTranscriber::new("mock").with_response("accendi la luce");
    let calls = transcriber.call_counter();
    let publisher = MockPublisher::new();
    let messages = publisher.messages();
    let disconnected = publisher.disconnected();

    let report = Pipeline::new(config())
        .with_stop_signal(stop)
        .start(
            Box::new(MockEndpoints::new(["/dev/ttyACM0"]).with_source(source)),
            Arc::new(transcriber),
            Box::new(publisher),
        )
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(report.chunks, 200);
    assert_eq!(report.clips, 0);
    assert_eq!(report.worker_processed, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(messages.lock().unwrap().is_empty());
    assert!(disconnected.load(Ordering::SeqCst));
}

#[test]
fn stall_triggers_rediscovery_on_a_fresh_session() {
    let stalling = MockChunkSource::new("/dev/ttyACM0")
        .with_chunks([quiet(), quiet()])
        .with_read(MockRead::Stall);
    let first_closed = stalling.closed_flag();
    let healthy = MockChunkSource::new("/dev/ttyACM0")
        .with_chunks(utterance())
        .idle_when_exhausted(4);
    let endpoints = MockEndpoints::new(["/dev/ttyACM0"])
        .with_source(stalling)
        .with_source(healthy);
    let opens = endpoints.open_counter();

    let publisher = MockPublisher::new();
    let messages = publisher.messages();
    let (events_tx, events_rx) = crossbeam_channel::unbounded();

    let handle = Pipeline::new(config())
        .with_state_events(events_tx)
        .start(
            Box::new(endpoints),
            Arc::new(MockTranscriber::new("mock").with_response("Accendi la luce")),
            Box::new(publisher),
        )
        .unwrap();
    wait_until("the command", || !messages.lock().unwrap().is_empty());
    let report = handle.stop().unwrap();

    assert_eq!(report.sessions, 2);
    assert_eq!(report.stalls, 1);
    assert_eq!(report.clips, 1);
    assert_eq!(opens.load(Ordering::SeqCst), 2);
    assert!(first_closed.load(Ordering::SeqCst));

    let states: Vec<SupervisorState> = events_rx.try_iter().collect();
    assert_eq!(
        states,
        vec![Discovering, Capturing, Draining, Discovering, Capturing, Draining, Terminated]
    );

    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].topic, "shellyplus1-hall/command/switch:0");
    assert_eq!(messages[0].payload, "on");
}

#[test]
fn lost_transport_is_recovered_without_crashing() {
    let unplugged = MockChunkSource::new("/dev/ttyACM0")
        .with_chunks([quiet()])
        .with_read(MockRead::Lost("device disconnected".to_string()));
    let replugged = MockChunkSource::new("/dev/ttyACM1")
        .with_chunks(utterance())
        .idle_when_exhausted(4);

    let publisher = MockPublisher::new();
    let messages = publisher.messages();

    let handle = Pipeline::new(config())
        .start(
            Box::new(
                MockEndpoints::new(["/dev/ttyACM0"])
                    .with_source(unplugged)
                    .with_source(replugged),
            ),
            Arc::new(MockTranscriber::new("mock").with_response("spegni la luce")),
            Box::new(publisher),
        )
        .unwrap();
    wait_until("the command", || !messages.lock().unwrap().is_empty());
    let report = handle.stop().unwrap();

    assert_eq!(report.sessions, 2);
    assert_eq!(report.transport_errors, 1);
    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].payload, "off");
}

#[test]
fn stop_during_stall_terminates_instead_of_retrying() {
    let stop = StopSignal::new();
    // Requests the stop, then reports a stall on the same read.
    let source = MockChunkSource::new("/dev/ttyACM0")
        .with_chunks([quiet(), quiet()])
        .stop_when_exhausted(stop.clone());
    let endpoints = MockEndpoints::new(["/dev/ttyACM0"])
        .with_source(source)
        .with_source(MockChunkSource::new("/dev/ttyACM0"));
    let opens = endpoints.open_counter();
    let scans = endpoints.scan_counter();
    let (events_tx, events_rx) = crossbeam_channel::unbounded();

    let report = Pipeline::new(config())
        .with_stop_signal(stop)
        .with_state_events(events_tx)
        .start(
            Box::new(endpoints),
            Arc::new(MockTranscriber::new("mock")),
            Box::new(MockPublisher::new()),
        )
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(report.sessions, 1);
    assert_eq!(report.stalls, 1);
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(scans.load(Ordering::SeqCst), 1);
    let states: Vec<SupervisorState> = events_rx.try_iter().collect();
    assert_eq!(states, vec![Discovering, Capturing, Draining, Terminated]);
}

#[test]
fn recognition_failures_do_not_stop_the_worker() {
    let mut chunks = utterance();
    chunks.extend(utterance());
    chunks.extend(utterance());
    let source = MockChunkSource::new("/dev/ttyACM0")
        .with_chunks(chunks)
        .idle_when_exhausted(4);

    let transcriber = MockTranscriber::new("mock").with_sequence(&[
        None,
        Some("buongiorno"),
        Some("spegni la luce"),
    ]);
    let calls = transcriber.call_counter();
    let publisher = MockPublisher::new();
    let messages = publisher.messages();

    let handle = Pipeline::new(config())
        .start(
            Box::new(MockEndpoints::new(["/dev/ttyACM0"]).with_source(source)),
            Arc::new(transcriber),
            Box::new(publisher),
        )
        .unwrap();
    wait_until("the command", || !messages.lock().unwrap().is_empty());
    let report = handle.stop().unwrap();

    assert_eq!(report.clips, 3);
    assert_eq!(report.worker_processed, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].payload, "off");
}

#[test]
fn failed_publish_is_reported_and_not_retried() {
    let source = MockChunkSource::new("/dev/ttyACM0")
        .with_chunks(utterance())
        .idle_when_exhausted(4);
    let reporter = Arc::new(CollectingReporter::new());
    let publisher = MockPublisher::new().with_failure();
    let messages = publisher.messages();

    let handle = Pipeline::new(config())
        .with_error_reporter(reporter.clone())
        .start(
            Box::new(MockEndpoints::new(["/dev/ttyACM0"]).with_source(source)),
            Arc::new(MockTranscriber::new("mock").with_response("accendi la luce")),
            Box::new(publisher),
        )
        .unwrap();
    wait_until("the failure report", || !reporter.reports().is_empty());
    let report = handle.stop().unwrap();

    assert_eq!(report.worker_processed, 1);
    assert!(messages.lock().unwrap().is_empty());
    let reports = reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "dispatcher");
    assert!(matches!(reports[0].1, StationError::Recoverable(_)));
}

#[test]
fn external_stop_while_capturing() {
    // A source that never runs dry: only the stop request ends the session.
    let source = MockChunkSource::new("/dev/ttyACM0").with_chunks(std::iter::repeat_n(quiet(), 100_000));
    let closed = source.closed_flag();

    let handle = Pipeline::new(config())
        .start(
            Box::new(MockEndpoints::new(["/dev/ttyACM0"]).with_source(source)),
            Arc::new(MockTranscriber::new("mock")),
            Box::new(MockPublisher::new()),
        )
        .unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let report = handle.stop().unwrap();
    assert_eq!(report.sessions, 1);
    assert!(report.chunks > 0);
    assert!(closed.load(Ordering::SeqCst));
}

#[test]
fn stop_discards_backlog_behind_the_clip_in_progress() {
    let mut chunks = Vec::new();
    for _ in 0..4 {
        chunks.extend(utterance());
    }
    let source = MockChunkSource::new("/dev/ttyACM0")
        .with_chunks(chunks)
        .idle_when_exhausted(4);
    let reads = source.read_counter();
    let (transcriber, calls, release) = GatedTranscriber::new();
    let publisher = MockPublisher::new();
    let messages = publisher.messages();
    let disconnected = publisher.disconnected();
    let (events_tx, events_rx) = crossbeam_channel::unbounded();

    let handle = Pipeline::new(config())
        .with_state_events(events_tx)
        .start(
            Box::new(MockEndpoints::new(["/dev/ttyACM0"]).with_source(source)),
            Arc::new(transcriber),
            Box::new(publisher),
        )
        .unwrap();

    // First clip held by the recognizer, the other three queued behind it.
    wait_until("all clips captured", || reads.load(Ordering::SeqCst) > 24);
    wait_until("the first recognition", || calls.load(Ordering::SeqCst) == 1);
    handle.request_stop();
    wait_until("termination", || {
        events_rx.try_iter().any(|state| state == Terminated)
    });
    drop(release);

    let report = handle.join().unwrap();
    assert_eq!(report.clips, 4);
    assert_eq!(report.cleared_clips, 3);
    assert_eq!(report.worker_processed, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(messages.lock().unwrap().len(), 1);
    assert!(disconnected.load(Ordering::SeqCst));
}

#[test]
fn stop_mid_window_never_enqueues_a_partial_clip() {
    let stop = StopSignal::new();
    let source = MockChunkSource::new("/dev/ttyACM0")
        .with_chunks(cut_off_utterance())
        .stop_when_exhausted(stop.clone());
    let transcriber = MockTranscriber::new("mock").with_response("accendi la luce");
    let calls = transcriber.call_counter();
    let publisher = MockPublisher::new();
    let messages = publisher.messages();

    let report = Pipeline::new(config())
        .with_stop_signal(stop)
        .start(
            Box::new(MockEndpoints::new(["/dev/ttyACM0"]).with_source(source)),
            Arc::new(transcriber),
            Box::new(publisher),
        )
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(report.chunks, 4);
    assert_eq!(report.clips, 0);
    assert_eq!(report.worker_processed, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(messages.lock().unwrap().is_empty());
}

#[test]
fn stall_mid_window_restarts_idle() {
    let stalling = MockChunkSource::new("/dev/ttyACM0")
        .with_chunks(cut_off_utterance())
        .with_read(MockRead::Stall);
    // A carried-over window would close on the first of these chunks.
    let next = MockChunkSource::new("/dev/ttyACM0")
        .with_chunks([quiet(), quiet(), quiet()])
        .idle_when_exhausted(4);
    let next_reads = next.read_counter();
    let transcriber = MockTranscriber::new("mock").with_response("accendi la luce");
    let calls = transcriber.call_counter();

    let handle = Pipeline::new(config())
        .start(
            Box::new(
                MockEndpoints::new(["/dev/ttyACM0"])
                    .with_source(stalling)
                    .with_source(next),
            ),
            Arc::new(transcriber),
            Box::new(MockPublisher::new()),
        )
        .unwrap();
    wait_until("the second session", || next_reads.load(Ordering::SeqCst) > 10);
    let report = handle.stop().unwrap();

    assert_eq!(report.sessions, 2);
    assert_eq!(report.stalls, 1);
    assert_eq!(report.clips, 0);
    assert_eq!(report.worker_processed, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
