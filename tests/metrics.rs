#![cfg(feature = "metrics")]
//! Tests for `wirepump` metrics helpers.
//!
//! Counters and gauges are checked with
//! `metrics_util::debugging::DebuggingRecorder`.
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use wirepump::metrics::{self, Direction, ErrorKind};

fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter_value(snapshotter: &Snapshotter, name: &str, label: (&str, &str)) -> Option<u64> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(key, _, _, value)| {
            let matches = key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label.0 && l.value() == label.1);
            match value {
                DebugValue::Counter(count) if matches => Some(count),
                _ => None,
            }
        })
}

#[rstest]
#[case(Direction::Inbound, "inbound", 3)]
#[case(Direction::Outbound, "outbound", 1)]
fn frame_counter_records_direction(
    #[case] direction: Direction,
    #[case] label: &str,
    #[case] count: u64,
) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || metrics::inc_frames(direction, count));
    assert_eq!(
        counter_value(&snapshotter, metrics::FRAMES_PROCESSED, ("direction", label)),
        Some(count)
    );
}

#[rstest]
#[case(ErrorKind::Protocol, "protocol")]
#[case(ErrorKind::HandlerPanic, "handler_panic")]
#[case(ErrorKind::QueueFull, "queue_full")]
#[case(ErrorKind::HeartbeatExpired, "heartbeat_expired")]
fn error_counter_records_kind(#[case] kind: ErrorKind, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        metrics::inc_errors(kind);
        metrics::inc_errors(kind);
    });
    assert_eq!(
        counter_value(&snapshotter, metrics::ERRORS_TOTAL, ("kind", label)),
        Some(2)
    );
}

#[test]
fn connection_gauge_tracks_open_and_close() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        metrics::inc_connections();
        metrics::inc_connections();
        metrics::dec_connections();
    });
    let gauge = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(key, _, _, value)| match value {
            DebugValue::Gauge(v) if key.key().name() == metrics::CONNECTIONS_ACTIVE => {
                Some(v.into_inner())
            }
            _ => None,
        });
    assert_eq!(gauge, Some(1.0));
}
