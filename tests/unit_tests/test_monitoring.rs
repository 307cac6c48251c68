use memsession::monitoring::{ErrorKind, Monitoring, Op, SNAPSHOT_LEN, Stage};

// Snapshot layout: sent, received, passed x14, failed x14, errors x11,
// receiving x9, processing x9, sending x9, total_free_sessions.
const FAILED_BASE: usize = 2 + 14;
const ERRORS_BASE: usize = 2 + 28;
const RECEIVING_BASE: usize = 2 + 28 + 11;
const PROCESSING_BASE: usize = RECEIVING_BASE + 9;
const SENDING_BASE: usize = PROCESSING_BASE + 9;

#[test]
fn test_snapshot_len() {
    assert_eq!(SNAPSHOT_LEN, 69);
    assert_eq!(Monitoring::new().snapshot().len(), SNAPSHOT_LEN);
}

#[test]
fn test_snapshot_cell_positions() {
    let monitoring = Monitoring::new();
    monitoring.inc_sent_bytes(10);
    monitoring.inc_received_bytes(20);
    monitoring.inc_passed(Op::Generate);
    monitoring.inc_passed(Op::RemoveKeyFromAll);
    monitoring.inc_failed(Op::SetKey);
    monitoring.inc_error(ErrorKind::Disconnection);
    monitoring.update_duration(Stage::Sending, 3);
    monitoring.update_total_free_sessions(7);

    let snap = monitoring.snapshot();
    assert_eq!(snap[0], 10);
    assert_eq!(snap[1], 20);
    assert_eq!(snap[2 + Op::Generate as usize], 1);
    assert_eq!(snap[2 + Op::RemoveKeyFromAll as usize], 1);
    assert_eq!(snap[FAILED_BASE + Op::SetKey as usize], 1);
    assert_eq!(snap[ERRORS_BASE + ErrorKind::Disconnection as usize], 1);
    assert_eq!(snap[SENDING_BASE], 1);
    assert_eq!(snap[SNAPSHOT_LEN - 1], 7);

    // Everything else stays zero.
    assert_eq!(snap.iter().filter(|v| **v != 0).count(), 8);
}

#[test]
fn test_duration_bucket_bounds() {
    let monitoring = Monitoring::new();
    monitoring.update_duration(Stage::Receiving, 0);
    monitoring.update_duration(Stage::Receiving, 4);
    monitoring.update_duration(Stage::Receiving, 5);
    monitoring.update_duration(Stage::Receiving, 999);
    monitoring.update_duration(Stage::Receiving, 1_000);
    monitoring.update_duration(Stage::Processing, 50_000);

    let snap = monitoring.snapshot();
    assert_eq!(snap[RECEIVING_BASE], 2, "<5ms");
    assert_eq!(snap[RECEIVING_BASE + 1], 1, "<10ms");
    assert_eq!(snap[RECEIVING_BASE + 7], 1, "<1000ms");
    assert_eq!(snap[RECEIVING_BASE + 8], 1, "other");
    assert_eq!(snap[PROCESSING_BASE + 8], 1, "other");
}

#[test]
fn test_counters_accumulate() {
    let monitoring = Monitoring::new();
    for _ in 0..5 {
        monitoring.inc_passed(Op::GetKey);
    }
    for _ in 0..3 {
        monitoring.inc_failed(Op::GetKey);
    }
    assert_eq!(monitoring.passed_count(Op::GetKey), 5);
    assert_eq!(monitoring.failed_count(Op::GetKey), 3);
    assert_eq!(monitoring.error_count(ErrorKind::WrongParams), 0);
}

#[test]
fn test_gauge_overwrites() {
    let monitoring = Monitoring::new();
    monitoring.update_total_free_sessions(10);
    monitoring.update_total_free_sessions(3);
    let snap = monitoring.snapshot();
    assert_eq!(snap[SNAPSHOT_LEN - 1], 3);
}
