//! `tx_id` generation: a monotonically-ordered token used as the
//! optimistic concurrency version for a document.

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SEQUENCE: AtomicU16 = AtomicU16::new(0);

/// A 60-bit-ish time id: 48 bits of epoch milliseconds, 12 bits of a
/// wrapping per-process sequence counter to break ties within the same
/// millisecond. Strictly increasing across calls on one process as long
/// as fewer than 4096 ids are minted per millisecond.
pub fn next_tx_id() -> i64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64;
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) as i64 & 0xFFF;
    (millis << 12) | seq
}
