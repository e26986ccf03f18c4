use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::progress::TRANSFER_CEILING;

/// Receives `(bytes_sent, bytes_total)` as the request body is consumed
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Byte progress scaled onto the upload band, `floor(sent / total * 30)`.
/// Never exceeds the band ceiling, even if more bytes than announced go out.
pub fn transfer_percent(bytes_sent: u64, bytes_total: u64) -> u8 {
    if bytes_total == 0 {
        return 0;
    }
    let scaled = u128::from(bytes_sent) * u128::from(TRANSFER_CEILING) / u128::from(bytes_total);
    scaled.min(u128::from(TRANSFER_CEILING)) as u8
}

/// Counts body bytes handed to the HTTP client and reports each advance
pub struct TransferTracker {
    total_bytes: u64,
    sent_bytes: AtomicU64,
    on_progress: ProgressCallback,
}

impl TransferTracker {
    pub fn new(total_bytes: u64, on_progress: ProgressCallback) -> Self {
        Self {
            total_bytes,
            sent_bytes: AtomicU64::new(0),
            on_progress,
        }
    }

    /// Record `n` more bytes sent and notify the callback
    /// Returns (sent, total)
    pub fn advance(&self, n: u64) -> (u64, u64) {
        let sent = self.sent_bytes.fetch_add(n, Ordering::SeqCst) + n;
        let total = self.total_bytes;

        (self.on_progress)(sent, total);

        (sent, total)
    }
}
