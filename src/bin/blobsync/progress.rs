// Progress bar display for blobsync

use blobsync::replication::{ProgressEvent, ProgressObserver};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};

/// Spinner that counts finished objects; the total is unknown until listing ends
pub struct ReplicationProgressBar {
    bar: ProgressBar,
    copied: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
}

impl ReplicationProgressBar {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} objects {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        Self {
            bar,
            copied: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_with_message(self.message());
    }

    fn message(&self) -> String {
        format!(
            "({} copied, {} skipped, {} failed, {})",
            self.copied.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            format_bytes(self.bytes.load(Ordering::Relaxed))
        )
    }
}

impl ProgressObserver for ReplicationProgressBar {
    fn on_event(&self, event: ProgressEvent<'_>) {
        match event {
            ProgressEvent::Copied { bytes } => {
                self.copied.fetch_add(1, Ordering::Relaxed);
                self.bytes.fetch_add(bytes, Ordering::Relaxed);
            }
            ProgressEvent::Skipped => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            ProgressEvent::Failed {
                object_name,
                error_kind,
            } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.bar
                    .println(format!("Failed: {} [{}]", object_name, error_kind));
            }
        }
        self.bar.inc(1);
        self.bar.set_message(self.message());
    }
}

/// Format bytes into human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
