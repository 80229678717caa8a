//! Lightweight in-memory counters for remote traffic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct RemoteMetrics {
    statements: AtomicU64,
    failed: AtomicU64,
    rows_fetched: AtomicU64,
    chunked_reads: AtomicU64,
    fractional_truncations: AtomicU64,
    rows_modified: AtomicU64,
}

static REMOTE_METRICS: OnceLock<RemoteMetrics> = OnceLock::new();

fn metrics() -> &'static RemoteMetrics {
    REMOTE_METRICS.get_or_init(RemoteMetrics::default)
}

pub fn record_statement(success: bool) {
    let metrics = metrics();
    metrics.statements.fetch_add(1, Ordering::Relaxed);
    if !success {
        metrics.failed.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_row_fetched() {
    metrics().rows_fetched.fetch_add(1, Ordering::Relaxed);
}

pub fn record_chunked_read() {
    metrics().chunked_reads.fetch_add(1, Ordering::Relaxed);
}

pub fn record_fractional_truncation() {
    metrics()
        .fractional_truncations
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_rows_modified(rows: u64) {
    metrics().rows_modified.fetch_add(rows, Ordering::Relaxed);
}

#[derive(Debug, Serialize)]
pub struct RemoteMetricsSnapshot {
    pub statements: u64,
    pub failed: u64,
    pub rows_fetched: u64,
    pub chunked_reads: u64,
    pub fractional_truncations: u64,
    pub rows_modified: u64,
}

pub fn snapshot() -> RemoteMetricsSnapshot {
    let metrics = metrics();
    RemoteMetricsSnapshot {
        statements: metrics.statements.load(Ordering::Relaxed),
        failed: metrics.failed.load(Ordering::Relaxed),
        rows_fetched: metrics.rows_fetched.load(Ordering::Relaxed),
        chunked_reads: metrics.chunked_reads.load(Ordering::Relaxed),
        fractional_truncations: metrics.fractional_truncations.load(Ordering::Relaxed),
        rows_modified: metrics.rows_modified.load(Ordering::Relaxed),
    }
}
