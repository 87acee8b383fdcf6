//! Process-wide counters.
//!
//! Incremented at the call site; [`Metrics::flush`] emits the current values
//! as one `info!` event, typically when a flow finishes.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    sessions_started: AtomicU64,
    turns_taken: AtomicU64,
    generations: AtomicU64,
    approvals: AtomicU64,
    revisions: AtomicU64,
    retries: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            sessions_started: AtomicU64::new(0),
            turns_taken: AtomicU64::new(0),
            generations: AtomicU64::new(0),
            approvals: AtomicU64::new(0),
            revisions: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    pub fn inc_sessions(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sessions_started", "counter incremented");
    }

    pub fn inc_turns(&self) {
        self.turns_taken.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "turns_taken", "counter incremented");
    }

    pub fn inc_generations(&self) {
        self.generations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generations", "counter incremented");
    }

    pub fn inc_approvals(&self) {
        self.approvals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_revisions(&self) {
        self.revisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "retries", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            sessions_started = self.sessions_started(),
            turns_taken = self.turns_taken(),
            generations = self.generations(),
            approvals = self.approvals(),
            revisions = self.revisions(),
            retries = self.retries(),
        );
    }

    pub fn sessions_started(&self) -> u64 {
        self.sessions_started.load(Ordering::Relaxed)
    }

    pub fn turns_taken(&self) -> u64 {
        self.turns_taken.load(Ordering::Relaxed)
    }

    pub fn generations(&self) -> u64 {
        self.generations.load(Ordering::Relaxed)
    }

    pub fn approvals(&self) -> u64 {
        self.approvals.load(Ordering::Relaxed)
    }

    pub fn revisions(&self) -> u64 {
        self.revisions.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Zero every counter (tests).
    pub fn reset(&self) {
        for counter in [
            &self.sessions_started,
            &self.turns_taken,
            &self.generations,
            &self.approvals,
            &self.revisions,
            &self.retries,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
