//! Structured lifecycle events for flows.
//!
//! Every event carries an `event` field so log pipelines can filter on it.
//! Level is controlled through `RUST_LOG`; pass `--json` to the CLI for
//! newline-delimited JSON.

use tracing::info;

/// Span tagged with the flow name and session id.
pub fn session_span(flow: &str, session_id: &str) -> tracing::Span {
    tracing::info_span!("flows.session", flow = %flow, session_id = %session_id)
}

pub fn emit_session_started(session_id: &str, flow: &str, participants: usize) {
    info!(
        event = "session.started",
        session_id = %session_id,
        flow = %flow,
        participants = participants,
    );
}

/// A contribution was recorded and routed.
pub fn emit_turn_relayed(session_id: &str, seq: u64, from: &str, to: Option<&str>) {
    info!(
        event = "session.turn_relayed",
        session_id = %session_id,
        seq = seq,
        from = %from,
        to = to.unwrap_or("-"),
    );
}

pub fn emit_review_verdict(session_id: &str, producer: &str, approved: bool) {
    info!(
        event = "session.review_verdict",
        session_id = %session_id,
        producer = %producer,
        approved = approved,
    );
}

pub fn emit_session_finished(session_id: &str, duration_ms: u64, turns: u64, success: bool) {
    info!(
        event = "session.finished",
        session_id = %session_id,
        duration_ms = duration_ms,
        turns = turns,
        success = success,
    );
}

/// Best-effort cleanup failed (warning level).
pub fn emit_cleanup_error(resource: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "flow.cleanup_error", resource = %resource, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_emit_inside_a_session_span() {
        let _span = session_span("campaign", "test-session").entered();
        emit_turn_relayed("test-session", 1, "EmailWriter", Some("Editor"));
    }
}
