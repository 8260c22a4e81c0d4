// =============================================================================
// Trace/Span propagation (§4.2)
// =============================================================================
//
// A lightweight trace-ID-propagating context. Each scheduled run starts a
// trace; each stage it drives through (adapter discover/enrich, ETL, scoring,
// snapshot) starts a child span. IDs are carried explicitly through async
// task boundaries (the teacher has no tracing-context propagation need, so
// this is new: grounded on `tracing`'s own span model, just surfaced as
// plain UUIDs so they can be persisted alongside `run_version_id` in
// `RunLog` rows without depending on `tracing`'s internal span IDs).
// =============================================================================

use std::time::Instant;

use tracing::{info, Span};
use uuid::Uuid;

/// A trace context propagated through one scheduler-triggered run.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: Uuid,
    pub request_id: Uuid,
}

impl TraceContext {
    pub fn start_trace(name: &str) -> Self {
        let ctx = Self {
            trace_id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
        };
        info!(trace_id = %ctx.trace_id, request_id = %ctx.request_id, name, "trace started");
        ctx
    }

    /// Start a child span under this trace, returning a guard that records
    /// duration and success on drop/`end()`.
    pub fn start_span(&self, name: &'static str) -> TraceGuard {
        let span_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "span",
            name,
            trace_id = %self.trace_id,
            span_id = %span_id,
        );
        TraceGuard {
            trace_id: self.trace_id,
            span_id,
            name,
            started_at: Instant::now(),
            span,
            ended: false,
        }
    }
}

/// RAII guard for a span. Call `end()` explicitly to record success/failure;
/// if dropped without calling `end()`, assumes success.
pub struct TraceGuard {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    name: &'static str,
    started_at: Instant,
    span: Span,
    ended: bool,
}

impl TraceGuard {
    pub fn end(mut self, success: bool, error: Option<&str>) {
        self.finish(success, error);
    }

    fn finish(&mut self, success: bool, error: Option<&str>) {
        if self.ended {
            return;
        }
        self.ended = true;
        let _enter = self.span.enter();
        let duration_ms = self.started_at.elapsed().as_secs_f64() * 1000.0;
        if success {
            info!(
                trace_id = %self.trace_id,
                span_id = %self.span_id,
                name = self.name,
                duration_ms,
                "span completed"
            );
        } else {
            tracing::warn!(
                trace_id = %self.trace_id,
                span_id = %self.span_id,
                name = self.name,
                duration_ms,
                error = error.unwrap_or("unknown"),
                "span failed"
            );
        }
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        if !self.ended {
            self.finish(true, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_and_span_ids_are_unique() {
        let t1 = TraceContext::start_trace("run-a");
        let t2 = TraceContext::start_trace("run-b");
        assert_ne!(t1.trace_id, t2.trace_id);
        let s1 = t1.start_span("stage-1");
        let s2 = t1.start_span("stage-2");
        assert_ne!(s1.span_id, s2.span_id);
        s1.end(true, None);
        s2.end(false, Some("boom"));
    }
}
