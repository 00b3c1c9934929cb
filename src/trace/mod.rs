//! Tracing context propagation.
//!
//! The router decorates each hop's span and injects propagation headers on
//! the outgoing request: the B3 family plus the opaque `x-ot-span-context`
//! carrying parent/child relationships. Span transport to a collector is a
//! separate collaborator; only context handling lives here.

mod span_context;

pub use span_context::{Annotation, SpanContext};

use crate::http::{header_names, HeaderMap};
use crate::runtime::RandomGenerator;

/// Sampling sentinel injected at this layer: always sample. Whether a
/// downstream decision may override is the tracing collaborator's concern.
const SAMPLED: &str = "1";

/// The active span for one hop through the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    context: SpanContext,
    operation: String,
    tags: Vec<(String, String)>,
    /// True when this hop continues the caller's span rather than owning a
    /// fresh one (zipkin shared-context spans).
    shared_context: bool,
}

impl Span {
    /// Starts the span for an inbound request.
    ///
    /// With an inbound `x-ot-span-context` whose annotation is client-send,
    /// the caller opened the span for us: this hop is the server-receive
    /// half of the same span. With a server-receive annotation the request
    /// is an egress continuation, so a new child span is started. Without
    /// usable context a root span is started.
    pub fn start(headers: &HeaderMap, operation: &str, random: &dyn RandomGenerator) -> Self {
        let inbound = headers
            .get(header_names::OT_SPAN_CONTEXT)
            .and_then(SpanContext::parse);

        let (context, shared_context) = match inbound {
            Some(inbound) if inbound.has_annotation(Annotation::ClientSend) => (
                SpanContext {
                    annotations: vec![Annotation::ServerReceive],
                    ..inbound
                },
                true,
            ),
            Some(inbound) if inbound.has_annotation(Annotation::ServerReceive) => (
                SpanContext {
                    trace_id: inbound.trace_id,
                    span_id: random.random(),
                    parent_id: inbound.span_id,
                    annotations: vec![Annotation::ClientSend],
                },
                false,
            ),
            _ => {
                let id = random.random();
                (
                    SpanContext {
                        trace_id: id,
                        span_id: id,
                        parent_id: 0,
                        annotations: vec![Annotation::ServerReceive],
                    },
                    false,
                )
            }
        };

        Self {
            context,
            operation: operation.to_string(),
            tags: Vec::new(),
            shared_context,
        }
    }

    /// Starts the egress child for an upstream call made from this hop.
    pub fn spawn_child(&self, operation: &str, random: &dyn RandomGenerator) -> Span {
        Span {
            context: SpanContext {
                trace_id: self.context.trace_id,
                span_id: random.random(),
                parent_id: self.context.span_id,
                annotations: vec![Annotation::ClientSend],
            },
            operation: operation.to_string(),
            tags: Vec::new(),
            shared_context: false,
        }
    }

    pub fn set_operation(&mut self, operation: &str) {
        self.operation = operation.to_string();
    }

    pub fn set_tag(&mut self, name: &str, value: &str) {
        self.tags.push((name.to_string(), value.to_string()));
    }

    /// Writes the propagation headers onto the outgoing request.
    pub fn inject_context(&self, headers: &mut HeaderMap) {
        headers.set(
            header_names::B3_TRACE_ID,
            &format!("{:016x}", self.context.trace_id),
        );
        headers.set(
            header_names::B3_SPAN_ID,
            &format!("{:016x}", self.context.span_id),
        );
        if self.context.parent_id != 0 {
            headers.set(
                header_names::B3_PARENT_SPAN_ID,
                &format!("{:016x}", self.context.parent_id),
            );
        }
        headers.set(header_names::B3_SAMPLED, SAMPLED);
        headers.set(header_names::OT_SPAN_CONTEXT, &self.context.to_string());
    }

    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    pub fn is_shared_context(&self) -> bool {
        self.shared_context
    }
}
