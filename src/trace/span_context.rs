//! Wire codec for the propagated span context.
//!
//! The context travels in `x-ot-span-context` as
//! `trace_id;span_id;parent_id;annotations`, with ids as zero-padded hex
//! and annotations a comma-separated list of `cs` / `sr` markers.

use std::fmt;

/// Span annotation markers carried in the propagated context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    ClientSend,
    ServerReceive,
}

impl Annotation {
    fn as_str(&self) -> &'static str {
        match self {
            Annotation::ClientSend => "cs",
            Annotation::ServerReceive => "sr",
        }
    }

    fn parse(token: &str) -> Option<Self> {
        match token {
            "cs" => Some(Annotation::ClientSend),
            "sr" => Some(Annotation::ServerReceive),
            _ => None,
        }
    }
}

/// The identifiers and annotations one hop shares with the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanContext {
    pub trace_id: u64,
    pub span_id: u64,
    /// Zero when the span has no parent.
    pub parent_id: u64,
    pub annotations: Vec<Annotation>,
}

impl SpanContext {
    pub fn has_annotation(&self, annotation: Annotation) -> bool {
        self.annotations.contains(&annotation)
    }

    /// Parses the serialized form; `None` for anything malformed.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.splitn(4, ';');
        let trace_id = u64::from_str_radix(parts.next()?, 16).ok()?;
        let span_id = u64::from_str_radix(parts.next()?, 16).ok()?;
        let parent_id = u64::from_str_radix(parts.next()?, 16).ok()?;
        let annotations = parts
            .next()?
            .split(',')
            .filter(|t| !t.is_empty())
            .map(Annotation::parse)
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            trace_id,
            span_id,
            parent_id,
            annotations,
        })
    }
}

impl fmt::Display for SpanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let annotations: Vec<&str> = self.annotations.iter().map(Annotation::as_str).collect();
        write!(
            f,
            "{:016x};{:016x};{:016x};{}",
            self.trace_id,
            self.span_id,
            self.parent_id,
            annotations.join(",")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_round_trip() {
        let context = SpanContext {
            trace_id: 0x1,
            span_id: 0xabc,
            parent_id: 0,
            annotations: vec![Annotation::ClientSend],
        };
        let serialized = context.to_string();
        assert_eq!(
            serialized,
            "0000000000000001;0000000000000abc;0000000000000000;cs"
        );
        assert_eq!(SpanContext::parse(&serialized), Some(context));
    }

    #[test]
    fn test_parse_multiple_annotations() {
        let context =
            SpanContext::parse("0000000000000001;0000000000000002;0000000000000003;cs,sr").unwrap();
        assert!(context.has_annotation(Annotation::ClientSend));
        assert!(context.has_annotation(Annotation::ServerReceive));
        assert_eq!(context.parent_id, 3);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(SpanContext::parse(""), None);
        assert_eq!(SpanContext::parse("1;2;3"), None);
        assert_eq!(SpanContext::parse("xyz;2;3;cs"), None);
        assert_eq!(SpanContext::parse("1;2;3;bogus"), None);
    }

    #[test]
    fn test_parse_empty_annotation_list() {
        let context = SpanContext::parse("1;2;0;").unwrap();
        assert!(context.annotations.is_empty());
    }
}
