//! HTTP header primitives shared by the matcher and the provider.
//!
//! The routing core never touches a socket; requests arrive as a header map
//! and leave as a route decision plus header mutations. This module owns
//! that map and the well-known header names the core reads and writes.

mod headers;

pub use headers::{path_without_query, HeaderMap};

/// Well-known header names used by the routing core.
pub mod header_names {
    pub const AUTHORITY: &str = ":authority";
    pub const METHOD: &str = ":method";
    pub const PATH: &str = ":path";

    pub const FORWARDED_PROTO: &str = "x-forwarded-proto";
    pub const ENVOY_INTERNAL: &str = "x-envoy-internal";
    pub const ENVOY_ORIGINAL_PATH: &str = "x-envoy-original-path";

    pub const B3_TRACE_ID: &str = "x-b3-traceid";
    pub const B3_SPAN_ID: &str = "x-b3-spanid";
    pub const B3_PARENT_SPAN_ID: &str = "x-b3-parentspanid";
    pub const B3_SAMPLED: &str = "x-b3-sampled";
    pub const OT_SPAN_CONTEXT: &str = "x-ot-span-context";
}
