//! Error types for configuration building and discovery fetching.

/// Error raised while building a config snapshot from a `RouteConfiguration`.
///
/// At static load time this is fatal; during a dynamic reload the provider
/// records it as an update failure and keeps the previous snapshot.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration violates a structural invariant.
    #[error("config rejected: {0}")]
    Rejected(String),

    /// A statically-referenced cluster is not known to the cluster manager.
    #[error("route config references unknown cluster '{0}'")]
    UnknownCluster(String),

    /// A regex in the configuration failed to compile.
    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl ConfigError {
    /// Create a new rejection with a formatted reason.
    pub fn rejected<S: Into<String>>(reason: S) -> Self {
        Self::Rejected(reason.into())
    }
}

/// Error raised by the discovery fetch path.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// The request could not be sent or the response never arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// The discovery server answered with a non-2xx status.
    #[error("unexpected discovery response status {0}")]
    Status(u16),

    /// The response body could not be parsed into a `RouteConfiguration`.
    #[error("unparseable route configuration: {0}")]
    Parse(String),

    /// No discovery client is configured for the named cluster.
    #[error("no discovery client for cluster '{0}'")]
    NoClient(String),
}
