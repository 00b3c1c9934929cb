//! Route configuration wire model.
//!
//! Serde types mirroring the JSON body served by the discovery service.
//! These are the *source* shape only; semantic validation and compilation
//! into matchable structures happen when a config snapshot is built.

mod route_config;

pub use route_config::{
    CorsConfig, DecoratorConfig, HashPolicyConfig, HeaderMatchConfig, HeaderValueConfig,
    RateLimitActionConfig, RateLimitConfig, RdsConfig, RetryPolicyConfig, RouteConfiguration,
    RoutePriority, RouteSpec, RuntimeFractionConfig, ShadowPolicyConfig, SslRequirement,
    VirtualClusterConfig, VirtualHostConfig, WeightedClusterConfig, WeightedClustersConfig,
};
