//! Provider sharing and admin-plane introspection.
//!
//! Providers are keyed by `(discovery_cluster, route_config_name)` and held
//! weakly: every listener declaring the pair shares one provider, and the
//! provider dies with its last listener.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde::Serialize;

use crate::config::RdsConfig;
use crate::error::ConfigError;
use crate::init::InitManager;
use crate::runtime::RuntimeHandle;
use crate::stats::Scope;
use crate::upstream::ClusterManager;

use super::rds::RdsProvider;
use super::LocalInfo;

/// Admin dump entry for one provider. Field order is part of the admin
/// interface contract.
#[derive(Debug, Serialize)]
pub struct ProviderDump {
    pub version_info: String,
    pub route_config_name: String,
    pub cluster_name: String,
    pub route_table_dump: serde_json::Value,
}

/// Owns the provider map and creates or revives providers on demand.
pub struct ProviderManager {
    providers: DashMap<(String, String), Weak<RdsProvider>>,
    cluster_manager: Arc<dyn ClusterManager>,
    runtime: RuntimeHandle,
    local_info: LocalInfo,
}

impl ProviderManager {
    pub fn new(
        cluster_manager: Arc<dyn ClusterManager>,
        runtime: RuntimeHandle,
        local_info: LocalInfo,
    ) -> Self {
        Self {
            providers: DashMap::new(),
            cluster_manager,
            runtime,
            local_info,
        }
    }

    /// Returns the provider for this subscription, creating and starting
    /// it if no live one exists.
    pub fn get_or_create(
        &self,
        rds: &RdsConfig,
        scope: &Scope,
        init_manager: &InitManager,
    ) -> Result<Arc<RdsProvider>, ConfigError> {
        let key = (rds.cluster.clone(), rds.route_config_name.clone());

        match self.providers.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if let Some(existing) = occupied.get().upgrade() {
                    return Ok(existing);
                }
                let provider = self.create(rds, scope, init_manager)?;
                occupied.insert(Arc::downgrade(&provider));
                Ok(provider)
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let provider = self.create(rds, scope, init_manager)?;
                vacant.insert(Arc::downgrade(&provider));
                Ok(provider)
            }
        }
    }

    fn create(
        &self,
        rds: &RdsConfig,
        scope: &Scope,
        init_manager: &InitManager,
    ) -> Result<Arc<RdsProvider>, ConfigError> {
        let provider = RdsProvider::new(
            rds,
            &self.local_info,
            &*self.cluster_manager,
            self.runtime.clone(),
            scope,
            init_manager,
        )?;
        provider.start();
        tracing::info!(
            cluster = %rds.cluster,
            route_config = %rds.route_config_name,
            "created route config provider"
        );
        Ok(provider)
    }

    /// All live providers; entries whose last listener dropped are pruned.
    pub fn active_providers(&self) -> Vec<Arc<RdsProvider>> {
        let mut live = Vec::new();
        self.providers.retain(|_, weak| match weak.upgrade() {
            Some(provider) => {
                live.push(provider);
                true
            }
            None => false,
        });
        live.sort_by(|a, b| a.route_config_name().cmp(b.route_config_name()));
        live
    }

    /// Dump entries for the admin plane, optionally filtered by route
    /// config name.
    pub fn dump(&self, route_config_name: Option<&str>) -> Vec<ProviderDump> {
        self.active_providers()
            .into_iter()
            .filter(|p| route_config_name.is_none_or(|name| p.route_config_name() == name))
            .map(|p| {
                let table = serde_json::to_value(p.config().route_table())
                    .unwrap_or(serde_json::Value::Null);
                ProviderDump {
                    version_info: p.version_info(),
                    route_config_name: p.route_config_name().to_string(),
                    cluster_name: p.cluster_name().to_string(),
                    route_table_dump: table,
                }
            })
            .collect()
    }
}
