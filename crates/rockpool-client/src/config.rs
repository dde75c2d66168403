//! Client configuration: global options layered with per-service overrides.
//!
//! The host application constructs one [`ClientConfig`] at setup; each
//! service resolves its effective options by overlaying its own entry on
//! the global one. List-valued options concatenate instead of replacing,
//! so a service keeps the globally whitelisted operators.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use rockpool_store::StoreOptions;

use crate::events::EventOptions;

/// Options for one service, all optional so the global layer can fill
/// the gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Field holding the permanent identity.
    pub id_field: Option<String>,
    /// `$limit` injected into finds that carry none.
    pub default_limit: Option<usize>,
    /// Extra operator names allowed in local queries.
    pub whitelist: Vec<String>,
    /// Query keys meant for the server only.
    pub params_for_server: Vec<String>,
    /// Debounce window for event reconciliation, in milliseconds.
    pub debounce_events_ms: Option<u64>,
    /// Force event flushes under continuous arrival.
    pub debounce_events_guarantee: Option<bool>,
    /// Whether this service hydrates from a server-rendered snapshot.
    pub ssr: Option<bool>,
}

/// Global configuration plus per-service overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    pub global: ServiceConfig,
    pub services: HashMap<String, ServiceConfig>,
}

/// The effective options for one service after layering.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub store: StoreOptions,
    pub events: EventOptions,
}

impl ClientConfig {
    /// Resolve the effective options for a service path.
    pub fn resolve(&self, path: &str) -> ResolvedConfig {
        let service = self.services.get(path).cloned().unwrap_or_default();
        let defaults = StoreOptions::default();
        let event_defaults = EventOptions::default();

        let mut whitelist = service.whitelist;
        whitelist.extend(self.global.whitelist.iter().cloned());
        let mut params_for_server = service.params_for_server;
        params_for_server.extend(self.global.params_for_server.iter().cloned());

        ResolvedConfig {
            store: StoreOptions {
                id_field: service
                    .id_field
                    .or_else(|| self.global.id_field.clone())
                    .unwrap_or(defaults.id_field),
                default_limit: service
                    .default_limit
                    .or(self.global.default_limit)
                    .unwrap_or(defaults.default_limit),
                whitelist,
                params_for_server,
                ssr: service.ssr.or(self.global.ssr).unwrap_or(defaults.ssr),
                ssr_ttl_ms: defaults.ssr_ttl_ms,
            },
            events: EventOptions {
                debounce_ms: service
                    .debounce_events_ms
                    .or(self.global.debounce_events_ms)
                    .unwrap_or(event_defaults.debounce_ms),
                guarantee: service
                    .debounce_events_guarantee
                    .or(self.global.debounce_events_guarantee)
                    .unwrap_or(event_defaults.guarantee),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn service_options_override_global_ones() {
        let mut config = ClientConfig {
            global: ServiceConfig {
                id_field: Some("uuid".to_string()),
                default_limit: Some(25),
                ..ServiceConfig::default()
            },
            services: HashMap::new(),
        };
        config.services.insert(
            "messages".to_string(),
            ServiceConfig {
                default_limit: Some(50),
                ..ServiceConfig::default()
            },
        );

        let resolved = config.resolve("messages");
        assert_eq!(resolved.store.id_field, "uuid");
        assert_eq!(resolved.store.default_limit, 50);
    }

    #[test]
    fn unknown_service_falls_back_to_global_then_defaults() {
        let config = ClientConfig::default();
        let resolved = config.resolve("anything");
        assert_eq!(resolved.store.id_field, "id");
        assert_eq!(resolved.store.default_limit, 10);
        assert_eq!(resolved.events.debounce_ms, 20);
    }

    #[test]
    fn whitelists_concatenate_across_layers() {
        let mut config = ClientConfig {
            global: ServiceConfig {
                whitelist: vec!["$fuzzy".to_string()],
                ..ServiceConfig::default()
            },
            services: HashMap::new(),
        };
        config.services.insert(
            "messages".to_string(),
            ServiceConfig {
                whitelist: vec!["$near".to_string()],
                ..ServiceConfig::default()
            },
        );

        let resolved = config.resolve("messages");
        assert!(resolved.store.whitelist.contains(&"$near".to_string()));
        assert!(resolved.store.whitelist.contains(&"$fuzzy".to_string()));
    }
}
