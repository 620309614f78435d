//! Gateway configuration, loaded from a TOML file at the path the backend
//! spawn contract (spec §6) already commits the gateway to accepting on its
//! own command line.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// `[service]` — backend spawn contract, XMPP identity, and transport mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Path to the backend executable, passed to `exec` on every spawn.
    pub backend: String,
    /// The gateway's own XMPP domain, used to build every outbound JID.
    pub jid: String,
    /// Upstream XMPP host (component mode) or bind host (server mode).
    pub server: String,
    /// Upstream XMPP port (component mode) or bind port (server mode).
    pub port: u16,
    /// Run as a full XMPP server instead of an external component.
    pub server_mode: bool,
    /// Component handshake secret (XEP-0114). Ignored in server mode.
    pub password: String,
    /// Optional PKCS#12 bundle path for TLS.
    pub cert: Option<String>,
    /// Password for `cert`, if set.
    pub cert_password: Option<String>,
    /// Selects `@`→`%` rewrite (`false`) vs. XEP-0106 node-escaping (`true`)
    /// for legacy names with no roster entry.
    pub jid_escaping: bool,
    /// Host the backend listener binds to; backends connect back here.
    pub backend_host: String,
    /// Port the backend listener binds to.
    pub backend_port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend: String::new(),
            jid: String::new(),
            server: "localhost".into(),
            port: 5222,
            server_mode: false,
            password: String::new(),
            cert: None,
            cert_password: None,
            jid_escaping: true,
            backend_host: "localhost".into(),
            backend_port: 10000,
        }
    }
}

/// `[features]` — optional behavior toggles.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Enable raw-IQ passthrough to backends.
    pub rawxml: bool,
}

/// One statically-configured legacy login, keyed by the owning bare JID in
/// `[users."alice@gw.example.com"]`. A real deployment backs this with an
/// external account store (spec §1); this section exists so the binary has
/// something to load without one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntryConfig {
    pub legacy_name: String,
    pub password: String,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub service: ServiceConfig,
    pub features: FeaturesConfig,
    pub users: HashMap<String, UserEntryConfig>,
}

impl GatewayConfig {
    /// Load and parse a configuration file from `path`.
    ///
    /// Any failure here is the spec §7 "configuration error" category and
    /// is fatal at startup — the caller (`xgate-server`) is expected to
    /// exit non-zero rather than retry.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: GatewayConfig = toml::from_str(&content)
            .map_err(|e| GatewayError::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.service.backend.trim().is_empty() {
            return Err(GatewayError::Config(
                "service.backend must name a backend executable".into(),
            ));
        }
        if self.service.jid.trim().is_empty() {
            return Err(GatewayError::Config(
                "service.jid must name the gateway's XMPP domain".into(),
            ));
        }
        Ok(())
    }
}

/// Per-user settings consulted by the conversation router.
///
/// Backed by the external roster/account store (spec §1 "out of scope,
/// treated as external collaborators"), not the config file — this trait is
/// the seam `xgate-core` needs without owning that storage.
pub trait UserSettings: Send + Sync {
    /// `send_headlines`: `true` preserves legacy headline messages as XMPP
    /// headlines instead of downgrading them to `chat`.
    fn send_headlines(&self, user: &str) -> bool;

    /// `enable_notifications`: reserved extension point (spec §9 Open
    /// Questions) — consulted but currently only logged, never acted on.
    fn enable_notifications(&self, user: &str) -> bool;
}

/// A `UserSettings` that answers every query with the legacy default
/// (`"0"`, i.e. `false`). Useful for tests and for a gateway with no
/// backing account store configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultUserSettings;

impl UserSettings for DefaultUserSettings {
    fn send_headlines(&self, _user: &str) -> bool {
        false
    }

    fn enable_notifications(&self, _user: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_backend_path() {
        let config = GatewayConfig {
            service: ServiceConfig {
                jid: "gw.example.com".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_minimal_valid_config() {
        let config = GatewayConfig {
            service: ServiceConfig {
                backend: "/usr/bin/spectrum2-legacy-backend".into(),
                jid: "gw.example.com".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_from_toml() {
        let toml_src = r#"
            [service]
            backend = "/usr/bin/legacy-backend"
            jid = "gw.example.com"
            jid_escaping = true

            [features]
            rawxml = true
        "#;
        let config: GatewayConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.service.backend, "/usr/bin/legacy-backend");
        assert!(config.service.jid_escaping);
        assert!(config.features.rawxml);
        assert_eq!(config.service.backend_port, 10000);
    }
}
