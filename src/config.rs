//! config.rs — immutable runtime configuration for the control-plane agent
//!
//! Loaded once at startup from the process environment (optionally backed by
//! a local `.env` file), never mutated afterwards. Field names mirror the
//! `CLOUDFLARE_*` / hardware / scheduling environment variables, lower-cased
//! by the `config` crate's environment source.

use std::net::Ipv4Addr;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // ─── Cloudflare-compatible DNS provider ───
    pub cloudflare_api_base_url: String,
    pub cloudflare_api_token: String,
    pub cloudflare_zone_id: String,
    pub cloudflare_dns_name: String,
    #[serde(default = "default_ttl")]
    pub cloudflare_ttl_s: u32,

    // ─── LAN hardware topology ───
    pub router_ip: String,
    pub plug_ip: String,

    // ─── Scheduling ───
    #[serde(default = "default_cycle_interval_s")]
    pub cycle_interval_s: u64,
    #[serde(default = "default_fast_poll_scalar")]
    pub fast_poll_scalar: f64,
    #[serde(default = "default_slow_poll_scalar")]
    pub slow_poll_scalar: f64,
    #[serde(default = "default_jitter_s")]
    pub polling_jitter_s: f64,

    // ─── Cache ───
    #[serde(default = "default_max_cache_age_s")]
    pub max_cache_age_s: f64,

    // ─── Recovery policy inputs ───
    #[serde(default = "default_expected_network_recovery_s")]
    pub expected_network_recovery_s: u64,
    #[serde(default = "default_escalation_buffer_s")]
    pub escalation_buffer_s: u64,
    #[serde(default = "default_reboot_delay_s")]
    pub reboot_delay_s: u64,
    #[serde(default = "default_recovery_cooldown_s")]
    pub recovery_cooldown_s: u64,

    // ─── Feature flags ───
    #[serde(default)]
    pub allow_physical_recovery: bool,
    #[serde(default)]
    pub debug_enabled: bool,
}

fn default_ttl() -> u32 {
    300
}
fn default_cycle_interval_s() -> u64 {
    60
}
fn default_fast_poll_scalar() -> f64 {
    0.25
}
fn default_slow_poll_scalar() -> f64 {
    1.0
}
fn default_jitter_s() -> f64 {
    5.0
}
fn default_max_cache_age_s() -> f64 {
    3600.0
}
fn default_expected_network_recovery_s() -> u64 {
    180
}
fn default_escalation_buffer_s() -> u64 {
    60
}
fn default_reboot_delay_s() -> u64 {
    30
}
fn default_recovery_cooldown_s() -> u64 {
    1800
}

impl Config {
    /// Loads configuration from the process environment, preferring a local
    /// `.env` file if present (development parity with the original agent's
    /// `python-dotenv` usage).
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .separator("__"),
            )
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Hard startup invariants. Violations abort the process before the
    /// supervisor loop begins.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cloudflare_api_token.is_empty() {
            return Err(ConfigError::Missing("CLOUDFLARE_API_TOKEN".into()));
        }
        if self.cloudflare_zone_id.is_empty() {
            return Err(ConfigError::Missing("CLOUDFLARE_ZONE_ID".into()));
        }
        if self.cloudflare_dns_name.is_empty() {
            return Err(ConfigError::Missing("CLOUDFLARE_DNS_NAME".into()));
        }
        if self.router_ip.parse::<Ipv4Addr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "ROUTER_IP is not a valid IPv4 address: {}",
                self.router_ip
            )));
        }
        if self.plug_ip.parse::<Ipv4Addr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "PLUG_IP is not a valid IPv4 address: {}",
                self.plug_ip
            )));
        }

        let slow_poll_interval_s = self.cycle_interval_s as f64 * self.slow_poll_scalar;
        if self.max_cache_age_s < slow_poll_interval_s {
            return Err(ConfigError::Invalid(format!(
                "MAX_CACHE_AGE_S ({}) is shorter than the steady-state polling interval \
                 ({}s); cache would expire before it can be reused",
                self.max_cache_age_s, slow_poll_interval_s
            )));
        }

        Ok(())
    }

    /// True when running inside a container, mirroring the original agent's
    /// `/.dockerenv` detection used to pick the cache directory root.
    pub fn running_in_docker() -> bool {
        Path::new("/.dockerenv").exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            cloudflare_api_base_url: "https://api.cloudflare.com/client/v4".into(),
            cloudflare_api_token: "token".into(),
            cloudflare_zone_id: "zone".into(),
            cloudflare_dns_name: "vpn.example.com".into(),
            cloudflare_ttl_s: 300,
            router_ip: "192.168.1.1".into(),
            plug_ip: "192.168.1.50".into(),
            cycle_interval_s: 60,
            fast_poll_scalar: 0.25,
            slow_poll_scalar: 1.0,
            polling_jitter_s: 5.0,
            max_cache_age_s: 3600.0,
            expected_network_recovery_s: 180,
            escalation_buffer_s: 60,
            reboot_delay_s: 30,
            recovery_cooldown_s: 1800,
            allow_physical_recovery: false,
            debug_enabled: false,
        }
    }

    #[test]
    fn rejects_invalid_router_ip() {
        let mut cfg = base_config();
        cfg.router_ip = "not-an-ip".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_cache_age_shorter_than_slow_poll_interval() {
        let mut cfg = base_config();
        cfg.max_cache_age_s = 10.0;
        cfg.cycle_interval_s = 60;
        cfg.slow_poll_scalar = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_config() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
    }
}
