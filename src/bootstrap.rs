//! bootstrap.rs — startup invariant checks and runtime capability discovery
//!
//! Split into two halves deliberately: `validate_invariants` is a hard
//! fail-fast check of logical invariants that would otherwise make the
//! control loop misbehave silently (a too-short cache TTL, for instance).
//! `discover_runtime_capabilities` is soft — failures are logged but never
//! abort startup, since recovery itself may be what restores the missing
//! capability.

use crate::config::Config;
use crate::error::ConfigError;
use crate::probes::ping_host;
use crate::telemetry;

/// Observed runtime capabilities, derived once at startup for diagnostic
/// telemetry only. The recovery controller re-checks relay reachability on
/// every cycle rather than trusting this snapshot, since a relay that is
/// down at boot may come back while the agent is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvCapabilities {
    pub physical_recovery_available: bool,
}

/// Validate logical invariants and probe the local hardware topology.
/// Returns the derived capabilities or a hard configuration error.
pub async fn bootstrap(config: &Config) -> Result<EnvCapabilities, ConfigError> {
    validate_invariants(config)?;
    Ok(discover_runtime_capabilities(config).await)
}

fn validate_invariants(config: &Config) -> Result<(), ConfigError> {
    let slow_poll_interval_s = config.cycle_interval_s as f64 * config.slow_poll_scalar;
    if config.max_cache_age_s < slow_poll_interval_s {
        return Err(ConfigError::Invalid(format!(
            "max_cache_age_s ({}) is shorter than the steady-state polling interval ({slow_poll_interval_s}); \
             cache will expire before it can be reused",
            config.max_cache_age_s
        )));
    }
    Ok(())
}

async fn discover_runtime_capabilities(config: &Config) -> EnvCapabilities {
    let router_ip = config.router_ip.to_string();
    let plug_ip = config.plug_ip.to_string();

    let lan_reachable = ping_host(&router_ip).await;
    telemetry::emit(
        if lan_reachable.success { "🟢" } else { "🟡" },
        "BOOTSTRAP",
        if lan_reachable.success { "ROUTER_UP" } else { "ROUTER_DOWN" },
        &format!("ip={router_ip}"),
        None,
    );

    let plug_reachable = ping_host(&plug_ip).await;
    telemetry::emit(
        if plug_reachable.success { "🟢" } else { "🟡" },
        "BOOTSTRAP",
        if plug_reachable.success { "PLUG_UP" } else { "PLUG_DOWN" },
        &format!("ip={plug_ip}"),
        None,
    );

    let physical_recovery_available = config.allow_physical_recovery && plug_reachable.success;

    if !physical_recovery_available {
        telemetry::emit("🟡", "BOOTSTRAP", "RECOVERY_DISABLED", "physical recovery unavailable", None);
    }

    EnvCapabilities {
        physical_recovery_available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn base_config() -> Config {
        Config {
            cloudflare_api_base_url: "https://api.cloudflare.com/client/v4".to_string(),
            cloudflare_api_token: "token".to_string(),
            cloudflare_zone_id: "zone".to_string(),
            cloudflare_dns_name: "home.example.com".to_string(),
            cloudflare_ttl_s: 300,
            router_ip: "192.168.1.1".to_string(),
            plug_ip: "192.168.1.2".to_string(),
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
    fn rejects_cache_shorter_than_slow_poll_interval() {
        let mut config = base_config();
        config.max_cache_age_s = 10.0;
        assert!(validate_invariants(&config).is_err());
    }

    #[test]
    fn accepts_cache_at_least_as_long_as_slow_poll_interval() {
        let config = base_config();
        assert!(validate_invariants(&config).is_ok());
    }
}
