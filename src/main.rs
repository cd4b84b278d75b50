mod audit;
mod bootstrap;
mod cache;
mod config;
mod controller;
mod ddns;
mod error;
mod probes;
mod readiness;
mod recovery;
mod recovery_policy;
mod scheduler;
mod supervisor;
mod telemetry;

use std::path::PathBuf;

use anyhow::{Context, Result};

use audit::LoggingAuditSink;
use config::Config;
use controller::Controller;
use ddns::CloudflareClient;
use readiness::ReadinessController;
use recovery::RecoveryController;
use recovery_policy::RecoveryPolicy;
use scheduler::SchedulingPolicy;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("loading configuration")?;

    let filter = if config.debug_enabled { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_default())
        .init();

    telemetry::emit("🚀", "MAIN", "STARTING", "control-plane agent", None);

    let capabilities = bootstrap::bootstrap(&config)
        .await
        .context("startup invariant checks failed")?;

    let cache_dir: PathBuf = cache::cache_dir();

    telemetry::emit(
        "🧭",
        "STARTUP",
        "SUMMARY",
        &format!("dns={}", config.cloudflare_dns_name),
        Some(&format!(
            "router={} | relay={} | zone={} | docker={} | relay_seen_up={}",
            config.router_ip,
            config.plug_ip,
            config.cloudflare_zone_id,
            Config::running_in_docker(),
            capabilities.physical_recovery_available,
        )),
    );

    let cloudflare = CloudflareClient::new(
        config.cloudflare_api_base_url.clone(),
        config.cloudflare_api_token.clone(),
        config.cloudflare_zone_id.clone(),
        config.cloudflare_dns_name.clone(),
        config.cloudflare_ttl_s,
    );

    let recovery_policy = RecoveryPolicy::new(&config);
    let recovery = RecoveryController::new(recovery_policy, config.allow_physical_recovery, config.plug_ip.clone());

    let controller = Controller::new(
        ReadinessController::new(),
        recovery,
        recovery_policy,
        cloudflare,
        Box::new(LoggingAuditSink),
        cache_dir,
        config.router_ip.clone(),
        config.max_cache_age_s,
    );

    let policy = SchedulingPolicy::new(&config);

    telemetry::emit("🚀", "MAIN", "READY", "entering control loop", None);

    supervisor::run_forever(controller, policy).await;
}
