//! error.rs — explicit error taxonomy for the control-plane agent
//!
//! Mirrors the original agent's exception kinds (`DNSRecordNotFound`,
//! `DNSUpdateFailed`) as typed, non-panicking `Result` values instead of
//! raised exceptions.

use thiserror::Error;

/// Errors surfaced by the DDNS reconciliation engine.
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("no A-record found for {hostname} (zone={zone_id})")]
    RecordNotFound { hostname: String, zone_id: String },

    #[error("more than one A-record matches {hostname}; refusing to guess")]
    AmbiguousRecord { hostname: String },

    #[error("failed to update DNS record: {0}")]
    UpdateFailed(String),

    #[error("DNS provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Errors surfaced while loading or validating `Config`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Source(#[from] config::ConfigError),
}

/// Errors surfaced by the best-effort audit sink. Never fatal.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Collapsed per-cycle outcome for the supervisor loop.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Dns(#[from] DnsError),
}
