//! ddns.rs — Cloudflare client and the three-tier reconciliation engine
//!
//! This is the single authoritative path for DNS mutation. It is
//! deliberately layered to minimize both API calls and write risk:
//!
//! L1: local cache — fast no-op on a fresh, matching entry
//! L2: DoH — authoritative external truth, no mutation
//! L3: targeted Cloudflare update — only on confirmed drift

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::cache::IpCache;
use crate::error::DnsError;
use crate::probes::doh_lookup;
use crate::telemetry;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const RECORD_TYPE: &str = "A";

/// Thin wrapper over the Cloudflare v4 API surface this agent needs:
/// listing a single A-record by name, and patching its content.
pub struct CloudflareClient {
    http: reqwest::Client,
    api_base_url: String,
    api_token: String,
    zone_id: String,
    pub dns_name: String,
    pub ttl: u32,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ListRecordsResponse {
    result: Vec<DnsRecord>,
}

impl CloudflareClient {
    pub fn new(
        api_base_url: String,
        api_token: String,
        zone_id: String,
        dns_name: String,
        ttl: u32,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .expect("reqwest client with static config never fails to build"),
            api_base_url,
            api_token,
            zone_id,
            dns_name,
            ttl,
        }
    }

    async fn find_record(&self) -> Result<DnsRecord, DnsError> {
        let url = format!(
            "{}/zones/{}/dns_records?name={}&type={}",
            self.api_base_url, self.zone_id, self.dns_name, RECORD_TYPE
        );

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        let parsed: ListRecordsResponse = resp.error_for_status()?.json().await?;

        match parsed.result.len() {
            0 => Err(DnsError::RecordNotFound {
                hostname: self.dns_name.clone(),
                zone_id: self.zone_id.clone(),
            }),
            1 => Ok(parsed.result.into_iter().next().unwrap()),
            _ => Err(DnsError::AmbiguousRecord {
                hostname: self.dns_name.clone(),
            }),
        }
    }

    /// Replace the A-record's content with `ip`. Fails closed on zero or
    /// more than one matching record — ambiguity is never guessed past.
    pub async fn update_dns(&self, ip: &str) -> Result<f64, DnsError> {
        let start = Instant::now();
        let record = self.find_record().await?;

        if record.content == ip {
            return Ok(start.elapsed().as_secs_f64() * 1000.0);
        }

        let url = format!(
            "{}/zones/{}/dns_records/{}",
            self.api_base_url, self.zone_id, record.id
        );

        let body = serde_json::json!({
            "type": RECORD_TYPE,
            "name": self.dns_name,
            "content": ip,
            "ttl": self.ttl,
            "proxied": false,
        });

        let resp = self
            .http
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(DnsError::UpdateFailed(format!(
                "HTTP {} updating {}",
                resp.status(),
                self.dns_name
            )));
        }

        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }
}

/// Reconcile Cloudflare DNS against `public_ip`, only ever called while
/// readiness is `Ready`. Idempotent and mutation-gated: a write happens
/// only when DoH itself disagrees with `public_ip`.
pub async fn reconcile_dns_if_needed(
    client: &CloudflareClient,
    cache_dir: &Path,
    max_cache_age_s: f64,
    public_ip: &str,
) -> Result<(), DnsError> {
    let ip_cache = IpCache::new(cache_dir);
    let cache = ip_cache.load();

    let cache_fresh = cache.hit && cache.age_s <= max_cache_age_s;
    let cache_match = cache_fresh && cache.ip.as_deref() == Some(public_ip);

    let (cache_state, emoji) = if !cache.hit {
        ("MISS", "🔴")
    } else if !cache_fresh {
        ("EXPIRED", "🟠")
    } else if !cache_match {
        ("MISMATCH", "🟡")
    } else {
        ("HIT", "🟢")
    };

    telemetry::emit(
        emoji,
        "CACHE",
        cache_state,
        &if cache.hit {
            format!("age={:.0}s", cache.age_s)
        } else {
            "no cache".to_string()
        },
        cache.hit.then(|| format!("rtt={:.1}ms", cache.elapsed_ms)).as_deref(),
    );

    if cache_match {
        telemetry::emit("🌐", "DDNS", "NO-OP", "cache=hit", None);
        return Ok(());
    }

    let doh = doh_lookup(&client.dns_name).await;

    if doh.success && doh.ip.as_deref() == Some(public_ip) {
        telemetry::emit(
            "🟢",
            "DNS",
            "VERIFIED",
            &format!("ip={}", doh.ip.unwrap_or_default()),
            Some(&format!("rtt={:.0}ms", doh.elapsed_ms)),
        );

        if let Err(e) = ip_cache.store(public_ip) {
            telemetry::emit("🔴", "CACHE", "WRITE_FAILED", &e.to_string(), None);
        } else {
            telemetry::emit("🟢", "CACHE", "REFRESHED", &format!("ttl={max_cache_age_s}s"), None);
        }

        telemetry::emit("🌐", "DDNS", "NO-OP", "doh=verified", None);
        return Ok(());
    }

    match client.update_dns(public_ip).await {
        Ok(elapsed_ms) => {
            if let Err(e) = ip_cache.store(public_ip) {
                telemetry::emit("🔴", "CACHE", "WRITE_FAILED", &e.to_string(), None);
            }

            telemetry::emit(
                "🟢",
                "CLOUDFLARE",
                "UPDATED",
                &format!("dns={}", client.dns_name),
                Some(&format!(
                    "rtt={elapsed_ms:.0}ms | desired={public_ip} | ttl={}s",
                    client.ttl
                )),
            );
            telemetry::emit("🟢", "CACHE", "REFRESHED", &format!("ttl={max_cache_age_s}s"), None);
            telemetry::emit("🌐", "DDNS", "UPDATED", "reason=ip-mismatch", None);
            Ok(())
        }
        Err(e) => {
            telemetry::emit("🔴", "CLOUDFLARE", "UPDATE_FAILED", &e.to_string(), None);
            telemetry::emit("🌐", "DDNS", "FAILED", "reason=update-error", None);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_carries_configured_dns_name_and_ttl() {
        let client = CloudflareClient::new(
            "https://api.cloudflare.com/client/v4".to_string(),
            "token".to_string(),
            "zone".to_string(),
            "home.example.com".to_string(),
            300,
        );
        assert_eq!(client.dns_name, "home.example.com");
        assert_eq!(client.ttl, 300);
    }
}
