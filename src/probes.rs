//! probes.rs — stateless, network-bound reachability primitives
//!
//! Every probe returns a [`ProbeResult`] and never propagates a transport
//! error to its caller: timeouts, connection refusals, and malformed
//! responses are all folded into `success = false` with whatever timing and
//! detail could be captured. None of these functions hold state across
//! calls.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::pki_types::ServerName;
use serde::Deserialize;
use surge_ping::{Client, Config as PingConfig, PingIdentifier, PingSequence};
use tokio::net::TcpStream;
use tokio::time::timeout;

const PING_TIMEOUT: Duration = Duration::from_secs(2);
const TCP_TLS_TIMEOUT: Duration = Duration::from_secs(5);
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const SMART_PLUG_TIMEOUT: Duration = Duration::from_secs(2);

const PUBLIC_IP_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://ipv4.icanhazip.com",
    "https://ipecho.net/plain",
];

/// Outcome of a single probe invocation. `ip` is populated only by probes
/// that resolve an address (public-IP echo, DoH).
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub success: bool,
    pub elapsed_ms: f64,
    pub attempts: u32,
    pub max_attempts: u32,
    pub detail: Option<String>,
    pub ip: Option<String>,
}

impl ProbeResult {
    fn failure(elapsed_ms: f64, attempts: u32, max_attempts: u32, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            elapsed_ms,
            attempts,
            max_attempts,
            detail: Some(detail.into()),
            ip: None,
        }
    }
}

/// Accepts only dotted-quad IPv4 addresses, 0-255 per octet. `Ipv4Addr`'s
/// `FromStr` already enforces this shape, so no hand-rolled parser is
/// needed.
pub fn is_valid_ipv4(candidate: &str) -> bool {
    Ipv4Addr::from_str(candidate.trim()).is_ok()
}

/// Single ICMP echo with a short timeout. A weak LAN signal only — never a
/// readiness input.
pub async fn ping_host(ip: &str) -> ProbeResult {
    let start = Instant::now();

    let Ok(addr) = ip.parse::<IpAddr>() else {
        return ProbeResult::failure(0.0, 0, 1, format!("invalid IP address: {ip}"));
    };

    let outcome = async {
        let client = Client::new(&PingConfig::default())?;
        let mut pinger = client.pinger(addr, PingIdentifier(rand_u16())).await;
        pinger.timeout(PING_TIMEOUT);
        let payload = [0u8; 32];
        pinger.ping(PingSequence(0), &payload).await.map(|_| ())
    }
    .await;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(()) => ProbeResult {
            success: true,
            elapsed_ms,
            attempts: 1,
            max_attempts: 1,
            detail: None,
            ip: None,
        },
        Err(e) => ProbeResult::failure(elapsed_ms, 1, 1, e.to_string()),
    }
}

fn rand_u16() -> u16 {
    rand::random()
}

/// Opens a TCP connection and completes a TLS handshake against `host:port`.
/// Success implies routing, DNS-free L4, and TLS are all functional — the
/// **strong** readiness signal.
pub async fn verify_wan_reachability(host: &str, port: u16) -> ProbeResult {
    let start = Instant::now();

    let outcome = timeout(TCP_TLS_TIMEOUT, handshake(host, port)).await;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(Ok(())) => ProbeResult {
            success: true,
            elapsed_ms,
            attempts: 1,
            max_attempts: 1,
            detail: Some("tls=ok".to_string()),
            ip: None,
        },
        Ok(Err(e)) => ProbeResult::failure(elapsed_ms, 1, 1, e.to_string()),
        Err(_) => ProbeResult::failure(elapsed_ms, 1, 1, "timed out"),
    }
}

async fn handshake(host: &str, port: u16) -> anyhow::Result<()> {
    let ip: IpAddr = host.parse()?;
    let socket_addr = SocketAddr::new(ip, port);
    let tcp = TcpStream::connect(socket_addr).await?;

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));

    // `host` here is an IP literal (1.1.1.1 by default); encode it as an IP
    // SNI so rustls accepts it without a DNS name.
    let server_name = ServerName::IpAddress(ip.into());
    let _stream = connector.connect(server_name, tcp).await?;
    Ok(())
}

/// Tries an ordered list of plaintext IP echo services, returning the first
/// response whose trimmed body passes IPv4 validation.
pub async fn get_public_ip() -> ProbeResult {
    let start = Instant::now();
    let client = match reqwest::Client::builder().timeout(HTTP_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => return ProbeResult::failure(0.0, 0, PUBLIC_IP_SERVICES.len() as u32, e.to_string()),
    };

    let mut attempts = 0u32;
    let mut last_detail = String::from("no services tried");

    for &url in PUBLIC_IP_SERVICES {
        attempts += 1;
        match client.get(url).send().await {
            Ok(resp) => match resp.text().await {
                Ok(body) => {
                    let candidate = body.trim();
                    if is_valid_ipv4(candidate) {
                        return ProbeResult {
                            success: true,
                            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                            attempts,
                            max_attempts: PUBLIC_IP_SERVICES.len() as u32,
                            detail: Some(url.to_string()),
                            ip: Some(candidate.to_string()),
                        };
                    }
                    last_detail = format!("invalid IP from {url}: {candidate:?}");
                }
                Err(e) => last_detail = format!("{url}: {e}"),
            },
            Err(e) => last_detail = format!("{url}: {e}"),
        }
    }

    ProbeResult::failure(
        start.elapsed().as_secs_f64() * 1000.0,
        attempts,
        PUBLIC_IP_SERVICES.len() as u32,
        last_detail,
    )
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    data: String,
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

/// DNS-over-HTTPS lookup against Cloudflare's public resolver. Authoritative
/// external truth of what the record currently resolves to, independent of
/// local cache and of the provider's own API.
pub async fn doh_lookup(hostname: &str) -> ProbeResult {
    let start = Instant::now();

    let client = match reqwest::Client::builder().timeout(HTTP_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => return ProbeResult::failure(0.0, 0, 1, e.to_string()),
    };

    let result = client
        .get("https://cloudflare-dns.com/dns-query")
        .query(&[("name", hostname), ("type", "A")])
        .header("Accept", "application/dns-json")
        .send()
        .await;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    let resp = match result {
        Ok(r) => r,
        Err(e) => return ProbeResult::failure(elapsed_ms, 1, 1, e.to_string()),
    };

    if !resp.status().is_success() {
        return ProbeResult::failure(elapsed_ms, 1, 1, format!("HTTP {}", resp.status()));
    }

    let parsed: DohResponse = match resp.json().await {
        Ok(p) => p,
        Err(e) => return ProbeResult::failure(elapsed_ms, 1, 1, e.to_string()),
    };

    let Some(answer) = parsed.answer.first() else {
        return ProbeResult::failure(elapsed_ms, 1, 1, "no A-record in DoH response");
    };

    if !is_valid_ipv4(&answer.data) {
        return ProbeResult::failure(
            elapsed_ms,
            1,
            1,
            format!("DoH returned invalid IP: {:?}", answer.data),
        );
    }

    ProbeResult {
        success: true,
        elapsed_ms,
        attempts: 1,
        max_attempts: 1,
        detail: None,
        ip: Some(answer.data.trim().to_string()),
    }
}

/// Issues `GET http://{plug_ip}/relay/0?turn={state}` with a short, fixed
/// timeout. Used by the recovery controller — LAN-only, fast-fail
/// semantics, no retries.
pub async fn smart_relay_command(plug_ip: &str, turn_on: bool) -> Result<(), String> {
    let client = reqwest::Client::builder()
        .timeout(SMART_PLUG_TIMEOUT)
        .build()
        .map_err(|e| e.to_string())?;

    let state = if turn_on { "on" } else { "off" };
    let url = format!("http://{plug_ip}/relay/0?turn={state}");

    let resp = client.get(&url).send().await.map_err(|e| e.to_string())?;
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(format!("HTTP {}", resp.status()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ipv4_accepts_dotted_quads() {
        assert!(is_valid_ipv4("203.0.113.5"));
        assert!(is_valid_ipv4(" 203.0.113.5 "));
    }

    #[test]
    fn valid_ipv4_rejects_garbage() {
        assert!(!is_valid_ipv4("not an ip"));
        assert!(!is_valid_ipv4("999.999.999.999"));
        assert!(!is_valid_ipv4(""));
        assert!(!is_valid_ipv4("2001:db8::1"));
    }

    #[tokio::test]
    async fn ping_host_rejects_unparseable_address() {
        let result = ping_host("not-an-ip").await;
        assert!(!result.success);
    }
}
