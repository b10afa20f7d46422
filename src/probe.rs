use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use surge_ping::{
    Client as PingClient, Config as PingConfig, PingIdentifier, PingSequence, SurgeError, ICMP,
};
use tracing::warn;

use crate::models::PingResult;

/// Echo reply received.
pub const RC_OK: i32 = 0;
/// No reply within the timeout.
pub const RC_NO_REPLY: i32 = 1;
/// Resolution, socket, or permission failure.
pub const RC_ERROR: i32 = 2;

/// One reachability check against one host.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, target: &str, timeout: Duration) -> PingResult;
}

/// ICMP echo prober, one request per call. Raw ICMP sockets need elevated
/// permissions on most systems; when a socket cannot be opened the prober
/// still constructs and reports every probe as `RC_ERROR` instead.
pub struct IcmpProber {
    client_v4: Option<PingClient>,
    client_v6: Option<PingClient>,
    resolver: TokioResolver,
}

impl IcmpProber {
    pub fn new() -> Self {
        let client_v4 = PingClient::new(&PingConfig::default())
            .map_err(|e| warn!("ICMPv4 socket unavailable: {}", e))
            .ok();
        let client_v6 = PingClient::new(&PingConfig::builder().kind(ICMP::V6).build())
            .map_err(|e| warn!("ICMPv6 socket unavailable: {}", e))
            .ok();

        let resolver = TokioResolver::builder_with_config(
            ResolverConfig::cloudflare(),
            TokioConnectionProvider::default(),
        )
        .build();

        Self {
            client_v4,
            client_v6,
            resolver,
        }
    }

    async fn resolve(&self, target: &str) -> Result<IpAddr, String> {
        if let Ok(ip) = target.parse::<IpAddr>() {
            return Ok(ip);
        }
        match self.resolver.lookup_ip(target).await {
            Ok(lookup) => lookup.iter().next().ok_or_else(|| "no address records".into()),
            Err(e) => Err(format!("resolution failed: {}", e)),
        }
    }

    fn client_for(&self, ip: IpAddr) -> Option<&PingClient> {
        match ip {
            IpAddr::V4(_) => self.client_v4.as_ref(),
            IpAddr::V6(_) => self.client_v6.as_ref(),
        }
    }

    fn failure(target: &str, rc: i32, error: String) -> PingResult {
        PingResult {
            host: target.to_string(),
            success: false,
            rc,
            error: Some(error),
        }
    }
}

impl Default for IcmpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for IcmpProber {
    async fn probe(&self, target: &str, timeout: Duration) -> PingResult {
        let ip = match self.resolve(target).await {
            Ok(ip) => ip,
            Err(e) => return Self::failure(target, RC_ERROR, e),
        };
        let Some(client) = self.client_for(ip) else {
            return Self::failure(target, RC_ERROR, "icmp socket unavailable".into());
        };

        let payload = [0u8; 56];
        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(timeout);

        match pinger.ping(PingSequence(0), &payload).await {
            Ok((_, _latency)) => PingResult {
                host: target.to_string(),
                success: true,
                rc: RC_OK,
                error: None,
            },
            Err(SurgeError::Timeout { .. }) => {
                Self::failure(target, RC_NO_REPLY, "timeout".into())
            }
            Err(e) => Self::failure(target, RC_ERROR, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unresolvable_name_is_an_error_result() {
        let prober = IcmpProber::new();
        // empty labels make the name invalid before any lookup happens
        let res = prober.probe("not..a..host", Duration::from_secs(1)).await;

        assert_eq!(res.host, "not..a..host");
        assert!(!res.success);
        assert_eq!(res.rc, RC_ERROR);
        assert!(res.error.is_some());
    }

    #[tokio::test]
    async fn loopback_probe_is_always_well_formed() {
        let prober = IcmpProber::new();
        for target in ["127.0.0.1", "::1"] {
            let res = prober.probe(target, Duration::from_secs(1)).await;
            assert_eq!(res.host, target);
            if res.success {
                assert_eq!(res.rc, RC_OK);
                assert!(res.error.is_none());
            } else {
                // unprivileged environments land here
                assert_ne!(res.rc, RC_OK);
                assert!(res.error.is_some());
            }
        }
    }
}
