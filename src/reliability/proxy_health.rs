//! Best-effort proxy health probe
//!
//! A quick reachability check before routing session traffic through an
//! external proxy. Never fails: any error is reported as unhealthy.

use log::{debug, warn};
use std::time::Duration;

/// Echo endpoint used to confirm outbound connectivity through a proxy.
pub const ECHO_ENDPOINT: &str = "https://api.ipify.org";

const PROBE_DEADLINE: Duration = Duration::from_secs(5);

/// Probe the given endpoint and report whether it answered in time.
///
/// # Arguments
/// * `client` - reqwest client, optionally configured with the proxy under test
/// * `endpoint` - echo endpoint URL ([`ECHO_ENDPOINT`] in production)
pub async fn probe_proxy_health(client: &reqwest::Client, endpoint: &str) -> bool {
    let request = client.get(endpoint).timeout(PROBE_DEADLINE).send();
    match request.await {
        Ok(response) if response.status().is_success() => {
            debug!("Proxy health probe succeeded against {endpoint}");
            true
        }
        Ok(response) => {
            warn!(
                "Proxy health probe got HTTP {} from {endpoint}",
                response.status()
            );
            false
        }
        Err(e) => {
            warn!("Proxy health probe failed against {endpoint}: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn healthy_endpoint_reports_true() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body("203.0.113.7")
            .create_async()
            .await;

        let client = reqwest::Client::new();
        assert!(probe_proxy_health(&client, &server.url()).await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_reports_false() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(502)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        assert!(!probe_proxy_health(&client, &server.url()).await);
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_false_without_error() {
        let client = reqwest::Client::new();
        // Nothing listens on this port; the probe must swallow the failure.
        assert!(!probe_proxy_health(&client, "http://127.0.0.1:1/").await);
    }
}
