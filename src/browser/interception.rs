//! Request interception for worker pages
//!
//! Travel sites carry heavy ad and analytics payloads that slow page
//! readiness and burn proxy bandwidth. A Fetch-domain route filter aborts
//! requests against a fixed block list before they leave the browser.

use anyhow::{Context, Result, anyhow};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::page::Page;
use chromiumoxide_cdp::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use futures_util::StreamExt;
use log::{debug, trace};

/// Ad and tracking hosts aborted when blocking is enabled.
const BLOCKED_DOMAINS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "googletagmanager.com",
    "google-analytics.com",
    "adservice.google.com",
    "hotjar.com",
    "mouseflow.com",
    "connect.facebook.net",
    "amplitude.com",
    "segment.io",
    "mixpanel.com",
    "criteo.com",
    "taboola.com",
    "outbrain.com",
];

/// What the route filter drops.
#[derive(Debug, Clone, Copy)]
pub struct InterceptionPolicy {
    pub block_ads: bool,
    pub block_analytics: bool,
    /// Images stay enabled for workers: the vision model reads them.
    pub block_images: bool,
    pub log_blocked: bool,
}

impl Default for InterceptionPolicy {
    fn default() -> Self {
        Self {
            block_ads: true,
            block_analytics: true,
            block_images: false,
            log_blocked: false,
        }
    }
}

impl InterceptionPolicy {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.block_ads || self.block_analytics || self.block_images
    }
}

/// Pure block decision, split out for tests.
fn should_block(url: &str, resource_type: &ResourceType, policy: &InterceptionPolicy) -> bool {
    if (policy.block_ads || policy.block_analytics)
        && BLOCKED_DOMAINS.iter().any(|domain| url.contains(domain))
    {
        return true;
    }
    if policy.block_images && matches!(resource_type, ResourceType::Image) {
        return true;
    }
    false
}

/// Install the route filter on a page.
///
/// Spawns a listener task that continues or aborts every paused request.
/// The task ends when the page's event stream closes.
pub async fn install_request_interception(
    page: &Page,
    policy: &InterceptionPolicy,
) -> Result<()> {
    if !policy.is_active() {
        trace!("Request interception disabled by policy");
        return Ok(());
    }

    let mut paused_events = page
        .event_listener::<EventRequestPaused>()
        .await
        .context("Failed to subscribe to paused requests")?;

    page.execute(EnableParams::default())
        .await
        .context("Failed to enable request interception")?;

    let page = page.clone();
    let policy = *policy;
    tokio::task::spawn(async move {
        while let Some(event) = paused_events.next().await {
            let url = event.request.url.clone();
            if should_block(&url, &event.resource_type, &policy) {
                if policy.log_blocked {
                    debug!("Blocking request: {url}");
                }
                let fail = FailRequestParams::builder()
                    .request_id(event.request_id.clone())
                    .error_reason(ErrorReason::Aborted)
                    .build()
                    .map_err(|e| anyhow!("{e}"));
                match fail {
                    Ok(params) => {
                        let _ = page.execute(params).await;
                    }
                    Err(e) => log::warn!("Failed to build abort for {url}: {e}"),
                }
            } else {
                let resume = ContinueRequestParams::builder()
                    .request_id(event.request_id.clone())
                    .build()
                    .map_err(|e| anyhow!("{e}"));
                match resume {
                    Ok(params) => {
                        let _ = page.execute(params).await;
                    }
                    Err(e) => log::warn!("Failed to build continue for {url}: {e}"),
                }
            }
        }
        trace!("Request interception listener finished");
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_domains_are_blocked() {
        let policy = InterceptionPolicy::default();
        assert!(should_block(
            "https://securepubads.doubleclick.net/gampad/ads",
            &ResourceType::Script,
            &policy,
        ));
        assert!(should_block(
            "https://www.googletagmanager.com/gtm.js",
            &ResourceType::Script,
            &policy,
        ));
    }

    #[test]
    fn first_party_content_passes() {
        let policy = InterceptionPolicy::default();
        assert!(!should_block(
            "https://www.example-travel.com/results",
            &ResourceType::Document,
            &policy,
        ));
        // Images pass under the default worker policy.
        assert!(!should_block(
            "https://www.example-travel.com/logo.png",
            &ResourceType::Image,
            &policy,
        ));
    }

    #[test]
    fn image_blocking_is_opt_in() {
        let policy = InterceptionPolicy {
            block_images: true,
            ..InterceptionPolicy::default()
        };
        assert!(should_block(
            "https://cdn.example.com/banner.jpg",
            &ResourceType::Image,
            &policy,
        ));
    }

    #[test]
    fn inactive_policy_blocks_nothing() {
        let policy = InterceptionPolicy {
            block_ads: false,
            block_analytics: false,
            block_images: false,
            log_blocked: false,
        };
        assert!(!policy.is_active());
        assert!(!should_block(
            "https://doubleclick.net/ad",
            &ResourceType::Script,
            &policy,
        ));
    }
}
