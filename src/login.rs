//! Login execution: reachability check, substitution, portal request

use crate::http::Transport;
use crate::networks::NetworkProfile;
use crate::placeholder::{resolve_profile, Resolver, Substitutions};

/// Endpoint used to detect working internet access
#[derive(Debug, Clone, PartialEq)]
pub struct Reachability {
    pub url: String,
    pub expected_status: u16,
}

impl Default for Reachability {
    fn default() -> Self {
        Self {
            url: "http://gstatic.com/generate_204".to_string(),
            expected_status: 204,
        }
    }
}

/// A portal accepted the login iff it answered 2xx
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

pub struct LoginExecutor {
    transport: Box<dyn Transport>,
    resolver: Box<dyn Resolver>,
    reachability: Reachability,
}

impl LoginExecutor {
    pub fn new(
        transport: Box<dyn Transport>,
        resolver: Box<dyn Resolver>,
        reachability: Reachability,
    ) -> Self {
        Self {
            transport,
            resolver,
            reachability,
        }
    }

    /// True when the probe endpoint answers with the expected status
    pub async fn has_internet_access(&self) -> bool {
        match self.transport.probe(&self.reachability.url).await {
            Ok(status) => {
                tracing::debug!("Reachability probe returned {}", status);
                status == self.reachability.expected_status
            }
            Err(e) => {
                tracing::debug!("Reachability probe failed: {:#}", e);
                false
            }
        }
    }

    /// Log into `ssid` using `profile`.
    ///
    /// Returns immediately when already online. `bssid_hint` is used for
    /// `$ap_mac` when the caller already knows the access point.
    pub async fn login(
        &self,
        ssid: &str,
        profile: &NetworkProfile,
        bssid_hint: Option<&str>,
    ) -> bool {
        if self.has_internet_access().await {
            tracing::info!("[{}] Already have internet access", ssid);
            return true;
        }

        let mut subs = Substitutions::new(self.resolver.as_ref(), bssid_hint);
        let request = match resolve_profile(profile, &mut subs).await {
            Ok(request) => request,
            Err(e) => {
                tracing::error!("[{}] Could not build login request: {}", ssid, e);
                return false;
            }
        };

        tracing::debug!("[{}] Sending {} {}", ssid, request.method, request.url);
        match self.transport.send(&request).await {
            Ok(status) if is_success(status) => {
                tracing::info!("[{}] Login succeeded (status {})", ssid, status);
                true
            }
            Ok(status) => {
                tracing::warn!("[{}] Login failed (status {})", ssid, status);
                false
            }
            Err(e) => {
                tracing::warn!("[{}] Login request failed: {:#}", ssid, e);
                false
            }
        }
    }
}
