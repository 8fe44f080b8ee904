//! Placeholder substitution for login request templates
//!
//! `$ap_mac` expands to the BSSID of the associated access point and `$mac`
//! to the client's own hardware address. Both lookups may need system calls,
//! so they only run when a template actually contains the token.

use crate::error::{NetloginError, NetloginResult};
use crate::networks::{NetworkProfile, RequestBody};
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub const AP_MAC_TOKEN: &str = "$ap_mac";
pub const MAC_TOKEN: &str = "$mac";

static MAC_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([0-9a-f]{2}:){5}[0-9a-f]{2}$").ok());

#[cfg(target_os = "linux")]
const SYS_CLASS_NET: &str = "/sys/class/net";

/// Source of runtime values for placeholders
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Hardware address of this machine's wireless interface
    async fn client_mac(&self) -> NetloginResult<String>;

    /// Hardware address of the currently associated access point
    async fn ap_bssid(&self) -> NetloginResult<String>;
}

/// Resolver backed by the host: sysfs for the client MAC, `iwgetid` for the BSSID
pub struct SystemResolver {
    interface: Option<String>,
}

impl SystemResolver {
    /// `interface` of `None` picks the first wireless interface at lookup time
    pub fn new(interface: Option<String>) -> Self {
        Self { interface }
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn client_mac(&self) -> NetloginResult<String> {
        read_client_mac(self.interface.as_deref()).await
    }

    async fn ap_bssid(&self) -> NetloginResult<String> {
        let output = tokio::process::Command::new("iwgetid")
            .args(["--ap", "-r"])
            .output()
            .await
            .map_err(|e| NetloginError::Resolve {
                what: "access point BSSID",
                reason: format!("failed to run iwgetid: {}", e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(NetloginError::Resolve {
                what: "access point BSSID",
                reason: format!("iwgetid exited with {}", output.status),
            });
        }

        normalize_mac(&stdout).ok_or_else(|| NetloginError::Resolve {
            what: "access point BSSID",
            reason: format!("unexpected iwgetid output '{}'", stdout.trim()),
        })
    }
}

#[cfg(target_os = "linux")]
async fn read_client_mac(interface: Option<&str>) -> NetloginResult<String> {
    let interface = match interface {
        Some(name) => name.to_string(),
        None => detect_wireless_interface()?,
    };

    let path = std::path::Path::new(SYS_CLASS_NET)
        .join(&interface)
        .join("address");
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| NetloginError::Read { path, source })?;

    normalize_mac(&raw).ok_or_else(|| NetloginError::Resolve {
        what: "client MAC",
        reason: format!("unexpected address '{}' on {}", raw.trim(), interface),
    })
}

#[cfg(not(target_os = "linux"))]
async fn read_client_mac(_interface: Option<&str>) -> NetloginResult<String> {
    Err(NetloginError::Unsupported(
        "client MAC address lookup is only implemented for Linux",
    ))
}

/// First interface (by name) exposing a `wireless` directory in sysfs
#[cfg(target_os = "linux")]
fn detect_wireless_interface() -> NetloginResult<String> {
    let root = std::path::Path::new(SYS_CLASS_NET);
    let entries = std::fs::read_dir(root).map_err(|source| NetloginError::Read {
        path: root.to_path_buf(),
        source,
    })?;

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().join("wireless").is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let name = names.into_iter().next().ok_or_else(|| NetloginError::Resolve {
        what: "client MAC",
        reason: "no wireless interface found, set `interface` in the settings".to_string(),
    })?;
    tracing::debug!("Using wireless interface {}", name);
    Ok(name)
}

/// Lower-case a colon separated MAC address, rejecting anything else
pub fn normalize_mac(raw: &str) -> Option<String> {
    let mac = raw.trim().to_ascii_lowercase();
    MAC_RE.as_ref()?.is_match(&mac).then_some(mac)
}

/// Placeholder values for a single login attempt.
///
/// Each value is looked up at most once, and only on first use.
pub struct Substitutions<'a> {
    resolver: &'a dyn Resolver,
    mac: Option<String>,
    bssid: Option<String>,
}

impl<'a> Substitutions<'a> {
    /// A BSSID already known from the network manager skips the resolver
    pub fn new(resolver: &'a dyn Resolver, bssid_hint: Option<&str>) -> Self {
        Self {
            resolver,
            mac: None,
            bssid: bssid_hint.map(str::to_ascii_lowercase),
        }
    }

    /// Replace every recognised token in `template`
    pub async fn apply(&mut self, template: &str) -> NetloginResult<String> {
        let mut out = template.to_string();

        if out.contains(AP_MAC_TOKEN) {
            let bssid = match &self.bssid {
                Some(bssid) => bssid.clone(),
                None => {
                    let bssid = self.resolver.ap_bssid().await?;
                    self.bssid = Some(bssid.clone());
                    bssid
                }
            };
            out = out.replace(AP_MAC_TOKEN, &bssid);
        }

        if out.contains(MAC_TOKEN) {
            let mac = match &self.mac {
                Some(mac) => mac.clone(),
                None => {
                    let mac = self.resolver.client_mac().await?;
                    self.mac = Some(mac.clone());
                    mac
                }
            };
            out = out.replace(MAC_TOKEN, &mac);
        }

        Ok(out)
    }

    async fn apply_map(
        &mut self,
        map: &BTreeMap<String, String>,
    ) -> NetloginResult<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for (key, value) in map {
            out.insert(key.clone(), self.apply(value).await?);
        }
        Ok(out)
    }
}

/// Substituted copy of `profile`; the stored template is left untouched
pub async fn resolve_profile(
    profile: &NetworkProfile,
    subs: &mut Substitutions<'_>,
) -> NetloginResult<NetworkProfile> {
    let data = match &profile.data {
        Some(RequestBody::Raw(body)) => Some(RequestBody::Raw(subs.apply(body).await?)),
        Some(RequestBody::Form(form)) => Some(RequestBody::Form(subs.apply_map(form).await?)),
        None => None,
    };

    Ok(NetworkProfile {
        url: subs.apply(&profile.url).await?,
        method: profile.method.clone(),
        headers: subs.apply_map(&profile.headers).await?,
        params: subs.apply_map(&profile.params).await?,
        data,
    })
}
