//! Network profiles
//!
//! A profile describes the single HTTP request that satisfies one network's
//! captive portal. Profiles are keyed by SSID and loaded from JSON, either a
//! single file or a directory of files merged together.

use crate::error::{NetloginError, NetloginResult};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Login request template for one network
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkProfile {
    /// Target URL, may contain `$mac` / `$ap_mac`
    pub url: String,

    #[serde(default = "default_method", deserialize_with = "deserialize_method")]
    pub method: Method,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Appended to the URL as a query string
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Request body
    #[serde(default)]
    pub data: Option<RequestBody>,
}

/// Body of a login request: a raw string, or a form that gets urlencoded
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RequestBody {
    Raw(String),
    Form(BTreeMap<String, String>),
}

fn default_method() -> Method {
    Method::GET
}

fn deserialize_method<'de, D>(deserializer: D) -> Result<Method, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes()).map_err(serde::de::Error::custom)
}

impl NetworkProfile {
    fn validate(&self, network: &str) -> NetloginResult<()> {
        let invalid = |reason: String| NetloginError::InvalidProfile {
            network: network.to_string(),
            reason,
        };

        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(invalid(format!("url must be http(s): '{}'", self.url)));
        }

        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| invalid(format!("bad header name '{}'", name)))?;
            HeaderValue::from_str(value)
                .map_err(|_| invalid(format!("bad value for header '{}'", name)))?;
        }

        Ok(())
    }
}

/// Immutable SSID -> profile lookup table
#[derive(Debug, Clone, Default)]
pub struct NetworkTable {
    profiles: HashMap<String, NetworkProfile>,
}

impl NetworkTable {
    /// Load the directory source first, then overlay the consolidated file.
    ///
    /// Sources that don't exist are skipped; anything that exists but can't
    /// be read or parsed is an error.
    pub fn load_sources(dir: &Path, file: &Path) -> NetloginResult<Self> {
        let mut profiles = HashMap::new();

        for source in [dir, file] {
            if !source.exists() {
                tracing::debug!("Network source {} not present, skipping", source.display());
                continue;
            }
            let loaded = load_path(source)?;
            tracing::debug!("Loaded {} network(s) from {}", loaded.len(), source.display());
            profiles.extend(loaded);
        }

        Ok(Self { profiles })
    }

    pub fn get(&self, ssid: &str) -> Option<&NetworkProfile> {
        self.profiles.get(ssid)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Configured SSIDs, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl FromIterator<(String, NetworkProfile)> for NetworkTable {
    fn from_iter<I: IntoIterator<Item = (String, NetworkProfile)>>(iter: I) -> Self {
        Self {
            profiles: iter.into_iter().collect(),
        }
    }
}

/// Load profiles from a file, or from every file in a directory.
///
/// Directory entries are merged in file name order, so a later file wins
/// on duplicate SSIDs.
pub fn load_path(path: &Path) -> NetloginResult<HashMap<String, NetworkProfile>> {
    let read_err = |source| NetloginError::Read {
        path: path.to_path_buf(),
        source,
    };

    if !path.is_dir() {
        return load_file(path);
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(path).map_err(read_err)? {
        let entry_path = entry.map_err(read_err)?.path();
        if entry_path.is_file() {
            files.push(entry_path);
        } else {
            tracing::warn!("Ignoring non-file entry {}", entry_path.display());
        }
    }
    files.sort();

    let mut merged = HashMap::new();
    for file in files {
        merged.extend(load_file(&file)?);
    }
    Ok(merged)
}

fn load_file(path: &Path) -> NetloginResult<HashMap<String, NetworkProfile>> {
    let contents = fs::read_to_string(path).map_err(|source| NetloginError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let profiles: HashMap<String, NetworkProfile> =
        serde_json::from_str(&contents).map_err(|source| NetloginError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    for (network, profile) in &profiles {
        profile.validate(network)?;
    }

    Ok(profiles)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scratch directory removed on drop
    pub(crate) struct ScratchDir(PathBuf);

    impl ScratchDir {
        pub(crate) fn new(tag: &str) -> Self {
            static COUNTER: AtomicUsize = AtomicUsize::new(0);
            let path = std::env::temp_dir().join(format!(
                "netlogin-{}-{}-{}",
                tag,
                std::process::id(),
                COUNTER.fetch_add(1, Ordering::SeqCst)
            ));
            fs::create_dir_all(&path).unwrap();
            Self(path)
        }

        pub(crate) fn path(&self) -> &Path {
            &self.0
        }

        pub(crate) fn write(&self, name: &str, contents: &str) -> PathBuf {
            let path = self.0.join(name);
            fs::write(&path, contents).unwrap();
            path
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_parse_full_profile() {
        let json = r#"{
            "Hotel": {
                "url": "https://portal.hotel/auth",
                "method": "post",
                "headers": {"X-Client": "$mac"},
                "params": {"ap": "$ap_mac"},
                "data": {"accept": "yes"}
            }
        }"#;
        let profiles: HashMap<String, NetworkProfile> = serde_json::from_str(json).unwrap();
        let hotel = &profiles["Hotel"];

        assert_eq!(hotel.method, Method::POST);
        assert_eq!(hotel.headers["X-Client"], "$mac");
        assert_eq!(hotel.params["ap"], "$ap_mac");
        assert_eq!(
            hotel.data,
            Some(RequestBody::Form(BTreeMap::from([(
                "accept".to_string(),
                "yes".to_string()
            )])))
        );
    }

    #[test]
    fn test_defaults_and_raw_body() {
        let json = r#"{"Cafe": {"url": "http://cafe/", "data": "terms=1"}}"#;
        let profiles: HashMap<String, NetworkProfile> = serde_json::from_str(json).unwrap();
        let cafe = &profiles["Cafe"];

        assert_eq!(cafe.method, Method::GET);
        assert!(cafe.headers.is_empty());
        assert_eq!(cafe.data, Some(RequestBody::Raw("terms=1".to_string())));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = ScratchDir::new("unknown-field");
        let file = dir.write("n.json", r#"{"A": {"url": "http://a/", "verify": false}}"#);

        assert!(matches!(load_path(&file), Err(NetloginError::Parse { .. })));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let dir = ScratchDir::new("bad-url");
        let file = dir.write("n.json", r#"{"A": {"url": "ftp://a/"}}"#);

        assert!(matches!(
            load_path(&file),
            Err(NetloginError::InvalidProfile { network, .. }) if network == "A"
        ));
    }

    #[test]
    fn test_malformed_json_fails() {
        let dir = ScratchDir::new("malformed");
        let file = dir.write("n.json", "{ not json");

        assert!(matches!(load_path(&file), Err(NetloginError::Parse { .. })));
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = ScratchDir::new("missing");
        let err = load_path(&dir.path().join("nope.json")).unwrap_err();

        assert!(matches!(err, NetloginError::Read { .. }));
    }

    #[test]
    fn test_directory_merge() {
        let dir = ScratchDir::new("dir-merge");
        dir.write("10-a.json", r#"{"A": {"url": "http://a/"}, "Shared": {"url": "http://first/"}}"#);
        dir.write("20-b.json", r#"{"B": {"url": "http://b/"}, "Shared": {"url": "http://second/"}}"#);

        let merged = load_path(dir.path()).unwrap();

        assert_eq!(merged.len(), 3);
        assert_eq!(merged["Shared"].url, "http://second/");
    }

    #[test]
    fn test_file_overrides_directory() {
        let dir = ScratchDir::new("precedence");
        let networks_d = dir.path().join("networks.d");
        fs::create_dir(&networks_d).unwrap();
        fs::write(
            networks_d.join("x.json"),
            r#"{"Cafe": {"url": "http://from-dir/"}, "Library": {"url": "http://lib/"}}"#,
        )
        .unwrap();
        let file = dir.write(
            "networks.json",
            r#"{"Cafe": {"url": "http://from-file/", "method": "POST"}}"#,
        );

        let table = NetworkTable::load_sources(&networks_d, &file).unwrap();

        assert_eq!(table.len(), 2);
        let cafe = table.get("Cafe").unwrap();
        assert_eq!(cafe.url, "http://from-file/");
        assert_eq!(cafe.method, Method::POST);
        assert_eq!(table.names(), vec!["Cafe", "Library"]);
    }

    #[test]
    fn test_missing_sources_give_empty_table() {
        let dir = ScratchDir::new("absent");
        let table =
            NetworkTable::load_sources(&dir.path().join("d"), &dir.path().join("f.json")).unwrap();

        assert!(table.is_empty());
    }
}
