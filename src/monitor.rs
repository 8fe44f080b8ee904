//! Connection monitoring: decide when to log in, and where

use crate::error::NetloginError;
use crate::login::LoginExecutor;
use crate::models::{AccessPoint, ActiveConnection, ConnectionEvent};
use crate::network::NetworkState;
use crate::networks::NetworkTable;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fmt;
use tokio::sync::mpsc;

/// Why a change notification was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Notification didn't touch the active connection set
    Unrelated,
    /// A connection is still activating
    Activating,
    NoActiveConnections,
    WirelessDisabled,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Rejection::Unrelated => "active connections unchanged",
            Rejection::Activating => "connection still activating",
            Rejection::NoActiveConnections => "no active connections",
            Rejection::WirelessDisabled => "wireless disabled",
        };
        f.write_str(reason)
    }
}

/// Connections worth handling in `event`, or why there are none
pub fn accept(event: &ConnectionEvent) -> Result<&[ActiveConnection], Rejection> {
    let connections = event
        .active_connections
        .as_deref()
        .ok_or(Rejection::Unrelated)?;

    if event.activating {
        return Err(Rejection::Activating);
    }
    if connections.is_empty() {
        return Err(Rejection::NoActiveConnections);
    }
    if event.wireless_enabled == Some(false) {
        return Err(Rejection::WirelessDisabled);
    }

    Ok(connections)
}

/// Outcome of a one-shot run
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    /// Connected SSIDs without a profile
    pub skipped: Vec<String>,
}

pub struct Monitor {
    table: NetworkTable,
    executor: LoginExecutor,
}

impl Monitor {
    pub fn new(table: NetworkTable, executor: LoginExecutor) -> Self {
        Self { table, executor }
    }

    /// Log into `ap` if it is configured; `None` when it isn't
    async fn try_login(&self, ap: &AccessPoint) -> Option<bool> {
        let Some(profile) = self.table.get(&ap.ssid) else {
            tracing::info!("No config for {}, skipping...", ap.ssid);
            return None;
        };

        tracing::info!("Logging into network {}", ap.ssid);
        Some(
            self.executor
                .login(&ap.ssid, profile, ap.bssid.as_deref())
                .await,
        )
    }

    /// One-shot mode: log into every configured network we're associated with
    pub async fn run_once(&self, state: &dyn NetworkState) -> Result<RunSummary> {
        let access_points = state
            .active_access_points()
            .await
            .context("Failed to query active connections")?;

        if access_points.is_empty() {
            tracing::warn!("Not connected to any wireless network");
        }

        Ok(self.login_all(&access_points).await)
    }

    /// Each SSID is handled once, even if several connections share it
    pub async fn login_all(&self, access_points: &[AccessPoint]) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut seen = HashSet::new();

        for ap in access_points {
            if !seen.insert(ap.ssid.as_str()) {
                continue;
            }
            match self.try_login(ap).await {
                Some(ok) => {
                    summary.attempted += 1;
                    if ok {
                        summary.succeeded += 1;
                    }
                }
                None => summary.skipped.push(ap.ssid.clone()),
            }
        }

        summary
    }

    /// Log into one named network regardless of what we're connected to
    pub async fn login_network(&self, name: &str) -> Result<bool, NetloginError> {
        let profile = self
            .table
            .get(name)
            .ok_or_else(|| NetloginError::UnknownNetwork(name.to_string()))?;

        Ok(self.executor.login(name, profile, None).await)
    }

    /// React to one change notification, returning the number of login attempts
    pub async fn handle_event(&self, event: &ConnectionEvent) -> usize {
        let connections = match accept(event) {
            Ok(connections) => connections,
            Err(reason) => {
                tracing::trace!("Rejecting notification: {}", reason);
                return 0;
            }
        };

        tracing::trace!("Accepted notification with {} connection(s)", connections.len());

        let mut attempts = 0;
        for ap in connections.iter().filter_map(ActiveConnection::access_point) {
            if self.try_login(ap).await.is_some() {
                attempts += 1;
            }
        }
        attempts
    }

    /// Listener mode: handle events one at a time until the sender goes away
    pub async fn listen(&self, mut events: mpsc::Receiver<ConnectionEvent>) {
        tracing::info!("Watching for connections to: {}", self.table.names().join(", "));

        while let Some(event) = events.recv().await {
            self.handle_event(&event).await;
        }

        tracing::debug!("Event stream ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::login::tests::{executor, FakeTransport};
    use crate::models::{ConnectionKind, SpecificObject};
    use crate::networks::NetworkProfile;
    use crate::placeholder::tests::FakeResolver;
    use async_trait::async_trait;
    use reqwest::Method;
    use std::collections::BTreeMap;

    struct FakeNetworkState {
        access_points: Vec<AccessPoint>,
        events: Vec<ConnectionEvent>,
    }

    #[async_trait]
    impl NetworkState for FakeNetworkState {
        async fn active_access_points(&self) -> Result<Vec<AccessPoint>> {
            Ok(self.access_points.clone())
        }

        async fn watch(&self, tx: mpsc::Sender<ConnectionEvent>) -> Result<()> {
            for event in &self.events {
                tx.send(event.clone()).await?;
            }
            Ok(())
        }
    }

    fn profile(url: &str) -> NetworkProfile {
        NetworkProfile {
            url: url.to_string(),
            method: Method::GET,
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            data: None,
        }
    }

    fn ap(ssid: &str) -> AccessPoint {
        AccessPoint {
            ssid: ssid.to_string(),
            bssid: None,
        }
    }

    fn wifi(ssid: &str) -> ActiveConnection {
        ActiveConnection {
            kind: ConnectionKind::Wireless,
            specific_object: SpecificObject::AccessPoint(ap(ssid)),
        }
    }

    fn event(connections: Vec<ActiveConnection>) -> ConnectionEvent {
        ConnectionEvent {
            active_connections: Some(connections),
            ..Default::default()
        }
    }

    fn monitor(networks: &[&str], transport: &FakeTransport) -> Monitor {
        let table = networks
            .iter()
            .map(|name| (name.to_string(), profile(&format!("http://portal/{}", name))))
            .collect();
        Monitor::new(table, executor(transport, &FakeResolver::default()))
    }

    #[tokio::test]
    async fn test_unconfigured_network_skipped() {
        let transport = FakeTransport::new(Some(200), Some(200));
        let monitor = monitor(&["A"], &transport);
        let state = FakeNetworkState {
            access_points: vec![ap("A"), ap("B"), ap("B")],
            events: vec![],
        };

        let summary = monitor.run_once(&state).await.unwrap();

        assert_eq!(
            summary,
            RunSummary {
                attempted: 1,
                succeeded: 1,
                skipped: vec!["B".to_string()],
            }
        );
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "http://portal/A");
    }

    #[tokio::test]
    async fn test_login_network_unknown() {
        let transport = FakeTransport::new(Some(200), Some(200));
        let monitor = monitor(&["A"], &transport);

        let err = monitor.login_network("Nope").await.unwrap_err();

        assert!(matches!(err, NetloginError::UnknownNetwork(name) if name == "Nope"));
        assert!(transport.probes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_login_network_reports_failure() {
        let transport = FakeTransport::new(Some(200), Some(403));
        let monitor = monitor(&["A"], &transport);

        assert!(!monitor.login_network("A").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_events_do_nothing() {
        let transport = FakeTransport::new(Some(200), Some(200));
        let monitor = monitor(&["A"], &transport);

        let empty = event(vec![]);
        let activating = ConnectionEvent {
            activating: true,
            ..event(vec![wifi("A")])
        };
        let radio_off = ConnectionEvent {
            wireless_enabled: Some(false),
            ..event(vec![wifi("A")])
        };
        let unrelated = ConnectionEvent {
            wireless_enabled: Some(true),
            ..Default::default()
        };

        assert_eq!(accept(&empty).unwrap_err(), Rejection::NoActiveConnections);
        assert_eq!(accept(&activating).unwrap_err(), Rejection::Activating);
        assert_eq!(accept(&radio_off).unwrap_err(), Rejection::WirelessDisabled);
        assert_eq!(accept(&unrelated).unwrap_err(), Rejection::Unrelated);

        for ev in [empty, activating, radio_off, unrelated] {
            assert_eq!(monitor.handle_event(&ev).await, 0);
        }
        assert!(transport.probes.lock().unwrap().is_empty());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_accepted_event_logs_in_once() {
        let transport = FakeTransport::new(Some(200), Some(200));
        let monitor = monitor(&["A"], &transport);
        let ev = event(vec![
            wifi("A"),
            wifi("Unknown"),
            ActiveConnection {
                kind: ConnectionKind::Other("802-3-ethernet".to_string()),
                specific_object: SpecificObject::None,
            },
            ActiveConnection {
                kind: ConnectionKind::Other("vpn".to_string()),
                specific_object: SpecificObject::AccessPoint(ap("A")),
            },
        ]);

        assert_eq!(monitor.handle_event(&ev).await, 1);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_listen_handles_events_until_closed() {
        let transport = FakeTransport::new(Some(200), Some(200));
        let monitor = monitor(&["A", "B"], &transport);
        let state = FakeNetworkState {
            access_points: vec![],
            events: vec![
                event(vec![wifi("A")]),
                event(vec![]),
                event(vec![wifi("B")]),
            ],
        };

        let (tx, rx) = mpsc::channel(8);
        state.watch(tx).await.unwrap();
        monitor.listen(rx).await;

        let urls: Vec<String> = transport.sent().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["http://portal/A", "http://portal/B"]);
    }

    #[tokio::test]
    async fn test_coffee_shop_end_to_end() {
        let table: NetworkTable =
            serde_json::from_str::<std::collections::HashMap<String, NetworkProfile>>(
                r#"{"CoffeeShop": {"url": "http://portal.example/login?mac=$mac", "method": "GET"}}"#,
            )
            .unwrap()
            .into_iter()
            .collect();
        let transport = FakeTransport::new(Some(200), Some(200));
        let resolver = FakeResolver::new("aa:bb:cc:dd:ee:ff", "11:22:33:44:55:66");
        let monitor = Monitor::new(table, executor(&transport, &resolver));
        let state = FakeNetworkState {
            access_points: vec![ap("CoffeeShop")],
            events: vec![],
        };

        let summary = monitor.run_once(&state).await.unwrap();

        assert_eq!(summary.succeeded, 1);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "http://portal.example/login?mac=aa:bb:cc:dd:ee:ff");
        assert_eq!(resolver.bssid_calls(), 0);
    }
}
