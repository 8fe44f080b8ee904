//! NetworkManager backend over the system D-Bus

use crate::models::{self, ConnectionEvent, ConnectionKind, SpecificObject};
use crate::network::NetworkState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc;
use zbus::fdo::PropertiesProxy;
use zbus::zvariant::{OwnedObjectPath, Value};
use zbus::{proxy, Connection};

const NM_SERVICE: &str = "org.freedesktop.NetworkManager";
const NM_PATH: &str = "/org/freedesktop/NetworkManager";
const ACCESS_POINT_PATH_PREFIX: &str = "/org/freedesktop/NetworkManager/AccessPoint/";

#[proxy(
    interface = "org.freedesktop.NetworkManager",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager"
)]
trait NetworkManager {
    #[zbus(property)]
    fn active_connections(&self) -> zbus::Result<Vec<OwnedObjectPath>>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Connection.Active",
    default_service = "org.freedesktop.NetworkManager"
)]
trait ActiveConnection {
    #[zbus(property, name = "Type")]
    fn connection_type(&self) -> zbus::Result<String>;

    /// Access point for WiFi connections, `/` when unset
    #[zbus(property)]
    fn specific_object(&self) -> zbus::Result<OwnedObjectPath>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.AccessPoint",
    default_service = "org.freedesktop.NetworkManager"
)]
trait AccessPoint {
    /// SSID as raw bytes
    #[zbus(property)]
    fn ssid(&self) -> zbus::Result<Vec<u8>>;

    /// BSSID
    #[zbus(property)]
    fn hw_address(&self) -> zbus::Result<String>;
}

pub struct NetworkManagerClient {
    connection: Connection,
}

impl NetworkManagerClient {
    pub async fn new() -> Result<Self> {
        let connection = Connection::system()
            .await
            .context("Failed to connect to system D-Bus")?;

        Ok(Self { connection })
    }

    async fn read_active_connections(&self) -> Result<Vec<models::ActiveConnection>> {
        let nm = NetworkManagerProxy::new(&self.connection)
            .await
            .context("Failed to create NetworkManager proxy")?;

        let mut connections = Vec::new();
        for path in nm.active_connections().await? {
            // connections can vanish between listing and reading them
            match self.read_active_connection(&path).await {
                Ok(conn) => connections.push(conn),
                Err(e) => tracing::debug!("Skipping active connection {}: {:#}", path.as_str(), e),
            }
        }
        Ok(connections)
    }

    async fn read_active_connection(&self, path: &OwnedObjectPath) -> Result<models::ActiveConnection> {
        let active = ActiveConnectionProxy::builder(&self.connection)
            .path(path)?
            .build()
            .await?;

        let kind = ConnectionKind::from_type(&active.connection_type().await?);
        let specific = active.specific_object().await?;

        let specific_object = if specific.as_str() == "/" {
            SpecificObject::None
        } else if is_access_point_path(specific.as_str()) {
            SpecificObject::AccessPoint(self.read_access_point(&specific).await?)
        } else {
            SpecificObject::Other(specific.as_str().to_string())
        };

        Ok(models::ActiveConnection {
            kind,
            specific_object,
        })
    }

    async fn read_access_point(&self, path: &OwnedObjectPath) -> Result<models::AccessPoint> {
        let ap = AccessPointProxy::builder(&self.connection)
            .path(path)?
            .build()
            .await?;

        let ssid = String::from_utf8_lossy(&ap.ssid().await?).into_owned();
        let bssid = ap.hw_address().await.ok().filter(|addr| !addr.is_empty());

        Ok(models::AccessPoint { ssid, bssid })
    }

    async fn build_event(&self, changed: &HashMap<&str, Value<'_>>) -> Result<ConnectionEvent> {
        let (activating, wireless_enabled) = read_flags(changed);

        let active_connections = if changed.contains_key("ActiveConnections") {
            Some(self.read_active_connections().await?)
        } else {
            None
        };

        Ok(ConnectionEvent {
            active_connections,
            activating,
            wireless_enabled,
        })
    }
}

#[async_trait]
impl NetworkState for NetworkManagerClient {
    async fn active_access_points(&self) -> Result<Vec<models::AccessPoint>> {
        Ok(self
            .read_active_connections()
            .await?
            .iter()
            .filter_map(|conn| conn.access_point().cloned())
            .collect())
    }

    async fn watch(&self, tx: mpsc::Sender<ConnectionEvent>) -> Result<()> {
        let props = PropertiesProxy::builder(&self.connection)
            .destination(NM_SERVICE)?
            .path(NM_PATH)?
            .build()
            .await
            .context("Failed to create properties proxy")?;
        let mut stream = props.receive_properties_changed().await?;

        tracing::info!("Listening for NetworkManager state changes");

        while let Some(signal) = stream.next().await {
            let args = match signal.args() {
                Ok(args) => args,
                Err(e) => {
                    tracing::warn!("Malformed PropertiesChanged signal: {}", e);
                    continue;
                }
            };
            if args.interface_name().as_str() != NM_SERVICE {
                continue;
            }

            let event = match self.build_event(args.changed_properties()).await {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Failed to read connection state: {:#}", e);
                    continue;
                }
            };

            if tx.send(event).await.is_err() {
                tracing::debug!("Event receiver closed, stopping watch");
                break;
            }
        }

        Ok(())
    }
}

fn is_access_point_path(path: &str) -> bool {
    path.starts_with(ACCESS_POINT_PATH_PREFIX)
}

/// `(activating, wireless_enabled)` from a PropertiesChanged payload
fn read_flags(changed: &HashMap<&str, Value<'_>>) -> (bool, Option<bool>) {
    let activating = match changed.get("ActivatingConnection") {
        Some(Value::ObjectPath(path)) => path.as_str() != "/",
        Some(_) => true,
        None => false,
    };
    let wireless_enabled = match changed.get("WirelessEnabled") {
        Some(Value::Bool(enabled)) => Some(*enabled),
        _ => None,
    };
    (activating, wireless_enabled)
}
