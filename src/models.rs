//! Data models for network connection state

/// NetworkManager's type string for WiFi connections
pub const WIRELESS_TYPE: &str = "802-11-wireless";

/// An access point we are (or were) associated with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    pub ssid: String,
    /// Hardware address, if the network manager reported one
    pub bssid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionKind {
    Wireless,
    Other(String),
}

impl ConnectionKind {
    pub fn from_type(connection_type: &str) -> Self {
        if connection_type == WIRELESS_TYPE {
            Self::Wireless
        } else {
            Self::Other(connection_type.to_string())
        }
    }
}

/// What an active connection is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecificObject {
    AccessPoint(AccessPoint),
    /// Some other object (e.g. a VPN parent), by D-Bus path
    Other(String),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConnection {
    pub kind: ConnectionKind,
    pub specific_object: SpecificObject,
}

impl ActiveConnection {
    /// The access point, for wireless connections bound to one
    pub fn access_point(&self) -> Option<&AccessPoint> {
        match (&self.kind, &self.specific_object) {
            (ConnectionKind::Wireless, SpecificObject::AccessPoint(ap)) => Some(ap),
            _ => None,
        }
    }
}

/// A change notification from the network manager.
///
/// Each field is `None` when the notification didn't touch that property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub active_connections: Option<Vec<ActiveConnection>>,
    /// A connection is still being brought up
    pub activating: bool,
    pub wireless_enabled: Option<bool>,
}
