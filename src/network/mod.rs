//! Network state providers
//!
//! The monitor only needs two things from the host networking stack: the
//! access points we are associated with right now, and a stream of change
//! notifications. Each backend implements `NetworkState` to supply them.

pub mod nm;

pub use nm::NetworkManagerClient;

use crate::models::{AccessPoint, ConnectionEvent};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait NetworkState: Send + Sync {
    /// Access points of all currently active wireless connections
    async fn active_access_points(&self) -> Result<Vec<AccessPoint>>;

    /// Forward change notifications into `tx` until the source or the
    /// receiver goes away
    async fn watch(&self, tx: mpsc::Sender<ConnectionEvent>) -> Result<()>;
}
