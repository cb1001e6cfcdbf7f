//! # Offline Gateway
//!
//! An offline-capable request gateway that sits between an application and
//! its origin server. Requests are answered from a generation-namespaced
//! store or the live network depending on the kind of resource.
//!
//! ## Features
//!
//! - Cache-first static assets, network-first documents and data
//! - Offline fallback document for navigations
//! - Deployment detection through the server's asset manifest
//! - Memory + file store tiers, one namespace per deployed build
//! - Push notifications relayed to attached application instances

pub mod builder;
pub mod classifier;
pub mod collector;
pub mod config;
pub mod error;
pub mod gateway;
pub mod manifest;
pub mod messenger;
pub mod network;
pub mod push;
pub mod store;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use builder::GatewayConfigBuilder;
pub use classifier::{Classification, Classifier};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::{
    EventOutcome, GatewayEvent, InstallReport, Interception, InterceptedRequest, LifecycleState,
    OfflineGateway,
};
pub use manifest::{AssetManifest, ManifestSynchronizer, SyncOutcome};
pub use messenger::{ClientEvent, ClientId, ClientMessenger, ControlCommand};
pub use network::{HttpNetwork, Network, NetworkResponse, create_client};
pub use push::{
    LogPresenter, Notification, NotificationId, NotificationPresenter, NotificationTimestamp,
    PushPayload,
};
pub use store::{PopulateReport, StoreHandle, VersionStore};
pub use strategy::{FetchEngine, GatewayResponse, ResponseSource};
