//! # Push Relay
//!
//! Turns server-pushed payloads into visible notifications and notification
//! clicks into client events.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::messenger::{ClientEvent, ClientId, ClientMessenger};
use crate::network::{Network, fetch_with_timeout};
use crate::{GatewayConfig, GatewayError};

/// Notification id as sent by the server, numeric or textual
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationId {
    Number(u64),
    Text(String),
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationId::Number(n) => write!(f, "{n}"),
            NotificationId::Text(s) => f.write_str(s),
        }
    }
}

/// Notification time, epoch milliseconds or a formatted date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationTimestamp {
    Millis(serde_json::Number),
    Text(String),
}

/// Typed view of the fields the relay reads from a push payload.
///
/// Everything else in the payload is opaque and only travels inside
/// [`Notification::data`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    #[serde(alias = "msg")]
    pub message: String,
    #[serde(alias = "note_id")]
    pub id: NotificationId,
    #[serde(default, deserialize_with = "string_or_none")]
    pub icon: Option<String>,
    #[serde(default, alias = "note_timestamp", deserialize_with = "timestamp_or_none")]
    pub timestamp: Option<NotificationTimestamp>,
    #[serde(default, alias = "note_opened_pixel", deserialize_with = "string_or_none")]
    pub opened_pixel_url: Option<String>,
}

/// Optional text field; values of any other type are ignored
fn string_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn timestamp_or_none<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NotificationTimestamp>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => Some(NotificationTimestamp::Millis(n)),
        Value::String(s) => Some(NotificationTimestamp::Text(s)),
        _ => None,
    })
}

/// A notification as presented to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    /// Notifications sharing a tag replace each other
    pub tag: String,
    pub icon: Option<String>,
    pub timestamp: Option<NotificationTimestamp>,
    pub opened_pixel_url: Option<String>,
    /// The payload exactly as pushed
    pub data: Value,
}

impl Notification {
    /// Build a notification from raw push data; malformed data yields `None`
    pub fn parse(data: &[u8]) -> Option<Self> {
        let parsed = serde_json::from_slice::<Value>(data).and_then(|raw| {
            let payload = PushPayload::deserialize(&raw)?;
            Ok((payload, raw))
        });

        match parsed {
            Ok((payload, raw)) => Some(Self::new(payload, raw)),
            Err(e) => {
                warn!(error = %e, "Dropping malformed push payload");
                None
            }
        }
    }

    fn new(payload: PushPayload, data: Value) -> Self {
        Self {
            title: payload.message,
            tag: format!("note_{}", payload.id),
            icon: payload.icon,
            timestamp: payload.timestamp,
            opened_pixel_url: payload.opened_pixel_url,
            data,
        }
    }
}

/// Host surface that shows notifications and manages application windows
#[async_trait]
pub trait NotificationPresenter: Send + Sync {
    async fn show(&self, notification: &Notification) -> Result<(), GatewayError>;

    /// Dismiss a presented notification
    async fn close(&self, notification: &Notification) -> Result<(), GatewayError>;

    /// Bring an attached application instance to the foreground
    async fn focus(&self, client: ClientId) -> Result<(), GatewayError>;

    async fn open_window(&self, url: &Url) -> Result<(), GatewayError>;
}

/// Presenter that only logs, for headless hosts
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPresenter;

#[async_trait]
impl NotificationPresenter for LogPresenter {
    async fn show(&self, notification: &Notification) -> Result<(), GatewayError> {
        info!(tag = %notification.tag, title = %notification.title, "Notification");
        Ok(())
    }

    async fn close(&self, notification: &Notification) -> Result<(), GatewayError> {
        debug!(tag = %notification.tag, "Notification closed");
        Ok(())
    }

    async fn focus(&self, client: ClientId) -> Result<(), GatewayError> {
        debug!(client = client, "Focus requested");
        Ok(())
    }

    async fn open_window(&self, url: &Url) -> Result<(), GatewayError> {
        info!(url = %url, "Open window requested");
        Ok(())
    }
}

/// A presented notification and its opened-pixel request, if any
pub struct PushDelivery {
    pub notification: Notification,
    pub pixel: Option<JoinHandle<()>>,
}

pub struct PushRelay {
    presenter: Arc<dyn NotificationPresenter>,
    network: Arc<dyn Network>,
    origin: Url,
    timeout: Duration,
}

impl PushRelay {
    pub fn new(
        config: &GatewayConfig,
        presenter: Arc<dyn NotificationPresenter>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            presenter,
            network,
            origin: config.origin.clone(),
            timeout: config.request_timeout,
        }
    }

    /// Present the notification carried by `data`.
    ///
    /// Returns `None` when the payload is malformed or the presenter failed.
    pub async fn on_push(&self, data: &[u8]) -> Option<PushDelivery> {
        let notification = Notification::parse(data)?;

        if let Err(e) = self.presenter.show(&notification).await {
            warn!(tag = %notification.tag, error = %e, "Failed to present notification");
            return None;
        }

        let pixel = notification
            .opened_pixel_url
            .as_deref()
            .and_then(|pixel| self.fire_pixel(pixel));

        Some(PushDelivery {
            notification,
            pixel,
        })
    }

    /// Best-effort GET of the opened pixel; failure is only logged
    fn fire_pixel(&self, pixel: &str) -> Option<JoinHandle<()>> {
        let url = match self.origin.join(pixel) {
            Ok(url) => url,
            Err(e) => {
                debug!(pixel = %pixel, error = %e, "Could not parse the pixel URL");
                return None;
            }
        };

        let network = Arc::clone(&self.network);
        let timeout = self.timeout;
        Some(tokio::spawn(async move {
            if let Err(e) = fetch_with_timeout(network.as_ref(), &url, timeout).await {
                debug!(pixel = %url, error = %e, "Could not load the pixel");
            }
        }))
    }

    /// Relay a click on `notification` to the application.
    ///
    /// Closes the notification, focuses the first attached instance and
    /// emits `openPanel` then `trackClick` with the payload as pushed. When
    /// no instance is attached both events are queued and a new window is
    /// opened at the origin root, which will ask for the queued events once
    /// it attaches. Returns whether the events were delivered immediately.
    pub async fn on_notification_click(
        &self,
        notification: &Notification,
        messenger: &ClientMessenger,
    ) -> bool {
        if let Err(e) = self.presenter.close(notification).await {
            debug!(tag = %notification.tag, error = %e, "Failed to close notification");
        }

        if let Some(client) = messenger.first_attached() {
            if let Err(e) = self.presenter.focus(client).await {
                debug!(client = client, error = %e, "Failed to focus client");
            }
        }

        let delivered = messenger.deliver(ClientEvent::OpenPanel);
        messenger.deliver(ClientEvent::TrackClick {
            notification: notification.data.clone(),
        });

        if !delivered {
            if let Err(e) = self.presenter.open_window(&self.origin).await {
                warn!(url = %self.origin, error = %e, "Failed to open a window for queued events");
            }
        }
        delivered
    }
}
