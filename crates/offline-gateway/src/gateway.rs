//! # Gateway
//!
//! Lifecycle state machine tying the components together. Each host event
//! (install, activate, fetch, push, notification click, client message) maps
//! to one async method; [`OfflineGateway::handle_event`] dispatches by kind.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::Method;
use tracing::{debug, info, warn};
use url::Url;

use crate::classifier::{Classification, Classifier};
use crate::collector::GenerationCollector;
use crate::manifest::ManifestSynchronizer;
use crate::messenger::{ClientMessenger, ControlCommand};
use crate::network::{HttpNetwork, Network};
use crate::push::{LogPresenter, Notification, NotificationPresenter, PushDelivery, PushRelay};
use crate::store::{PopulateReport, StoreHandle, VersionStore};
use crate::strategy::{FetchEngine, GatewayResponse};
use crate::{GatewayConfig, GatewayError, Result};

/// Lifecycle of a gateway instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; the instance never controls requests
    Redundant,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
            LifecycleState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// A request seen at the interception boundary
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub url: String,
    /// Full-document navigation
    pub navigational: bool,
}

impl InterceptedRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            navigational: false,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            navigational: true,
            ..Self::get(url)
        }
    }
}

/// What the host should do with an intercepted request
#[derive(Debug)]
pub enum Interception {
    /// Not handled; the host performs the request itself
    PassThrough,
    Respond(GatewayResponse),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub manifest_changed: bool,
    pub populate: PopulateReport,
}

/// Events a host feeds into the gateway
#[derive(Debug)]
pub enum GatewayEvent {
    Install,
    Activate,
    Fetch(InterceptedRequest),
    Push(Bytes),
    NotificationClick(Notification),
    Message(Bytes),
}

#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated { collected: Vec<String> },
    Fetched(Interception),
    Pushed(Option<Notification>),
    Clicked { delivered: bool },
    Message { flushed: usize },
}

pub struct OfflineGateway {
    config: GatewayConfig,
    classifier: Arc<Classifier>,
    network: Arc<dyn Network>,
    store: Arc<VersionStore>,
    engine: FetchEngine,
    manifest: ManifestSynchronizer,
    messenger: ClientMessenger,
    push: PushRelay,
    fallback_url: Url,
    state: Mutex<LifecycleState>,
}

impl OfflineGateway {
    pub fn new(
        config: GatewayConfig,
        network: Arc<dyn Network>,
        presenter: Arc<dyn NotificationPresenter>,
    ) -> Result<Self> {
        let classifier = Arc::new(Classifier::new(&config)?);
        let fallback_url = config.fallback_url()?;
        let engine = FetchEngine::new(&config, Arc::clone(&classifier), Arc::clone(&network));
        let manifest = ManifestSynchronizer::new(&config)?;
        let push = PushRelay::new(&config, presenter, Arc::clone(&network));
        let store = Arc::new(VersionStore::new(&config));

        Ok(Self {
            config,
            classifier,
            network,
            store,
            engine,
            manifest,
            messenger: ClientMessenger::new(),
            push,
            fallback_url,
            state: Mutex::new(LifecycleState::Parsed),
        })
    }

    /// Gateway over the real network with a logging presenter
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        let network = Arc::new(HttpNetwork::from_config(&config)?);
        Self::new(config, network, Arc::new(LogPresenter))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn store(&self) -> &Arc<VersionStore> {
        &self.store
    }

    pub fn manifest(&self) -> &ManifestSynchronizer {
        &self.manifest
    }

    pub fn messenger(&self) -> &ClientMessenger {
        &self.messenger
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    fn transition(&self, allowed: &[LifecycleState], next: LifecycleState) -> Result<()> {
        let mut state = self.state.lock();
        let current = *state;
        if !allowed.contains(&current) {
            return Err(GatewayError::LifecycleError(format!(
                "cannot move from {current} to {next}"
            )));
        }
        debug!(from = %current, to = %next, "Lifecycle transition");
        *state = next;
        Ok(())
    }

    fn current_store(&self) -> StoreHandle {
        self.store.handle(self.config.generation.as_str())
    }

    /// Pre-populate the current generation and become ready to activate
    /// without waiting for older instances.
    pub async fn install(&self) -> Result<InstallReport> {
        self.transition(
            &[LifecycleState::Parsed, LifecycleState::Redundant],
            LifecycleState::Installing,
        )?;

        if let Err(e) = self.store.open(self.config.generation.as_str()).await {
            warn!(generation = %self.config.generation, error = %e, "Cannot open store, install failed");
            *self.state.lock() = LifecycleState::Redundant;
            return Err(e.into());
        }

        let outcome = self.manifest.sync(self.network.as_ref()).await;
        let populate = self.refresh(&outcome.assets).await;

        // Skip waiting
        *self.state.lock() = LifecycleState::Installed;
        info!(
            generation = %self.config.generation,
            stored = populate.stored,
            failed = populate.failed.len(),
            "Gateway installed"
        );

        Ok(InstallReport {
            manifest_changed: outcome.changed,
            populate,
        })
    }

    /// Take control of attached instances and drop stale generations
    pub async fn activate(&self) -> Result<Vec<String>> {
        self.transition(
            &[LifecycleState::Installed, LifecycleState::Activated],
            LifecycleState::Activating,
        )?;

        let collected = match GenerationCollector::collect(&self.store, &self.config.generation).await
        {
            Ok(collected) => collected,
            Err(e) => {
                warn!(error = %e, "Generation collection failed");
                Vec::new()
            }
        };

        *self.state.lock() = LifecycleState::Activated;
        info!(
            generation = %self.config.generation,
            clients = self.messenger.attached_count(),
            "Gateway activated and controlling attached clients"
        );
        Ok(collected)
    }

    /// Store `assets` and the fallback document under the current generation.
    ///
    /// Assets that are not cacheable are skipped.
    pub async fn refresh(&self, assets: &[String]) -> PopulateReport {
        let mut urls: Vec<Url> = Vec::with_capacity(assets.len() + 1);
        for asset in assets {
            match self.classifier.resolve(asset) {
                Some(url) if self.classifier.classify_url(&url).is_cacheable() => {
                    if !urls.contains(&url) {
                        urls.push(url);
                    }
                }
                _ => debug!(asset = %asset, "Skipping uncacheable manifest asset"),
            }
        }
        if !urls.contains(&self.fallback_url) {
            urls.push(self.fallback_url.clone());
        }

        self.current_store()
            .put_all(self.network.as_ref(), urls)
            .await
    }

    /// Handle a request at the interception boundary.
    ///
    /// The only error returned is a network failure with nothing cached and
    /// no fallback applicable.
    pub async fn intercept(&self, request: InterceptedRequest) -> Result<Interception> {
        if request.method != Method::GET {
            return Ok(Interception::PassThrough);
        }

        if self.state() != LifecycleState::Activated {
            debug!(url = %request.url, state = %self.state(), "Gateway not active, passing through");
            return Ok(Interception::PassThrough);
        }

        let Some(url) = self.classifier.resolve(&request.url) else {
            return Ok(Interception::PassThrough);
        };
        let classification = self.classifier.classify_url(&url);
        if classification == Classification::NotCacheable {
            return Ok(Interception::PassThrough);
        }

        let store = self.current_store();
        let response = if request.navigational {
            let outcome = self.manifest.sync(self.network.as_ref()).await;
            if outcome.changed {
                self.refresh(&outcome.assets).await;
            }
            self.engine
                .network_first(&store, &url, Some(&self.fallback_url))
                .await?
        } else {
            self.engine.fetch(&store, &url, classification, None).await?
        };

        Ok(Interception::Respond(response))
    }

    pub async fn on_push(&self, data: &[u8]) -> Option<PushDelivery> {
        self.push.on_push(data).await
    }

    pub async fn on_notification_click(&self, notification: &Notification) -> bool {
        self.push
            .on_notification_click(notification, &self.messenger)
            .await
    }

    /// Handle a control message from an application instance.
    ///
    /// Returns the number of queued events flushed.
    pub fn on_message(&self, data: &[u8]) -> usize {
        match serde_json::from_slice::<ControlCommand>(data) {
            Ok(ControlCommand::SendQueuedMessages) => self.messenger.flush(),
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognized client message");
                0
            }
        }
    }

    pub async fn handle_event(&self, event: GatewayEvent) -> Result<EventOutcome> {
        Ok(match event {
            GatewayEvent::Install => EventOutcome::Installed(self.install().await?),
            GatewayEvent::Activate => EventOutcome::Activated {
                collected: self.activate().await?,
            },
            GatewayEvent::Fetch(request) => EventOutcome::Fetched(self.intercept(request).await?),
            GatewayEvent::Push(data) => {
                EventOutcome::Pushed(self.on_push(&data).await.map(|delivery| delivery.notification))
            }
            GatewayEvent::NotificationClick(notification) => EventOutcome::Clicked {
                delivered: self.on_notification_click(&notification).await,
            },
            GatewayEvent::Message(data) => EventOutcome::Message {
                flushed: self.on_message(&data),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::AssetManifest;
    use crate::messenger::ClientEvent;
    use crate::strategy::ResponseSource;
    use crate::testing::{FakeNetwork, init_tracing};
    use std::time::Duration;

    struct Harness {
        gateway: OfflineGateway,
        network: Arc<FakeNetwork>,
    }

    fn url(path: &str) -> Url {
        Url::parse("https://app.example.com").unwrap().join(path).unwrap()
    }

    fn publish_manifest(network: &FakeNetwork, hash: &str, assets: &[&str]) {
        let manifest = AssetManifest {
            hash: hash.to_owned(),
            assets: assets.iter().map(|a| (*a).to_owned()).collect(),
        };
        network.respond(
            &url("/assets-manifest"),
            200,
            &serde_json::to_string(&manifest).unwrap(),
        );
    }

    fn harness_with(builder: crate::GatewayConfigBuilder) -> Harness {
        init_tracing();
        let config = builder
            .with_origin("https://app.example.com")
            .unwrap()
            .with_request_timeout(Duration::from_millis(200))
            .build();
        let network = Arc::new(FakeNetwork::new());
        let gateway = OfflineGateway::new(config, network.clone(), Arc::new(LogPresenter)).unwrap();
        Harness { gateway, network }
    }

    fn harness() -> Harness {
        harness_with(GatewayConfig::builder())
    }

    async fn activated(h: &Harness) {
        h.gateway.install().await.unwrap();
        h.gateway.activate().await.unwrap();
    }

    fn respond(interception: Interception) -> GatewayResponse {
        match interception {
            Interception::Respond(response) => response,
            Interception::PassThrough => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn test_install_prepopulates_assets_and_fallback() {
        let h = harness();
        publish_manifest(&h.network, "abc", &["/app.js", "/app.css", "/version", "https://cdn.example.com/x.js"]);
        h.network.respond(&url("/app.js"), 200, "js");
        h.network.respond(&url("/app.css"), 200, "css");
        h.network.respond(&url("/offline"), 200, "No Internet");

        let report = h.gateway.install().await.unwrap();

        assert!(report.manifest_changed);
        assert_eq!(report.populate.stored, 3);
        assert!(report.populate.failed.is_empty());
        assert_eq!(h.gateway.state(), LifecycleState::Installed);
        assert_eq!(h.network.calls(&url("/version")), 0);

        let store = h.gateway.current_store();
        assert!(store.get(url("/offline").as_str()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_install_survives_missing_manifest() {
        let h = harness();
        h.network.respond(&url("/offline"), 200, "No Internet");

        let report = h.gateway.install().await.unwrap();
        assert!(!report.manifest_changed);
        assert_eq!(report.populate.stored, 1);
    }

    #[tokio::test]
    async fn test_lifecycle_order_is_enforced() {
        let h = harness();
        assert!(h.gateway.activate().await.is_err());
        activated(&h).await;
        assert!(h.gateway.install().await.is_err());
        assert_eq!(h.gateway.state(), LifecycleState::Activated);
    }

    #[tokio::test]
    async fn test_pass_through_cases() {
        let h = harness();
        h.network.respond(&url("/app.js"), 200, "js");

        // Not yet active
        let before = h.gateway.intercept(InterceptedRequest::get("/app.js")).await.unwrap();
        assert!(matches!(before, Interception::PassThrough));

        activated(&h).await;

        let post = InterceptedRequest {
            method: Method::POST,
            ..InterceptedRequest::get("/app.js")
        };
        assert!(matches!(
            h.gateway.intercept(post).await.unwrap(),
            Interception::PassThrough
        ));
        for uncacheable in ["/socket.io/", "https://cdn.example.com/lib.js", "http://[broken"] {
            assert!(matches!(
                h.gateway.intercept(InterceptedRequest::get(uncacheable)).await.unwrap(),
                Interception::PassThrough
            ));
        }
    }

    // Scenario A
    #[tokio::test]
    async fn test_static_asset_is_served_from_store_on_second_request() {
        let h = harness();
        activated(&h).await;
        h.network.respond(&url("/app.js"), 200, "bundle");

        let first = respond(h.gateway.intercept(InterceptedRequest::get("/app.js")).await.unwrap());
        assert_eq!(first.source, ResponseSource::Network);

        let second = respond(h.gateway.intercept(InterceptedRequest::get("/app.js")).await.unwrap());
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.body.as_ref(), b"bundle");
        assert_eq!(h.network.calls(&url("/app.js")), 1);
    }

    // Scenario B
    #[tokio::test]
    async fn test_offline_navigation_gets_fallback_document() {
        let h = harness();
        h.network.respond(&url("/offline"), 200, "No Internet");
        activated(&h).await;

        h.network.set_offline(true);
        let response = respond(
            h.gateway
                .intercept(InterceptedRequest::navigate("/read/following"))
                .await
                .unwrap(),
        );
        assert_eq!(response.source, ResponseSource::Fallback);
        assert_eq!(response.body.as_ref(), b"No Internet");
    }

    #[tokio::test]
    async fn test_offline_navigation_without_fallback_fails() {
        let h = harness();
        activated(&h).await;

        h.network.set_offline(true);
        let result = h.gateway.intercept(InterceptedRequest::navigate("/me")).await;
        assert!(matches!(result, Err(GatewayError::Offline(_))));
    }

    // Scenario C
    #[tokio::test]
    async fn test_navigation_refreshes_store_on_manifest_change() {
        let h = harness();
        publish_manifest(&h.network, "abc", &["/app.1.js"]);
        h.network.respond(&url("/app.1.js"), 200, "one");
        h.network.respond(&url("/offline"), 200, "offline v1");
        h.network.respond(&url("/"), 200, "home");
        activated(&h).await;

        publish_manifest(&h.network, "xyz", &["/app.2.js"]);
        h.network.respond(&url("/app.2.js"), 200, "two");
        h.network.respond(&url("/offline"), 200, "offline v2");

        h.gateway.intercept(InterceptedRequest::navigate("/")).await.unwrap();
        assert_eq!(h.gateway.manifest().last_known_hash().as_deref(), Some("xyz"));

        let store = h.gateway.current_store();
        let asset = store.get(url("/app.2.js").as_str()).await.unwrap().unwrap();
        assert_eq!(asset.body.as_ref(), b"two");
        let fallback = store.get(url("/offline").as_str()).await.unwrap().unwrap();
        assert_eq!(fallback.body.as_ref(), b"offline v2");

        // Unchanged manifest does not repopulate
        h.gateway.intercept(InterceptedRequest::navigate("/")).await.unwrap();
        assert_eq!(h.network.calls(&url("/app.2.js")), 1);
    }

    #[tokio::test]
    async fn test_manifest_failure_does_not_break_navigation() {
        let h = harness();
        activated(&h).await;
        h.network.fail(&url("/assets-manifest"));
        h.network.respond(&url("/me"), 200, "profile");

        let response = respond(h.gateway.intercept(InterceptedRequest::navigate("/me")).await.unwrap());
        assert_eq!(response.body.as_ref(), b"profile");
    }

    // Scenario D
    #[tokio::test]
    async fn test_activate_collects_stale_generations() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness_with(
            GatewayConfig::builder()
                .with_store_dir(dir.path())
                .with_generation("v2"),
        );
        h.gateway.store().open("v1").await.unwrap();

        h.gateway.install().await.unwrap();
        let collected = h.gateway.activate().await.unwrap();

        assert_eq!(collected, vec!["v1".to_owned()]);
        let remaining = h.gateway.store().list_generations().await.unwrap();
        assert_eq!(remaining.into_iter().collect::<Vec<_>>(), vec!["v2".to_owned()]);
    }

    #[tokio::test]
    async fn test_queued_click_events_reach_new_client() {
        let h = harness();
        let delivery = h
            .gateway
            .on_push(br#"{"message":"Liked your post","id":9}"#)
            .await
            .unwrap();

        assert!(!h.gateway.on_notification_click(&delivery.notification).await);

        let (_id, mut receiver) = h.gateway.messenger().attach();
        assert_eq!(h.gateway.on_message(br#"{"action":"unknown"}"#), 0);
        assert_eq!(
            h.gateway.on_message(br#"{"action":"sendQueuedMessages"}"#),
            2
        );

        assert_eq!(receiver.try_recv().unwrap(), ClientEvent::OpenPanel);
        assert!(matches!(
            receiver.try_recv().unwrap(),
            ClientEvent::TrackClick { .. }
        ));
        assert_eq!(h.gateway.messenger().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_handle_event_dispatch() {
        let h = harness();
        h.network.respond(&url("/offline"), 200, "No Internet");

        assert!(matches!(
            h.gateway.handle_event(GatewayEvent::Install).await.unwrap(),
            EventOutcome::Installed(_)
        ));
        assert!(matches!(
            h.gateway.handle_event(GatewayEvent::Activate).await.unwrap(),
            EventOutcome::Activated { .. }
        ));
        assert!(matches!(
            h.gateway
                .handle_event(GatewayEvent::Push(Bytes::from_static(b"garbage")))
                .await
                .unwrap(),
            EventOutcome::Pushed(None)
        ));
        assert!(matches!(
            h.gateway
                .handle_event(GatewayEvent::Fetch(InterceptedRequest::navigate("/offline")))
                .await
                .unwrap(),
            EventOutcome::Fetched(Interception::Respond(_))
        ));
        assert!(matches!(
            h.gateway
                .handle_event(GatewayEvent::Message(Bytes::from_static(
                    br#"{"action":"sendQueuedMessages"}"#
                )))
                .await
                .unwrap(),
            EventOutcome::Message { flushed: 0 }
        ));
    }
}
