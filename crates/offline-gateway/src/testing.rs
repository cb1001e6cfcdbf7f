//! Scripted network double for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::StatusCode;
use url::Url;

use crate::GatewayError;
use crate::network::{Network, NetworkResponse};

#[derive(Clone)]
enum Route {
    Respond(NetworkResponse),
    Fail,
    Stall,
}

#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &Url, status: u16, body: &str) {
        self.redirect(url, url, status, body);
    }

    /// Answer `url` as if it had been redirected to `final_url`
    pub fn redirect(&self, url: &Url, final_url: &Url, status: u16, body: &str) {
        let response = NetworkResponse {
            url: final_url.clone(),
            status: StatusCode::from_u16(status).unwrap(),
            headers: vec![("content-type".to_owned(), "text/plain".to_owned())],
            body: Bytes::from(body.to_owned()),
        };
        self.routes
            .lock()
            .insert(url.to_string(), Route::Respond(response));
    }

    pub fn fail(&self, url: &Url) {
        self.routes.lock().insert(url.to_string(), Route::Fail);
    }

    /// Never answer `url`
    pub fn stall(&self, url: &Url) {
        self.routes.lock().insert(url.to_string(), Route::Stall);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self, url: &Url) -> usize {
        self.calls.lock().get(url.as_str()).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, url: &Url) -> Result<NetworkResponse, GatewayError> {
        *self.calls.lock().entry(url.to_string()).or_default() += 1;

        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Offline(url.to_string()));
        }

        let route = self.routes.lock().get(url.as_str()).cloned();
        match route {
            Some(Route::Respond(response)) => Ok(response),
            Some(Route::Fail) => Err(GatewayError::Offline(url.to_string())),
            Some(Route::Stall) => std::future::pending().await,
            None => Ok(NetworkResponse {
                url: url.clone(),
                status: StatusCode::NOT_FOUND,
                headers: Vec::new(),
                body: Bytes::new(),
            }),
        }
    }
}
