//! Shared application state for the HTTP handlers.

use std::sync::Arc;

use crate::store::EventJournal;
use crate::worker::Dispatcher;

/// Shared application state.
///
/// Passed to all handlers via axum's `State` extractor. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    dispatcher: Arc<Dispatcher>,

    /// Names of required environment variables that were not set at startup.
    missing_credentials: Vec<&'static str>,

    /// When set, deliveries must carry a valid `X-Hub-Signature`.
    webhook_secret: Option<Vec<u8>>,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        missing_credentials: Vec<&'static str>,
        webhook_secret: Option<Vec<u8>>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                dispatcher,
                missing_credentials,
                webhook_secret: webhook_secret.filter(|s| !s.is_empty()),
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn journal(&self) -> &EventJournal {
        self.inner.dispatcher.journal()
    }

    pub fn missing_credentials(&self) -> &[&'static str] {
        &self.inner.missing_credentials
    }

    pub fn webhook_secret(&self) -> Option<&[u8]> {
        self.inner.webhook_secret.as_deref()
    }
}
