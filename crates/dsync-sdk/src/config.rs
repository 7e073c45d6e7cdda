//! Client configuration and application hooks.

use crate::error::SdkError;
use dsync_core::{Document, JsonPatchStrategy, Strategy};
use dsync_engine::RegistrationPolicy;
use std::fmt;

/// Hook with no arguments (`on_open`, `on_close`).
pub type EventHook = Box<dyn FnMut() + Send>;
/// Hook receiving the updated document after a remote edit.
pub type SyncHook<C> = Box<dyn FnMut(&Document<C>) + Send>;
/// Hook receiving errors that never reach a caller.
pub type ErrorHook = Box<dyn FnMut(&SdkError) + Send>;

/// Application callbacks. Unset hooks are no-ops.
pub struct ClientHooks<C> {
    pub on_open: Option<EventHook>,
    pub on_close: Option<EventHook>,
    pub on_sync: Option<SyncHook<C>>,
    pub on_error: Option<ErrorHook>,
}

impl<C> ClientHooks<C> {
    pub(crate) fn open(&mut self) {
        if let Some(hook) = self.on_open.as_mut() {
            hook();
        }
    }

    pub(crate) fn close(&mut self) {
        if let Some(hook) = self.on_close.as_mut() {
            hook();
        }
    }

    pub(crate) fn sync(&mut self, doc: &Document<C>) {
        if let Some(hook) = self.on_sync.as_mut() {
            hook(doc);
        }
    }

    pub(crate) fn error(&mut self, err: &SdkError) {
        if let Some(hook) = self.on_error.as_mut() {
            hook(err);
        }
    }
}

impl<C> Default for ClientHooks<C> {
    fn default() -> Self {
        Self {
            on_open: None,
            on_close: None,
            on_sync: None,
            on_error: None,
        }
    }
}

impl<C> fmt::Debug for ClientHooks<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHooks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_sync", &self.on_sync.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Configuration for a [`SyncClient`](crate::SyncClient).
pub struct ClientConfig<S: Strategy = JsonPatchStrategy> {
    /// Where to connect. Required.
    pub server_url: Option<String>,
    /// Identifies this client to the peer.
    pub client_id: String,
    /// Diff/patch strategy for every document of the client.
    pub strategy: S,
    /// Behaviour when a document id is registered twice.
    pub registration: RegistrationPolicy,
    pub hooks: ClientHooks<S::Content>,
}

impl<S: Strategy + Default> Default for ClientConfig<S> {
    fn default() -> Self {
        Self::with_strategy(S::default())
    }
}

impl<S: Strategy> ClientConfig<S> {
    /// Defaults around an explicit strategy.
    pub fn with_strategy(strategy: S) -> Self {
        Self {
            server_url: None,
            client_id: ulid::Ulid::new().to_string(),
            strategy,
            registration: RegistrationPolicy::default(),
            hooks: ClientHooks::default(),
        }
    }
}

impl<S: Strategy> fmt::Debug for ClientConfig<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("client_id", &self.client_id)
            .field("strategy", &self.strategy.name())
            .field("registration", &self.registration)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Builder for client configuration.
pub struct ClientConfigBuilder<S: Strategy = JsonPatchStrategy> {
    config: ClientConfig<S>,
}

impl ClientConfigBuilder<JsonPatchStrategy> {
    pub fn new() -> Self {
        Self::with_strategy(JsonPatchStrategy)
    }
}

impl Default for ClientConfigBuilder<JsonPatchStrategy> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Strategy> ClientConfigBuilder<S> {
    pub fn with_strategy(strategy: S) -> Self {
        Self {
            config: ClientConfig::with_strategy(strategy),
        }
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = Some(url.into());
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.config.client_id = id.into();
        self
    }

    pub fn registration(mut self, policy: RegistrationPolicy) -> Self {
        self.config.registration = policy;
        self
    }

    pub fn on_open(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.config.hooks.on_open = Some(Box::new(hook));
        self
    }

    pub fn on_close(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.config.hooks.on_close = Some(Box::new(hook));
        self
    }

    pub fn on_sync(mut self, hook: impl FnMut(&Document<S::Content>) + Send + 'static) -> Self {
        self.config.hooks.on_sync = Some(Box::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl FnMut(&SdkError) + Send + 'static) -> Self {
        self.config.hooks.on_error = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> ClientConfig<S> {
        self.config
    }
}
