//! Page sessions
//!
//! A page binds one client connection to one snapshot, one template,
//! and one action handler. All mutable state sits behind a single
//! `tokio::sync::Mutex`, which is what serializes actions: the lock is
//! held across handler invocation, render, and diff, so responses leave
//! in arrival order and the snapshot never tears.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use luciole_protocol::{FRAGMENT_ID_ATTR, TOKEN_ATTR, TOKEN_META_NAME, UpdateEnvelope};
use verveine::{RenderedTree, Template, diff, patch_to_wire, render, tree_to_wire};

use crate::config::LiveConfig;
use crate::error::LiveError;
use crate::handler::ActionHandler;
use crate::registry::Application;

/// Unique page identifier (hex, never reused within a process).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageId(String);

impl PageId {
    pub(crate) fn fresh() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub(crate) fn from_raw(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a page session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePhase {
    /// Created, no snapshot rendered yet
    New,
    /// Rendering and accepting actions
    Active,
    /// Close requested, draining in-flight work
    Closing,
    /// Terminal
    Closed,
}

/// Lock-free counters, readable without touching the page lock.
#[derive(Debug, Default)]
pub struct PageMetrics {
    actions: AtomicU64,
    failures: AtomicU64,
    patches: AtomicU64,
    bytes_out: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub actions: u64,
    pub failures: u64,
    pub patches: u64,
    pub bytes_out: u64,
}

impl PageMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            actions: self.actions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            patches: self.patches.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_bytes_out(&self, n: usize) {
        self.bytes_out.fetch_add(n as u64, Ordering::Relaxed);
    }
}

struct PageState {
    phase: PagePhase,
    snapshot: Value,
    rendered: Option<RenderedTree>,
    /// Client acknowledged holding the statics for our signature
    client_cached: bool,
    footprint: usize,
}

/// One live session.
pub struct Page {
    id: PageId,
    token: String,
    template: Arc<Template>,
    handler: Arc<dyn ActionHandler>,
    config: LiveConfig,
    state: Mutex<PageState>,
    metrics: PageMetrics,
    created_at: DateTime<Utc>,
    last_access: AtomicI64,
    close_token: CancellationToken,
    app: Weak<Application>,
}

impl Page {
    pub(crate) fn new(
        id: PageId,
        token: String,
        template: Arc<Template>,
        handler: Arc<dyn ActionHandler>,
        config: LiveConfig,
        snapshot: Value,
        app: Weak<Application>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            token,
            template,
            handler,
            config,
            state: Mutex::new(PageState {
                phase: PagePhase::New,
                snapshot,
                rendered: None,
                client_cached: false,
                footprint: 0,
            }),
            metrics: PageMetrics::default(),
            created_at: now,
            last_access: AtomicI64::new(now.timestamp()),
            close_token: CancellationToken::new(),
            app,
        }
    }

    pub fn id(&self) -> &PageId {
        &self.id
    }

    /// The signed token the client echoes back to address this page.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn metrics(&self) -> &PageMetrics {
        &self.metrics
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub async fn phase(&self) -> PagePhase {
        self.state.lock().await.phase
    }

    /// How long since the page last saw traffic.
    pub fn idle_for(&self) -> Duration {
        let last = self.last_access.load(Ordering::Relaxed);
        let elapsed = Utc::now().timestamp().saturating_sub(last);
        Duration::from_secs(elapsed.max(0) as u64)
    }

    fn touch(&self) {
        self.last_access
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    /// Present a statics signature from a reconnecting client. A match
    /// lets subsequent patches omit `s`; a mismatch forces a re-send.
    pub async fn present_cache(&self, signature: &str) -> bool {
        let mut state = self.state.lock().await;
        let hit = signature == self.template.statics_signature();
        state.client_cached = hit;
        hit
    }

    /// Compute the initial full render. Always the first message a new
    /// session receives; transitions `New → Active`.
    pub async fn initial_render(&self) -> UpdateEnvelope {
        let mut state = self.state.lock().await;
        self.touch();
        let tree = render(&self.template, &state.snapshot);
        let wire = tree_to_wire(&tree, true);
        self.store_render(&mut state, tree);
        if state.phase == PagePhase::New {
            state.phase = PagePhase::Active;
        }
        UpdateEnvelope::initial(wire)
    }

    /// Full HTML document for the plain `GET` path: the wrapper
    /// fragment from [`render_html`](Self::render_html) inside a
    /// minimal document whose head repeats the signed token as a meta
    /// tag.
    pub async fn render_page(&self) -> String {
        let body = self.render_html().await;
        format!(
            "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <meta name=\"{TOKEN_META_NAME}\" content=\"{token}\">\n\
             </head>\n<body>\n{body}\n</body>\n</html>\n",
            token = self.token,
        )
    }

    /// The rendered template inside an addressable wrapper carrying the
    /// signed token, for embedding into an existing document.
    pub async fn render_html(&self) -> String {
        let mut state = self.state.lock().await;
        self.touch();
        let tree = render(&self.template, &state.snapshot);
        let html = tree.to_html();
        self.store_render(&mut state, tree);
        if state.phase == PagePhase::New {
            state.phase = PagePhase::Active;
        }
        format!(
            r#"<div {FRAGMENT_ID_ATTR}="{id}-root" {TOKEN_ATTR}="{token}">{html}</div>"#,
            id = self.id,
            token = self.token,
        )
    }

    /// Process one action: invoke the handler, re-render, diff, and
    /// build the response envelope.
    ///
    /// Returns `Err` only for fatal conditions; handler failures,
    /// validation issues, and timeouts come back as `success: false`
    /// envelopes with the snapshot unchanged.
    pub async fn process_action(
        &self,
        envelope: luciole_protocol::ActionEnvelope,
    ) -> Result<UpdateEnvelope, LiveError> {
        let mut state = self.state.lock().await;
        self.touch();
        match state.phase {
            PagePhase::Active => {}
            PagePhase::New => {
                return Err(LiveError::BadRequest("page has not rendered yet".into()));
            }
            PagePhase::Closing | PagePhase::Closed => return Err(LiveError::Expired),
        }

        // a presented hash either acknowledges the cache or, when it no
        // longer matches, signals eviction and forces a re-send
        if !envelope.cache.is_empty() {
            let signature = self.template.statics_signature();
            state.client_cached = envelope.cache.iter().any(|sig| *sig == signature);
        }

        self.metrics.actions.fetch_add(1, Ordering::Relaxed);

        let handler = self.handler.clone();
        let snapshot = state.snapshot.clone();
        let action = envelope.action.clone();
        let data = envelope.data.clone();
        let cancel = self.close_token.child_token();
        let handler_cancel = cancel.clone();
        let join = tokio::task::spawn_blocking(move || {
            handler.handle(snapshot, &action, &data, &handler_cancel)
        });

        let outcome = match tokio::time::timeout(self.config.action_timeout(), join).await {
            Err(_) => {
                cancel.cancel();
                tracing::warn!(page = %self.id, action = %envelope.action, "action handler timed out");
                Err(LiveError::Timeout)
            }
            Ok(Err(join_err)) => {
                let fault = LiveError::HandlerFault(join_err.to_string());
                tracing::error!(page = %self.id, action = %envelope.action, error = %fault, "action handler panicked");
                Err(fault)
            }
            Ok(Ok(Err(action_err))) => {
                tracing::debug!(page = %self.id, action = %envelope.action, "action handler rejected");
                return Ok(self.failed(action_err.field_errors()));
            }
            Ok(Ok(Ok(next_snapshot))) => Ok(next_snapshot),
        };

        let next_snapshot = match outcome {
            Ok(snapshot) => snapshot,
            Err(err) => {
                debug_assert!(!err.is_fatal());
                return Ok(self.failed(err.field_errors()));
            }
        };

        let Some(prev) = state.rendered.take() else {
            return Err(LiveError::BadRequest("page has not rendered yet".into()));
        };
        let next = render(&self.template, &next_snapshot);
        let patch = diff(&prev, &next, state.client_cached);

        state.snapshot = next_snapshot;
        self.store_render(&mut state, next);

        Ok(match patch {
            None => UpdateEnvelope::no_change(),
            Some(patch) => {
                self.metrics.patches.fetch_add(1, Ordering::Relaxed);
                UpdateEnvelope::patch(envelope.action, patch_to_wire(&patch))
            }
        })
    }

    fn failed(&self, errors: std::collections::BTreeMap<String, String>) -> UpdateEnvelope {
        self.metrics.failures.fetch_add(1, Ordering::Relaxed);
        UpdateEnvelope::failure(errors)
    }

    /// Cancel in-flight work and drive the page to `Closed`. Waiting on
    /// the state lock is what drains the in-flight action.
    pub async fn close(&self) {
        self.close_token.cancel();
        let mut state = self.state.lock().await;
        if state.phase == PagePhase::Closed {
            return;
        }
        state.phase = PagePhase::Closing;
        let old = std::mem::take(&mut state.footprint);
        if let Some(app) = self.app.upgrade() {
            app.update_memory(old, 0);
        }
        state.rendered = None;
        state.phase = PagePhase::Closed;
        tracing::info!(page = %self.id, "page closed");
    }

    /// Close and deregister everywhere (used when the session itself
    /// decides the page is done, e.g. a terminated slow client).
    pub async fn expire(self: &Arc<Self>) {
        match self.app.upgrade() {
            Some(app) => app.close_page(self).await,
            None => self.close().await,
        }
    }

    /// Approximate footprint: snapshot plus last rendered tree.
    pub async fn memory_estimate(&self) -> usize {
        self.state.lock().await.footprint
    }

    fn store_render(&self, state: &mut PageState, tree: RenderedTree) {
        let new_footprint = approx_value_size(&state.snapshot) + tree.approx_size();
        let old = std::mem::replace(&mut state.footprint, new_footprint);
        state.rendered = Some(tree);
        if let Some(app) = self.app.upgrade() {
            app.update_memory(old, new_footprint);
        }
    }
}

/// Rough heap size of a snapshot value.
pub(crate) fn approx_value_size(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => 8,
        Value::String(s) => s.len() + 8,
        Value::Array(items) => 8 + items.iter().map(approx_value_size).sum::<usize>(),
        Value::Object(map) => {
            8 + map
                .iter()
                .map(|(k, v)| k.len() + approx_value_size(v))
                .sum::<usize>()
        }
    }
}
