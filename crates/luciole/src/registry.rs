//! Application registry
//!
//! The registry is the process-wide directory of live pages, keyed by
//! page id and reached through signed tokens. Applications are the
//! isolation boundary: each owns a secret, its compiled template, its
//! limits, and weak references to its pages. The registry holds the
//! strong references; an explicitly closed page drops out of the strong
//! map and the weak ones die with it.
//!
//! Reads (token lookups) vastly outnumber writes (page create/destroy),
//! so the maps sit behind `std::sync::RwLock` and guards are never held
//! across await points.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use rand::RngCore;
use serde_json::Value;

use verveine::Template;

use crate::config::LiveConfig;
use crate::error::LiveError;
use crate::handler::ActionHandler;
use crate::page::{Page, PageId, approx_value_size};
use crate::token::{self, TokenClaims};

/// Process-wide directory of applications and their live pages.
pub struct Registry {
    apps: RwLock<HashMap<String, Arc<Application>>>,
    pages: RwLock<HashMap<PageId, Arc<Page>>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            apps: RwLock::new(HashMap::new()),
            pages: RwLock::new(HashMap::new()),
        })
    }

    /// Create and register an application. The id becomes part of every
    /// token this application issues, so it must not contain `.`.
    pub fn create_application(
        self: &Arc<Self>,
        id: impl Into<String>,
        template: Arc<Template>,
        handler: Arc<dyn ActionHandler>,
        config: LiveConfig,
    ) -> Result<Arc<Application>, LiveError> {
        let id = id.into();
        if id.is_empty() || id.contains('.') {
            return Err(LiveError::BadRequest(format!(
                "application id {id:?} must be non-empty and dot-free"
            )));
        }

        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);

        let app = Arc::new(Application {
            id: id.clone(),
            secret,
            template,
            handler,
            config,
            pages: RwLock::new(HashMap::new()),
            memory: AtomicUsize::new(0),
            registry: Arc::downgrade(self),
        });

        let mut apps = self.apps.write().unwrap();
        if apps.contains_key(&id) {
            return Err(LiveError::BadRequest(format!(
                "application {id:?} already registered"
            )));
        }
        apps.insert(id, app.clone());
        Ok(app)
    }

    fn lookup_page(&self, id: &PageId) -> Option<Arc<Page>> {
        self.pages
            .read()
            .unwrap()
            .get(id)
            .cloned()
    }

    fn insert_page(&self, page: Arc<Page>) {
        self.pages
            .write()
            .unwrap()
            .insert(page.id().clone(), page);
    }

    fn remove_page(&self, id: &PageId) {
        self.pages
            .write()
            .unwrap()
            .remove(id);
    }

    /// Close every page whose idle time exceeds its application's
    /// expiry, and prune references to pages that are already gone.
    pub async fn sweep_expired(&self) {
        let apps: Vec<Arc<Application>> = {
            let apps = self.apps.read().unwrap();
            apps.values().cloned().collect()
        };
        for app in apps {
            let expiry = app.config.idle_expiry();
            let expired: Vec<Arc<Page>> = {
                let mut pages = app.pages.write().unwrap();
                pages.retain(|_, weak| weak.strong_count() > 0);
                pages
                    .values()
                    .filter_map(Weak::upgrade)
                    .filter(|page| page.idle_for() >= expiry)
                    .collect()
            };
            for page in expired {
                tracing::info!(app = %app.id, page = %page.id(), "closing idle page");
                app.close_page(&page).await;
            }
        }
    }

    /// Spawn a background task sweeping expired pages at `period`. The
    /// task ends when the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.sweep_expired().await;
            }
        })
    }
}

/// Tenant boundary: secret, template, handler, limits, pages.
pub struct Application {
    id: String,
    secret: [u8; 32],
    template: Arc<Template>,
    handler: Arc<dyn ActionHandler>,
    config: LiveConfig,
    pages: RwLock<HashMap<PageId, Weak<Page>>>,
    memory: AtomicUsize,
    registry: Weak<Registry>,
}

impl Application {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    /// Approximate memory in use across this application's pages.
    pub fn memory_used(&self) -> usize {
        self.memory.load(Ordering::Relaxed)
    }

    /// Pages currently alive (weak refs that still upgrade).
    pub fn live_page_count(&self) -> usize {
        let pages = self.pages.read().unwrap();
        pages.values().filter(|w| w.strong_count() > 0).count()
    }

    /// Create a page for a new session, enforcing this application's
    /// limits. The page starts in `New` and renders on first contact.
    pub fn create_page(self: &Arc<Self>, snapshot: Value) -> Result<Arc<Page>, LiveError> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| LiveError::Transport("registry shut down".into()))?;

        if self.live_page_count() >= self.config.limits.max_pages {
            return Err(LiveError::ResourceExhausted(format!(
                "application {} is at its page limit",
                self.id
            )));
        }
        let incoming = approx_value_size(&snapshot);
        if self.memory_used() + incoming > self.config.limits.max_memory_bytes {
            return Err(LiveError::ResourceExhausted(format!(
                "application {} is over its memory bound",
                self.id
            )));
        }

        let id = PageId::fresh();
        let claims = TokenClaims {
            app: self.id.clone(),
            page: id.as_str().to_string(),
            issued_at: chrono::Utc::now().timestamp(),
        };
        let token = token::mint(&self.secret, &claims);

        let page = Arc::new(Page::new(
            id.clone(),
            token,
            self.template.clone(),
            self.handler.clone(),
            self.config.clone(),
            snapshot,
            Arc::downgrade(self),
        ));

        {
            let mut pages = self.pages.write().unwrap();
            pages.insert(id.clone(), Arc::downgrade(&page));
        }
        registry.insert_page(page.clone());
        tracing::debug!(app = %self.id, page = %id, "page created");
        Ok(page)
    }

    /// Resolve a signed token to a live page. Constant-time signature
    /// check; tokens from other applications never resolve here.
    pub fn resolve(&self, token: &str) -> Result<Arc<Page>, LiveError> {
        let claims = token::verify(&self.secret, token)?;
        if claims.app != self.id {
            return Err(LiveError::Unauthorized);
        }
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| LiveError::Transport("registry shut down".into()))?;
        registry
            .lookup_page(&PageId::from_raw(claims.page))
            .ok_or(LiveError::Expired)
    }

    /// Close one page and forget it everywhere.
    pub async fn close_page(&self, page: &Arc<Page>) {
        page.close().await;
        {
            let mut pages = self.pages.write().unwrap();
            pages.remove(page.id());
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_page(page.id());
        }
    }

    /// Close every page this application owns.
    pub async fn shutdown(&self) {
        let pages: Vec<Arc<Page>> = {
            let pages = self.pages.read().unwrap();
            pages.values().filter_map(Weak::upgrade).collect()
        };
        for page in pages {
            self.close_page(&page).await;
        }
        tracing::info!(app = %self.id, "application shut down");
    }

    pub(crate) fn update_memory(&self, old: usize, new: usize) {
        if new >= old {
            self.memory.fetch_add(new - old, Ordering::Relaxed);
        } else {
            self.memory.fetch_sub(old - new, Ordering::Relaxed);
        }
    }
}
