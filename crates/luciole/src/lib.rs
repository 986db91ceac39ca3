//! luciole — live-HTML runtime
//!
//! Serves templates whose dynamic parts update live: a page renders
//! once over plain HTTP, then a thin browser client applies minimal
//! structural patches pushed over a duplex transport (or fetched
//! through a request/response fallback) as user actions mutate the
//! snapshot.
//!
//! The pieces:
//!
//! - [`Registry`] / [`Application`] — tenant isolation, signed page
//!   tokens, limits, idle expiry
//! - [`Page`] — one live session: snapshot, last rendered tree, action
//!   handler, serialized action processing
//! - [`drive`] / [`Transport`] — the duplex session loop
//! - [`LiveServer`] — axum routes for `GET|POST /live` and the
//!   websocket upgrade
//!
//! Template compilation, rendering, and diffing live in the
//! [`verveine`] crate; the wire envelopes in [`luciole_protocol`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::{Map, Value, json};
//! use tokio_util::sync::CancellationToken;
//! use luciole::{ActionError, LiveConfig, LiveServer, Registry};
//! use verveine::Template;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let template = Arc::new(Template::parse(
//!     "counter",
//!     r#"<p>Count: {{.Count}}</p>"#,
//! )?);
//! let handler = |snapshot: Value, action: &str, _data: &Map<String, Value>,
//!                _cancel: &CancellationToken| {
//!     match action {
//!         "inc" => {
//!             let count = snapshot["Count"].as_i64().unwrap_or(0);
//!             Ok(json!({"Count": count + 1}))
//!         }
//!         other => Err(ActionError::Failed(format!("unknown action {other}"))),
//!     }
//! };
//!
//! let registry = Registry::new();
//! let app = registry.create_application(
//!     "counter",
//!     template,
//!     Arc::new(handler),
//!     LiveConfig::default(),
//! )?;
//! let router = LiveServer::new(app, || json!({"Count": 0})).router();
//! # let _ = router;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod handler;
mod page;
mod registry;
mod serve;
mod token;
mod transport;

pub use config::{Limits, LiveConfig, SlowClientPolicy};
pub use error::LiveError;
pub use handler::{ActionError, ActionHandler};
pub use page::{MetricsSnapshot, Page, PageId, PageMetrics, PagePhase};
pub use registry::{Application, Registry};
pub use serve::{LiveServer, SnapshotFn, WsTransport};
pub use token::{TokenClaims, mint, verify};
pub use transport::{
    ChannelClient, ChannelTransport, Transport, TransportRx, TransportTx, channel_pair, drive,
};

// the wire contract is part of this crate's public API surface
pub use luciole_protocol as protocol;
