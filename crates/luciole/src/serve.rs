//! HTTP surface
//!
//! Routes, all mounted under `/live`:
//!
//! - `GET  /live`    — create a page, return the full rendered document
//!   (wrapper div with `data-lvt-id`, the signed token as both a
//!   wrapper attribute and a head meta tag)
//! - `HEAD /live`    — capability probe; answers with the websocket
//!   header only and never allocates a page
//! - `POST /live`    — request/response fallback: one action envelope
//!   in, one response envelope out, token in `x-livetemplate-token`
//! - `GET  /live/ws` — duplex upgrade; token in the `token` query
//!   parameter, optional cached-statics hash in `cache`
//!
//! Both paths feed [`Page::process_action`], so identical action
//! sequences produce byte-identical patches regardless of transport.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use futures_util::SinkExt;
use futures_util::stream::{SplitSink, SplitStream, StreamExt};
use serde_json::Value;

use luciole_protocol::{
    ActionEnvelope, TOKEN_HEADER, UpdateEnvelope, WEBSOCKET_CAPABILITY_HEADER,
};

use crate::error::LiveError;
use crate::registry::Application;
use crate::transport::{Transport, TransportRx, TransportTx, drive};

/// Per-connection initial snapshot factory.
pub type SnapshotFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Serves one application's live pages over HTTP and websocket.
pub struct LiveServer {
    app: Arc<Application>,
    initial: SnapshotFn,
    ws_enabled: bool,
}

impl LiveServer {
    pub fn new(app: Arc<Application>, initial: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self {
            app,
            initial: Arc::new(initial),
            ws_enabled: true,
        }
    }

    /// Disable the duplex transport; clients fall back to `POST`.
    pub fn websocket_enabled(mut self, enabled: bool) -> Self {
        self.ws_enabled = enabled;
        self
    }

    /// Build the router. Mount it wherever the host application wants.
    pub fn router(self) -> Router {
        let server = Arc::new(self);
        let mut router = Router::new().route("/live", get(get_live).post(post_live));
        if server.ws_enabled {
            router = router.route("/live/ws", get(ws_live));
        }
        router.with_state(server)
    }
}

fn capability_headers(server: &LiveServer) -> [(&'static str, &'static str); 1] {
    let value = if server.ws_enabled { "enabled" } else { "disabled" };
    [(WEBSOCKET_CAPABILITY_HEADER, value)]
}

/// `GET /live`, plus the `HEAD` capability probe axum routes to the
/// same handler.
async fn get_live(State(server): State<Arc<LiveServer>>, method: Method) -> Response {
    // probes only want the capability header; allocating a page for
    // them would eat into the application's limits
    if method == Method::HEAD {
        return (capability_headers(&server), ()).into_response();
    }
    let snapshot = (server.initial)();
    match server.app.create_page(snapshot) {
        Ok(page) => {
            let html = page.render_page().await;
            (capability_headers(&server), Html(html)).into_response()
        }
        Err(err) => error_response(&server, err),
    }
}

/// `POST /live` — the request/response fallback.
async fn post_live(
    State(server): State<Arc<LiveServer>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(token) = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) else {
        return error_response(&server, LiveError::BadRequest("missing page token".into()));
    };
    let page = match server.app.resolve(token) {
        Ok(page) => page,
        Err(err) => return error_response(&server, err),
    };
    let envelope = match serde_json::from_str::<ActionEnvelope>(&body) {
        Ok(envelope) => envelope,
        Err(err) => {
            // malformed envelope: the session (page) stays usable
            let bad = LiveError::BadRequest(err.to_string());
            let reply = UpdateEnvelope::failure(bad.field_errors());
            return (
                StatusCode::BAD_REQUEST,
                capability_headers(&server),
                Json(reply),
            )
                .into_response();
        }
    };
    match page.process_action(envelope).await {
        Ok(reply) => (capability_headers(&server), Json(reply)).into_response(),
        Err(err) => error_response(&server, err),
    }
}

/// `GET /live/ws` — duplex upgrade.
async fn ws_live(
    State(server): State<Arc<LiveServer>>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.get("token") else {
        return error_response(&server, LiveError::BadRequest("missing page token".into()));
    };
    let page = match server.app.resolve(token) {
        Ok(page) => page,
        Err(err) => return error_response(&server, err),
    };
    let cache = params.get("cache").cloned();
    ws.on_upgrade(move |socket| async move {
        if let Some(signature) = cache {
            // reconnecting client presents its cached-statics hash
            page.present_cache(&signature).await;
        }
        if let Err(err) = drive(page, WsTransport { socket }).await {
            tracing::warn!(error = %err, "websocket session ended with error");
        }
    })
}

fn error_response(server: &LiveServer, err: LiveError) -> Response {
    let status = match &err {
        LiveError::BadRequest(_) | LiveError::Validation(_) => StatusCode::BAD_REQUEST,
        LiveError::Unauthorized => StatusCode::UNAUTHORIZED,
        LiveError::Expired => StatusCode::GONE,
        LiveError::ResourceExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
        LiveError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        LiveError::TemplateSyntax(_)
        | LiveError::HandlerFault(_)
        | LiveError::SlowClient
        | LiveError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let reply = UpdateEnvelope::failure(err.field_errors());
    (status, capability_headers(server), Json(reply)).into_response()
}

// ============================================================================
// Websocket transport
// ============================================================================

/// Axum websocket as a [`Transport`].
pub struct WsTransport {
    socket: WebSocket,
}

pub struct WsTx(SplitSink<WebSocket, Message>);
pub struct WsRx(SplitStream<WebSocket>);

impl Transport for WsTransport {
    type Tx = WsTx;
    type Rx = WsRx;

    fn split(self) -> (Self::Tx, Self::Rx) {
        let (sink, stream) = self.socket.split();
        (WsTx(sink), WsRx(stream))
    }
}

impl TransportTx for WsTx {
    async fn send(&mut self, msg: String) -> Result<(), LiveError> {
        self.0
            .send(Message::Text(msg.into()))
            .await
            .map_err(|err| LiveError::Transport(err.to_string()))
    }
}

impl TransportRx for WsRx {
    async fn recv(&mut self) -> Option<Result<String, LiveError>> {
        loop {
            match self.0.next().await {
                None => return None,
                Some(Err(err)) => return Some(Err(LiveError::Transport(err.to_string()))),
                Some(Ok(Message::Text(text))) => return Some(Ok(text.as_str().to_owned())),
                Some(Ok(Message::Close(_))) => return None,
                // pings/pongs are the socket's business; binary frames
                // are not part of this protocol
                Some(Ok(_)) => continue,
            }
        }
    }
}
