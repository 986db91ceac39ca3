//! Shared protocol types for luciole live pages
//!
//! This crate defines the envelopes exchanged between the browser
//! client and the server, over both transports:
//!
//! - duplex (websocket): JSON text messages, [`ActionEnvelope`] inbound
//!   and [`UpdateEnvelope`] outbound
//! - request/response fallback: one `POST` per action, the same
//!   envelopes as body and response
//!
//! Both paths produce byte-identical patches for identical action
//! sequences; only the framing differs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response header advertising whether the duplex transport is up.
pub const WEBSOCKET_CAPABILITY_HEADER: &str = "x-livetemplate-websocket";

/// Request header carrying the signed page token on the fallback path.
pub const TOKEN_HEADER: &str = "x-livetemplate-token";

/// Attribute naming the addressable root of a rendered page.
pub const FRAGMENT_ID_ATTR: &str = "data-lvt-id";

/// Attribute carrying the signed page token on the wrapper element.
pub const TOKEN_ATTR: &str = "data-lvt-token";

/// `<meta name>` repeating the signed token in full-document renders.
pub const TOKEN_META_NAME: &str = "lvt-token";

// ============================================================================
// Client → server
// ============================================================================

/// An action submitted by the client.
///
/// `cache` optionally lists statics-signature hashes the client still
/// holds; a match lets the server omit `s` arrays from its patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub action: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cache: Vec<String>,
}

impl ActionEnvelope {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            data: Map::new(),
            cache: Vec::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_cache(mut self, signature: impl Into<String>) -> Self {
        self.cache.push(signature.into());
        self
    }
}

// ============================================================================
// Server → client
// ============================================================================

/// Outcome metadata attached to every server message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Name of the action this responds to; absent on the initial render
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub success: bool,
    /// Field-level errors from the handler (validation and friends)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

/// One server → client message: a tree (full render or sparse patch)
/// plus metadata. A no-change response carries an empty tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEnvelope {
    pub tree: Value,
    pub meta: ResponseMeta,
}

impl UpdateEnvelope {
    /// Initial render: the full tree, no action name.
    pub fn initial(tree: Value) -> Self {
        Self {
            tree,
            meta: ResponseMeta {
                action: None,
                success: true,
                errors: None,
            },
        }
    }

    /// Successful action that produced a patch.
    pub fn patch(action: impl Into<String>, tree: Value) -> Self {
        Self {
            tree,
            meta: ResponseMeta {
                action: Some(action.into()),
                success: true,
                errors: None,
            },
        }
    }

    /// Successful action with nothing to change.
    pub fn no_change() -> Self {
        Self {
            tree: Value::Object(Map::new()),
            meta: ResponseMeta {
                action: None,
                success: true,
                errors: None,
            },
        }
    }

    /// Failed action: field errors in `meta.errors`, state unchanged.
    pub fn failure(errors: BTreeMap<String, String>) -> Self {
        Self {
            tree: Value::Object(Map::new()),
            meta: ResponseMeta {
                action: None,
                success: false,
                errors: Some(errors),
            },
        }
    }
}
