//! Error taxonomy for live pages
//!
//! Fatal errors terminate the page; non-fatal ones flow back to the
//! client through the envelope's `meta.errors` channel and leave the
//! snapshot untouched. The core never retries handlers.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LiveError {
    /// Template cannot be compiled; fatal to the page
    #[error("template syntax: {0}")]
    TemplateSyntax(#[from] verveine::TemplateError),

    /// Malformed envelope or unknown action; session continues
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Handler reported field-level issues; snapshot unchanged
    #[error("validation failed")]
    Validation(BTreeMap<String, String>),

    /// Handler panicked or failed; snapshot unchanged
    #[error("handler fault: {0}")]
    HandlerFault(String),

    /// Token signature or application mismatch
    #[error("unauthorized token")]
    Unauthorized,

    /// Idle expiry or explicit close
    #[error("page expired")]
    Expired,

    /// Registry limits exceeded
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Handler exceeded its configured duration
    #[error("action timed out")]
    Timeout,

    /// Outbound backpressure exceeded
    #[error("client cannot keep up")]
    SlowClient,

    /// Underlying transport error; terminates the session
    #[error("transport: {0}")]
    Transport(String),
}

impl LiveError {
    /// Fatal errors terminate the page session.
    pub fn is_fatal(&self) -> bool {
        match self {
            LiveError::TemplateSyntax(_)
            | LiveError::Unauthorized
            | LiveError::Expired
            | LiveError::ResourceExhausted(_)
            | LiveError::SlowClient
            | LiveError::Transport(_) => true,
            LiveError::BadRequest(_)
            | LiveError::Validation(_)
            | LiveError::HandlerFault(_)
            | LiveError::Timeout => false,
        }
    }

    /// Field-level error map for the envelope's `meta.errors`.
    ///
    /// Validation errors keep their per-field entries; everything else
    /// folds into a single `error` entry.
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        match self {
            LiveError::Validation(fields) => fields.clone(),
            other => BTreeMap::from([("error".to_string(), other.to_string())]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_split_matches_the_taxonomy() {
        assert!(LiveError::Unauthorized.is_fatal());
        assert!(LiveError::Expired.is_fatal());
        assert!(LiveError::SlowClient.is_fatal());
        assert!(LiveError::Transport("eof".into()).is_fatal());
        assert!(!LiveError::BadRequest("nope".into()).is_fatal());
        assert!(!LiveError::Validation(BTreeMap::new()).is_fatal());
        assert!(!LiveError::HandlerFault("boom".into()).is_fatal());
        assert!(!LiveError::Timeout.is_fatal());
    }

    #[test]
    fn validation_keeps_field_entries() {
        let err = LiveError::Validation(BTreeMap::from([(
            "name".to_string(),
            "must not be empty".to_string(),
        )]));
        assert_eq!(err.field_errors()["name"], "must not be empty");
        assert_eq!(LiveError::Timeout.field_errors()["error"], "action timed out");
    }
}
