//! Signed page tokens
//!
//! Format: `v1.<app>.<page>.<issued-at>.<base64url mac>`, where the MAC
//! is HMAC-SHA256 over the three claim fields using the application's
//! secret. Verification is constant-time, so a token minted by one
//! application can never resolve inside another.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::LiveError;

type HmacSha256 = Hmac<Sha256>;

const VERSION: &str = "v1";

/// Fields embedded in a page token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub app: String,
    pub page: String,
    pub issued_at: i64,
}

/// Mint a signed token. Claim fields must not contain `.`; the
/// application validates its id at creation and page ids are hex.
pub fn mint(secret: &[u8], claims: &TokenClaims) -> String {
    let payload = format!("{}.{}.{}", claims.app, claims.page, claims.issued_at);
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    let tag = mac.finalize().into_bytes();
    format!("{VERSION}.{payload}.{}", URL_SAFE_NO_PAD.encode(tag))
}

/// Verify a token against this application's secret.
pub fn verify(secret: &[u8], token: &str) -> Result<TokenClaims, LiveError> {
    let mut parts = token.split('.');
    let (Some(version), Some(app), Some(page), Some(issued_at), Some(tag), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(LiveError::Unauthorized);
    };
    if version != VERSION {
        return Err(LiveError::Unauthorized);
    }
    let issued_at: i64 = issued_at.parse().map_err(|_| LiveError::Unauthorized)?;
    let tag = URL_SAFE_NO_PAD
        .decode(tag)
        .map_err(|_| LiveError::Unauthorized)?;

    let payload = format!("{app}.{page}.{issued_at}");
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    mac.verify_slice(&tag).map_err(|_| LiveError::Unauthorized)?;

    Ok(TokenClaims {
        app: app.to_string(),
        page: page.to_string(),
        issued_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> TokenClaims {
        TokenClaims {
            app: "shop".into(),
            page: "0123abcd".into(),
            issued_at: 1_754_000_000,
        }
    }

    #[test]
    fn mint_verify_roundtrip() {
        let secret = b"0123456789abcdef0123456789abcdef";
        let token = mint(secret, &claims());
        assert_eq!(verify(secret, &token).unwrap(), claims());
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let token = mint(b"secret-a", &claims());
        assert!(matches!(
            verify(b"secret-b", &token),
            Err(LiveError::Unauthorized)
        ));
    }

    #[test]
    fn tampered_claims_are_unauthorized() {
        let secret = b"secret";
        let token = mint(secret, &claims());
        let forged = token.replacen("shop", "bank", 1);
        assert!(matches!(verify(secret, &forged), Err(LiveError::Unauthorized)));
    }

    #[test]
    fn malformed_tokens_are_unauthorized() {
        for bad in ["", "v1", "v1.a.b", "v0.a.b.0.AAAA", "v1.a.b.notanumber.AAAA", "v1.a.b.0.!!"] {
            assert!(
                matches!(verify(b"secret", bad), Err(LiveError::Unauthorized)),
                "token {bad:?} must not verify"
            );
        }
    }
}
