//! Local bearer-token inspection.
//!
//! The backend signs HS256 JWTs; the client never verifies the signature
//! (it has no key and the backend re-checks every request), it only reads
//! the claims to derive identity, role and expiry. Decoding fails closed:
//! any irregularity is reported as an error and treated by callers exactly
//! like an absent session.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::model::Role;

use super::error::AuthError;

/// Claims the backend embeds in its access tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    /// `sub`: the username.
    pub username: String,
    pub role: Role,
    /// `exp`: unix seconds.
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: String,
    role: String,
    exp: i64,
}

pub fn decode_claims(token: &str) -> Result<Claims, AuthError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::MalformedToken(
            "expected three dot-separated segments".into(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| AuthError::MalformedToken(format!("payload is not base64url: {err}")))?;
    let raw: RawClaims = serde_json::from_slice(&bytes)
        .map_err(|err| AuthError::MalformedToken(format!("payload is not valid claims: {err}")))?;

    let role = Role::parse(&raw.role).ok_or_else(|| AuthError::UnknownRole(raw.role.clone()))?;
    let expires_at = OffsetDateTime::from_unix_timestamp(raw.exp)
        .map_err(|err| AuthError::MalformedToken(format!("exp out of range: {err}")))?;

    Ok(Claims {
        username: raw.sub,
        role,
        expires_at,
    })
}

impl Claims {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= OffsetDateTime::now_utc()
    }
}

#[cfg(test)]
pub(crate) fn encode_unsigned(username: &str, role: &str, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({ "sub": username, "role": role, "exp": exp }).to_string(),
    );
    format!("{header}.{payload}.sig")
}
