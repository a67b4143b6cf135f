//! Claims-based access token expiry parsing.
//!
//! The client never verifies token signatures; it only needs the embedded
//! expiry claim to decide whether a stored token is still worth sending.
//! Parsing is total: malformed input is an answer, not an error.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Outcome of decoding a token's expiry claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenExpiry {
    /// Structurally valid token carrying an `exp` claim (Unix seconds)
    Valid(i64),
    /// Not a three-segment token, or the claims segment is not base64url JSON
    Malformed,
    /// Well-formed claims object without a usable `exp` claim
    MissingClaim,
}

/// Decode the `exp` claim from a three-segment claims-based token.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn decode_expiry(token: &str) -> TokenExpiry {
    let mut segments = token.split('.');
    let (Some(header), Some(claims), Some(signature)) =
        (segments.next(), segments.next(), segments.next())
    else {
        return TokenExpiry::Malformed;
    };
    if segments.next().is_some() || header.is_empty() || signature.is_empty() {
        return TokenExpiry::Malformed;
    }

    let Ok(decoded) = URL_SAFE_NO_PAD.decode(claims) else {
        return TokenExpiry::Malformed;
    };
    let Ok(claims) = serde_json::from_slice::<serde_json::Value>(&decoded) else {
        return TokenExpiry::Malformed;
    };

    // Servers emit exp as an integer, but float seconds show up in the wild.
    match claims.get("exp") {
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|seconds| seconds as i64))
            .map_or(TokenExpiry::MissingClaim, TokenExpiry::Valid),
        None => TokenExpiry::MissingClaim,
    }
}

/// Whether the token's expiry claim is strictly in the future.
///
/// Malformed or claimless tokens are simply invalid; this never errors.
#[must_use]
pub fn is_valid(token: &str) -> bool {
    match decode_expiry(token) {
        TokenExpiry::Valid(expires_at) => expires_at > crate::util::unix_timestamp_now(),
        TokenExpiry::Malformed | TokenExpiry::MissingClaim => false,
    }
}
