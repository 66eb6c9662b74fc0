//! Bearer tokens: signed capabilities an actor hands to a ledger account
//!
//! A token authorizes one ledger account (the transaction signer) to submit
//! policy commands on behalf of the actor that issued it. The wire format is a
//! compact JWS: `base64url(header).base64url(claims).base64url(signature)`,
//! signed with the actor's Ed25519 key and verified against the key encoded in
//! the issuer DID.

use crate::error::{AcpError, AcpResult};
use crate::identity::did::{did_from_public_key, public_key_from_did};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};

/// Signature algorithm advertised in the token header
const TOKEN_ALGORITHM: &str = "EdDSA";

/// Token type advertised in the token header
const TOKEN_TYPE: &str = "JWT";

/// Default audience expected by the ledger
pub const DEFAULT_BEARER_AUDIENCE: &str = "sourcehub";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// Claims carried by a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerClaims {
    /// DID of the actor issuing the token
    pub iss: String,
    /// Intended audience (the ledger)
    pub aud: String,
    /// Ledger account allowed to act on behalf of the issuer
    pub authorized_account: String,
    /// Issued-at, seconds since the unix epoch
    pub iat: i64,
    /// Expiry, seconds since the unix epoch
    pub exp: i64,
}

/// Issues a bearer token for `authorized_account`, valid for `ttl` from `now`.
pub fn issue_bearer_token(
    signing_key: &SigningKey,
    audience: &str,
    authorized_account: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> AcpResult<String> {
    let header = TokenHeader {
        alg: TOKEN_ALGORITHM.to_string(),
        typ: TOKEN_TYPE.to_string(),
    };
    let claims = BearerClaims {
        iss: did_from_public_key(&signing_key.verifying_key()),
        aud: audience.to_string(),
        authorized_account: authorized_account.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
    );
    let signature = signing_key.sign(signing_input.as_bytes());

    Ok(format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

/// Verifies a bearer token and returns its claims.
///
/// The signature must match the key encoded in the issuer DID, the token must
/// not be expired at `now`, and it must authorize `expected_account`.
pub fn verify_bearer_token(
    token: &str,
    expected_audience: &str,
    expected_account: &str,
    now: DateTime<Utc>,
) -> AcpResult<BearerClaims> {
    let mut parts = token.split('.');
    let (header_b64, claims_b64, signature_b64) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(c), Some(s), None) => (h, c, s),
        _ => return Err(AcpError::InvalidBearerToken("malformed token".to_string())),
    };

    let header: TokenHeader = decode_segment(header_b64)?;
    if header.alg != TOKEN_ALGORITHM {
        return Err(AcpError::InvalidBearerToken(format!(
            "unsupported algorithm {}",
            header.alg
        )));
    }

    let claims: BearerClaims = decode_segment(claims_b64)?;
    let issuer_key = public_key_from_did(&claims.iss)?;

    let signature_bytes = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|e| AcpError::InvalidBearerToken(e.to_string()))?;
    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|e| AcpError::InvalidBearerToken(e.to_string()))?;

    let signing_input = format!("{}.{}", header_b64, claims_b64);
    issuer_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| AcpError::InvalidBearerToken("signature mismatch".to_string()))?;

    if claims.exp <= now.timestamp() {
        return Err(AcpError::InvalidBearerToken("token expired".to_string()));
    }
    if claims.aud != expected_audience {
        return Err(AcpError::InvalidBearerToken(format!(
            "unexpected audience {}",
            claims.aud
        )));
    }
    if claims.authorized_account != expected_account {
        return Err(AcpError::InvalidBearerToken(format!(
            "token does not authorize account {}",
            expected_account
        )));
    }

    Ok(claims)
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> AcpResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AcpError::InvalidBearerToken(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| AcpError::InvalidBearerToken(e.to_string()))
}
