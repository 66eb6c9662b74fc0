//! `did:key` encoding for Ed25519 public keys

use crate::error::{AcpError, AcpResult};
use ed25519_dalek::VerifyingKey;

/// Ed25519 public key length in bytes
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Prefix shared by every `did:key` identifier
pub const DID_KEY_PREFIX: &str = "did:key:";

/// Multibase prefix for base58btc
const MULTIBASE_BASE58_BTC: char = 'z';

/// Multicodec varint for an Ed25519 public key
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// Derives the `did:key` identifier of an Ed25519 public key.
pub fn did_from_public_key(public_key: &VerifyingKey) -> String {
    let mut bytes = Vec::with_capacity(ED25519_MULTICODEC.len() + PUBLIC_KEY_LENGTH);
    bytes.extend_from_slice(&ED25519_MULTICODEC);
    bytes.extend_from_slice(public_key.as_bytes());

    format!(
        "{}{}{}",
        DID_KEY_PREFIX,
        MULTIBASE_BASE58_BTC,
        bs58::encode(bytes).into_string()
    )
}

/// Recovers the Ed25519 public key encoded in a `did:key` identifier.
pub fn public_key_from_did(did: &str) -> AcpResult<VerifyingKey> {
    let invalid = || AcpError::InvalidActorId {
        actor_id: did.to_string(),
    };

    let encoded = did
        .strip_prefix(DID_KEY_PREFIX)
        .and_then(|rest| rest.strip_prefix(MULTIBASE_BASE58_BTC))
        .ok_or_else(invalid)?;

    let bytes = bs58::decode(encoded).into_vec().map_err(|_| invalid())?;
    if bytes.len() != ED25519_MULTICODEC.len() + PUBLIC_KEY_LENGTH
        || bytes[..ED25519_MULTICODEC.len()] != ED25519_MULTICODEC
    {
        return Err(invalid());
    }

    let mut key_bytes = [0u8; PUBLIC_KEY_LENGTH];
    key_bytes.copy_from_slice(&bytes[ED25519_MULTICODEC.len()..]);
    VerifyingKey::from_bytes(&key_bytes).map_err(|_| invalid())
}

/// Returns true if `actor_id` is a well formed Ed25519 `did:key`.
pub fn is_valid_did(actor_id: &str) -> bool {
    public_key_from_did(actor_id).is_ok()
}
