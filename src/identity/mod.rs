//! Actor identities for ACP requests
//!
//! An [`Identity`] names the actor behind a request. Its DID is the actor id the
//! backends store in relationships; an identity without a DID is anonymous. The
//! ledger backend additionally needs a bearer token so the transaction signer may
//! act on the identity's behalf.

pub mod bearer;
pub mod did;

pub use bearer::{issue_bearer_token, verify_bearer_token, BearerClaims, DEFAULT_BEARER_AUDIENCE};
pub use did::{did_from_public_key, is_valid_did, public_key_from_did};

use crate::error::{AcpError, AcpResult};
use chrono::{Duration, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;

/// Actor id meaning "every actor" when used as a relationship target
pub const WILDCARD_ACTOR: &str = "*";

/// An actor presenting a request to the ACP engine
#[derive(Clone, Default)]
pub struct Identity {
    public_key: Option<VerifyingKey>,
    private_key: Option<SigningKey>,
    did: String,
    bearer_token: Option<String>,
}

impl Identity {
    /// Generate a fresh identity with a random Ed25519 key pair
    pub fn generate() -> Self {
        Self::from_private_key(SigningKey::generate(&mut OsRng))
    }

    /// Build an identity that can sign, from its private key
    pub fn from_private_key(private_key: SigningKey) -> Self {
        let public_key = private_key.verifying_key();
        Self {
            did: did_from_public_key(&public_key),
            public_key: Some(public_key),
            private_key: Some(private_key),
            bearer_token: None,
        }
    }

    /// Build a verify-only identity from a public key
    pub fn from_public_key(public_key: VerifyingKey) -> Self {
        Self {
            did: did_from_public_key(&public_key),
            public_key: Some(public_key),
            private_key: None,
            bearer_token: None,
        }
    }

    /// Parse a `did:key` back into a verify-only identity
    pub fn from_did(did: &str) -> AcpResult<Self> {
        public_key_from_did(did).map(Self::from_public_key)
    }

    /// Attach an already issued bearer token
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Issue and attach a bearer token authorizing `authorized_account`
    /// to submit ledger commands for this identity.
    pub fn update_bearer_token(
        &mut self,
        audience: &str,
        authorized_account: &str,
        ttl: Duration,
    ) -> AcpResult<()> {
        let private_key = self.private_key.as_ref().ok_or_else(|| {
            AcpError::identity("a private key is required to issue a bearer token")
        })?;
        let token = issue_bearer_token(private_key, audience, authorized_account, Utc::now(), ttl)?;
        self.bearer_token = Some(token);
        Ok(())
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn public_key(&self) -> Option<&VerifyingKey> {
        self.public_key.as_ref()
    }

    pub fn private_key(&self) -> Option<&SigningKey> {
        self.private_key.as_ref()
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    /// An identity without a DID is anonymous
    pub fn is_anonymous(&self) -> bool {
        self.did.is_empty()
    }

    /// True for `Identity::default()`, which is never a valid requester
    pub fn is_zero(&self) -> bool {
        self.public_key.is_none()
            && self.private_key.is_none()
            && self.did.is_empty()
            && self.bearer_token.is_none()
    }
}

/// Resolve the actor id of an optional identity; absent identities are anonymous.
pub fn actor_id_of(identity: Option<&Identity>) -> String {
    identity.map(|i| i.did().to_string()).unwrap_or_default()
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("did", &self.did)
            .field("has_private_key", &self.private_key.is_some())
            .field("has_bearer_token", &self.bearer_token.is_some())
            .finish()
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.did == other.did
            && self.public_key == other.public_key
            && self.bearer_token == other.bearer_token
    }
}
