//! RPC transport to the ledger
//!
//! Transactions go to the consensus node (`broadcast_tx_sync`, `tx`), queries
//! go to the ACP module's query gateway. Not-found responses are normalized to
//! `None`; every other failure surfaces as an error without retrying.

use crate::error::{AcpError, AcpResult};
use crate::ledger::tx::{LedgerPolicy, MsgResult, SignedTx, TxResponse};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Submit a transaction, returning its hash once accepted into the mempool.
    async fn broadcast_tx(&self, tx: &SignedTx) -> AcpResult<String>;

    /// Inclusion result of a transaction; `None` while still pending.
    async fn tx_result(&self, hash: &str) -> AcpResult<Option<TxResponse>>;

    async fn policy(&self, policy_id: &str) -> AcpResult<Option<LedgerPolicy>>;

    async fn object_owner(
        &self,
        policy_id: &str,
        resource: &str,
        object_id: &str,
    ) -> AcpResult<Option<String>>;

    async fn verify_access_request(
        &self,
        policy_id: &str,
        resource: &str,
        object_id: &str,
        permission: &str,
        actor_id: &str,
    ) -> AcpResult<bool>;
}

// ---- wire shapes ----

#[derive(Debug, Serialize)]
struct BroadcastRequest {
    tx: String,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct BroadcastResult {
    code: u32,
    #[serde(default)]
    log: String,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct TxQueryResult {
    hash: String,
    #[serde(default)]
    height: String,
    tx_result: DeliverResult,
}

#[derive(Debug, Deserialize)]
struct DeliverResult {
    code: u32,
    #[serde(default)]
    log: String,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PolicyQueryResponse {
    policy: LedgerPolicy,
}

#[derive(Debug, Deserialize)]
struct ObjectOwnerResponse {
    is_registered: bool,
    #[serde(default)]
    owner_id: String,
}

#[derive(Debug, Serialize)]
struct VerifyAccessRequestBody<'a> {
    policy_id: &'a str,
    access_request: AccessRequest<'a>,
}

#[derive(Debug, Serialize)]
struct AccessRequest<'a> {
    operations: Vec<Operation<'a>>,
    actor: Actor<'a>,
}

#[derive(Debug, Serialize)]
struct Operation<'a> {
    object: Object<'a>,
    permission: &'a str,
}

#[derive(Debug, Serialize)]
struct Object<'a> {
    resource: &'a str,
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct Actor<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyAccessResponse {
    valid: bool,
}

fn is_not_found(message: &str) -> bool {
    message.to_lowercase().contains("not found")
}

/// HTTP implementation of [`LedgerTransport`]
pub struct HttpLedgerTransport {
    client: Client,
    grpc_address: String,
    comet_address: String,
}

impl HttpLedgerTransport {
    pub fn new(
        grpc_address: impl Into<String>,
        comet_address: impl Into<String>,
        request_timeout: Duration,
    ) -> AcpResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("defra-acp/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            grpc_address: grpc_address.into().trim_end_matches('/').to_string(),
            comet_address: comet_address.into().trim_end_matches('/').to_string(),
        })
    }

    /// Decode a successful JSON response, `None` on a not-found status or message.
    async fn read_json<T: DeserializeOwned>(response: Response) -> AcpResult<Option<T>> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_not_found(&body) {
                return Ok(None);
            }
            return Err(AcpError::ledger(format!("HTTP {}: {}", status.as_u16(), body)));
        }
        Ok(Some(response.json::<T>().await?))
    }
}

#[async_trait]
impl LedgerTransport for HttpLedgerTransport {
    async fn broadcast_tx(&self, tx: &SignedTx) -> AcpResult<String> {
        let request = BroadcastRequest {
            tx: STANDARD.encode(tx.to_bytes()?),
        };
        let response = self
            .client
            .post(format!("{}/broadcast_tx_sync", self.comet_address))
            .json(&request)
            .send()
            .await?;

        let envelope: RpcEnvelope<BroadcastResult> = Self::read_json(response)
            .await?
            .ok_or_else(|| AcpError::ledger("broadcast endpoint not found"))?;
        if let Some(error) = envelope.error {
            return Err(AcpError::ledger(format!("{} {}", error.message, error.data)));
        }
        let result = envelope
            .result
            .ok_or_else(|| AcpError::ledger("empty broadcast response"))?;

        if result.code != 0 {
            return Err(AcpError::LedgerRejected {
                code: result.code,
                log: result.log,
            });
        }
        Ok(result.hash)
    }

    async fn tx_result(&self, hash: &str) -> AcpResult<Option<TxResponse>> {
        let response = self
            .client
            .get(format!("{}/tx", self.comet_address))
            .query(&[("hash", format!("0x{}", hash))])
            .send()
            .await?;

        let envelope: RpcEnvelope<TxQueryResult> = match Self::read_json(response).await? {
            Some(envelope) => envelope,
            None => return Ok(None),
        };
        if let Some(error) = envelope.error {
            // the node reports pending transactions as not found
            if is_not_found(&error.message) || is_not_found(&error.data) {
                return Ok(None);
            }
            return Err(AcpError::ledger(format!("{} {}", error.message, error.data)));
        }
        let result = match envelope.result {
            Some(result) => result,
            None => return Ok(None),
        };

        let msg_result = match result.tx_result.data.as_deref() {
            Some(data) if !data.is_empty() && result.tx_result.code == 0 => {
                let bytes = STANDARD
                    .decode(data)
                    .map_err(|e| AcpError::ledger(format!("invalid tx result data: {}", e)))?;
                Some(serde_json::from_slice::<MsgResult>(&bytes)?)
            }
            _ => None,
        };

        Ok(Some(TxResponse {
            hash: result.hash,
            height: result.height.parse().unwrap_or_default(),
            code: result.tx_result.code,
            log: result.tx_result.log,
            result: msg_result,
        }))
    }

    async fn policy(&self, policy_id: &str) -> AcpResult<Option<LedgerPolicy>> {
        let response = self
            .client
            .get(format!("{}/sourcehub/acp/policy/{}", self.grpc_address, policy_id))
            .send()
            .await?;

        Ok(Self::read_json::<PolicyQueryResponse>(response)
            .await?
            .map(|r| r.policy))
    }

    async fn object_owner(
        &self,
        policy_id: &str,
        resource: &str,
        object_id: &str,
    ) -> AcpResult<Option<String>> {
        let response = self
            .client
            .get(format!(
                "{}/sourcehub/acp/object_owner/{}/{}/{}",
                self.grpc_address, policy_id, resource, object_id
            ))
            .send()
            .await?;

        Ok(Self::read_json::<ObjectOwnerResponse>(response)
            .await?
            .filter(|r| r.is_registered)
            .map(|r| r.owner_id))
    }

    async fn verify_access_request(
        &self,
        policy_id: &str,
        resource: &str,
        object_id: &str,
        permission: &str,
        actor_id: &str,
    ) -> AcpResult<bool> {
        let body = VerifyAccessRequestBody {
            policy_id,
            access_request: AccessRequest {
                operations: vec![Operation {
                    object: Object {
                        resource,
                        id: object_id,
                    },
                    permission,
                }],
                actor: Actor { id: actor_id },
            },
        };

        let response = self
            .client
            .post(format!("{}/sourcehub/acp/verify_access_request", self.grpc_address))
            .json(&body)
            .send()
            .await?;

        let verified: VerifyAccessResponse = Self::read_json(response)
            .await?
            .ok_or_else(|| AcpError::ledger("verify_access_request returned not found"))?;
        Ok(verified.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_detection_is_case_insensitive() {
        assert!(is_not_found("rpc error: code = NotFound desc = policy Not Found"));
        assert!(!is_not_found("internal error"));
    }

    #[test]
    fn trailing_slashes_are_trimmed() {
        let transport =
            HttpLedgerTransport::new("http://localhost:1317/", "http://localhost:26657/", Duration::from_secs(5))
                .unwrap();
        assert_eq!(transport.grpc_address, "http://localhost:1317");
        assert_eq!(transport.comet_address, "http://localhost:26657");
    }

    #[test]
    fn tx_query_result_decodes() {
        let json = r#"{"jsonrpc":"2.0","id":-1,"result":{"hash":"AB","height":"12","tx_result":{"code":0,"log":"","data":null}}}"#;
        let envelope: RpcEnvelope<TxQueryResult> = serde_json::from_str(json).unwrap();
        let result = envelope.result.unwrap();
        assert_eq!(result.height, "12");
        assert_eq!(result.tx_result.code, 0);
    }
}
