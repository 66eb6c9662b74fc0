//! Ledger-backed ACP backend
//!
//! Writes are signed transactions broadcast to the chain and awaited until
//! included; reads go through the ACP query service. The backend keeps no local
//! state, so its lifecycle methods are no-ops and it cannot reset state.

#[cfg(feature = "mock")]
pub mod mock;
pub mod transport;
pub mod tx;

#[cfg(feature = "mock")]
pub use mock::MockLedger;
pub use transport::{HttpLedgerTransport, LedgerTransport};
pub use tx::{
    account_address, Ed25519TxSigner, LedgerMsg, LedgerPolicy, MsgResult, PolicyCmd, SignedTx,
    TxBuilder, TxResponse, TxSigner, DEFAULT_GAS_LIMIT,
};

use crate::client::AcpSystemClient;
use crate::error::{AcpError, AcpResult};
use crate::identity::{Identity, DEFAULT_BEARER_AUDIENCE};
use crate::logging::AcpLogger;
use crate::types::{AcpSystemType, Policy, PolicyMarshalType, RegistrationResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Name used for the ledger backend in wrapped errors
pub const LEDGER_BACKEND_NAME: &str = "SourceHub";

/// Connection and transaction settings for [`LedgerAcp`]
#[derive(Debug, Clone)]
pub struct LedgerAcpOptions {
    pub chain_id: String,
    pub gas_limit: u64,
    /// How long to wait for a broadcast transaction to be included
    pub await_timeout: Duration,
    pub poll_interval: Duration,
    /// Audience bearer tokens must be issued for
    pub bearer_audience: String,
}

impl Default for LedgerAcpOptions {
    fn default() -> Self {
        Self {
            chain_id: "sourcehub-dev".to_string(),
            gas_limit: DEFAULT_GAS_LIMIT,
            await_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(200),
            bearer_audience: DEFAULT_BEARER_AUDIENCE.to_string(),
        }
    }
}

/// ACP client that talks to the ledger
pub struct LedgerAcp {
    transport: Arc<dyn LedgerTransport>,
    tx_builder: TxBuilder,
    options: LedgerAcpOptions,
    logger: AcpLogger,
}

impl LedgerAcp {
    pub fn new(
        transport: Arc<dyn LedgerTransport>,
        signer: Arc<dyn TxSigner>,
        options: LedgerAcpOptions,
        logger: AcpLogger,
    ) -> Self {
        let tx_builder = TxBuilder::new(options.chain_id.clone(), options.gas_limit, signer);
        Self {
            transport,
            tx_builder,
            options,
            logger,
        }
    }

    /// Connect over HTTP to the query gateway and consensus RPC
    pub fn with_http(
        grpc_address: &str,
        comet_address: &str,
        signer: Arc<dyn TxSigner>,
        options: LedgerAcpOptions,
        logger: AcpLogger,
    ) -> AcpResult<Self> {
        let transport = HttpLedgerTransport::new(grpc_address, comet_address, options.await_timeout)?;
        Ok(Self::new(Arc::new(transport), signer, options, logger))
    }

    /// Ledger account that signs this client's transactions. Bearer tokens
    /// must authorize this account.
    pub fn signer_account(&self) -> String {
        self.tx_builder.account()
    }

    pub fn options(&self) -> &LedgerAcpOptions {
        &self.options
    }

    fn bearer_token<'a>(identity: &'a Identity, operation: &'static str) -> AcpResult<&'a str> {
        identity
            .bearer_token()
            .filter(|token| !token.is_empty())
            .ok_or(AcpError::MissingBearerToken { operation })
    }

    /// Sign, broadcast and await one message.
    async fn submit(&self, msg: LedgerMsg) -> AcpResult<MsgResult> {
        let tx = self.tx_builder.build(msg)?;
        let hash = self.transport.broadcast_tx(&tx).await?;
        self.logger.in_scope(|| {
            tracing::debug!(tx_hash = %hash, sequence = tx.body.sequence, "broadcast acp transaction")
        });

        let response = self.await_tx(&hash).await?;
        if response.code != 0 {
            return Err(AcpError::LedgerRejected {
                code: response.code,
                log: response.log,
            });
        }
        response
            .result
            .ok_or_else(|| AcpError::ledger(format!("transaction {} carried no result", hash)))
    }

    async fn await_tx(&self, hash: &str) -> AcpResult<TxResponse> {
        let deadline = Instant::now() + self.options.await_timeout;
        loop {
            if let Some(response) = self.transport.tx_result(hash).await? {
                return Ok(response);
            }
            if Instant::now() >= deadline {
                return Err(AcpError::TxAwaitTimeout {
                    tx_hash: hash.to_string(),
                });
            }
            sleep(self.options.poll_interval).await;
        }
    }

    async fn submit_cmd(
        &self,
        identity: &Identity,
        operation: &'static str,
        policy_id: &str,
        cmd: PolicyCmd,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<MsgResult> {
        let bearer_token = Self::bearer_token(identity, operation)?;
        self.submit(LedgerMsg::BearerPolicyCmd {
            creator: self.tx_builder.account(),
            bearer_token: bearer_token.to_string(),
            policy_id: policy_id.to_string(),
            cmd,
            creation_time,
        })
        .await
    }
}

fn unexpected(result: MsgResult) -> AcpError {
    AcpError::ledger(format!("unexpected transaction result {:?}", result))
}

#[async_trait]
impl AcpSystemClient for LedgerAcp {
    fn system_type(&self) -> Option<AcpSystemType> {
        Some(AcpSystemType::LedgerDocument)
    }

    fn backend_name(&self) -> &'static str {
        LEDGER_BACKEND_NAME
    }

    fn init(&mut self, _path: &str) {}

    async fn start(&mut self) -> AcpResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> AcpResult<()> {
        Ok(())
    }

    async fn reset_state(&mut self) -> AcpResult<()> {
        Err(AcpError::Unimplemented("ledger acp ResetState()"))
    }

    async fn add_policy(
        &self,
        _creator: &Identity,
        policy: &str,
        marshal_type: PolicyMarshalType,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<String> {
        let result = self
            .submit(LedgerMsg::CreatePolicy {
                creator: self.tx_builder.account(),
                policy: policy.to_string(),
                marshal_type,
                creation_time,
            })
            .await?;

        match result {
            MsgResult::CreatePolicy { policy } => Ok(policy.id),
            other => Err(unexpected(other)),
        }
    }

    async fn policy(&self, policy_id: &str) -> AcpResult<Option<Policy>> {
        Ok(self
            .transport
            .policy(policy_id)
            .await?
            .map(|policy| policy.to_policy()))
    }

    async fn register_object(
        &self,
        identity: &Identity,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<RegistrationResult> {
        let cmd = PolicyCmd::RegisterObject {
            resource: resource_name.to_string(),
            object_id: object_id.to_string(),
        };
        match self
            .submit_cmd(identity, "register objects", policy_id, cmd, creation_time)
            .await?
        {
            MsgResult::RegisterObject { result } => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    async fn archive_object(
        &self,
        identity: &Identity,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<bool> {
        let cmd = PolicyCmd::ArchiveObject {
            resource: resource_name.to_string(),
            object_id: object_id.to_string(),
        };
        match self
            .submit_cmd(identity, "archive objects", policy_id, cmd, creation_time)
            .await?
        {
            MsgResult::ArchiveObject { archived } => Ok(archived),
            other => Err(unexpected(other)),
        }
    }

    async fn object_owner(
        &self,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
    ) -> AcpResult<Option<String>> {
        self.transport
            .object_owner(policy_id, resource_name, object_id)
            .await
    }

    async fn verify_access_request(
        &self,
        permission: &str,
        actor_id: &str,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
    ) -> AcpResult<bool> {
        self.transport
            .verify_access_request(policy_id, resource_name, object_id, permission, actor_id)
            .await
    }

    async fn add_actor_relationship(
        &self,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        relation: &str,
        requester: &Identity,
        target_actor: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<bool> {
        let cmd = PolicyCmd::SetRelationship {
            resource: resource_name.to_string(),
            object_id: object_id.to_string(),
            relation: relation.to_string(),
            subject: target_actor.to_string(),
        };
        match self
            .submit_cmd(requester, "add relationships", policy_id, cmd, creation_time)
            .await?
        {
            MsgResult::SetRelationship { record_existed } => Ok(record_existed),
            other => Err(unexpected(other)),
        }
    }

    async fn delete_actor_relationship(
        &self,
        policy_id: &str,
        resource_name: &str,
        object_id: &str,
        relation: &str,
        requester: &Identity,
        target_actor: &str,
        creation_time: DateTime<Utc>,
    ) -> AcpResult<bool> {
        let cmd = PolicyCmd::DeleteRelationship {
            resource: resource_name.to_string(),
            object_id: object_id.to_string(),
            relation: relation.to_string(),
            subject: target_actor.to_string(),
        };
        match self
            .submit_cmd(requester, "delete relationships", policy_id, cmd, creation_time)
            .await?
        {
            MsgResult::DeleteRelationship { record_found } => Ok(record_found),
            other => Err(unexpected(other)),
        }
    }
}
