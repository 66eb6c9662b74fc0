//! In-process ledger for tests and local development
//!
//! Executes transactions immediately against a temporary policy engine while
//! enforcing what the real chain enforces: signatures, chain id and bearer
//! tokens. Policy ids get a fresh nonce per transaction, so identical
//! submissions never collide.

use crate::error::{AcpError, AcpResult};
use crate::identity::verify_bearer_token;
use crate::ledger::transport::LedgerTransport;
use crate::ledger::tx::{
    LedgerMsg, LedgerPermission, LedgerPolicy, LedgerRelation, LedgerResource, MsgResult,
    PolicyCmd, SignedTx, TxResponse,
};
use crate::local::{AcpStore, PolicyEngine, StoredPolicy};
use crate::logging::AcpLogger;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Response code for a transaction the chain refused to execute
pub const CODE_EXECUTION_FAILED: u32 = 1;

pub struct MockLedger {
    chain_id: String,
    bearer_audience: String,
    engine: PolicyEngine,
    logger: AcpLogger,
    delivered: Mutex<HashMap<String, TxResponse>>,
    height: AtomicU64,
    broadcasts: AtomicUsize,
    queries: AtomicUsize,
}

impl MockLedger {
    pub fn new(chain_id: impl Into<String>, bearer_audience: impl Into<String>) -> AcpResult<Self> {
        Ok(Self {
            chain_id: chain_id.into(),
            bearer_audience: bearer_audience.into(),
            engine: PolicyEngine::new(AcpStore::open_temporary()?, AcpLogger::current()),
            logger: AcpLogger::current(),
            delivered: Mutex::new(HashMap::new()),
            height: AtomicU64::new(0),
            broadcasts: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        })
    }

    /// Route the ledger's events, including those of its engine, to `logger`
    pub fn with_logger(mut self, logger: AcpLogger) -> Self {
        self.engine = PolicyEngine::new(self.engine.store().clone(), logger.clone());
        self.logger = logger;
        self
    }

    /// Number of transactions broadcast so far
    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    /// Number of query requests served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn execute(&self, tx: &SignedTx) -> AcpResult<MsgResult> {
        match &tx.body.msg {
            LedgerMsg::CreatePolicy {
                policy,
                marshal_type,
                creation_time,
                ..
            } => {
                let nonce = uuid::Uuid::new_v4().to_string();
                let stored = self.engine.create_policy(
                    &tx.body.account,
                    policy,
                    *marshal_type,
                    *creation_time,
                    Some(&nonce),
                )?;
                Ok(MsgResult::CreatePolicy {
                    policy: to_ledger_policy(&stored),
                })
            }
            LedgerMsg::BearerPolicyCmd {
                bearer_token,
                policy_id,
                cmd,
                creation_time,
                ..
            } => {
                let claims = verify_bearer_token(
                    bearer_token,
                    &self.bearer_audience,
                    &tx.body.account,
                    Utc::now(),
                )?;
                let actor = claims.iss.as_str();

                match cmd {
                    PolicyCmd::RegisterObject { resource, object_id } => {
                        let result = self.engine.register_object(
                            actor,
                            policy_id,
                            resource,
                            object_id,
                            *creation_time,
                        )?;
                        Ok(MsgResult::RegisterObject { result })
                    }
                    PolicyCmd::ArchiveObject { resource, object_id } => {
                        let archived = self.engine.archive_object(
                            actor,
                            policy_id,
                            resource,
                            object_id,
                            *creation_time,
                        )?;
                        Ok(MsgResult::ArchiveObject { archived })
                    }
                    PolicyCmd::SetRelationship {
                        resource,
                        object_id,
                        relation,
                        subject,
                    } => {
                        let record_existed = self.engine.set_relationship(
                            actor,
                            policy_id,
                            resource,
                            object_id,
                            relation,
                            subject,
                            *creation_time,
                        )?;
                        Ok(MsgResult::SetRelationship { record_existed })
                    }
                    PolicyCmd::DeleteRelationship {
                        resource,
                        object_id,
                        relation,
                        subject,
                    } => {
                        let record_found = self.engine.delete_relationship(
                            actor,
                            policy_id,
                            resource,
                            object_id,
                            relation,
                            subject,
                            *creation_time,
                        )?;
                        Ok(MsgResult::DeleteRelationship { record_found })
                    }
                }
            }
        }
    }

    fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::SeqCst);
    }
}

fn to_ledger_policy(stored: &StoredPolicy) -> LedgerPolicy {
    let resources = stored
        .definition
        .resources
        .values()
        .map(|resource| LedgerResource {
            name: resource.name.clone(),
            permissions: resource
                .permissions
                .iter()
                .map(|(name, p)| LedgerPermission {
                    name: name.clone(),
                    expression: p.expr.clone(),
                    doc: p.doc.clone(),
                })
                .collect(),
            relations: resource
                .relations
                .iter()
                .map(|(name, r)| LedgerRelation {
                    name: name.clone(),
                    manages: r.manages.clone(),
                    doc: r.doc.clone(),
                })
                .collect(),
        })
        .collect();

    LedgerPolicy {
        id: stored.id.clone(),
        name: stored.definition.name.clone(),
        description: stored.definition.description.clone(),
        creator: stored.creator.clone(),
        creation_time: stored.created_at,
        resources,
    }
}

#[async_trait]
impl LedgerTransport for MockLedger {
    async fn broadcast_tx(&self, tx: &SignedTx) -> AcpResult<String> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);

        // CheckTx: malformed or foreign transactions never enter a block
        tx.verify().map_err(|e| AcpError::LedgerRejected {
            code: 4,
            log: e.to_string(),
        })?;
        if tx.body.chain_id != self.chain_id {
            return Err(AcpError::LedgerRejected {
                code: 4,
                log: format!("wrong chain id {}", tx.body.chain_id),
            });
        }

        let hash = tx.hash()?;
        let height = self.height.fetch_add(1, Ordering::SeqCst) + 1;
        let response = match self.execute(tx) {
            Ok(result) => TxResponse {
                hash: hash.clone(),
                height,
                code: 0,
                log: String::new(),
                result: Some(result),
            },
            Err(e) => {
                self.logger.in_scope(|| {
                    tracing::debug!(tx_hash = %hash, error = %e, "mock ledger rejected transaction")
                });
                TxResponse {
                    hash: hash.clone(),
                    height,
                    code: CODE_EXECUTION_FAILED,
                    log: e.to_string(),
                    result: None,
                }
            }
        };

        self.delivered
            .lock()
            .map_err(|_| AcpError::ledger("mock ledger state poisoned"))?
            .insert(hash.clone(), response);
        Ok(hash)
    }

    async fn tx_result(&self, hash: &str) -> AcpResult<Option<TxResponse>> {
        self.record_query();
        Ok(self
            .delivered
            .lock()
            .map_err(|_| AcpError::ledger("mock ledger state poisoned"))?
            .get(hash)
            .cloned())
    }

    async fn policy(&self, policy_id: &str) -> AcpResult<Option<LedgerPolicy>> {
        self.record_query();
        Ok(self.engine.policy(policy_id)?.as_ref().map(to_ledger_policy))
    }

    async fn object_owner(
        &self,
        policy_id: &str,
        resource: &str,
        object_id: &str,
    ) -> AcpResult<Option<String>> {
        self.record_query();
        self.engine
            .object_owner(policy_id, resource, object_id)
            .map_err(|e| AcpError::ledger(e.to_string()))
    }

    async fn verify_access_request(
        &self,
        policy_id: &str,
        resource: &str,
        object_id: &str,
        permission: &str,
        actor_id: &str,
    ) -> AcpResult<bool> {
        self.record_query();
        self.engine
            .verify(permission, actor_id, policy_id, resource, object_id)
            .map_err(|e| AcpError::ledger(e.to_string()))
    }
}
