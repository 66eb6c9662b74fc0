//! TOML configuration for the ACP systems of a node

use crate::bridge::{
    new_ledger_document_acp, new_local_admin_acp, new_local_document_acp, new_local_node_acp,
    DocumentAcp, NodeAcp,
};
use crate::error::{AcpError, AcpResult};
use crate::identity::DEFAULT_BEARER_AUDIENCE;
use crate::ledger::{Ed25519TxSigner, LedgerAcpOptions, DEFAULT_GAS_LIMIT};
use crate::logging::{AcpLogger, LogConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Which backend gates documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentBackend {
    #[default]
    Local,
    Ledger,
}

/// Ledger connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub chain_id: String,
    pub grpc_address: String,
    pub comet_address: String,
    pub gas_limit: u64,
    pub await_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub bearer_audience: String,
    /// Hex encoded ed25519 secret of the transaction signer
    pub signer_key: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            chain_id: "sourcehub-dev".to_string(),
            grpc_address: "http://localhost:1317".to_string(),
            comet_address: "http://localhost:26657".to_string(),
            gas_limit: DEFAULT_GAS_LIMIT,
            await_timeout_secs: 30,
            poll_interval_ms: 200,
            bearer_audience: DEFAULT_BEARER_AUDIENCE.to_string(),
            signer_key: String::new(),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> AcpResult<()> {
        if self.chain_id.is_empty() {
            return Err(AcpError::config("ledger chain_id cannot be empty"));
        }
        if self.grpc_address.is_empty() || self.comet_address.is_empty() {
            return Err(AcpError::config("ledger grpc_address and comet_address are required"));
        }
        if self.gas_limit == 0 {
            return Err(AcpError::config("ledger gas_limit must be positive"));
        }
        if self.poll_interval_ms == 0 || self.await_timeout_secs == 0 {
            return Err(AcpError::config(
                "ledger await_timeout_secs and poll_interval_ms must be positive",
            ));
        }
        if self.signer_key.is_empty() {
            return Err(AcpError::config("ledger signer_key is required"));
        }
        Ok(())
    }

    pub fn options(&self) -> LedgerAcpOptions {
        LedgerAcpOptions {
            chain_id: self.chain_id.clone(),
            gas_limit: self.gas_limit,
            await_timeout: Duration::from_secs(self.await_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            bearer_audience: self.bearer_audience.clone(),
        }
    }
}

/// Top level ACP configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcpConfig {
    /// Root directory of the local stores; empty keeps them in memory
    pub store_path: String,
    pub document_backend: DocumentBackend,
    pub ledger: Option<LedgerConfig>,
    pub logging: LogConfig,
}

impl AcpConfig {
    pub fn from_toml_str(content: &str) -> AcpResult<Self> {
        let config: AcpConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> AcpResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_toml_str(&content)
    }

    /// Write the configuration, replacing `path` atomically
    pub async fn save(&self, path: impl AsRef<Path>) -> AcpResult<()> {
        self.validate()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| AcpError::config(e.to_string()))?;

        let path = path.as_ref();
        let temp_path = path.with_extension("toml.tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, path).await?;
        Ok(())
    }

    pub fn validate(&self) -> AcpResult<()> {
        self.logging.validate()?;
        match (self.document_backend, &self.ledger) {
            (DocumentBackend::Ledger, None) => Err(AcpError::config(
                "document_backend = \"ledger\" requires a [ledger] section",
            )),
            (_, Some(ledger)) => ledger.validate(),
            (DocumentBackend::Local, None) => Ok(()),
        }
    }

    pub fn ledger_options(&self) -> Option<LedgerAcpOptions> {
        self.ledger.as_ref().map(LedgerConfig::options)
    }
}

/// The ACP instances of one node
pub struct AcpSystems {
    pub document: DocumentAcp,
    pub node: NodeAcp,
    pub admin: NodeAcp,
    store_path: String,
}

impl AcpSystems {
    /// Build every bridge described by `config`. Nothing is opened until
    /// [`AcpSystems::start`].
    pub fn from_config(config: &AcpConfig, logger: AcpLogger) -> AcpResult<Self> {
        config.validate()?;

        let document = match (config.document_backend, &config.ledger) {
            (DocumentBackend::Ledger, Some(ledger)) => {
                let signer = Arc::new(Ed25519TxSigner::from_hex(&ledger.signer_key)?);
                new_ledger_document_acp(
                    &ledger.grpc_address,
                    &ledger.comet_address,
                    signer,
                    ledger.options(),
                    logger.clone(),
                )?
            }
            _ => new_local_document_acp(logger.clone()),
        };

        Ok(Self {
            document,
            node: new_local_node_acp(logger.clone()),
            admin: new_local_admin_acp(logger),
            store_path: config.store_path.clone(),
        })
    }

    pub async fn start(&mut self) -> AcpResult<()> {
        self.document.init(&self.store_path);
        self.document.start().await?;
        self.node.init(&self.store_path);
        self.node.start().await?;
        self.admin.init(&self.store_path);
        self.admin.start().await
    }

    /// Close every instance, returning the first failure
    pub async fn close(&mut self) -> AcpResult<()> {
        let document = self.document.close().await;
        let node = self.node.close().await;
        let admin = self.admin.close().await;
        document.and(node).and(admin)
    }
}
