//! Replay host implementation
//!
//! Reads one JSON document per line and delivers it to the handler:
//! - a transaction (`{"id": ..., "operations": [...]}`) goes through
//!   `operation_added` followed by `transaction_commit`
//! - a metadata change (`{"metadata": {...}}`) goes through `metadata_changed`
//!
//! Any handler error abends the replay: the handler is destroyed and the
//! error is returned to the caller.

use super::state::HostState;
use crate::core::errors::{HandlerError, HandlerResult};
use crate::events::DataSourceHandler;
use crate::protocol::messages::{HostConfig, HostEvent, MetaData, Status, Transaction};
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info};

/// One line of replay input
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostMessage {
    MetaDataChange { metadata: MetaData },
    Transaction(Transaction),
}

/// Host runtime driving a single handler instance, one transaction at a time
pub struct ReplayHost<H: DataSourceHandler> {
    handler: H,
    config: HostConfig,
    metadata: MetaData,
    state: HostState,
    shutdown_signal: Arc<AtomicBool>,
}

impl<H: DataSourceHandler> ReplayHost<H> {
    pub fn new(handler: H, config: HostConfig, shutdown_signal: Arc<AtomicBool>) -> Self {
        Self {
            handler,
            config,
            metadata: MetaData::default(),
            state: HostState::new(),
            shutdown_signal,
        }
    }

    /// Source metadata handed to the handler at `init`
    pub fn with_metadata(mut self, metadata: MetaData) -> Self {
        self.metadata = metadata;
        self
    }

    #[cfg(test)]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn state(&self) -> &HostState {
        &self.state
    }

    /// Initialize the handler, replay `reader` to the end, then destroy the handler
    pub async fn run<R>(&mut self, reader: R) -> HandlerResult<()>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        self.handler.init(&self.config, &self.metadata).await?;

        let result = self.replay(reader).await;

        info!("Handler status: {}", self.handler.report_status());
        self.handler.destroy().await;

        result
    }

    async fn replay<R>(&mut self, reader: R) -> HandlerResult<()>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if self.shutdown_signal.load(Ordering::SeqCst) {
                info!("Shutdown signal received, stopping replay");
                break;
            }

            self.state.lines_read += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let message: HostMessage = serde_json::from_str(line).map_err(|e| {
                error!("Unreadable input on line {}: {}", self.state.lines_read, e);
                HandlerError::from(e)
            })?;

            match message {
                HostMessage::MetaDataChange { metadata } => {
                    self.change_metadata(metadata).await?;
                }
                HostMessage::Transaction(tx) => {
                    self.deliver(&tx).await?;
                }
            }
        }

        Ok(())
    }

    /// Deliver one committed transaction
    pub async fn deliver(&mut self, tx: &Transaction) -> HandlerResult<Status> {
        let Some(last) = tx.operations().last() else {
            debug!("Transaction {} has no operations, skipping", tx.id);
            self.state.record_skipped();
            return Ok(Status::Ok);
        };

        let event = HostEvent::new(self.state.next_sequence());
        let outcome = match self.handler.operation_added(&event, tx, last).await {
            Ok(_) => self.handler.transaction_commit(&event, tx).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(status) => {
                self.state.record_delivered();
                Ok(status)
            }
            Err(e) => {
                self.state.record_failed();
                error!("Transaction {} failed ({}): {}", tx.id, Status::Abend, e);
                Err(e)
            }
        }
    }

    async fn change_metadata(&mut self, metadata: MetaData) -> HandlerResult<()> {
        let event = HostEvent::new(self.state.next_sequence());
        self.handler.metadata_changed(&event, &metadata).await?;
        self.metadata = metadata;
        self.state.record_metadata_change();
        Ok(())
    }
}
