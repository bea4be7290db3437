//! Host-facing event handling
//!
//! `DataSourceHandler` is the set of lifecycle callbacks a replication host
//! invokes. `PilosaHandler` implements it by replaying row changes into the
//! index store.

use crate::core::errors::HandlerResult;
use crate::protocol::messages::{HostConfig, HostEvent, MetaData, Operation, Status, Transaction};
use async_trait::async_trait;

pub mod handler;
pub mod mapping;

// Re-export for convenience
pub use handler::PilosaHandler;

/// Lifecycle callbacks of a replication host.
///
/// Every callback takes `&mut self`: a handler instance serves one
/// transaction at a time, in delivery order.
#[async_trait]
pub trait DataSourceHandler: Send {
    /// Connect to the target and prepare for deliveries
    async fn init(&mut self, config: &HostConfig, metadata: &MetaData) -> HandlerResult<()>;

    /// Process the operations of `tx`; `op` is the operation that triggered delivery
    async fn operation_added(
        &mut self,
        event: &HostEvent,
        tx: &Transaction,
        op: &Operation,
    ) -> HandlerResult<Status>;

    /// Transaction boundary reached on the host side
    async fn transaction_commit(&mut self, event: &HostEvent, tx: &Transaction) -> HandlerResult<Status>;

    /// Source table layout changed
    async fn metadata_changed(&mut self, event: &HostEvent, metadata: &MetaData) -> HandlerResult<Status>;

    /// Release everything acquired in `init`
    async fn destroy(&mut self);

    /// Free-form status line for the host's monitoring
    fn report_status(&self) -> String;
}
