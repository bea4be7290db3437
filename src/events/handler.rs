//! Replication handler writing row changes into the index store
//!
//! For every delivered transaction the handler classifies each operation on
//! the watched table, queues the matching field writes in one batch and
//! submits that batch with a single request. The batch is cleared after every
//! transaction, whatever the outcome.

use super::DataSourceHandler;
use super::mapping::{ColumnMap, parse_identifier};
use crate::core::config::{DEFAULT_ADDRESS, DEFAULT_INDEX_NAME, DEFAULT_WATCHED_TABLE, HandlerConfig};
use crate::core::errors::{HandlerError, HandlerResult};
use crate::pilosa::{
    FieldOptions, IndexStore, PqlBatchQuery, PqlQuery, RowValue, Schema, StoreConnector,
};
use crate::protocol::messages::{
    HostConfig, HostEvent, MetaData, OpKind, Operation, Record, Status, Transaction,
};
use crate::tracing_context::TracingContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{Instrument, debug, error, info, warn};

/// Bool field marking whether a row currently exists in the source table
pub const LIVENESS_FIELD: &str = "ok";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerState {
    Uninitialized,
    Ready,
    /// `init` failed; nothing is processed until `init` succeeds
    Failed(String),
    Destroyed,
}

impl fmt::Display for HandlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerState::Uninitialized => write!(f, "uninitialized"),
            HandlerState::Ready => write!(f, "ready"),
            HandlerState::Failed(reason) => write!(f, "failed ({})", reason),
            HandlerState::Destroyed => write!(f, "destroyed"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HandlerStats {
    pub transactions_flushed: u64,
    pub writes_submitted: u64,
    pub last_flush: Option<DateTime<Utc>>,
}

/// Which table is replicated, where to, and how its columns map
#[derive(Debug, Clone)]
struct SinkTarget {
    watched_table: String,
    index_name: String,
    column_map: ColumnMap,
}

/// Everything acquired by `init` and held until `destroy`
struct Session<S> {
    store: S,
    batch: PqlBatchQuery,
}

pub struct PilosaHandler<C: StoreConnector> {
    connector: C,
    address: String,
    target: SinkTarget,
    state: HandlerState,
    session: Option<Session<C::Store>>,
    stats: HandlerStats,
}

impl<C: StoreConnector> PilosaHandler<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            address: DEFAULT_ADDRESS.to_string(),
            target: SinkTarget {
                watched_table: DEFAULT_WATCHED_TABLE.to_string(),
                index_name: DEFAULT_INDEX_NAME.to_string(),
                column_map: ColumnMap::default(),
            },
            state: HandlerState::Uninitialized,
            session: None,
            stats: HandlerStats::default(),
        }
    }

    pub fn from_config(connector: C, config: &HandlerConfig) -> Self {
        Self::new(connector)
            .with_address(config.address.clone())
            .with_watched_table(config.watched_table.clone())
            .with_index_name(config.index_name.clone())
            .with_column_map(config.column_map.clone())
    }

    pub fn with_address<S: Into<String>>(mut self, address: S) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_watched_table<S: Into<String>>(mut self, table: S) -> Self {
        self.target.watched_table = table.into();
        self
    }

    pub fn with_index_name<S: Into<String>>(mut self, index: S) -> Self {
        self.target.index_name = index.into();
        self
    }

    pub fn with_column_map(mut self, column_map: ColumnMap) -> Self {
        self.target.column_map = column_map;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> &HandlerState {
        &self.state
    }

    #[cfg(test)]
    fn stats(&self) -> &HandlerStats {
        &self.stats
    }

    /// Writes currently queued; zero between transactions
    #[cfg(test)]
    fn pending(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.batch.len())
    }

    async fn open_session(&self, metadata: &MetaData) -> HandlerResult<Session<C::Store>> {
        self.target.column_map.validate()?;
        self.target.check_layout(metadata);

        let store = self.connector.connect(&self.address).await?;
        let schema = self.target.declare_schema();
        store.sync_schema(&schema).await?;
        let batch = PqlBatchQuery::new(&self.target.index_name);

        Ok(Session { store, batch })
    }
}

impl SinkTarget {
    fn declare_schema(&self) -> Schema {
        let mut schema = Schema::default();
        let index = schema.index(&self.index_name);
        for (name, options) in self.column_map.fields() {
            index.field(name, options);
        }
        index.field(LIVENESS_FIELD, FieldOptions::boolean());
        schema
    }

    fn check_layout(&self, metadata: &MetaData) {
        match metadata.table(&self.watched_table) {
            Some(table) => {
                for warning in self.column_map.check_against(table) {
                    warn!("{}", warning);
                }
            }
            None => debug!(
                "No metadata for {}, column layout not checked",
                self.watched_table
            ),
        }
    }

    /// Queue the writes for one operation. Nothing is queued if it fails.
    fn queue(&self, batch: &mut PqlBatchQuery, op: &Operation) -> HandlerResult<()> {
        if op.table.short_name() != self.watched_table {
            debug!("{} on {} ignored, not the watched table", op.kind, op.table);
            return Ok(());
        }

        let writes = match op.kind {
            OpKind::Insert => self.insert_writes(op)?,
            OpKind::Update => self.update_writes(op)?,
            OpKind::Delete => self.delete_writes(op)?,
            OpKind::Truncate | OpKind::Unknown => {
                debug!("{} on {} ignored", op.kind, op.table);
                return Ok(());
            }
        };

        for write in writes {
            batch.add(write);
        }
        Ok(())
    }

    fn insert_writes(&self, op: &Operation) -> HandlerResult<Vec<PqlQuery>> {
        let id = self.identifier(op, &op.after)?;
        info!("INSERT {} id={}", op.table, id);

        let mut writes = Vec::with_capacity(self.column_map.bindings.len() + 1);
        for binding in &self.column_map.bindings {
            match binding.write_nullable(op.after.value(binding.column), id)? {
                Some(write) => writes.push(write),
                None => debug!("{} is NULL for id={}, no row to set", binding.name, id),
            }
        }
        writes.push(PqlQuery::set(LIVENESS_FIELD, RowValue::Bool(true), id));
        Ok(writes)
    }

    fn update_writes(&self, op: &Operation) -> HandlerResult<Vec<PqlQuery>> {
        let id = self.identifier(op, &op.after)?;
        info!("UPDATE {} id={}", op.table, id);

        let mut writes = Vec::new();
        for binding in &self.column_map.bindings {
            match op.after.value(binding.column) {
                Some(raw) if !raw.is_empty() => writes.push(binding.write(raw, id)?),
                _ => debug!("{} unchanged for id={}", binding.name, id),
            }
        }
        Ok(writes)
    }

    fn delete_writes(&self, op: &Operation) -> HandlerResult<Vec<PqlQuery>> {
        let id = self.identifier(op, &op.before)?;
        info!("DELETE {} id={}", op.table, id);

        Ok(vec![PqlQuery::set(LIVENESS_FIELD, RowValue::Bool(false), id)])
    }

    fn identifier(&self, op: &Operation, record: &Record) -> HandlerResult<i64> {
        let column = self.column_map.id_column;
        let raw = record
            .value(column)
            .ok_or_else(|| HandlerError::MissingColumn {
                table: op.table.to_string(),
                column,
            })?;
        parse_identifier(column, raw)
    }
}

/// Classify every operation of `tx`, then flush once if anything was queued.
/// Returns the number of writes submitted.
async fn replay<S: IndexStore>(
    target: &SinkTarget,
    session: &mut Session<S>,
    tx: &Transaction,
) -> HandlerResult<usize> {
    for op in tx.operations() {
        target.queue(&mut session.batch, op)?;
    }

    if session.batch.is_empty() {
        debug!("No writes queued, skipping flush");
        return Ok(0);
    }

    let count = session.batch.len();
    let response = session.store.query(&session.batch).await?;
    info!(
        "Flushed {} writes to index {} ({} results)",
        count,
        session.batch.index(),
        response.results.len()
    );
    Ok(count)
}

#[async_trait]
impl<C> DataSourceHandler for PilosaHandler<C>
where
    C: StoreConnector,
{
    async fn init(&mut self, config: &HostConfig, metadata: &MetaData) -> HandlerResult<()> {
        info!(
            "Initializing handler {} for {} -> {} at {}",
            config.handler_name, self.target.watched_table, self.target.index_name, self.address
        );
        debug!("Host properties: {:?}", config.properties);
        self.session = None;

        match self.open_session(metadata).await {
            Ok(session) => {
                self.session = Some(session);
                self.state = HandlerState::Ready;
                info!("PilosaHandler initialized.");
                Ok(())
            }
            Err(e) => {
                error!("PilosaHandler initialization failed: {}", e);
                self.state = HandlerState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn operation_added(
        &mut self,
        event: &HostEvent,
        tx: &Transaction,
        _op: &Operation,
    ) -> HandlerResult<Status> {
        debug!("event added: {}", event);

        let session = match (&self.state, self.session.as_mut()) {
            (HandlerState::Ready, Some(session)) => session,
            _ => {
                return Err(HandlerError::NotReady {
                    state: self.state.to_string(),
                });
            }
        };

        let context = TracingContext::for_transaction(&tx.id);
        let result = replay(&self.target, session, tx)
            .instrument(context.span.clone())
            .await;
        session.batch.clear();

        match result {
            Ok(0) => Ok(Status::Ok),
            Ok(count) => {
                self.stats.transactions_flushed += 1;
                self.stats.writes_submitted += count as u64;
                self.stats.last_flush = Some(Utc::now());
                Ok(Status::Ok)
            }
            Err(e) => {
                error!(
                    correlation_id = %context.correlation_id,
                    "Transaction {} failed: {}", tx.id, e
                );
                Err(e)
            }
        }
    }

    async fn transaction_commit(&mut self, _event: &HostEvent, tx: &Transaction) -> HandlerResult<Status> {
        debug!("Transaction {} committed", tx.id);
        Ok(Status::Ok)
    }

    async fn metadata_changed(&mut self, _event: &HostEvent, metadata: &MetaData) -> HandlerResult<Status> {
        info!("Source metadata changed");
        self.target.check_layout(metadata);
        Ok(Status::Ok)
    }

    async fn destroy(&mut self) {
        if let Some(session) = self.session.take() {
            if !session.batch.is_empty() {
                warn!(
                    "Discarding {} unflushed writes on shutdown",
                    session.batch.len()
                );
            }
        }
        self.state = HandlerState::Destroyed;
        info!("PilosaHandler destroyed.");
    }

    fn report_status(&self) -> String {
        let last_flush = self
            .stats
            .last_flush
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        format!(
            "state={} transactions={} writes={} last_flush={}",
            self.state, self.stats.transactions_flushed, self.stats.writes_submitted, last_flush
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pilosa::memory::{MemoryConnector, MemoryStore};
    use crate::protocol::messages::TableName;
    use std::collections::BTreeMap;

    fn row(id: &str, email: &str, job: &str, salary: &str) -> Record {
        vec![
            Some(id),
            Some("Ada"),
            Some("Lovelace"),
            Some(email),
            Some("555-0100"),
            Some("2019-01-07"),
            Some(job),
            Some(salary),
        ]
        .into_iter()
        .collect()
    }

    fn op(table: &str, kind: OpKind, before: Record, after: Record) -> Operation {
        Operation {
            table: TableName::from(table),
            kind,
            before,
            after,
        }
    }

    fn tx(operations: Vec<Operation>) -> Transaction {
        Transaction {
            id: "tx-test".to_string(),
            operations,
            commit_time: None,
        }
    }

    async fn ready_handler() -> (PilosaHandler<MemoryConnector>, MemoryStore) {
        let store = MemoryStore::default();
        let mut handler = PilosaHandler::new(MemoryConnector::new(store.clone()));
        handler
            .init(&HostConfig::default(), &MetaData::default())
            .await
            .unwrap();
        (handler, store)
    }

    async fn deliver(
        handler: &mut PilosaHandler<MemoryConnector>,
        tx: &Transaction,
    ) -> HandlerResult<Status> {
        let last = tx.operations.last().cloned().unwrap_or_else(|| {
            op("HR.EMPLOYEES", OpKind::Unknown, Record::default(), Record::default())
        });
        handler.operation_added(&HostEvent::new(1), tx, &last).await
    }

    fn email_attrs(id: i64, email: &str) -> PqlQuery {
        let mut attrs = BTreeMap::new();
        attrs.insert("email".to_string(), Some(email.to_string()));
        PqlQuery::set_column_attrs(id, attrs)
    }

    #[tokio::test]
    async fn test_init_declares_and_syncs_schema() {
        let (handler, store) = ready_handler().await;
        assert_eq!(handler.state(), &HandlerState::Ready);

        let state = store.state();
        assert_eq!(
            state.created,
            vec!["employees", "employees.job", "employees.salary", "employees.ok"]
        );
        let index = state.schema.get_index("employees").unwrap();
        assert_eq!(index.get_field("job").unwrap().options, FieldOptions::keyed_set());
        assert_eq!(
            index.get_field("salary").unwrap().options,
            FieldOptions::int(0, 1_000_000)
        );
        assert_eq!(index.get_field("ok").unwrap().options, FieldOptions::boolean());
        assert_eq!(handler.target.declare_schema(), state.schema);
    }

    #[tokio::test]
    async fn test_init_is_idempotent_against_existing_schema() {
        let (_, store) = ready_handler().await;
        let created_before = store.state().created.len();

        let mut second = PilosaHandler::new(MemoryConnector::new(store.clone()));
        second
            .init(&HostConfig::default(), &MetaData::default())
            .await
            .unwrap();
        assert_eq!(store.state().created.len(), created_before);
    }

    #[tokio::test]
    async fn test_insert_queues_four_writes() {
        let (mut handler, store) = ready_handler().await;
        let tx = tx(vec![op(
            "HR.EMPLOYEES",
            OpKind::Insert,
            Record::default(),
            row("42", "a@x.com", "Engineer", "95000.0"),
        )]);

        assert_eq!(deliver(&mut handler, &tx).await.unwrap(), Status::Ok);

        assert_eq!(
            store.submissions(),
            vec![vec![
                PqlQuery::set("job", RowValue::Key("Engineer".to_string()), 42),
                PqlQuery::set("salary", RowValue::Int(95000), 42),
                email_attrs(42, "a@x.com"),
                PqlQuery::set("ok", RowValue::Bool(true), 42),
            ]]
        );
        assert_eq!(handler.pending(), 0);
    }

    #[tokio::test]
    async fn test_insert_does_not_skip_blank_values() {
        let (mut handler, store) = ready_handler().await;
        let tx = tx(vec![op(
            "HR.EMPLOYEES",
            OpKind::Insert,
            Record::default(),
            row("7", "", "", "0"),
        )]);

        deliver(&mut handler, &tx).await.unwrap();
        assert_eq!(store.submissions()[0].len(), 4);
    }

    #[tokio::test]
    async fn test_insert_with_null_email_clears_attribute() {
        let (mut handler, store) = ready_handler().await;
        let after: Record = vec![
            Some("42"),
            Some("Ada"),
            Some("Lovelace"),
            None,
            Some("555-0100"),
            Some("2019-01-07"),
            Some("Engineer"),
            Some("95000.0"),
        ]
        .into_iter()
        .collect();
        let tx = tx(vec![op("HR.EMPLOYEES", OpKind::Insert, Record::default(), after)]);

        deliver(&mut handler, &tx).await.unwrap();
        let submissions = store.submissions();
        assert_eq!(submissions[0].len(), 4);
        assert_eq!(submissions[0][2].to_string(), "SetColumnAttrs(42,email=null)");
        assert_eq!(submissions[0][3], PqlQuery::set("ok", RowValue::Bool(true), 42));
    }

    #[tokio::test]
    async fn test_insert_with_null_job_skips_row_write() {
        let (mut handler, store) = ready_handler().await;
        let after: Record = vec![
            Some("42"),
            None,
            None,
            Some("a@x.com"),
            None,
            None,
            None,
            Some("95000"),
        ]
        .into_iter()
        .collect();
        let tx = tx(vec![op("HR.EMPLOYEES", OpKind::Insert, Record::default(), after)]);

        deliver(&mut handler, &tx).await.unwrap();
        assert_eq!(
            store.submissions(),
            vec![vec![
                PqlQuery::set("salary", RowValue::Int(95000), 42),
                email_attrs(42, "a@x.com"),
                PqlQuery::set("ok", RowValue::Bool(true), 42),
            ]]
        );
    }

    #[tokio::test]
    async fn test_insert_with_null_salary_or_id_fails() {
        let (mut handler, store) = ready_handler().await;
        let no_salary: Record = vec![Some("42"), None, None, None].into_iter().collect();
        let tx1 = tx(vec![op("HR.EMPLOYEES", OpKind::Insert, Record::default(), no_salary)]);

        let err = deliver(&mut handler, &tx1).await.unwrap_err();
        assert!(matches!(err, HandlerError::MalformedRow { column: 7, .. }));

        let no_id: Record = vec![None, Some("Ada")].into_iter().collect();
        let tx2 = tx(vec![op("HR.EMPLOYEES", OpKind::Insert, Record::default(), no_id)]);

        let err = deliver(&mut handler, &tx2).await.unwrap_err();
        assert!(matches!(err, HandlerError::MissingColumn { column: 0, .. }));
        assert!(store.submissions().is_empty());
        assert_eq!(handler.pending(), 0);
    }

    #[tokio::test]
    async fn test_partial_update_writes_only_present_values() {
        let (mut handler, store) = ready_handler().await;
        let tx = tx(vec![op(
            "HR.EMPLOYEES",
            OpKind::Update,
            row("42", "a@x.com", "Engineer", "95000.0"),
            row("42", "", "", "100000.5"),
        )]);

        deliver(&mut handler, &tx).await.unwrap();
        assert_eq!(
            store.submissions(),
            vec![vec![PqlQuery::set("salary", RowValue::Int(100000), 42)]]
        );
    }

    #[tokio::test]
    async fn test_update_with_job_and_email_only() {
        let (mut handler, store) = ready_handler().await;
        let after: Record = vec![
            Some("9"),
            None,
            None,
            Some("b@x.com"),
            None,
            None,
            Some("Manager"),
            None,
        ]
        .into_iter()
        .collect();
        let tx = tx(vec![op("HR.EMPLOYEES", OpKind::Update, Record::default(), after)]);

        deliver(&mut handler, &tx).await.unwrap();
        assert_eq!(
            store.submissions(),
            vec![vec![
                PqlQuery::set("job", RowValue::Key("Manager".to_string()), 9),
                email_attrs(9, "b@x.com"),
            ]]
        );
    }

    #[tokio::test]
    async fn test_blank_update_submits_nothing() {
        let (mut handler, store) = ready_handler().await;
        let tx = tx(vec![op(
            "HR.EMPLOYEES",
            OpKind::Update,
            Record::default(),
            row("42", "", "", ""),
        )]);

        assert_eq!(deliver(&mut handler, &tx).await.unwrap(), Status::Ok);
        assert!(store.submissions().is_empty());
        assert_eq!(handler.stats().transactions_flushed, 0);
    }

    #[tokio::test]
    async fn test_delete_marks_row_absent() {
        let (mut handler, store) = ready_handler().await;
        let tx = tx(vec![op(
            "HR.EMPLOYEES",
            OpKind::Delete,
            row("42", "a@x.com", "Engineer", "95000.0"),
            Record::default(),
        )]);

        deliver(&mut handler, &tx).await.unwrap();
        assert_eq!(
            store.submissions(),
            vec![vec![PqlQuery::set("ok", RowValue::Bool(false), 42)]]
        );
    }

    #[tokio::test]
    async fn test_other_tables_never_reach_the_store() {
        let (mut handler, store) = ready_handler().await;
        let other = row("1", "x@y.com", "Clerk", "10.0");
        let tx = tx(vec![
            op("HR.DEPARTMENTS", OpKind::Insert, Record::default(), other.clone()),
            op("HR.DEPARTMENTS", OpKind::Update, other.clone(), other.clone()),
            op("HR.DEPARTMENTS", OpKind::Delete, other.clone(), Record::default()),
            op("HR.employees", OpKind::Insert, Record::default(), other),
        ]);

        assert_eq!(deliver(&mut handler, &tx).await.unwrap(), Status::Ok);
        assert!(store.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_kinds_are_ignored() {
        let (mut handler, store) = ready_handler().await;
        let tx = tx(vec![
            op("HR.EMPLOYEES", OpKind::Truncate, Record::default(), Record::default()),
            op("HR.EMPLOYEES", OpKind::Unknown, Record::default(), Record::default()),
        ]);

        assert_eq!(deliver(&mut handler, &tx).await.unwrap(), Status::Ok);
        assert!(store.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_one_flush_per_transaction_in_delivery_order() {
        let (mut handler, store) = ready_handler().await;
        let first = tx(vec![
            op("HR.EMPLOYEES", OpKind::Insert, Record::default(), row("1", "a@x.com", "Dev", "1.0")),
            op("HR.DEPARTMENTS", OpKind::Insert, Record::default(), row("2", "", "", "0")),
            op("HR.EMPLOYEES", OpKind::Delete, row("1", "", "", ""), Record::default()),
        ]);
        let second = tx(vec![op(
            "HR.EMPLOYEES",
            OpKind::Update,
            Record::default(),
            row("3", "", "Ops", ""),
        )]);

        deliver(&mut handler, &first).await.unwrap();
        assert_eq!(handler.pending(), 0);
        deliver(&mut handler, &second).await.unwrap();

        let submissions = store.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].len(), 5);
        assert_eq!(
            submissions[0][4],
            PqlQuery::set("ok", RowValue::Bool(false), 1)
        );
        assert_eq!(
            submissions[1],
            vec![PqlQuery::set("job", RowValue::Key("Ops".to_string()), 3)]
        );
        assert_eq!(handler.stats().transactions_flushed, 2);
        assert_eq!(handler.stats().writes_submitted, 6);
    }

    #[tokio::test]
    async fn test_malformed_row_fails_transaction_and_clears_batch() {
        let (mut handler, store) = ready_handler().await;
        let bad = tx(vec![
            op("HR.EMPLOYEES", OpKind::Insert, Record::default(), row("1", "a@x.com", "Dev", "1.0")),
            op("HR.EMPLOYEES", OpKind::Insert, Record::default(), row("two", "b@x.com", "Dev", "1.0")),
        ]);

        let err = deliver(&mut handler, &bad).await.unwrap_err();
        assert!(matches!(err, HandlerError::MalformedRow { column: 0, .. }));
        assert_eq!(handler.pending(), 0);
        assert!(store.submissions().is_empty());

        let bad_salary = tx(vec![op(
            "HR.EMPLOYEES",
            OpKind::Update,
            Record::default(),
            row("1", "", "", "a lot"),
        )]);
        let err = deliver(&mut handler, &bad_salary).await.unwrap_err();
        assert!(matches!(err, HandlerError::MalformedRow { column: 7, .. }));

        let good = tx(vec![op("HR.EMPLOYEES", OpKind::Delete, row("3", "", "", ""), Record::default())]);
        deliver(&mut handler, &good).await.unwrap();
        assert_eq!(store.submissions().len(), 1);
        assert_eq!(store.submissions()[0].len(), 1);
    }

    #[tokio::test]
    async fn test_flush_failure_propagates_and_clears_batch() {
        let (mut handler, store) = ready_handler().await;
        store.state().fail_queries = true;
        let tx = tx(vec![op("HR.EMPLOYEES", OpKind::Delete, row("3", "", "", ""), Record::default())]);

        let err = deliver(&mut handler, &tx).await.unwrap_err();
        assert!(matches!(err, HandlerError::Store { status: Some(500), .. }));
        assert_eq!(handler.pending(), 0);
        assert_eq!(handler.state(), &HandlerState::Ready);
    }

    #[tokio::test]
    async fn test_failed_init_refuses_operations_until_reinitialized() {
        let mut connector = MemoryConnector::default();
        connector.refuse = true;
        let mut handler = PilosaHandler::new(connector);

        let err = handler
            .init(&HostConfig::default(), &MetaData::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Connection { .. }));
        assert!(matches!(handler.state(), HandlerState::Failed(_)));

        let tx = tx(vec![op("HR.EMPLOYEES", OpKind::Delete, row("3", "", "", ""), Record::default())]);
        let err = deliver(&mut handler, &tx).await.unwrap_err();
        assert!(matches!(err, HandlerError::NotReady { .. }));

        handler.connector.refuse = false;
        handler
            .init(&HostConfig::default(), &MetaData::default())
            .await
            .unwrap();
        deliver(&mut handler, &tx).await.unwrap();
        assert_eq!(handler.connector.store.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_schema_conflict_fails_init() {
        let mut existing = Schema::default();
        existing
            .index("employees")
            .field("salary", FieldOptions::int(0, 100));
        let store = MemoryStore::with_schema(existing);
        let mut handler = PilosaHandler::new(MemoryConnector::new(store));

        let err = handler
            .init(&HostConfig::default(), &MetaData::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::SchemaConflict { .. }));
        assert!(matches!(handler.state(), HandlerState::Failed(_)));
    }

    #[tokio::test]
    async fn test_operations_before_init_are_refused() {
        let mut handler = PilosaHandler::new(MemoryConnector::default());
        let tx = tx(vec![]);
        let err = deliver(&mut handler, &tx).await.unwrap_err();
        assert!(matches!(err, HandlerError::NotReady { ref state } if state == "uninitialized"));
    }

    #[tokio::test]
    async fn test_destroy_releases_session() {
        let (mut handler, _) = ready_handler().await;
        handler.destroy().await;
        assert_eq!(handler.state(), &HandlerState::Destroyed);
        assert!(handler.session.is_none());

        let tx = tx(vec![]);
        assert!(deliver(&mut handler, &tx).await.is_err());
    }

    #[tokio::test]
    async fn test_custom_target_and_column_map() {
        let store = MemoryStore::default();
        let column_map: ColumnMap = "id=1,job=0".parse().unwrap();
        let mut handler = PilosaHandler::new(MemoryConnector::new(store.clone()))
            .with_watched_table("STAFF")
            .with_index_name("staff")
            .with_column_map(column_map);
        handler
            .init(&HostConfig::default(), &MetaData::default())
            .await
            .unwrap();

        let after: Record = vec![Some("Pilot"), Some("5")].into_iter().collect();
        let tx = tx(vec![op("OPS.STAFF", OpKind::Update, Record::default(), after)]);
        deliver(&mut handler, &tx).await.unwrap();

        assert!(store.state().schema.get_index("staff").is_some());
        assert_eq!(
            store.submissions(),
            vec![vec![PqlQuery::set("job", RowValue::Key("Pilot".to_string()), 5)]]
        );
    }

    #[tokio::test]
    async fn test_lifecycle_pass_through_callbacks() {
        let (mut handler, _) = ready_handler().await;
        let event = HostEvent::new(3);
        assert_eq!(
            handler.transaction_commit(&event, &tx(vec![])).await.unwrap(),
            Status::Ok
        );
        assert_eq!(
            handler
                .metadata_changed(&event, &MetaData::default())
                .await
                .unwrap(),
            Status::Ok
        );
    }

    #[tokio::test]
    async fn test_report_status() {
        let (mut handler, _) = ready_handler().await;
        assert_eq!(
            handler.report_status(),
            "state=ready transactions=0 writes=0 last_flush=never"
        );

        let tx = tx(vec![op("HR.EMPLOYEES", OpKind::Delete, row("3", "", "", ""), Record::default())]);
        deliver(&mut handler, &tx).await.unwrap();
        let status = handler.report_status();
        assert!(status.starts_with("state=ready transactions=1 writes=1 last_flush=20"));
    }
}
