//! In-memory index store for tests

use super::client::{IndexStore, QueryResponse, StoreConnector};
use super::pql::{PqlBatchQuery, PqlQuery};
use super::schema::{Field, Schema};
use crate::core::errors::{HandlerError, HandlerResult};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct MemoryState {
    pub schema: Schema,
    /// Every batch submitted through `query`, in order
    pub submissions: Vec<Vec<PqlQuery>>,
    /// Names of indexes and fields created, as `index` or `index.field`
    pub created: Vec<String>,
    pub fail_queries: bool,
}

/// Store whose state is shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn with_schema(schema: Schema) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().schema = schema;
        store
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn submissions(&self) -> Vec<Vec<PqlQuery>> {
        self.state().submissions.clone()
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn read_schema(&self) -> HandlerResult<Schema> {
        Ok(self.state().schema.clone())
    }

    async fn create_index(&self, index: &str) -> HandlerResult<()> {
        let mut state = self.state();
        state.schema.index(index);
        state.created.push(index.to_string());
        Ok(())
    }

    async fn create_field(&self, index: &str, field: &Field) -> HandlerResult<()> {
        let mut state = self.state();
        state
            .schema
            .index(index)
            .field(field.name.clone(), field.options.clone());
        state.created.push(format!("{}.{}", index, field.name));
        Ok(())
    }

    async fn query(&self, batch: &PqlBatchQuery) -> HandlerResult<QueryResponse> {
        let mut state = self.state();
        if state.fail_queries {
            return Err(HandlerError::store(Some(500), "injected failure"));
        }
        state.submissions.push(batch.queries().to_vec());
        Ok(QueryResponse {
            results: vec![serde_json::Value::Bool(true); batch.len()],
        })
    }
}

/// Connector handing out clones of one `MemoryStore`, or refusing to connect
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    pub store: MemoryStore,
    pub refuse: bool,
}

impl MemoryConnector {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            refuse: false,
        }
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    type Store = MemoryStore;

    async fn connect(&self, address: &str) -> HandlerResult<MemoryStore> {
        if self.refuse {
            return Err(HandlerError::connection_with_source(
                format!("connection to {} refused", address),
                std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            ));
        }
        Ok(self.store.clone())
    }
}
