//! The store the API runs the annotation pipeline against.
//!
//! Postgres in production. Without a database the API keeps everything in memory, which is
//! enough for local development and the route tests.

use anyhow::anyhow;
use std::sync::{Arc, Mutex};
use vial_common::db_util::{PgPool, get_pooled_database_connection};
use vial_common::memory_store::MemoryStore;
use vial_common::{AnnotateError, AnnotationRepository};

#[derive(Clone)]
pub enum Backend {
    Postgres(PgPool),
    Memory(Arc<Mutex<MemoryStore>>),
}

impl Backend {
    pub fn memory(store: MemoryStore) -> Self {
        Backend::Memory(Arc::new(Mutex::new(store)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Postgres(_) => "postgres",
            Backend::Memory(_) => "memory",
        }
    }

    /// Run `f` with a connection from the pool, or with the locked in-memory store.
    pub fn with_repo<T>(
        &self,
        f: impl FnOnce(&mut dyn AnnotationRepository) -> Result<T, AnnotateError>,
    ) -> Result<T, AnnotateError> {
        match self {
            Backend::Postgres(pool) => {
                let mut conn = get_pooled_database_connection(pool)?;
                f(&mut *conn)
            }
            Backend::Memory(store) => {
                let mut store = store
                    .lock()
                    .map_err(|_| anyhow!("in-memory store lock is poisoned"))?;
                f(&mut *store)
            }
        }
    }
}
