//! Application state shared across request handlers.

use std::sync::Arc;

use ipscope_engine::{
    AddressStore, Aggregator, Classifier, EngineConfig, Enumerator, ReservationCoordinator,
};

use crate::db::Database;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    db: Option<Database>,
    store: Arc<dyn AddressStore>,
    engine: EngineConfig,
    enumerator: Enumerator,
    aggregator: Aggregator,
    classifier: Classifier,
    reservations: ReservationCoordinator<dyn AddressStore>,
}

impl AppState {
    /// State backed by Postgres.
    pub fn new(db: Database, engine: EngineConfig) -> Self {
        let store: Arc<dyn AddressStore> = Arc::new(db.address_store());
        Self::build(Some(db), store, engine)
    }

    /// State backed by any store, e.g. the in-memory one.
    pub fn with_store(store: Arc<dyn AddressStore>, engine: EngineConfig) -> Self {
        Self::build(None, store, engine)
    }

    fn build(db: Option<Database>, store: Arc<dyn AddressStore>, engine: EngineConfig) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                db,
                reservations: ReservationCoordinator::new(Arc::clone(&store), &engine),
                enumerator: Enumerator::new(&engine),
                aggregator: Aggregator::new(&engine),
                classifier: engine.classifier(),
                store,
                engine,
            }),
        }
    }

    /// Get a reference to the database, when the state is Postgres-backed.
    pub fn db(&self) -> Option<&Database> {
        self.inner.db.as_ref()
    }

    pub fn store(&self) -> &dyn AddressStore {
        self.inner.store.as_ref()
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.inner.engine
    }

    pub fn enumerator(&self) -> &Enumerator {
        &self.inner.enumerator
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.inner.aggregator
    }

    pub fn classifier(&self) -> &Classifier {
        &self.inner.classifier
    }

    pub fn reservations(&self) -> &ReservationCoordinator<dyn AddressStore> {
        &self.inner.reservations
    }
}
