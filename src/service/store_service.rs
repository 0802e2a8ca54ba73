// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Data store wrapped in the service lifecycle.

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::store::{DataStore, StorageBackend, StoreError};

use super::{BasicService, NodeLiveness, ServiceError, ServiceHooks, ShutdownOutcome};

struct StoreHooks<B> {
    store: Arc<DataStore<B>>,
}

impl<B: StorageBackend + 'static> ServiceHooks for StoreHooks<B> {
    fn do_shutdown(&self) -> Result<(), ServiceError> {
        self.store.shutdown().map_err(ServiceError::from)
    }
}

/// A [`DataStore`] whose operations are counted by a [`BasicService`], so
/// that shutdown waits for them and then shuts the backend down.
pub struct StoreService<B> {
    store: Arc<DataStore<B>>,
    service: BasicService,
}

impl<B: StorageBackend + 'static> StoreService<B> {
    pub const NAME: &'static str = "DataService";

    pub fn new(store: DataStore<B>, liveness: Arc<dyn NodeLiveness>, config: ServiceConfig) -> Self {
        let store = Arc::new(store);
        let hooks = Arc::new(StoreHooks {
            store: Arc::clone(&store),
        });
        Self {
            store,
            service: BasicService::new(Self::NAME, hooks, liveness, config),
        }
    }

    pub fn ready(&self) -> Result<(), ServiceError> {
        self.service.ready()
    }

    /// Runs `op` against the store as one counted call.
    ///
    /// Fails with an illegal state error once shutdown has begun.
    pub fn call<T>(&self, op: impl FnOnce(&DataStore<B>) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let _call = self
            .service
            .call_started()
            .map_err(|e| StoreError::IllegalState(e.to_string()))?;
        op(&self.store)
    }

    pub fn shutdown(&self) -> Result<ShutdownOutcome, ServiceError> {
        self.service.shutdown()
    }

    /// The store, for use as a transaction participant.
    pub fn store(&self) -> &DataStore<B> {
        &self.store
    }

    pub fn service(&self) -> &BasicService {
        &self.service
    }
}
