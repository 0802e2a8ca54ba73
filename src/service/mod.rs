// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Service lifecycle, IO retries and node liveness.

mod error;
mod lifecycle;
mod liveness;
mod store_service;

pub use error::ServiceError;
pub use lifecycle::{BasicService, CallGuard, IoTaskOutcome, ServiceHooks, ServiceState, ShutdownOutcome};
pub use liveness::{FailureReport, NodeId, NodeLiveness, NodeRegistry};
pub use store_service::StoreService;
