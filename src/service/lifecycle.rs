// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Service lifecycle state machine and IO retry helper.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::config::ServiceConfig;
use crate::txn::TaskContext;

use super::{NodeId, NodeLiveness, ServiceError};

/// Lifecycle state of a service. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServiceState {
    Initialized,
    Ready,
    ShuttingDown,
    Shutdown,
}

/// How a call to [`BasicService::shutdown`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The service reached [`ServiceState::Shutdown`].
    Completed,
    /// The wait was interrupted; the service is still shutting down and a
    /// later call resumes the wait.
    Interrupted,
}

/// How [`BasicService::run_io_task`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoTaskOutcome {
    /// The task succeeded.
    Completed,
    /// The target node was reported dead before a retry; the task was
    /// dropped.
    NodeDead,
    /// Retries ran out and the target node was reported as failed.
    ReportedFailed,
}

/// Hooks a concrete service supplies to the lifecycle.
pub trait ServiceHooks: Send + Sync + 'static {
    /// Runs on the first transition to ready.
    fn do_ready(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Final teardown. Runs exactly once, on a dedicated thread, after every
    /// in-flight call has finished.
    fn do_shutdown(&self) -> Result<(), ServiceError>;
}

struct Lifecycle {
    state: ServiceState,
    calls_in_progress: usize,
    teardown_started: bool,
    interrupts: u64,
}

struct Shared {
    lifecycle: Mutex<Lifecycle>,
    cond: Condvar,
}

/// Lifecycle and call accounting for a long-lived service.
///
/// ```text
/// Initialized --ready()--> Ready --shutdown()--> ShuttingDown --drained--> Shutdown
///      \________________shutdown()________________/
/// ```
///
/// Calls bracketed by [`call_started`](Self::call_started) are counted;
/// shutdown waits for the count to reach zero before running the teardown
/// hook.
pub struct BasicService {
    name: String,
    hooks: Arc<dyn ServiceHooks>,
    liveness: Arc<dyn NodeLiveness>,
    config: ServiceConfig,
    shared: Arc<Shared>,
}

/// Marks one in-flight call. Dropping it finishes the call.
#[must_use = "the call finishes when the guard is dropped"]
pub struct CallGuard<'a> {
    shared: &'a Shared,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        let mut lc = self.shared.lifecycle.lock();
        lc.calls_in_progress -= 1;
        if lc.state == ServiceState::ShuttingDown && lc.calls_in_progress == 0 {
            self.shared.cond.notify_all();
        }
    }
}

impl BasicService {
    pub fn new(
        name: impl Into<String>,
        hooks: Arc<dyn ServiceHooks>,
        liveness: Arc<dyn NodeLiveness>,
        config: ServiceConfig,
    ) -> Self {
        let name = name.into();
        debug!(
            service = %name,
            io_task_max_retries = config.io_task_max_retries,
            io_task_wait_ms = config.io_task_wait_time.as_millis() as u64,
            "creating service"
        );
        Self {
            name,
            hooks,
            liveness,
            config,
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(Lifecycle {
                    state: ServiceState::Initialized,
                    calls_in_progress: 0,
                    teardown_started: false,
                    interrupts: 0,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ServiceState {
        self.shared.lifecycle.lock().state
    }

    pub fn is_in_initialized_state(&self) -> bool {
        self.state() == ServiceState::Initialized
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state() >= ServiceState::ShuttingDown
    }

    /// Number of calls currently in flight.
    pub fn calls_in_progress(&self) -> usize {
        self.shared.lifecycle.lock().calls_in_progress
    }

    /// Moves the service to ready and runs the ready hook.
    ///
    /// Calling it again while ready does nothing. Fails once shutdown has
    /// begun.
    pub fn ready(&self) -> Result<(), ServiceError> {
        debug!(service = %self.name, "ready");
        {
            let mut lc = self.shared.lifecycle.lock();
            match lc.state {
                ServiceState::Initialized => lc.state = ServiceState::Ready,
                ServiceState::Ready => return Ok(()),
                ServiceState::ShuttingDown | ServiceState::Shutdown => {
                    return Err(ServiceError::IllegalState(format!(
                        "service {} is shutting down",
                        self.name
                    )))
                }
            }
        }
        self.hooks.do_ready()
    }

    /// Records the start of a call. Fails once shutdown has begun.
    pub fn call_started(&self) -> Result<CallGuard<'_>, ServiceError> {
        let mut lc = self.shared.lifecycle.lock();
        if lc.state >= ServiceState::ShuttingDown {
            return Err(ServiceError::IllegalState(format!(
                "service {} is shutting down",
                self.name
            )));
        }
        lc.calls_in_progress += 1;
        Ok(CallGuard {
            shared: &self.shared,
        })
    }

    /// Shuts the service down, waiting for in-flight calls and the teardown
    /// hook.
    ///
    /// Safe to call repeatedly: a call while another is draining waits for
    /// the same teardown, and a call after shutdown returns at once.
    pub fn shutdown(&self) -> Result<ShutdownOutcome, ServiceError> {
        debug!(service = %self.name, "shutdown");
        let mut lc = self.shared.lifecycle.lock();
        let generation = lc.interrupts;
        match lc.state {
            ServiceState::Initialized | ServiceState::Ready => {
                debug!(service = %self.name, "initiating shutdown");
                lc.state = ServiceState::ShuttingDown;
            }
            ServiceState::ShuttingDown => {}
            ServiceState::Shutdown => return Ok(ShutdownOutcome::Completed),
        }

        while lc.calls_in_progress > 0 {
            if lc.interrupts != generation {
                debug!(service = %self.name, "shutdown interrupted while draining calls");
                return Ok(ShutdownOutcome::Interrupted);
            }
            self.shared.cond.wait(&mut lc);
        }

        if !lc.teardown_started {
            lc.teardown_started = true;
            let hooks = Arc::clone(&self.hooks);
            let shared = Arc::clone(&self.shared);
            let name = self.name.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-shutdown", self.name))
                .spawn(move || teardown(&name, hooks.as_ref(), &shared));
            if let Err(e) = spawned {
                lc.teardown_started = false;
                return Err(ServiceError::Spawn(e));
            }
        }

        while lc.state != ServiceState::Shutdown {
            if lc.interrupts != generation {
                debug!(service = %self.name, "shutdown interrupted during teardown");
                return Ok(ShutdownOutcome::Interrupted);
            }
            self.shared.cond.wait(&mut lc);
        }
        Ok(ShutdownOutcome::Completed)
    }

    /// Wakes every thread blocked in [`shutdown`](Self::shutdown), which
    /// then returns [`ShutdownOutcome::Interrupted`].
    pub fn interrupt_shutdown(&self) {
        let mut lc = self.shared.lifecycle.lock();
        lc.interrupts += 1;
        self.shared.cond.notify_all();
    }

    /// Returns whether `node` is alive. Must not be called from a
    /// transaction.
    pub fn is_alive(&self, ctx: &TaskContext, node: NodeId) -> Result<bool, ServiceError> {
        check_non_transactional(ctx)?;
        Ok(self.liveness.is_node_alive(node))
    }

    /// Runs an IO task aimed at `node`, retrying IO failures.
    ///
    /// A failing task is retried up to the configured number of times,
    /// pausing between attempts. Before each retry the node's liveness is
    /// checked and a dead node ends the loop. If every retry fails the node
    /// is reported as failed. Must not be called from a transaction.
    pub fn run_io_task<F>(
        &self,
        ctx: &TaskContext,
        mut task: F,
        node: NodeId,
    ) -> Result<IoTaskOutcome, ServiceError>
    where
        F: FnMut() -> io::Result<()>,
    {
        check_non_transactional(ctx)?;
        let mut retries_left = self.config.io_task_max_retries;
        loop {
            let err = match task() {
                Ok(()) => return Ok(IoTaskOutcome::Completed),
                Err(err) => err,
            };
            if retries_left == 0 {
                warn!(
                    service = %self.name,
                    %node,
                    error = %err,
                    "IO task failed after all retries, reporting node as failed"
                );
                self.liveness.report_node_failure(node, &self.name);
                return Ok(IoTaskOutcome::ReportedFailed);
            }
            retries_left -= 1;
            trace!(service = %self.name, %node, error = %err, retries_left, "retrying IO task");
            thread::sleep(self.config.io_task_wait_time);
            if !self.liveness.is_node_alive(node) {
                debug!(service = %self.name, %node, "node is dead, dropping IO task");
                return Ok(IoTaskOutcome::NodeDead);
            }
        }
    }
}

fn check_non_transactional(ctx: &TaskContext) -> Result<(), ServiceError> {
    if ctx.in_transaction() {
        return Err(ServiceError::TransactionalContext);
    }
    Ok(())
}

fn teardown(name: &str, hooks: &dyn ServiceHooks, shared: &Shared) {
    match panic::catch_unwind(AssertUnwindSafe(|| hooks.do_shutdown())) {
        Ok(Ok(())) => debug!(service = %name, "shutdown hook completed"),
        Ok(Err(e)) => warn!(service = %name, error = %e, "shutdown hook failed"),
        Err(_) => warn!(service = %name, "shutdown hook panicked"),
    }
    let mut lc = shared.lifecycle.lock();
    lc.state = ServiceState::Shutdown;
    shared.cond.notify_all();
}
