//! Request coordinator.
//!
//! Turns one synchronous request into: mint a token, register it, dispatch
//! the command carrying the token, wait for the completion, clean up. The
//! entry is removed on every exit path (success, rejection, dispatch failure,
//! timeout, cancellation of the calling future) because the
//! [`PendingHandle`](crate::pending::PendingHandle) owns it.

use crate::command_bus::{CommandBus, DispatchError};
use crate::pending::{PendingError, PendingTable};
use relay_core::correlation::CorrelationToken;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How the coordinator hands a command to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Wait for the aggregate to accept the command, bounded by the command timeout.
    AwaitAcceptance,
    /// Return as soon as the command is handed off.
    FireAndForget,
}

/// Deadlines applied by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Bound on the bus accepting or rejecting a command.
    pub command_timeout: Duration,

    /// Bound on waiting for the completion event after dispatch.
    pub completion_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(1),
            completion_timeout: Duration::from_secs(1),
        }
    }
}

impl CoordinatorConfig {
    /// Set the command acceptance timeout
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the completion timeout
    #[must_use]
    pub const fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }
}

/// Why a coordinated request did not produce a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError<R> {
    /// The aggregate refused the command.
    #[error("command rejected: {0}")]
    Rejected(R),

    /// The command could not be dispatched.
    #[error("command dispatch failed: {0}")]
    DispatchFailed(String),

    /// The completion did not arrive in time.
    #[error("timed out after {}ms waiting for completion of {token}", .waited.as_millis())]
    Timeout {
        /// Token of the request
        token: CorrelationToken,
        /// Deadline that elapsed
        waited: Duration,
    },

    /// The minted token collided with a live entry.
    #[error("correlation token {0} already in use")]
    DuplicateToken(CorrelationToken),

    /// The entry disappeared before the completion arrived.
    #[error("request {0} was abandoned before completion")]
    Abandoned(CorrelationToken),
}

impl<R> From<PendingError> for CoordinatorError<R> {
    fn from(error: PendingError) -> Self {
        match error {
            PendingError::DuplicateToken(token) => Self::DuplicateToken(token),
            PendingError::TimedOut { token, waited } => Self::Timeout { token, waited },
            PendingError::Abandoned(token) => Self::Abandoned(token),
        }
    }
}

/// Bridges a synchronous caller to the asynchronous command/event pipeline.
pub struct RequestCoordinator<B: CommandBus + ?Sized> {
    bus: Arc<B>,
    config: CoordinatorConfig,
}

impl<B: CommandBus + ?Sized> Clone for RequestCoordinator<B> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
            config: self.config,
        }
    }
}

impl<B: CommandBus + ?Sized> RequestCoordinator<B> {
    /// Create a coordinator dispatching through `bus`.
    #[must_use]
    pub const fn new(bus: Arc<B>, config: CoordinatorConfig) -> Self {
        Self { bus, config }
    }

    /// Active deadlines.
    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Dispatch a tracked command and wait for its completion payload.
    ///
    /// `build` receives the freshly minted token and must place it in the
    /// command's tracker field. The token is registered in `table` before the
    /// command is dispatched.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::Rejected`]: the aggregate refused the command
    /// - [`CoordinatorError::DispatchFailed`]: the bus could not deliver or did
    ///   not answer within the command timeout
    /// - [`CoordinatorError::Timeout`]: no completion within the completion timeout
    /// - [`CoordinatorError::DuplicateToken`] / [`CoordinatorError::Abandoned`]:
    ///   table bookkeeping failures
    #[tracing::instrument(
        skip_all,
        fields(table = table.name(), mode = ?mode, token = tracing::field::Empty)
    )]
    pub async fn execute<T, F>(
        &self,
        table: &Arc<PendingTable<T>>,
        mode: DispatchMode,
        build: F,
    ) -> Result<T, CoordinatorError<B::Rejection>>
    where
        T: Send + 'static,
        F: FnOnce(CorrelationToken) -> B::Command,
    {
        let token = CorrelationToken::mint();
        tracing::Span::current().record("token", tracing::field::display(token));

        let handle = table.register(token)?;
        let command = build(token);
        let started = Instant::now();

        let dispatched = match mode {
            DispatchMode::AwaitAcceptance => {
                self.bus
                    .send_and_wait(command, self.config.command_timeout)
                    .await
            },
            DispatchMode::FireAndForget => self.bus.send(command).await,
        };

        if let Err(error) = dispatched {
            drop(handle);
            return Err(match error {
                DispatchError::Rejected(cause) => {
                    tracing::debug!(%cause, "Command rejected");
                    metrics::counter!("correlation.rejected", "table" => table.name()).increment(1);
                    CoordinatorError::Rejected(cause)
                },
                DispatchError::Failed(reason) => {
                    tracing::error!(%reason, "Command dispatch failed");
                    metrics::counter!("correlation.dispatch_failures", "table" => table.name())
                        .increment(1);
                    CoordinatorError::DispatchFailed(reason)
                },
            });
        }

        match handle.wait(self.config.completion_timeout).await {
            Ok(value) => {
                metrics::histogram!("correlation.wait_seconds", "table" => table.name())
                    .record(started.elapsed().as_secs_f64());
                Ok(value)
            },
            Err(error) => {
                tracing::warn!(%error, "No completion for command");
                Err(error.into())
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::command_bus::DispatchFuture;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    #[error("name taken")]
    struct NameTaken;

    #[derive(Debug, Clone)]
    struct Rename {
        name: String,
        tracker: Option<CorrelationToken>,
    }

    /// Bus that answers every dispatch the same way and optionally
    /// resolves the tracked token straight away.
    struct FakeBus {
        reply: Result<(), DispatchError<NameTaken>>,
        names: Option<Arc<PendingTable<String>>>,
    }

    impl FakeBus {
        fn reply(&self, command: &Rename) -> Result<(), DispatchError<NameTaken>> {
            if let (Ok(()), Some(names), Some(token)) =
                (&self.reply, &self.names, command.tracker)
            {
                names.resolve(&token, command.name.clone());
            }
            self.reply.clone()
        }
    }

    impl CommandBus for FakeBus {
        type Command = Rename;
        type Rejection = NameTaken;

        fn send_and_wait(
            &self,
            command: Rename,
            _timeout: Duration,
        ) -> DispatchFuture<'_, NameTaken> {
            let reply = self.reply(&command);
            Box::pin(async move { reply })
        }

        fn send(&self, command: Rename) -> DispatchFuture<'_, NameTaken> {
            let reply = self.reply(&command);
            Box::pin(async move { reply })
        }
    }

    fn coordinator(bus: FakeBus) -> RequestCoordinator<FakeBus> {
        RequestCoordinator::new(
            Arc::new(bus),
            CoordinatorConfig::default()
                .with_command_timeout(Duration::from_millis(200))
                .with_completion_timeout(Duration::from_millis(50)),
        )
    }

    fn rename(tracker: CorrelationToken) -> Rename {
        Rename {
            name: "groceries".to_string(),
            tracker: Some(tracker),
        }
    }

    #[tokio::test]
    async fn completion_is_returned() {
        let table = PendingTable::<String>::new("names");
        let coordinator = coordinator(FakeBus {
            reply: Ok(()),
            names: Some(Arc::clone(&table)),
        });

        let name = coordinator
            .execute(&table, DispatchMode::AwaitAcceptance, rename)
            .await
            .unwrap();

        assert_eq!(name, "groceries");
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn missing_completion_times_out_and_cleans_up() {
        let table = PendingTable::<String>::new("names");
        let coordinator = coordinator(FakeBus {
            reply: Ok(()),
            names: None,
        });

        let result = coordinator.execute(&table, DispatchMode::AwaitAcceptance, rename).await;

        assert!(matches!(
            result,
            Err(CoordinatorError::Timeout { waited, .. }) if waited == Duration::from_millis(50)
        ));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn rejection_is_propagated() {
        let table = PendingTable::<String>::new("names");
        let coordinator = coordinator(FakeBus {
            reply: Err(DispatchError::Rejected(NameTaken)),
            names: Some(Arc::clone(&table)),
        });

        let result = coordinator.execute(&table, DispatchMode::AwaitAcceptance, rename).await;

        assert_eq!(result, Err(CoordinatorError::Rejected(NameTaken)));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn dispatch_failure_is_propagated() {
        let table = PendingTable::<String>::new("names");
        let coordinator = coordinator(FakeBus {
            reply: Err(DispatchError::Failed("bus down".to_string())),
            names: None,
        });

        let result = coordinator.execute(&table, DispatchMode::FireAndForget, rename).await;

        assert_eq!(result, Err(CoordinatorError::DispatchFailed("bus down".to_string())));
        assert!(table.is_empty());
    }

    #[test]
    fn pending_errors_map_onto_coordinator_errors() {
        let token = CorrelationToken::mint();
        let mapped: CoordinatorError<NameTaken> = PendingError::DuplicateToken(token).into();
        assert_eq!(mapped, CoordinatorError::DuplicateToken(token));

        let mapped: CoordinatorError<NameTaken> = PendingError::Abandoned(token).into();
        assert_eq!(mapped, CoordinatorError::Abandoned(token));
    }
}
