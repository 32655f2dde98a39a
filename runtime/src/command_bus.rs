//! Command dispatch seam.
//!
//! Request handlers hand commands to a [`CommandBus`]. The bus either waits
//! until the aggregate has accepted or rejected the command
//! ([`CommandBus::send_and_wait`]) or returns as soon as the command is
//! handed off ([`CommandBus::send`]). Neither mode waits for the resulting
//! event; that is the completion listener's job.
//!
//! A [`Store`] becomes a command bus when its action type implements
//! [`CommandProtocol`]: the command is wrapped in a dispatch action, and the
//! reducer answers with an acknowledgement action carrying the same
//! [`DispatchId`].

use crate::error::StoreError;
use crate::store::Store;
use relay_core::reducer::Reducer;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Identifier pairing a dispatch action with its acknowledgement.
///
/// Distinct from the correlation token: this one only lives between the bus
/// and the reducer, and exists for every command, tracked or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchId(Uuid);

impl DispatchId {
    /// Mint a fresh dispatch id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a command did not go through.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError<R> {
    /// The aggregate refused the command. Carries the domain cause.
    #[error("command rejected: {0}")]
    Rejected(R),

    /// The command could not be delivered or handled.
    #[error("command dispatch failed: {0}")]
    Failed(String),
}

/// Future returned by [`CommandBus`] methods.
pub type DispatchFuture<'a, R> =
    Pin<Box<dyn Future<Output = Result<(), DispatchError<R>>> + Send + 'a>>;

/// Something that accepts commands on behalf of an aggregate.
///
/// Object safe, so handlers can hold an `Arc<dyn CommandBus<...>>` and tests
/// can substitute a scripted bus.
pub trait CommandBus: Send + Sync {
    /// Command type accepted by this bus.
    type Command: Send + 'static;

    /// Domain rejection cause.
    type Rejection: std::error::Error + Send + Sync + 'static;

    /// Dispatch and wait up to `timeout` for the aggregate to accept or reject.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Rejected`] when the aggregate refused the command,
    /// [`DispatchError::Failed`] when it was not handled within `timeout` or
    /// could not be delivered.
    fn send_and_wait(
        &self,
        command: Self::Command,
        timeout: Duration,
    ) -> DispatchFuture<'_, Self::Rejection>;

    /// Dispatch without waiting for acceptance.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Failed`] when the command could not be handed off.
    fn send(&self, command: Self::Command) -> DispatchFuture<'_, Self::Rejection>;
}

/// Action protocol that lets a [`Store`] serve as a [`CommandBus`].
pub trait CommandProtocol: Sized {
    /// Command carried by the dispatch action.
    type Command;

    /// Domain rejection cause carried by a rejection acknowledgement.
    type Rejection;

    /// Wrap a command into the action the reducer handles.
    fn dispatch(id: DispatchId, command: Self::Command) -> Self;

    /// If this action acknowledges a dispatch, the id it answers.
    fn acknowledges(&self) -> Option<DispatchId>;

    /// Turn an acknowledgement into the dispatch outcome.
    ///
    /// Returns `None` for actions that are not acknowledgements.
    fn into_outcome(self) -> Option<Result<(), DispatchError<Self::Rejection>>>;
}

impl<S, A, E, R> CommandBus for Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    A: CommandProtocol + Clone + Send + Sync + 'static,
    A::Command: Send + 'static,
    A::Rejection: std::error::Error + Send + Sync + 'static,
    S: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    type Command = A::Command;
    type Rejection = A::Rejection;

    fn send_and_wait(
        &self,
        command: Self::Command,
        timeout: Duration,
    ) -> DispatchFuture<'_, Self::Rejection> {
        Box::pin(async move {
            let id = DispatchId::new();
            let ack = self
                .send_and_wait_for(
                    A::dispatch(id, command),
                    |a| a.acknowledges() == Some(id),
                    timeout,
                )
                .await
                .map_err(|error| match error {
                    StoreError::Timeout => DispatchError::Failed(format!(
                        "command not handled within {}ms",
                        timeout.as_millis()
                    )),
                    other => DispatchError::Failed(other.to_string()),
                })?;

            ack.into_outcome().unwrap_or_else(|| {
                Err(DispatchError::Failed(format!(
                    "dispatch {id} acknowledged without an outcome"
                )))
            })
        })
    }

    fn send(&self, command: Self::Command) -> DispatchFuture<'_, Self::Rejection> {
        Box::pin(async move {
            Store::send(self, A::dispatch(DispatchId::new(), command))
                .await
                .map_err(|error| DispatchError::Failed(error.to_string()))
        })
    }
}
