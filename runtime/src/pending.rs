//! Pending table: correlation token → waiting caller.
//!
//! A caller registers a token before dispatching its command and gets a
//! [`PendingHandle`] back. The completion listener later calls
//! [`PendingTable::resolve`] with the payload of the matching event, which
//! wakes the handle. Each token resolves at most once; the first value wins.
//!
//! Entries are removed when their handle is dropped, so a caller that times
//! out, fails to dispatch, or is cancelled never leaves anything behind.
//!
//! The table is sharded (`DashMap`), so concurrent registrations and
//! resolutions for different tokens do not contend on one lock.

use crate::HealthCheck;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use relay_core::correlation::CorrelationToken;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors from registering or waiting on a token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PendingError {
    /// The token is already registered in this table.
    #[error("correlation token {0} is already registered")]
    DuplicateToken(CorrelationToken),

    /// No completion arrived before the deadline.
    #[error("no completion for {token} within {}ms", .waited.as_millis())]
    TimedOut {
        /// The token that was waited on
        token: CorrelationToken,
        /// The deadline that elapsed
        waited: Duration,
    },

    /// The entry was removed before any value arrived.
    #[error("entry for {0} was removed before completion")]
    Abandoned(CorrelationToken),
}

enum Slot<T> {
    Waiting(oneshot::Sender<T>),
    Resolved,
}

/// Concurrent mapping from correlation token to a one-shot completion slot.
///
/// One table per payload shape: e.g. a single item vs. a whole list.
pub struct PendingTable<T> {
    name: &'static str,
    entries: DashMap<CorrelationToken, Slot<T>>,
}

impl<T> std::fmt::Debug for PendingTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTable")
            .field("name", &self.name)
            .field("pending", &self.entries.len())
            .finish()
    }
}

impl<T: Send + 'static> PendingTable<T> {
    /// Create an empty table. `name` labels logs and metrics.
    #[must_use]
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            entries: DashMap::new(),
        })
    }

    /// Table label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Register `token` and return the handle that will receive its value.
    ///
    /// # Errors
    ///
    /// [`PendingError::DuplicateToken`] if `token` is already present. The
    /// existing entry is left untouched.
    pub fn register(
        self: &Arc<Self>,
        token: CorrelationToken,
    ) -> Result<PendingHandle<T>, PendingError> {
        let (sender, receiver) = oneshot::channel();
        match self.entries.entry(token) {
            Entry::Occupied(_) => {
                tracing::warn!(
                    table = self.name,
                    %token,
                    "Duplicate correlation token registration"
                );
                return Err(PendingError::DuplicateToken(token));
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Waiting(sender));
            },
        }
        metrics::counter!("correlation.registered", "table" => self.name).increment(1);
        tracing::trace!(table = self.name, %token, "Registered pending entry");

        Ok(PendingHandle {
            token,
            receiver,
            table: Arc::clone(self),
        })
    }

    /// Deliver `value` to whoever waits on `token`.
    ///
    /// Returns `true` if a waiter received the value. Returns `false` (and
    /// drops `value`) when the token is unknown, was already resolved, or its
    /// waiter has gone away.
    pub fn resolve(&self, token: &CorrelationToken, value: T) -> bool {
        let Some(mut entry) = self.entries.get_mut(token) else {
            tracing::debug!(table = self.name, %token, "No pending entry for completion, ignoring");
            metrics::counter!("correlation.orphaned", "table" => self.name).increment(1);
            return false;
        };

        let slot = std::mem::replace(entry.value_mut(), Slot::Resolved);
        drop(entry);

        match slot {
            Slot::Waiting(sender) => {
                if sender.send(value).is_err() {
                    tracing::debug!(
                        table = self.name,
                        %token,
                        "Waiter went away before completion"
                    );
                    return false;
                }
                metrics::counter!("correlation.resolved", "table" => self.name).increment(1);
                true
            },
            Slot::Resolved => {
                tracing::warn!(
                    table = self.name,
                    %token,
                    "Duplicate completion for token, keeping first value"
                );
                false
            },
        }
    }

    /// Drop the entry for `token`, if any. Idempotent.
    pub fn remove(&self, token: &CorrelationToken) {
        if self.entries.remove(token).is_some() {
            tracing::trace!(table = self.name, %token, "Removed pending entry");
        }
    }

    /// Whether `token` currently has an entry.
    #[must_use]
    pub fn contains(&self, token: &CorrelationToken) -> bool {
        self.entries.contains_key(token)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no request is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Health check reporting the number of in-flight entries.
    #[must_use]
    pub fn health(&self) -> HealthCheck {
        HealthCheck::healthy(format!("pending.{}", self.name))
            .with_metadata("in_flight", self.len().to_string())
    }
}

/// A registered token waiting for its completion value.
///
/// Dropping the handle removes the table entry.
#[derive(Debug)]
pub struct PendingHandle<T: Send + 'static> {
    token: CorrelationToken,
    receiver: oneshot::Receiver<T>,
    table: Arc<PendingTable<T>>,
}

impl<T: Send + 'static> PendingHandle<T> {
    /// The registered token.
    #[must_use]
    pub const fn token(&self) -> CorrelationToken {
        self.token
    }

    /// Suspend until the value arrives or `deadline` elapses.
    ///
    /// # Errors
    ///
    /// - [`PendingError::TimedOut`] when nothing arrived in time
    /// - [`PendingError::Abandoned`] when the entry was removed without a value
    pub async fn wait(mut self, deadline: Duration) -> Result<T, PendingError> {
        match tokio::time::timeout(deadline, &mut self.receiver).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(PendingError::Abandoned(self.token)),
            Err(_) => {
                // Closing first makes any later `resolve` report `false`; a
                // value sent before the close still counts.
                self.table.remove(&self.token);
                self.receiver.close();
                if let Ok(value) = self.receiver.try_recv() {
                    return Ok(value);
                }
                metrics::counter!("correlation.timeouts", "table" => self.table.name).increment(1);
                Err(PendingError::TimedOut {
                    token: self.token,
                    waited: deadline,
                })
            },
        }
    }
}

impl<T: Send + 'static> Drop for PendingHandle<T> {
    fn drop(&mut self) {
        self.table.remove(&self.token);
    }
}
