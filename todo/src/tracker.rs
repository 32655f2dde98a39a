//! Completion tracking for to-do commands.
//!
//! Two pending tables: one for commands answered with a single item
//! (create, update, delete) and one for commands answered with a whole list
//! (clear). The tracker routes each tracked [`TodoEvent`] to the table its
//! payload belongs in.

use crate::types::{TodoEvent, TodoItem};
use relay_core::correlation::CorrelationToken;
use relay_runtime::{CompletionRouter, HealthCheck, PendingTable};
use std::sync::Arc;

/// Pending tables for the to-do service.
#[derive(Debug, Clone)]
pub struct TodoCompletionTracker {
    items: Arc<PendingTable<TodoItem>>,
    lists: Arc<PendingTable<Vec<TodoItem>>>,
}

impl Default for TodoCompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TodoCompletionTracker {
    /// Create empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: PendingTable::new("items"),
            lists: PendingTable::new("lists"),
        }
    }

    /// Requests waiting for a single item.
    #[must_use]
    pub const fn items(&self) -> &Arc<PendingTable<TodoItem>> {
        &self.items
    }

    /// Requests waiting for a list.
    #[must_use]
    pub const fn lists(&self) -> &Arc<PendingTable<Vec<TodoItem>>> {
        &self.lists
    }

    /// One health check per table.
    #[must_use]
    pub fn health(&self) -> Vec<HealthCheck> {
        vec![self.items.health(), self.lists.health()]
    }
}

impl CompletionRouter for TodoCompletionTracker {
    type Event = TodoEvent;

    fn route(&self, token: CorrelationToken, event: TodoEvent) -> bool {
        match event {
            TodoEvent::ItemCreated { item, .. }
            | TodoEvent::ItemUpdated { item, .. }
            | TodoEvent::ItemDeleted { item, .. } => self.items.resolve(&token, item),
            TodoEvent::ListCleared { remaining, .. } => self.lists.resolve(&token, remaining),
        }
    }
}
