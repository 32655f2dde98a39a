//! Read side of the to-do service.
//!
//! Queries read the aggregate's in-memory state through the store; they
//! never dispatch commands.

use crate::reducer::{TodoEnvironment, TodoReducer};
use crate::types::{TodoAction, TodoId, TodoItem, TodoState, UserId};
use relay_runtime::HealthCheck;
use relay_runtime::store::Store;
use std::sync::Arc;

/// Store running the to-do aggregate.
pub type TodoStore = Store<TodoState, TodoAction, TodoEnvironment, TodoReducer>;

/// Queries over users' lists.
#[derive(Clone)]
pub struct TodoQueryService {
    store: Arc<TodoStore>,
}

impl TodoQueryService {
    /// Query through `store`.
    #[must_use]
    pub const fn new(store: Arc<TodoStore>) -> Self {
        Self { store }
    }

    /// All items of a user's list, sorted by order then creation time.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, user_id: &UserId) -> Vec<TodoItem> {
        self.store.state(|state| state.items(user_id)).await
    }

    /// One item, if the user's list holds it.
    #[tracing::instrument(skip(self))]
    pub async fn item(&self, user_id: &UserId, id: &TodoId) -> Option<TodoItem> {
        self.store.state(|state| state.item(user_id, id).cloned()).await
    }

    /// Health of the underlying store.
    #[must_use]
    pub fn health(&self) -> HealthCheck {
        self.store.health()
    }
}
