//! JSON views of to-do items, in the shape TodoMVC clients expect.

use crate::types::{TodoId, TodoItem};
use serde::{Deserialize, Serialize};

/// One item as rendered over HTTP.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoView {
    /// Item id
    pub id: TodoId,
    /// Item title
    pub title: String,
    /// Whether the item is done
    pub completed: bool,
    /// Position in the list
    pub order: Option<i32>,
    /// Absolute URL of the item
    pub url: String,
}

/// Builds [`TodoView`]s with absolute URLs.
#[derive(Clone, Debug)]
pub struct TodoViewFactory {
    base_url: String,
}

impl TodoViewFactory {
    /// Views linking below `base_url`, e.g. `http://localhost:8080`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// URL of one item.
    #[must_use]
    pub fn url(&self, id: &TodoId) -> String {
        format!("{}/todos/{id}", self.base_url)
    }

    /// View of one item.
    #[must_use]
    pub fn item(&self, item: &TodoItem) -> TodoView {
        TodoView {
            id: item.id,
            title: item.title.clone(),
            completed: item.completed,
            order: item.order,
            url: self.url(&item.id),
        }
    }

    /// Views of several items, in the given order.
    #[must_use]
    pub fn list(&self, items: &[TodoItem]) -> Vec<TodoView> {
        items.iter().map(|item| self.item(item)).collect()
    }
}
