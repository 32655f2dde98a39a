//! Domain types for the to-do list aggregate.
//!
//! One list per user. Commands and events carry an optional correlation
//! token (`tracker`) so the HTTP layer can wait for the event its command
//! caused.

use chrono::{DateTime, Utc};
use relay_core::correlation::{CorrelationToken, Tracked};
use relay_core::event::Event;
use relay_runtime::command_bus::{CommandProtocol, DispatchError, DispatchId};
use relay_web::AppError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Longest title the aggregate accepts, in characters.
pub const MAX_TITLE_LENGTH: usize = 500;

/// Unique identifier for a to-do item
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(Uuid);

impl TodoId {
    /// Creates a new random `TodoId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `TodoId` from a UUID
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TodoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TodoId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Owner of a to-do list
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a `UserId`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single to-do item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Unique identifier
    pub id: TodoId,
    /// What needs doing
    pub title: String,
    /// Whether the item is done
    pub completed: bool,
    /// Client-chosen position in the list
    pub order: Option<i32>,
    /// When the item was created
    pub created_at: DateTime<Utc>,
}

/// Commands accepted by the to-do aggregate
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TodoCommand {
    /// Add an item to a user's list
    CreateItem {
        /// List owner
        user_id: UserId,
        /// Id for the new item
        item_id: TodoId,
        /// Item title
        title: String,
        /// Initial completion flag
        completed: bool,
        /// Position in the list
        order: Option<i32>,
        /// Correlation token of the waiting request
        tracker: Option<CorrelationToken>,
    },

    /// Change some fields of an item; absent fields keep their value
    UpdateItem {
        /// List owner
        user_id: UserId,
        /// Item to change
        item_id: TodoId,
        /// New title
        title: Option<String>,
        /// New completion flag
        completed: Option<bool>,
        /// New position
        order: Option<i32>,
        /// Correlation token of the waiting request
        tracker: Option<CorrelationToken>,
    },

    /// Remove an item
    DeleteItem {
        /// List owner
        user_id: UserId,
        /// Item to remove
        item_id: TodoId,
        /// Correlation token of the waiting request
        tracker: Option<CorrelationToken>,
    },

    /// Remove every item of a list
    ClearList {
        /// List owner
        user_id: UserId,
        /// Correlation token of the waiting request
        tracker: Option<CorrelationToken>,
    },
}

impl TodoCommand {
    /// Owner of the list this command targets
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        match self {
            Self::CreateItem { user_id, .. }
            | Self::UpdateItem { user_id, .. }
            | Self::DeleteItem { user_id, .. }
            | Self::ClearList { user_id, .. } => user_id,
        }
    }
}

impl Tracked for TodoCommand {
    fn correlation_token(&self) -> Option<CorrelationToken> {
        match self {
            Self::CreateItem { tracker, .. }
            | Self::UpdateItem { tracker, .. }
            | Self::DeleteItem { tracker, .. }
            | Self::ClearList { tracker, .. } => *tracker,
        }
    }
}

/// Facts emitted by the to-do aggregate
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TodoEvent {
    /// An item was added
    ItemCreated {
        /// List owner
        user_id: UserId,
        /// The new item
        item: TodoItem,
        /// Token copied from the command
        tracker: Option<CorrelationToken>,
    },

    /// An item changed; carries the full item after the change
    ItemUpdated {
        /// List owner
        user_id: UserId,
        /// The updated item
        item: TodoItem,
        /// Token copied from the command
        tracker: Option<CorrelationToken>,
    },

    /// An item was removed; carries the removed item
    ItemDeleted {
        /// List owner
        user_id: UserId,
        /// The removed item
        item: TodoItem,
        /// Token copied from the command
        tracker: Option<CorrelationToken>,
    },

    /// A list was emptied
    ListCleared {
        /// List owner
        user_id: UserId,
        /// Items left after clearing
        remaining: Vec<TodoItem>,
        /// Token copied from the command
        tracker: Option<CorrelationToken>,
    },
}

impl TodoEvent {
    /// Owner of the list this event belongs to
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        match self {
            Self::ItemCreated { user_id, .. }
            | Self::ItemUpdated { user_id, .. }
            | Self::ItemDeleted { user_id, .. }
            | Self::ListCleared { user_id, .. } => user_id,
        }
    }
}

impl Event for TodoEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::ItemCreated { .. } => "ItemCreated.v1",
            Self::ItemUpdated { .. } => "ItemUpdated.v1",
            Self::ItemDeleted { .. } => "ItemDeleted.v1",
            Self::ListCleared { .. } => "ListCleared.v1",
        }
    }
}

impl Tracked for TodoEvent {
    fn correlation_token(&self) -> Option<CorrelationToken> {
        match self {
            Self::ItemCreated { tracker, .. }
            | Self::ItemUpdated { tracker, .. }
            | Self::ItemDeleted { tracker, .. }
            | Self::ListCleared { tracker, .. } => *tracker,
        }
    }
}

/// Why the aggregate refused a command
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum TodoError {
    /// No item with this id in the list
    #[error("todo {0} not found")]
    NotFound(TodoId),

    /// An item with this id already exists
    #[error("todo {0} already exists")]
    AlreadyExists(TodoId),

    /// Title is empty or whitespace
    #[error("todo title cannot be empty")]
    EmptyTitle,

    /// Title exceeds the length limit
    #[error("todo title too long (max {max} characters)")]
    TitleTooLong {
        /// Maximum number of characters
        max: usize,
    },
}

impl From<TodoError> for AppError {
    fn from(error: TodoError) -> Self {
        match error {
            TodoError::NotFound(id) => Self::not_found("Todo", id),
            TodoError::AlreadyExists(_) => Self::conflict(error.to_string()),
            TodoError::EmptyTitle | TodoError::TitleTooLong { .. } => {
                Self::validation(error.to_string())
            },
        }
    }
}

/// Actions processed by the to-do store
///
/// A dispatch carries a command in; exactly one acknowledgement with the
/// same [`DispatchId`] comes back once the command was applied and its
/// event published, refused, or lost.
#[derive(Clone, Debug)]
pub enum TodoAction {
    /// Command handed to the aggregate
    Dispatch {
        /// Pairs this dispatch with its acknowledgement
        id: DispatchId,
        /// The command
        command: TodoCommand,
    },

    /// Command applied and its event published
    Accepted {
        /// Dispatch being acknowledged
        id: DispatchId,
    },

    /// Command refused by a business rule
    Rejected {
        /// Dispatch being acknowledged
        id: DispatchId,
        /// Why
        error: TodoError,
    },

    /// Command applied but its event could not be published
    Failed {
        /// Dispatch being acknowledged
        id: DispatchId,
        /// Transport error
        reason: String,
    },
}

impl CommandProtocol for TodoAction {
    type Command = TodoCommand;
    type Rejection = TodoError;

    fn dispatch(id: DispatchId, command: TodoCommand) -> Self {
        Self::Dispatch { id, command }
    }

    fn acknowledges(&self) -> Option<DispatchId> {
        match self {
            Self::Accepted { id } | Self::Rejected { id, .. } | Self::Failed { id, .. } => {
                Some(*id)
            },
            Self::Dispatch { .. } => None,
        }
    }

    fn into_outcome(self) -> Option<Result<(), DispatchError<TodoError>>> {
        match self {
            Self::Accepted { .. } => Some(Ok(())),
            Self::Rejected { error, .. } => Some(Err(DispatchError::Rejected(error))),
            Self::Failed { reason, .. } => Some(Err(DispatchError::Failed(reason))),
            Self::Dispatch { .. } => None,
        }
    }
}

/// Items of one user's list
#[derive(Clone, Debug, Default)]
pub struct TodoList {
    items: HashMap<TodoId, TodoItem>,
}

impl TodoList {
    /// Item by id
    #[must_use]
    pub fn get(&self, id: &TodoId) -> Option<&TodoItem> {
        self.items.get(id)
    }

    /// Whether the list holds `id`
    #[must_use]
    pub fn contains(&self, id: &TodoId) -> bool {
        self.items.contains_key(id)
    }

    /// Number of items
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the list has no items
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items sorted by `order`, then creation time
    #[must_use]
    pub fn sorted(&self) -> Vec<TodoItem> {
        let mut items: Vec<TodoItem> = self.items.values().cloned().collect();
        items.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        items
    }

    pub(crate) fn upsert(&mut self, item: TodoItem) {
        self.items.insert(item.id, item);
    }

    pub(crate) fn remove(&mut self, id: &TodoId) {
        self.items.remove(id);
    }
}

/// State of the to-do aggregate: every user's list
#[derive(Clone, Debug, Default)]
pub struct TodoState {
    lists: HashMap<UserId, TodoList>,
}

impl TodoState {
    /// Creates an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The list of `user_id`, if it has ever held an item
    #[must_use]
    pub fn list(&self, user_id: &UserId) -> Option<&TodoList> {
        self.lists.get(user_id)
    }

    /// One item of a user's list
    #[must_use]
    pub fn item(&self, user_id: &UserId, id: &TodoId) -> Option<&TodoItem> {
        self.list(user_id).and_then(|list| list.get(id))
    }

    /// Sorted items of a user's list; empty for unknown users
    #[must_use]
    pub fn items(&self, user_id: &UserId) -> Vec<TodoItem> {
        self.list(user_id).map(TodoList::sorted).unwrap_or_default()
    }

    pub(crate) fn list_mut(&mut self, user_id: &UserId) -> &mut TodoList {
        self.lists.entry(user_id.clone()).or_default()
    }

    pub(crate) fn clear(&mut self, user_id: &UserId) {
        self.lists.remove(user_id);
    }
}
