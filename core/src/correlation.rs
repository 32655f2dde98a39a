//! Correlation tokens linking a command dispatch to the event it produces.
//!
//! A token is minted by whoever wants to observe the outcome of a command,
//! placed in the command's `tracker` field, and echoed back by the aggregate
//! in every event that command causes. Commands that nobody waits on simply
//! carry `None`.
//!
//! ```
//! use relay_core::correlation::{CorrelationToken, Tracked};
//!
//! struct ClearList {
//!     tracker: Option<CorrelationToken>,
//! }
//!
//! impl Tracked for ClearList {
//!     fn correlation_token(&self) -> Option<CorrelationToken> {
//!         self.tracker
//!     }
//! }
//!
//! let command = ClearList { tracker: Some(CorrelationToken::mint()) };
//! assert!(command.correlation_token().is_some());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque identifier for one tracked command.
///
/// Backed by a random (v4) UUID; rendered and parsed as its hyphenated
/// string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(Uuid);

impl CorrelationToken {
    /// Mint a fresh token.
    #[must_use]
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A command or event that may carry a correlation token.
pub trait Tracked {
    /// The token this value carries, if its originator asked for tracking.
    fn correlation_token(&self) -> Option<CorrelationToken>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    #[test]
    fn minted_tokens_are_distinct_across_threads() {
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seen = Arc::clone(&seen);
                std::thread::spawn(move || {
                    let local: Vec<_> = (0..1_000).map(|_| CorrelationToken::mint()).collect();
                    let mut seen = seen.lock().unwrap();
                    for token in local {
                        assert!(seen.insert(token), "token minted twice: {token}");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(seen.lock().unwrap().len(), 8_000);
    }

    #[test]
    fn serializes_as_plain_string() {
        let token = CorrelationToken::mint();
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, format!("\"{token}\""));
    }

    #[test]
    fn rejects_garbage() {
        assert!("not-a-token".parse::<CorrelationToken>().is_err());
    }

    proptest! {
        #[test]
        fn display_parses_back(raw in any::<u128>()) {
            let token = CorrelationToken::from_uuid(Uuid::from_u128(raw));
            let parsed: CorrelationToken = token.to_string().parse().unwrap();
            prop_assert_eq!(parsed, token);
        }
    }
}
