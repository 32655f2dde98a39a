//! # Relay Testing
//!
//! Test support for reducers and request coordination.
//!
//! This crate provides:
//! - [`FixedClock`] for deterministic timestamps
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - [`mocks::ScriptedCommandBus`], a command bus whose answers a test decides
//! - [`effects::collect_actions`] to run effects without a store
//!
//! ## Example
//!
//! ```ignore
//! use relay_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(TodoReducer::new())
//!     .with_env(test_environment())
//!     .given_state(TodoState::default())
//!     .when_action(create_item("Buy milk"))
//!     .then_state(|state| assert_eq!(state.len(), 1))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use relay_core::environment::Clock;


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use relay_runtime::command_bus::{CommandBus, DispatchError, DispatchFuture};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// # Example
    ///
    /// ```
    /// use relay_testing::mocks::FixedClock;
    /// use relay_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Never in practice: the timestamp is a literal.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    type Reply<C, R> = Arc<dyn Fn(&C) -> Result<(), DispatchError<R>> + Send + Sync>;
    type Hook<C> = Arc<dyn Fn(&C) + Send + Sync>;

    /// Command bus that records every command and answers as scripted.
    ///
    /// An optional hook runs for each accepted command; tests use it to
    /// play the aggregate, e.g. resolving the tracked token or publishing
    /// the completion event.
    pub struct ScriptedCommandBus<C, R> {
        reply: Reply<C, R>,
        hook: Option<Hook<C>>,
        sent: Mutex<Vec<C>>,
        fire_and_forget: AtomicUsize,
    }

    impl<C, R> ScriptedCommandBus<C, R>
    where
        C: Clone + Send + 'static,
        R: std::error::Error + Send + Sync + 'static,
    {
        /// Bus that accepts every command and never produces an event.
        #[must_use]
        pub fn accepting() -> Self {
            Self::replying(|_| Ok(()))
        }

        /// Bus answering each command with `reply`.
        #[must_use]
        pub fn replying<F>(reply: F) -> Self
        where
            F: Fn(&C) -> Result<(), DispatchError<R>> + Send + Sync + 'static,
        {
            Self {
                reply: Arc::new(reply),
                hook: None,
                sent: Mutex::new(Vec::new()),
                fire_and_forget: AtomicUsize::new(0),
            }
        }

        /// Run `hook` for every accepted command, before the reply is returned.
        #[must_use]
        pub fn with_hook<F>(mut self, hook: F) -> Self
        where
            F: Fn(&C) + Send + Sync + 'static,
        {
            self.hook = Some(Arc::new(hook));
            self
        }

        /// Commands received so far, in order.
        #[must_use]
        pub fn sent(&self) -> Vec<C> {
            self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        /// How many commands arrived through `send`.
        #[must_use]
        pub fn fire_and_forget_count(&self) -> usize {
            self.fire_and_forget.load(Ordering::SeqCst)
        }

        fn handle(&self, command: C) -> Result<(), DispatchError<R>> {
            let reply = (self.reply)(&command);
            if reply.is_ok() {
                if let Some(hook) = &self.hook {
                    hook(&command);
                }
            }
            self.sent.lock().unwrap_or_else(PoisonError::into_inner).push(command);
            reply
        }
    }

    impl<C, R> CommandBus for ScriptedCommandBus<C, R>
    where
        C: Clone + Send + 'static,
        R: std::error::Error + Send + Sync + 'static,
    {
        type Command = C;
        type Rejection = R;

        fn send_and_wait(&self, command: C, _timeout: Duration) -> DispatchFuture<'_, R> {
            let reply = self.handle(command);
            Box::pin(async move { reply })
        }

        fn send(&self, command: C) -> DispatchFuture<'_, R> {
            self.fire_and_forget.fetch_add(1, Ordering::SeqCst);
            let reply = self.handle(command);
            Box::pin(async move { reply })
        }
    }
}

/// Running effects outside a store.
pub mod effects {
    use futures::future::BoxFuture;
    use relay_core::effect::Effect;

    /// Execute `effects` to completion and collect every action they produce.
    ///
    /// Delays are honoured; parallel effects are awaited in order. Produced
    /// actions are not fed back into any reducer.
    pub async fn collect_actions<A, I>(effects: I) -> Vec<A>
    where
        A: Send + 'static,
        I: IntoIterator<Item = Effect<A>>,
    {
        let mut actions = Vec::new();
        for effect in effects {
            run(effect, &mut actions).await;
        }
        actions
    }

    fn run<A: Send + 'static>(effect: Effect<A>, actions: &mut Vec<A>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match effect {
                Effect::None => {},
                Effect::Future(fut) => actions.extend(fut.await),
                Effect::Delay { duration, action } => {
                    tokio::time::sleep(duration).await;
                    actions.push(*action);
                },
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    for effect in effects {
                        run(effect, actions).await;
                    }
                },
            }
        })
    }
}

/// Test helpers.
pub mod helpers {
    /// Install a `tracing` subscriber that writes through the test harness.
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

pub use mocks::{FixedClock, ScriptedCommandBus, test_clock};
