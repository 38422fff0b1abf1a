//! Building blocks shared by the localtodo crates.
//!
//! A [`Reducer`](reducer::Reducer) mutates state in response to an action and
//! returns [`Effect`](effect::Effect)s describing the I/O it wants done. The
//! runtime performs that I/O; the reducer itself only touches what the
//! [`environment`] traits give it (a clock and a key-value store), so it can
//! be driven synchronously in tests.
//!
//! ```
//!
//! use localtodo_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! #[derive(Clone, Debug, Default)]
//! struct CounterState {
//!     count: i64,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Increment,
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = CounterState;
//!     type Action = CounterAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CounterState,
//!         action: CounterAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<CounterAction>; 4]> {
//!         match action {
//!             CounterAction::Increment => state.count += 1,
//!         }
//!         smallvec![Effect::None]
//!     }
//! }
//!
//! let mut state = CounterState::default();
//! CounterReducer.reduce(&mut state, CounterAction::Increment, &());
//! assert_eq!(state.count, 1);
//! ```

pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

/// State transitions.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Applies actions to a state
    ///
    /// Implementations must not block or perform I/O directly; anything
    /// observable outside `state` goes into the returned effects.
    pub trait Reducer {
        /// What the reducer mutates
        type State;

        /// Closed set of inputs
        type Action;

        /// Dependencies the reducer may read from or capture into effects
        type Environment;

        /// Applies `action` to `state`
        ///
        /// An action that does not apply to the current state (an unknown id,
        /// for example) leaves `state` untouched and returns no effects.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Deferred work returned by reducers.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Work for the runtime to perform after a reduction
    ///
    /// Building an effect does nothing; the store decides when it runs. Any
    /// `Action` an effect yields is sent back through the reducer.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// Start all at once
        Parallel(Vec<Effect<Action>>),

        /// Start each one after the previous has finished
        Sequential(Vec<Effect<Action>>),

        /// Send `action` once `duration` has passed
        Delay {
            /// Wait before sending
            duration: Duration,
            /// Sent afterwards
            action: Box<Action>,
        },

        /// Async work that may yield a follow-up action
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    impl<Action: std::fmt::Debug> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::None => f.write_str("Effect::None"),
                Self::Parallel(all) => f.debug_tuple("Effect::Parallel").field(all).finish(),
                Self::Sequential(steps) => {
                    f.debug_tuple("Effect::Sequential").field(steps).finish()
                },
                Self::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Self::Future(_) => f.write_str("Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Shorthand for [`Effect::Parallel`]
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Shorthand for [`Effect::Sequential`]
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Wrap a fire-and-forget future that never feeds an action back
        #[must_use]
        pub fn fire_and_forget<F>(fut: F) -> Effect<Action>
        where
            F: Future<Output = ()> + Send + 'static,
        {
            Effect::Future(Box::pin(async move {
                fut.await;
                None
            }))
        }

        /// Returns true for `Effect::None` and for composites holding only no-ops
        #[must_use]
        pub fn is_noop(&self) -> bool {
            match self {
                Effect::None => true,
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    effects.iter().all(Effect::is_noop)
                },
                Effect::Delay { .. } | Effect::Future(_) => false,
            }
        }
    }
}

/// Side-effecting dependencies, as traits so tests can substitute them.
pub mod environment {
    use chrono::{DateTime, Utc};
    use thiserror::Error;

    /// Source of "now" for timestamps
    ///
    /// ```
    /// use localtodo_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Current instant in UTC
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Errors reported by a key-value storage backend
    #[derive(Error, Debug)]
    pub enum StorageError {
        /// The backend refused the operation (disabled, read-only, ...)
        #[error("Storage unavailable: {0}")]
        Unavailable(String),

        /// The backend is full
        #[error("Storage quota exceeded while writing key {key}")]
        QuotaExceeded {
            /// Key being written
            key: String,
        },

        /// Underlying I/O failure
        #[error("Storage I/O error: {0}")]
        Io(#[from] std::io::Error),

        /// The backing document could not be read or written as JSON
        #[error("Storage document is corrupted: {0}")]
        Corrupted(String),
    }

    /// Synchronous string key-value storage, shaped after browser local storage
    ///
    /// Implementations must be cheap to call from inside effects; every method
    /// is fallible so callers can degrade instead of crashing.
    pub trait Storage: Send + Sync {
        /// Read the value stored under `key`
        ///
        /// # Errors
        ///
        /// Returns a [`StorageError`] if the backend cannot be read.
        fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

        /// Store `value` under `key`, replacing any previous value
        ///
        /// # Errors
        ///
        /// Returns a [`StorageError`] if the backend rejects the write.
        fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

        /// Remove `key`; removing an absent key is not an error
        ///
        /// # Errors
        ///
        /// Returns a [`StorageError`] if the backend rejects the removal.
        fn remove(&self, key: &str) -> Result<(), StorageError>;

        /// List every key currently stored
        ///
        /// # Errors
        ///
        /// Returns a [`StorageError`] if the backend cannot be enumerated.
        fn keys(&self) -> Result<Vec<String>, StorageError>;
    }
}
