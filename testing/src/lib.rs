//! Test doubles and the reducer harness used across the workspace.
//!
//! The [`mocks`] stand in for the environment traits: clocks that never move
//! on their own and storage that fails on demand. [`ReducerTest`] drives a
//! reducer without a store.
//!
//! ```ignore
//! use localtodo_testing::{test_clock, ReducerTest};
//!
//! ReducerTest::new(TodoReducer::new())
//!     .with_env(test_environment())
//!     .given_state(TodoState::new())
//!     .when_action(TodoAction::AddTodo { text: "Buy milk".into() })
//!     .then_state(|state| assert_eq!(state.count(), 1))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use localtodo_core::environment::Clock;


/// Deterministic clocks and misbehaving storage.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use localtodo_core::environment::{Storage, StorageError};
    use std::sync::Mutex;

    /// Clock stopped at one instant
    ///
    /// ```
    /// use localtodo_core::environment::Clock;
    /// use localtodo_testing::mocks::FixedClock;
    ///
    /// let clock = FixedClock::new(chrono::Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Stops the clock at `time`
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

    /// Clock that only moves when told to
    ///
    /// Used to prove that a timestamp was NOT restamped by a later operation.
    ///
    /// ```
    /// use localtodo_testing::mocks::ManualClock;
    /// use localtodo_core::environment::Clock;
    /// use chrono::Duration;
    ///
    /// let clock = ManualClock::starting_at(localtodo_testing::test_clock().now());
    /// let before = clock.now();
    /// clock.advance(Duration::minutes(5));
    /// assert_eq!(clock.now() - before, Duration::minutes(5));
    /// ```
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `time`
        #[must_use]
        pub const fn starting_at(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            if let Ok(mut time) = self.time.lock() {
                *time += by;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
                .lock()
                .map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
        }
    }

    /// Which operations a [`FailingStorage`] rejects
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum FailureMode {
        /// Every call fails, as when storage is disabled
        Everything,
        /// Reads and listing work, every write reports a full quota
        Writes,
    }

    /// Storage backend that fails on demand
    ///
    /// Reads (when allowed) always come back empty.
    #[derive(Debug, Clone, Copy)]
    pub struct FailingStorage {
        mode: FailureMode,
    }

    impl FailingStorage {
        /// Storage that rejects every call
        #[must_use]
        pub const fn disabled() -> Self {
            Self {
                mode: FailureMode::Everything,
            }
        }

        /// Storage whose writes always exceed the quota
        #[must_use]
        pub const fn full() -> Self {
            Self {
                mode: FailureMode::Writes,
            }
        }

        fn refuse(&self) -> StorageError {
            StorageError::Unavailable(format!("storage failing on purpose ({:?})", self.mode))
        }
    }

    impl Storage for FailingStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            match self.mode {
                FailureMode::Everything => Err(self.refuse()),
                FailureMode::Writes => Ok(None),
            }
        }

        fn set(&self, key: &str, _value: &str) -> Result<(), StorageError> {
            match self.mode {
                FailureMode::Everything => Err(self.refuse()),
                FailureMode::Writes => Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                }),
            }
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            match self.mode {
                FailureMode::Everything => Err(self.refuse()),
                FailureMode::Writes => Ok(()),
            }
        }

        fn keys(&self) -> Result<Vec<String>, StorageError> {
            match self.mode {
                FailureMode::Everything => Err(self.refuse()),
                FailureMode::Writes => Ok(Vec::new()),
            }
        }
    }

    /// Midnight UTC on 2025-01-01
    const TEST_EPOCH_SECS: i64 = 1_735_689_600;

    /// The clock most tests share, stopped at midnight UTC on 2025-01-01
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(TEST_EPOCH_SECS, 0).unwrap_or_default())
    }
}

pub use mocks::{FailingStorage, FixedClock, ManualClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
