//! Store runtime for localtodo.
//!
//! [`Store`] owns the state behind a lock, runs the reducer for one action at
//! a time and then executes the effects it returned on the tokio runtime.
//! Actions produced by effects are sent back into the same store.
//!
//! Two counters track running effects:
//!
//! - per action, through the [`EffectHandle`] returned by [`Store::send`]
//! - per store, through [`Store::pending_effects`], which [`Store::settle`]
//!   and [`Store::shutdown`] poll
//!
//! ```ignore
//! use localtodo_runtime::Store;
//!
//! let store = Store::new(TodoState::new(), TodoReducer::new(), environment);
//! let mut handle = store.send(TodoAction::AddTodo { text }).await?;
//! handle.wait().await;
//!
//! let open = store.state(|s| s.todos.len()).await;
//! ```

use localtodo_core::{effect::Effect, reducer::Reducer};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, watch};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors returned by [`Store`](crate::Store)
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// `send()` was called after shutdown started
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Effects were still running when the deadline passed
        #[error("Timed out with {0} effects still running")]
        Timeout(usize),
    }
}

pub use error::StoreError;

/// Store tuning knobs
///
/// ```
/// use localtodo_runtime::StoreConfig;
/// use std::time::Duration;
///
/// let config = StoreConfig::default().with_shutdown_timeout(Duration::from_secs(1));
/// assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Deadline used by [`Store::shutdown`] when none is given
    pub shutdown_timeout: Duration,
    /// How often [`Store::settle`] re-reads the pending counter
    pub poll_interval: Duration,
}

impl StoreConfig {
    /// Replace the shutdown deadline
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Replace the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Waits for the effects started by a single [`Store::send`]
#[derive(Clone)]
pub struct EffectHandle {
    running: Arc<AtomicUsize>,
    drained: watch::Receiver<()>,
}

impl EffectHandle {
    /// A handle with nothing left to wait for
    #[must_use]
    pub fn completed() -> Self {
        let (handle, _tracker) = ActionEffects::start();
        handle
    }

    /// Number of effects from this action still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Resolves once every effect of the action has finished
    pub async fn wait(&mut self) {
        while self.pending() > 0 {
            // Err means every tracker is gone: nothing can still be running.
            if self.drained.changed().await.is_err() {
                break;
            }
        }
    }

    /// [`EffectHandle::wait`] bounded by `timeout`
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if effects are still running when `timeout` elapses.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), ()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ())
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Tracker side of an [`EffectHandle`]
#[derive(Clone)]
struct ActionEffects {
    running: Arc<AtomicUsize>,
    drained: Arc<watch::Sender<()>>,
}

impl ActionEffects {
    fn start() -> (EffectHandle, Self) {
        let running = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());
        let handle = EffectHandle {
            running: Arc::clone(&running),
            drained: rx,
        };
        let tracker = Self {
            running,
            drained: Arc::new(tx),
        };
        (handle, tracker)
    }

    /// Counts one more running effect until the returned guard drops
    fn enter(&self, store_wide: &Arc<AtomicUsize>) -> RunningEffect {
        self.running.fetch_add(1, Ordering::SeqCst);
        store_wide.fetch_add(1, Ordering::SeqCst);
        RunningEffect {
            action: self.clone(),
            store_wide: Arc::clone(store_wide),
        }
    }
}

/// Held by a spawned effect; dropping it (including on panic) releases both counters
struct RunningEffect {
    action: ActionEffects,
    store_wide: Arc<AtomicUsize>,
}

impl Drop for RunningEffect {
    fn drop(&mut self) {
        self.store_wide.fetch_sub(1, Ordering::SeqCst);
        if self.action.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.action.drained.send(());
        }
    }
}

/// The store and its effect executor.
pub mod store {
    use super::{
        ActionEffects, Arc, AtomicBool, AtomicUsize, Duration, Effect, EffectHandle, Future,
        Instant, Ordering, Reducer, RwLock, StoreConfig, StoreError,
    };

    /// Runs a [`Reducer`] against shared state
    ///
    /// Clones share state, the shutdown flag and the pending-effect counter.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        config: StoreConfig,
        closed: Arc<AtomicBool>,
        in_flight: Arc<AtomicUsize>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Store with the default [`StoreConfig`]
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Store with an explicit configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                config,
                closed: Arc::new(AtomicBool::new(false)),
                in_flight: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Dependencies handed to the reducer
        #[must_use]
        pub const fn environment(&self) -> &E {
            &self.environment
        }

        /// Configuration this store was built with
        #[must_use]
        pub const fn config(&self) -> &StoreConfig {
            &self.config
        }

        /// Effects still running across every action sent so far
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.in_flight.load(Ordering::Acquire)
        }

        /// Whether [`Store::shutdown`] has been called
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }

        /// Reduces `action`, then starts its effects
        ///
        /// The reducer has run when this returns; the effects may not have.
        /// Await the returned handle to wait for them.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] once shutdown has begun.
        #[tracing::instrument(skip_all, name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError>
        where
            R: Clone,
            E: Clone,
        {
            if self.is_shutting_down() {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }
            metrics::counter!("store.commands.total").increment(1);

            let effects = {
                let mut state = self.state.write().await;
                let started = Instant::now();
                let effects = self.reducer.reduce(&mut state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                effects
            };
            tracing::trace!(effects = effects.len(), "Action reduced");

            let (handle, tracker) = ActionEffects::start();
            for effect in effects {
                self.run(effect, &tracker);
            }
            Ok(handle)
        }

        /// Reads state through `f`
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            f(&*self.state.read().await)
        }

        /// Waits until no effect is running
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Timeout`] with the remaining count if effects
        /// are still running after `timeout`.
        pub async fn settle(&self, timeout: Duration) -> Result<(), StoreError> {
            let deadline = Instant::now() + timeout;
            loop {
                let pending = self.pending_effects();
                if pending == 0 {
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    return Err(StoreError::Timeout(pending));
                }
                tracing::debug!(pending, "Waiting for effects");
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }

        /// Refuses further actions, then settles
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Timeout`] if effects outlive `timeout`.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);
            self.closed.store(true, Ordering::Release);

            match self.settle(timeout).await {
                Ok(()) => {
                    tracing::info!("All effects completed");
                    Ok(())
                },
                Err(error) => {
                    tracing::error!(%error, "Shutdown deadline passed");
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    Err(error)
                },
            }
        }

        fn run(&self, effect: Effect<A>, tracker: &ActionEffects)
        where
            R: Clone,
            E: Clone,
        {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.run(effect, tracker);
                    }
                },
                Effect::Future(fut) => self.spawn(tracker, "future", fut),
                Effect::Delay { duration, action } => self.spawn(tracker, "delay", async move {
                    tokio::time::sleep(duration).await;
                    Some(*action)
                }),
                Effect::Sequential(effects) => {
                    let store = self.clone();
                    self.spawn(tracker, "sequential", async move {
                        for effect in effects {
                            let (mut step, step_tracker) = ActionEffects::start();
                            store.run(effect, &step_tracker);
                            drop(step_tracker);
                            step.wait().await;
                        }
                        None
                    });
                },
            }
        }

        /// Spawns `work`, counted on both trackers, and sends back any action it yields
        fn spawn<F>(&self, tracker: &ActionEffects, kind: &'static str, work: F)
        where
            F: Future<Output = Option<A>> + Send + 'static,
            R: Clone,
            E: Clone,
        {
            metrics::counter!("store.effects.executed", "type" => kind).increment(1);
            let running = tracker.enter(&self.in_flight);
            let store = self.clone();

            tokio::spawn(async move {
                let _running = running;
                if let Some(action) = work.await {
                    tracing::trace!(kind, "Effect produced an action");
                    if let Err(error) = store.send(action).await {
                        tracing::debug!(%error, "Dropped action produced by effect");
                    }
                }
            });
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                config: self.config.clone(),
                closed: Arc::clone(&self.closed),
                in_flight: Arc::clone(&self.in_flight),
            }
        }
    }
}

pub use store::Store;
