//! The loader registry and its single-flight load path.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{BoxError, LoaderError, LoaderResult};
use crate::key::{LoadState, LoaderKey};

/// Future returned by a registered loader function.
pub type LoadFuture<V> = Pin<Box<dyn Future<Output = Result<V, BoxError>> + Send>>;

type LoaderFn<V> = Arc<dyn Fn() -> LoadFuture<V> + Send + Sync>;

type Outcome<V> = Option<LoaderResult<V>>;

enum Slot<V> {
    NotLoaded,
    /// A load is running; waiters subscribe to its outcome.
    Loading(watch::Receiver<Outcome<V>>),
    Loaded(V),
}

impl<V> Slot<V> {
    fn state(&self) -> LoadState {
        match self {
            Self::NotLoaded => LoadState::NotLoaded,
            Self::Loading(_) => LoadState::Loading,
            Self::Loaded(_) => LoadState::Loaded,
        }
    }
}

struct Registration<V> {
    loader: LoaderFn<V>,
    dependencies: Vec<LoaderKey>,
    slot: Slot<V>,
    /// Bumped on every reset; a load only settles into its own generation.
    generation: u64,
}

struct Registry<V> {
    entries: HashMap<LoaderKey, Registration<V>>,
    /// Reverse-dependency index: dependency -> keys that declare it.
    dependents: HashMap<LoaderKey, BTreeSet<LoaderKey>>,
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            dependents: HashMap::new(),
        }
    }
}

impl<V> Registry<V> {
    fn reset(&mut self, key: &LoaderKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.generation += 1;
                entry.slot = Slot::NotLoaded;
                true
            }
            None => false,
        }
    }

    /// Depth-first search over declared dependencies starting at `start`.
    fn check_acyclic(&self, start: &LoaderKey) -> LoaderResult<()> {
        let mut path = Vec::new();
        let mut done = HashSet::new();
        self.visit(start, start, &mut path, &mut done)
    }

    fn visit(
        &self,
        start: &LoaderKey,
        key: &LoaderKey,
        path: &mut Vec<LoaderKey>,
        done: &mut HashSet<LoaderKey>,
    ) -> LoaderResult<()> {
        if done.contains(key) {
            return Ok(());
        }
        if let Some(pos) = path.iter().position(|k| k == key) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(key.clone());
            return Err(LoaderError::CyclicDependency {
                key: start.clone(),
                cycle,
            });
        }
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| LoaderError::UnknownLoader(key.clone()))?;

        path.push(key.clone());
        for dep in &entry.dependencies {
            self.visit(start, dep, path, done)?;
        }
        path.pop();
        done.insert(key.clone());
        Ok(())
    }
}

/// What a caller of `load` has to do once the registry lock is released.
enum Step<V> {
    Ready(V),
    Wait(watch::Receiver<Outcome<V>>),
    Run {
        loader: LoaderFn<V>,
        dependencies: Vec<LoaderKey>,
        generation: u64,
        done: watch::Sender<Outcome<V>>,
    },
}

/// Registry of lazily-run, dependency-ordered loader functions.
///
/// Each instance is independent; nothing is process-global. The registry
/// lock is never held across an `.await`.
pub struct LazyLoader<V> {
    registry: Mutex<Registry<V>>,
}

impl<V> Default for LazyLoader<V> {
    fn default() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
        }
    }
}

impl<V> LazyLoader<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader with no dependencies.
    ///
    /// Returns `true` if an existing registration was replaced.
    pub fn register<F, Fut, E>(&self, key: impl Into<LoaderKey>, loader: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.register_with_dependencies(key, Vec::<LoaderKey>::new(), loader)
    }

    /// Register a loader that requires `dependencies` to be loaded first.
    ///
    /// Dependencies need not be registered yet; an unregistered dependency
    /// only fails at load time. Replacing a registration resets the key and
    /// everything depending on it. Returns `true` if a registration was
    /// replaced.
    pub fn register_with_dependencies<F, Fut, E, I, D>(
        &self,
        key: impl Into<LoaderKey>,
        dependencies: I,
        loader: F,
    ) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<BoxError>,
        I: IntoIterator<Item = D>,
        D: Into<LoaderKey>,
    {
        let key = key.into();
        let mut deps: Vec<LoaderKey> = Vec::new();
        for dep in dependencies {
            let dep = dep.into();
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }

        let loader: LoaderFn<V> = Arc::new(move || {
            let fut = loader();
            Box::pin(async move { fut.await.map_err(Into::into) }) as LoadFuture<V>
        });

        let replaced = {
            let mut reg = self.lock();
            let previous = reg.entries.remove(&key);
            if let Some(old) = &previous {
                for dep in &old.dependencies {
                    if let Some(set) = reg.dependents.get_mut(dep) {
                        set.remove(&key);
                        if set.is_empty() {
                            reg.dependents.remove(dep);
                        }
                    }
                }
            }
            for dep in &deps {
                reg.dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(key.clone());
            }

            debug!(key = %key, dependencies = deps.len(), "registered loader");
            let replaced = previous.is_some();
            reg.entries.insert(
                key.clone(),
                Registration {
                    loader,
                    dependencies: deps,
                    slot: Slot::NotLoaded,
                    generation: previous.map_or(0, |old| old.generation + 1),
                },
            );
            replaced
        };

        if replaced {
            self.invalidate(&key);
        }
        replaced
    }

    /// Load `key` (and its dependencies) if it is not loaded yet, returning
    /// its value.
    ///
    /// Idempotent after success. While another caller is loading the same
    /// key this call waits for that load and shares its outcome. A failure
    /// leaves the key `NotLoaded`; the next call tries again.
    pub async fn ensure_loaded(&self, key: &LoaderKey) -> LoaderResult<V> {
        self.check_acyclic(key)?;
        self.load(key, Vec::new()).await
    }

    fn check_acyclic(&self, key: &LoaderKey) -> LoaderResult<()> {
        let mut reg = self.lock();
        match reg.check_acyclic(key) {
            Err(LoaderError::CyclicDependency { key, cycle }) => {
                for participant in &cycle {
                    let loading = reg
                        .entries
                        .get(participant)
                        .is_some_and(|entry| matches!(entry.slot, Slot::Loading(_)));
                    if !loading {
                        reg.reset(participant);
                    }
                }
                warn!(key = %key, cycle = ?cycle, "cyclic loader dependency");
                Err(LoaderError::CyclicDependency { key, cycle })
            }
            other => other,
        }
    }

    fn load<'a>(
        &'a self,
        key: &'a LoaderKey,
        path: Vec<LoaderKey>,
    ) -> Pin<Box<dyn Future<Output = LoaderResult<V>> + Send + 'a>> {
        Box::pin(async move {
            let step = {
                let mut reg = self.lock();
                let entry = reg
                    .entries
                    .get_mut(key)
                    .ok_or_else(|| LoaderError::UnknownLoader(key.clone()))?;
                match &entry.slot {
                    Slot::Loaded(value) => Step::Ready(value.clone()),
                    Slot::Loading(rx) => Step::Wait(rx.clone()),
                    Slot::NotLoaded => {
                        let (tx, rx) = watch::channel(None);
                        entry.slot = Slot::Loading(rx);
                        debug!(key = %key, "loading");
                        Step::Run {
                            loader: Arc::clone(&entry.loader),
                            dependencies: entry.dependencies.clone(),
                            generation: entry.generation,
                            done: tx,
                        }
                    }
                }
            };

            match step {
                Step::Ready(value) => Ok(value),
                Step::Wait(rx) => wait_for_outcome(key, rx).await,
                Step::Run {
                    loader,
                    dependencies,
                    generation,
                    done,
                } => {
                    let mut guard = InFlight {
                        owner: self,
                        key,
                        generation,
                        settled: false,
                    };
                    let outcome = self.run(key, path, loader, dependencies).await;
                    self.settle(key, generation, &outcome);
                    guard.settled = true;
                    // Waiters may all have gone away; nothing to do then.
                    let _ = done.send(Some(outcome.clone()));
                    outcome
                }
            }
        })
    }

    async fn run(
        &self,
        key: &LoaderKey,
        mut path: Vec<LoaderKey>,
        loader: LoaderFn<V>,
        dependencies: Vec<LoaderKey>,
    ) -> LoaderResult<V> {
        path.push(key.clone());
        for dep in &dependencies {
            if let Some(pos) = path.iter().position(|k| k == dep) {
                let mut cycle = path[pos..].to_vec();
                cycle.push(dep.clone());
                return Err(LoaderError::CyclicDependency {
                    key: key.clone(),
                    cycle,
                });
            }
            self.load(dep, path.clone()).await?;
        }

        loader().await.map_err(|cause| LoaderError::LoaderFailure {
            key: key.clone(),
            source: Arc::from(cause),
        })
    }

    /// Record the outcome of a load, unless the key was reset meanwhile.
    fn settle(&self, key: &LoaderKey, generation: u64, outcome: &LoaderResult<V>) {
        let mut reg = self.lock();
        let Some(entry) = reg.entries.get_mut(key) else {
            return;
        };
        if entry.generation != generation {
            debug!(key = %key, "load finished after invalidation; result not kept");
            return;
        }
        match outcome {
            Ok(value) => {
                entry.slot = Slot::Loaded(value.clone());
                debug!(key = %key, "loaded");
            }
            Err(err) => {
                entry.slot = Slot::NotLoaded;
                warn!(key = %key, error = %err, "load failed");
            }
        }
    }

    /// Put a key whose load was dropped mid-flight back to `NotLoaded`.
    fn abandon(&self, key: &LoaderKey, generation: u64) {
        // Avoid a double panic if we are unwinding with the lock poisoned.
        let Ok(mut reg) = self.registry.lock() else {
            return;
        };
        if let Some(entry) = reg.entries.get_mut(key) {
            if entry.generation == generation && matches!(entry.slot, Slot::Loading(_)) {
                entry.slot = Slot::NotLoaded;
                warn!(key = %key, "load abandoned");
            }
        }
    }

    /// Reset `key` and every key that transitively depends on it.
    ///
    /// Returns the keys that were reset, `key` first. Unknown keys reset
    /// nothing.
    pub fn invalidate(&self, key: &LoaderKey) -> Vec<LoaderKey> {
        let mut reg = self.lock();
        if !reg.entries.contains_key(key) {
            return Vec::new();
        }

        let mut visited = HashSet::new();
        let mut reset = Vec::new();
        let mut queue = VecDeque::from([key.clone()]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if reg.reset(&current) {
                reset.push(current.clone());
            }
            if let Some(dependents) = reg.dependents.get(&current) {
                queue.extend(dependents.iter().cloned());
            }
        }

        debug!(key = %key, reset = reset.len(), "invalidated loader");
        reset
    }

    /// Reset every registration. Returns how many keys were registered.
    pub fn invalidate_all(&self) -> usize {
        let mut reg = self.lock();
        let keys: Vec<LoaderKey> = reg.entries.keys().cloned().collect();
        for key in &keys {
            reg.reset(key);
        }
        keys.len()
    }

    /// Current state of `key`, or `None` if it is not registered.
    pub fn state(&self, key: &LoaderKey) -> Option<LoadState> {
        self.lock().entries.get(key).map(|entry| entry.slot.state())
    }

    pub fn is_loaded(&self, key: &LoaderKey) -> bool {
        self.state(key) == Some(LoadState::Loaded)
    }

    /// The loaded value of `key`, without triggering a load.
    pub fn value(&self, key: &LoaderKey) -> Option<V> {
        match &self.lock().entries.get(key)?.slot {
            Slot::Loaded(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Declared dependencies of `key`, in declaration order.
    pub fn dependencies_of(&self, key: &LoaderKey) -> Option<Vec<LoaderKey>> {
        self.lock()
            .entries
            .get(key)
            .map(|entry| entry.dependencies.clone())
    }

    /// Keys that declare `key` as a direct dependency, sorted.
    pub fn dependents_of(&self, key: &LoaderKey) -> Vec<LoaderKey> {
        self.lock()
            .dependents
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All registered keys, sorted.
    pub fn keys(&self) -> Vec<LoaderKey> {
        let mut keys: Vec<LoaderKey> = self.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Registry<V>> {
        self.registry.lock().expect("loader registry lock poisoned")
    }
}

impl<V> std::fmt::Debug for LazyLoader<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .registry
            .lock()
            .map(|reg| reg.entries.len())
            .unwrap_or_default();
        f.debug_struct("LazyLoader")
            .field("registrations", &count)
            .finish()
    }
}

/// Resets the slot if the loading future is dropped before it settles.
struct InFlight<'a, V>
where
    V: Clone + Send + Sync + 'static,
{
    owner: &'a LazyLoader<V>,
    key: &'a LoaderKey,
    generation: u64,
    settled: bool,
}

impl<V> Drop for InFlight<'_, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.settled {
            self.owner.abandon(self.key, self.generation);
        }
    }
}

async fn wait_for_outcome<V: Clone>(
    key: &LoaderKey,
    mut rx: watch::Receiver<Outcome<V>>,
) -> LoaderResult<V> {
    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(outcome) = current {
            return outcome;
        }
        if rx.changed().await.is_err() {
            let last = rx.borrow().clone();
            return last.unwrap_or_else(|| Err(LoaderError::Abandoned { key: key.clone() }));
        }
    }
}
