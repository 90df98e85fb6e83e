//! GameStateAggregator - folds journal events into the game state
//!
//! Owns the single [`GameState`] instance. Every event is applied under one
//! lock by running the mutations registered for its type; afterwards the root
//! changed flag is read and cleared. Subscribers only ever see clones.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, error, info, warn};

use super::entities::{GameState, Trackable};
use super::mutations::MutationRegistry;
use crate::bus::BusError;
use crate::journal::{Event, JournalReader};
use crate::signals::AppSignals;

pub struct GameStateAggregator {
    state: Mutex<GameState>,
    mutations: MutationRegistry,
    signals: AppSignals,
    reader: Arc<JournalReader>,
    bootstrapped: AtomicBool,
    initialized: AtomicBool,
}

impl GameStateAggregator {
    /// Create an aggregator with a fresh state
    ///
    /// The registry should be complete; it is not modified afterwards.
    pub fn new(mutations: MutationRegistry, signals: AppSignals, reader: Arc<JournalReader>) -> Arc<Self> {
        debug!(routes = mutations.keys().len(), "GameStateAggregator::new: called");
        Arc::new(Self {
            state: Mutex::new(GameState::new()),
            mutations,
            signals,
            reader,
            bootstrapped: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
        })
    }

    /// Subscribe to journal events and to startup completion
    pub fn attach(self: &Arc<Self>) {
        debug!("GameStateAggregator::attach: called");

        let this: Weak<Self> = Arc::downgrade(self);
        self.signals.journal_event.subscribe("game state", move |event: Event| {
            if let Some(aggregator) = this.upgrade() {
                aggregator.on_event(&event)?;
            }
            Ok(())
        });

        let this: Weak<Self> = Arc::downgrade(self);
        self.signals.init_complete.subscribe("game state bootstrap", move |()| {
            if let Some(aggregator) = this.upgrade() {
                aggregator.bootstrap();
            }
            Ok(())
        });
    }

    /// Apply `event`, returning whether the state changed
    pub fn apply(&self, event: &Event) -> bool {
        let mut state = self.lock();
        self.apply_locked(&mut state, event)
    }

    fn apply_locked(&self, state: &mut MutexGuard<'_, GameState>, event: &Event) -> bool {
        let applied = self.mutations.invoke_all(event.name(), |mutation| {
            let result = mutation(event, &mut **state);
            if let Err(e) = &result {
                error!(event = %event.name(), error = %e, "Failed to apply mutation");
                debug!(raw = %event.raw(), "Failed mutation event");
                debug!(state = ?**state, "Failed mutation state");
            }
            result
        });

        let changed = state.is_changed();
        state.reset_changed();
        debug!(event = %event.name(), mutations = applied.len(), changed, "apply: done");
        changed
    }

    /// Apply a live event and publish a snapshot if anything changed
    ///
    /// Nothing is published until the startup replay has announced the
    /// initial state.
    pub fn on_event(&self, event: &Event) -> Result<bool, BusError> {
        let mut state = self.lock();
        if !self.apply_locked(&mut state, event) {
            return Ok(false);
        }

        // Enqueued under the lock so snapshots are queued in apply order
        if self.initialized.load(Ordering::SeqCst) {
            self.signals.state_changed.publish_async(state.clone())?;
        } else {
            debug!(event = %event.name(), "State changed before initialization, not publishing");
        }
        Ok(true)
    }

    /// Replay the latest journal and announce the initial state
    ///
    /// Runs once; later calls are ignored. The initial state is published
    /// synchronously so its subscribers have run before this returns. If live
    /// events changed the state meanwhile, the result follows on the state
    /// changed signal.
    pub fn bootstrap(&self) {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            warn!("GameStateAggregator::bootstrap: already bootstrapped, ignoring");
            return;
        }

        let events = self.reader.cached_latest_events();
        info!(events = events.len(), "Replaying latest journal");

        let snapshot = {
            let mut state = self.lock();
            for event in events.iter() {
                self.apply_locked(&mut state, event);
            }
            state.clone()
        };
        debug!(state = ?snapshot, "Initial state");

        self.signals.state_initialized.publish_sync(snapshot.clone());

        // Live events applied while the initial state was being delivered
        // were not published; catch up with one snapshot
        let state = self.lock();
        self.initialized.store(true, Ordering::SeqCst);
        if *state != snapshot {
            info!("State changed during initialization, publishing current state");
            if let Err(e) = self.signals.state_changed.publish_async(state.clone()) {
                warn!(error = %e, "Failed to publish state");
            }
        }
    }

    /// True once the initial state has been published
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// A copy of the current state
    pub fn snapshot(&self) -> GameState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, GameState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use crate::journal::parse_line;
    use crate::state::entities::MaterialCategory;
    use crate::state::error::MutationError;
    use crate::state::mutations::{default_registry, mutation};
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn event(line: &str) -> Event {
        parse_line(line).unwrap()
    }

    fn aggregator_with(registry: MutationRegistry, dir: &std::path::Path) -> (Arc<GameStateAggregator>, AppSignals, Bus) {
        let (bus, dispatcher) = Bus::new();
        dispatcher.spawn();
        let signals = AppSignals::new(&bus);
        let aggregator = GameStateAggregator::new(registry, signals.clone(), Arc::new(JournalReader::new(dir)));
        (aggregator, signals, bus)
    }

    fn collect(signal: &crate::bus::Signal<GameState>) -> Arc<Mutex<Vec<GameState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        signal.subscribe("collector", move |state: GameState| {
            sink.lock().unwrap().push(state);
            Ok(())
        });
        seen
    }

    #[tokio::test]
    async fn test_commander_event_changes_state() {
        let temp = TempDir::new().unwrap();
        let (aggregator, _signals, _bus) = aggregator_with(default_registry(), temp.path());

        let changed = aggregator.apply(&event(
            r#"{"timestamp":"2018-06-07T08:09:10Z","event":"Commander","Name":"X","FID":"F1"}"#,
        ));
        assert!(changed);

        let state = aggregator.snapshot();
        assert_eq!(state.commander.name.as_deref(), Some("X"));
        assert_eq!(state.commander.frontier_id.as_deref(), Some("F1"));
    }

    #[tokio::test]
    async fn test_materials_accumulate_and_clamp() {
        let temp = TempDir::new().unwrap();
        let (aggregator, _signals, _bus) = aggregator_with(default_registry(), temp.path());

        for count in [3, 2] {
            aggregator.apply(&event(&format!(
                r#"{{"timestamp":"2018-06-07T08:09:10Z","event":"MaterialCollected","Category":"Raw","Name":"Iron","Count":{}}}"#,
                count
            )));
        }
        assert_eq!(aggregator.snapshot().materials.count(MaterialCategory::Raw, "Iron"), 5);

        aggregator.apply(&event(
            r#"{"timestamp":"2018-06-07T08:09:11Z","event":"MaterialDiscarded","Category":"Raw","Name":"Iron","Count":10}"#,
        ));
        assert_eq!(aggregator.snapshot().materials.count(MaterialCategory::Raw, "Iron"), 0);
    }

    #[tokio::test]
    async fn test_unknown_event_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let (aggregator, _signals, _bus) = aggregator_with(default_registry(), temp.path());
        let before = aggregator.snapshot();

        assert!(!aggregator.apply(&event(r#"{"timestamp":"2018-06-07T08:09:10Z","event":"Music"}"#)));
        assert_eq!(aggregator.snapshot(), before);
    }

    #[tokio::test]
    async fn test_same_value_twice_reports_no_change() {
        let temp = TempDir::new().unwrap();
        let (aggregator, _signals, _bus) = aggregator_with(default_registry(), temp.path());
        let commander = event(r#"{"timestamp":"2018-06-07T08:09:10Z","event":"Commander","Name":"X"}"#);

        assert!(aggregator.apply(&commander));
        assert!(!aggregator.apply(&commander));
    }

    #[tokio::test]
    async fn test_failing_mutation_does_not_stop_others() {
        let temp = TempDir::new().unwrap();
        let mut registry = MutationRegistry::new();
        registry.register(
            "Commander",
            mutation(|_, _| Err(MutationError::Failed("broken handler".to_string()))),
        );
        registry.register("Commander", mutation(|_, _| panic!("panicking handler")));
        registry.register(
            "Commander",
            mutation(|event, state| {
                state.commander.name.update(event.get_or_noop("Name"))?;
                Ok(())
            }),
        );
        let (aggregator, _signals, _bus) = aggregator_with(registry, temp.path());

        assert!(aggregator.apply(&event(
            r#"{"timestamp":"2018-06-07T08:09:10Z","event":"Commander","Name":"X"}"#
        )));
        assert_eq!(aggregator.snapshot().commander.name.as_deref(), Some("X"));
    }

    #[tokio::test]
    async fn test_mutations_run_in_registration_order() {
        let temp = TempDir::new().unwrap();
        let mut registry = MutationRegistry::new();
        registry.register("Test", mutation(|_, state| {
            state.credits.set(1);
            Ok(())
        }));
        registry.register("Test", mutation(|_, state| {
            let doubled = *state.credits * 10;
            state.credits.set(doubled);
            Ok(())
        }));
        let (aggregator, _signals, _bus) = aggregator_with(registry, temp.path());

        aggregator.apply(&event(r#"{"timestamp":"2018-06-07T08:09:10Z","event":"Test"}"#));
        assert_eq!(*aggregator.snapshot().credits, 10);
    }

    #[tokio::test]
    async fn test_bootstrap_replays_and_publishes_once() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("Journal.1.log"),
            concat!(
                r#"{"timestamp":"2018-06-07T08:09:10Z","event":"Fileheader","gameversion":"3.1.4","build":"r1"}"#,
                "\n",
                r#"{"timestamp":"2018-06-07T08:09:11Z","event":"Commander","Name":"X","FID":"F1"}"#,
                "\n",
            ),
        )
        .unwrap();

        let (aggregator, signals, bus) = aggregator_with(default_registry(), temp.path());
        aggregator.attach();
        let initialized = collect(&signals.state_initialized);
        let changed = collect(&signals.state_changed);

        signals.init_complete.publish_sync(());
        assert!(aggregator.is_initialized());
        {
            let initialized = initialized.lock().unwrap();
            assert_eq!(initialized.len(), 1);
            assert_eq!(initialized[0].commander.name.as_deref(), Some("X"));
            assert!(*initialized[0].running);
        }

        aggregator.bootstrap();
        bus.flush().await.unwrap();
        assert_eq!(initialized.lock().unwrap().len(), 1);
        assert!(changed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_events_publish_after_initialization() {
        let temp = TempDir::new().unwrap();
        let (aggregator, signals, bus) = aggregator_with(default_registry(), temp.path());
        aggregator.attach();
        let changed = collect(&signals.state_changed);

        signals
            .journal_event
            .publish_async(event(r#"{"timestamp":"2018-06-07T08:09:10Z","event":"Commander","Name":"Early"}"#))
            .unwrap();
        bus.flush().await.unwrap();
        assert!(changed.lock().unwrap().is_empty());
        assert_eq!(aggregator.snapshot().commander.name.as_deref(), Some("Early"));

        signals.init_complete.publish_sync(());
        signals
            .journal_event
            .publish_async(event(r#"{"timestamp":"2018-06-07T08:09:11Z","event":"Commander","Name":"Late"}"#))
            .unwrap();
        signals
            .journal_event
            .publish_async(event(r#"{"timestamp":"2018-06-07T08:09:12Z","event":"Music"}"#))
            .unwrap();
        bus.flush().await.unwrap();

        let changed = changed.lock().unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].commander.name.as_deref(), Some("Late"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_change_during_initialization_is_published() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("Journal.1.log"),
            concat!(r#"{"timestamp":"2018-06-07T08:09:10Z","event":"Commander","Name":"Boot"}"#, "\n"),
        )
        .unwrap();

        let (aggregator, signals, bus) = aggregator_with(default_registry(), temp.path());
        aggregator.attach();
        let initialized = collect(&signals.state_initialized);
        let changed = collect(&signals.state_changed);

        // A live event lands while the initial state is being delivered
        let journal_event = signals.journal_event.clone();
        let weak = Arc::downgrade(&aggregator);
        signals.state_initialized.subscribe("live writer", move |_| {
            journal_event
                .publish_async(event(r#"{"timestamp":"2018-06-07T08:09:11Z","event":"Commander","Name":"Live"}"#))?;
            let deadline = Instant::now() + Duration::from_secs(5);
            while let Some(aggregator) = weak.upgrade() {
                let applied = aggregator.snapshot().commander.name.as_deref() == Some("Live");
                if applied || Instant::now() > deadline {
                    break;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        });

        signals.init_complete.publish_sync(());
        bus.flush().await.unwrap();

        assert_eq!(initialized.lock().unwrap()[0].commander.name.as_deref(), Some("Boot"));
        let current = aggregator.snapshot();
        assert_eq!(current.commander.name.as_deref(), Some("Live"));
        let changed = changed.lock().unwrap();
        assert_eq!(changed.last(), Some(&current));
    }

    #[test]
    fn test_concurrent_applies_never_interleave() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 200;

        let temp = TempDir::new().unwrap();
        let torn = Arc::new(AtomicUsize::new(0));
        let mut registry = MutationRegistry::new();
        registry.register("Tick", mutation(|_, state| {
            let next = *state.credits + 1;
            state.credits.set(next);
            state.commander.name.set(Some(next.to_string()));
            Ok(())
        }));
        let seen_torn = torn.clone();
        registry.register("Tick", mutation(move |_, state| {
            if state.commander.name.as_deref() != Some(state.credits.to_string().as_str()) {
                seen_torn.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }));

        let (bus, _dispatcher) = Bus::new();
        let aggregator = GameStateAggregator::new(
            registry,
            AppSignals::new(&bus),
            Arc::new(JournalReader::new(temp.path())),
        );
        let tick = event(r#"{"timestamp":"2018-06-07T08:09:10Z","event":"Tick"}"#);

        std::thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    for _ in 0..ROUNDS {
                        assert!(aggregator.apply(&tick));
                    }
                });
            }
        });

        assert_eq!(torn.load(Ordering::SeqCst), 0);
        let state = aggregator.snapshot();
        assert_eq!(*state.credits, (THREADS * ROUNDS) as i64);
        assert_eq!(state.commander.name.as_deref(), Some((THREADS * ROUNDS).to_string().as_str()));
    }

    #[tokio::test]
    async fn test_snapshot_is_detached_copy() {
        let temp = TempDir::new().unwrap();
        let (aggregator, _signals, _bus) = aggregator_with(default_registry(), temp.path());
        let mut copy = aggregator.snapshot();
        copy.credits.set(99);
        assert_eq!(*aggregator.snapshot().credits, 0);
    }
}
