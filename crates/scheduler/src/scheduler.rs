use crate::conversion::{ConversionOutcome, ConversionPipeline, Liveness};
use crate::error::{GenerationError, Result};
use crate::machine::{GenerationMachine, Phase, TimerDecision};
use log::{debug, error, info, warn};
use serde::Serialize;
use shadow_protocol::{ShadowLayout, ShadowPair, SyncOutcome, SyncUpdate};
use std::collections::HashMap;
use std::future::pending;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub debounce: Duration,
    /// Re-read the shadow file on this interval in addition to explicit change events.
    pub poll_interval: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1500),
            poll_interval: None,
        }
    }
}

/// Point-in-time view of one watched shadow file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSnapshot {
    pub phase: Phase,
    pub in_flight: bool,
    pub last_checkpoint: String,
}

enum FileCommand {
    Changed,
    Stop,
}

struct FileHandle {
    command_tx: mpsc::UnboundedSender<FileCommand>,
    alive_tx: watch::Sender<bool>,
    snapshot_rx: watch::Receiver<FileSnapshot>,
    task: JoinHandle<()>,
}

impl FileHandle {
    fn stop(self) -> JoinHandle<()> {
        self.alive_tx.send_replace(false);
        let _ = self.command_tx.send(FileCommand::Stop);
        self.task
    }
}

/// Registry of watched shadow files, one conversion loop per file.
///
/// Cheap to clone. Dropping the last clone stops every loop.
#[derive(Clone)]
pub struct GenerationScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    pipeline: Arc<ConversionPipeline>,
    layout: ShadowLayout,
    config: SchedulerConfig,
    files: Mutex<HashMap<String, FileHandle>>,
    update_tx: broadcast::Sender<SyncUpdate>,
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        if let Ok(files) = self.files.get_mut() {
            for (_, handle) in files.drain() {
                drop(handle.stop());
            }
        }
    }
}

impl GenerationScheduler {
    pub fn new(pipeline: ConversionPipeline, layout: ShadowLayout, config: SchedulerConfig) -> Self {
        let (update_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(SchedulerInner {
                pipeline: Arc::new(pipeline),
                layout,
                config,
                files: Mutex::new(HashMap::new()),
                update_tx,
            }),
        }
    }

    #[must_use]
    pub fn layout(&self) -> &ShadowLayout {
        &self.inner.layout
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<ConversionPipeline> {
        &self.inner.pipeline
    }

    /// Starts a conversion loop for `shadow`. Returns `false` if one already runs.
    pub async fn watch(&self, shadow: &Path) -> Result<bool> {
        let pair = self.pair(shadow)?;
        let shadow_id = pair.shadow_id();
        if self.is_watching(shadow) {
            return Ok(false);
        }

        let last_checkpoint = self
            .inner
            .pipeline
            .checkpoints()
            .get(&shadow_id)
            .await?
            .unwrap_or_default();

        let mut files = self.lock_files()?;
        if files.contains_key(&shadow_id) {
            return Ok(false);
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (alive_tx, alive_rx) = watch::channel(true);
        let (snapshot_tx, snapshot_rx) = watch::channel(FileSnapshot {
            phase: Phase::Idle,
            in_flight: false,
            last_checkpoint: last_checkpoint.clone(),
        });

        let task = spawn_file_loop(FileLoop {
            pipeline: self.inner.pipeline.clone(),
            pair,
            config: self.inner.config,
            last_checkpoint,
            command_rx,
            alive_rx,
            snapshot_tx,
            update_tx: self.inner.update_tx.clone(),
        });

        info!("Watching {shadow_id}");
        files.insert(
            shadow_id,
            FileHandle {
                command_tx,
                alive_tx,
                snapshot_rx,
                task,
            },
        );
        Ok(true)
    }

    /// Records a pseudocode change. Returns `false` if the file is not watched.
    pub fn notify_change(&self, shadow: &Path) -> bool {
        let Some(shadow_id) = self.id_for(shadow) else {
            return false;
        };
        let Ok(files) = self.lock_files() else {
            return false;
        };
        files
            .get(&shadow_id)
            .is_some_and(|handle| handle.command_tx.send(FileCommand::Changed).is_ok())
    }

    /// Unwatches `shadow`. Its timer is cancelled and its entry removed before this
    /// returns; an in-flight conversion runs on but its output is discarded.
    ///
    /// The returned handle resolves once the loop has exited.
    pub fn stop(&self, shadow: &Path) -> Option<JoinHandle<()>> {
        let shadow_id = self.id_for(shadow)?;
        let handle = self.lock_files().ok()?.remove(&shadow_id)?;
        info!("Stopped watching {shadow_id}");
        Some(handle.stop())
    }

    /// Stops every loop and waits for all of them to exit.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = match self.lock_files() {
            Ok(mut files) => files.drain().map(|(_, handle)| handle.stop()).collect(),
            Err(err) => {
                error!("{err}");
                return;
            }
        };
        for task in handles {
            if let Err(err) = task.await {
                warn!("Shadow file loop ended abnormally: {err}");
            }
        }
    }

    #[must_use]
    pub fn is_watching(&self, shadow: &Path) -> bool {
        let Some(shadow_id) = self.id_for(shadow) else {
            return false;
        };
        self.lock_files()
            .map(|files| files.contains_key(&shadow_id))
            .unwrap_or(false)
    }

    #[must_use]
    pub fn watched(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .lock_files()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn snapshot(&self, shadow: &Path) -> Option<FileSnapshot> {
        let shadow_id = self.id_for(shadow)?;
        let files = self.lock_files().ok()?;
        files
            .get(&shadow_id)
            .map(|handle| handle.snapshot_rx.borrow().clone())
    }

    #[must_use]
    pub fn subscribe_updates(&self) -> broadcast::Receiver<SyncUpdate> {
        self.inner.update_tx.subscribe()
    }

    fn pair(&self, shadow: &Path) -> Result<ShadowPair> {
        self.inner
            .layout
            .pair(shadow)
            .map_err(|err| GenerationError::Target(err.to_string()))
    }

    fn id_for(&self, shadow: &Path) -> Option<String> {
        self.inner
            .layout
            .pair(shadow)
            .ok()
            .map(|pair| pair.shadow_id())
    }

    fn lock_files(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, FileHandle>>> {
        self.inner
            .files
            .lock()
            .map_err(|_| GenerationError::Target("scheduler registry lock poisoned".to_string()))
    }
}

struct FileLoop {
    pipeline: Arc<ConversionPipeline>,
    pair: ShadowPair,
    config: SchedulerConfig,
    last_checkpoint: String,
    command_rx: mpsc::UnboundedReceiver<FileCommand>,
    alive_rx: watch::Receiver<bool>,
    snapshot_tx: watch::Sender<FileSnapshot>,
    update_tx: broadcast::Sender<SyncUpdate>,
}

type Finished = (String, Result<ConversionOutcome>, Duration);

fn spawn_file_loop(mut state: FileLoop) -> JoinHandle<()> {
    tokio::spawn(async move {
        let shadow_id = state.pair.shadow_id();
        let mut machine = GenerationMachine::new(state.config.debounce);
        let mut in_flight: Option<JoinHandle<Finished>> = None;
        let mut poll = state.config.poll_interval.map(|period| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let mut last_seen: Option<String> = None;

        loop {
            let next_deadline = machine.deadline();

            tokio::select! {
                cmd = state.command_rx.recv() => match cmd {
                    Some(FileCommand::Changed) => {
                        machine.observe_change(Instant::now());
                    }
                    Some(FileCommand::Stop) | None => {
                        machine.stop();
                        state.publish_snapshot(&machine);
                        break;
                    }
                },
                () = sleep_until(next_deadline), if next_deadline.is_some() => {
                    match machine.timer_fired(Instant::now()) {
                        TimerDecision::Evaluate => {
                            in_flight = state.evaluate(&mut machine).await;
                        }
                        TimerDecision::Rearmed => {
                            debug!("{shadow_id} changed while generating; re-armed");
                        }
                        TimerDecision::NotDue | TimerDecision::Ignore => {}
                    }
                }
                joined = join_in_flight(&mut in_flight) => {
                    in_flight = None;
                    machine.finish_generation();
                    state.finish(joined);
                }
                () = tick(&mut poll) => {
                    if let Some(text) = state.read_shadow().await {
                        let unseen = last_seen.as_deref() != Some(text.as_str());
                        if unseen && text != state.last_checkpoint {
                            machine.observe_change(Instant::now());
                        }
                        last_seen = Some(text);
                    }
                }
            }

            state.publish_snapshot(&machine);
        }

        // Let an outstanding conversion finish; liveness is already false so it discards.
        if let Some(task) = in_flight.take() {
            let joined = task.await;
            state.finish(joined);
        }
        debug!("Shadow file loop for {shadow_id} exited");
    })
}

impl FileLoop {
    /// Reads the current pseudocode and starts a conversion unless it matches the checkpoint.
    async fn evaluate(&mut self, machine: &mut GenerationMachine) -> Option<JoinHandle<Finished>> {
        let started = Instant::now();
        let pseudocode = self.read_shadow().await?;
        if pseudocode == self.last_checkpoint {
            debug!("{} unchanged since last conversion", self.pair.shadow_id());
            self.broadcast(SyncOutcome::Unchanged, started.elapsed());
            return None;
        }
        if !machine.begin_generation() {
            return None;
        }

        let pipeline = self.pipeline.clone();
        let pair = self.pair.clone();
        let checkpoint = self.last_checkpoint.clone();
        let liveness = Liveness::from_receiver(self.alive_rx.clone());
        Some(tokio::spawn(async move {
            let started = Instant::now();
            let result = pipeline
                .convert(&pair, &pseudocode, Some(&checkpoint), &liveness)
                .await;
            (pseudocode, result, started.elapsed())
        }))
    }

    fn finish(&mut self, joined: std::result::Result<Finished, JoinError>) {
        let shadow_id = self.pair.shadow_id();
        let (pseudocode, result, elapsed) = match joined {
            Ok(finished) => finished,
            Err(err) => {
                error!("Generation task for {shadow_id} panicked: {err}");
                self.broadcast(
                    SyncOutcome::Failed {
                        message: err.to_string(),
                        retryable: false,
                    },
                    Duration::ZERO,
                );
                return;
            }
        };

        let outcome = match result {
            Ok(ConversionOutcome::Converted { output_chars, .. }) => {
                self.last_checkpoint = pseudocode;
                SyncOutcome::Converted { output_chars }
            }
            Ok(ConversionOutcome::NoChanges) => {
                self.last_checkpoint = pseudocode;
                SyncOutcome::Converted { output_chars: 0 }
            }
            Ok(ConversionOutcome::Unchanged) => SyncOutcome::Unchanged,
            Ok(ConversionOutcome::Discarded) => {
                debug!("Discarded result for unwatched {shadow_id}");
                SyncOutcome::Discarded
            }
            Err(err) => {
                error!("Generation failed for {shadow_id}: {err}");
                SyncOutcome::Failed {
                    message: err.to_string(),
                    retryable: err.is_retryable(),
                }
            }
        };
        self.broadcast(outcome, elapsed);
    }

    async fn read_shadow(&self) -> Option<String> {
        match self.pipeline.sink().read(&self.pair.shadow).await {
            Ok(Some(text)) => Some(text),
            Ok(None) => {
                warn!("Shadow file {} no longer exists", self.pair.shadow.display());
                None
            }
            Err(err) => {
                warn!("{err}");
                None
            }
        }
    }

    fn broadcast(&self, outcome: SyncOutcome, elapsed: Duration) {
        let _ = self.update_tx.send(SyncUpdate {
            shadow_id: self.pair.shadow_id(),
            outcome,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            completed_at: SystemTime::now(),
        });
    }

    fn publish_snapshot(&self, machine: &GenerationMachine) {
        self.snapshot_tx.send_replace(FileSnapshot {
            phase: machine.phase(),
            in_flight: machine.in_flight(),
            last_checkpoint: self.last_checkpoint.clone(),
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn join_in_flight(
    task: &mut Option<JoinHandle<Finished>>,
) -> std::result::Result<Finished, JoinError> {
    match task {
        Some(task) => task.await,
        None => pending().await,
    }
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}
