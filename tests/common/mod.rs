//! Shared fixtures: an in-process fake engine and a service harness.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use sshbox::engine::{
    ContainerEngine, ContainerSpec, EngineInspect, LogFrame, LogFrameStream, LogSource, LogTail,
};
use sshbox::lifecycle::{ContainerService, Owner};
use sshbox::storage::MemoryStore;
use sshbox::{EngineError, PlatformConfig};

pub const ALICE: i64 = 1;
pub const BOB: i64 = 2;
pub const CAROL_DISABLED: i64 = 3;

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub spec: ContainerSpec,
    pub status: String,
}

#[derive(Default)]
struct FakeState {
    containers: HashMap<String, FakeContainer>,
    next_id: u64,
    images: HashSet<String>,
    calls: Vec<String>,
    fail_create: bool,
    fail_start: bool,
    fail_stop: bool,
    fail_remove: bool,
    inspect_error: Option<String>,
    pull_delay: Option<Duration>,
    pull_error: Option<String>,
    create_delay: Option<Duration>,
    history: HashMap<String, Vec<String>>,
    history_error: Option<String>,
    followers: HashMap<String, Vec<mpsc::Sender<Result<LogFrame, EngineError>>>>,
}

/// Scriptable in-memory container engine.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that already has every image locally.
    pub fn with_images(images: &[&str]) -> Self {
        let engine = Self::new();
        {
            let mut state = engine.lock();
            state.images = images.iter().map(|s| s.to_string()).collect();
        }
        engine
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, op: &str) -> usize {
        let prefix = format!("{op}:");
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    pub fn container(&self, engine_id: &str) -> Option<FakeContainer> {
        self.lock().containers.get(engine_id).cloned()
    }

    pub fn container_count(&self) -> usize {
        self.lock().containers.len()
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.lock().images.contains(image)
    }

    /// Simulates an out-of-band `docker rm`.
    pub fn remove_externally(&self, engine_id: &str) {
        self.lock().containers.remove(engine_id);
    }

    /// Simulates the engine changing state on its own.
    pub fn set_status(&self, engine_id: &str, status: &str) {
        if let Some(container) = self.lock().containers.get_mut(engine_id) {
            container.status = status.to_string();
        }
    }

    pub fn fail_create(&self, fail: bool) {
        self.lock().fail_create = fail;
    }

    pub fn fail_start(&self, fail: bool) {
        self.lock().fail_start = fail;
    }

    pub fn fail_stop(&self, fail: bool) {
        self.lock().fail_stop = fail;
    }

    pub fn fail_remove(&self, fail: bool) {
        self.lock().fail_remove = fail;
    }

    pub fn fail_inspect(&self, message: Option<&str>) {
        self.lock().inspect_error = message.map(str::to_string);
    }

    pub fn delay_pull(&self, delay: Duration) {
        self.lock().pull_delay = Some(delay);
    }

    pub fn fail_pull(&self, message: &str) {
        self.lock().pull_error = Some(message.to_string());
    }

    pub fn delay_create(&self, delay: Duration) {
        self.lock().create_delay = Some(delay);
    }

    /// Sets the log history returned to bounded reads, one frame per entry.
    pub fn set_history(&self, engine_id: &str, frames: &[&str]) {
        self.lock().history.insert(
            engine_id.to_string(),
            frames.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Makes bounded reads fail after replaying the history.
    pub fn fail_history(&self, message: &str) {
        self.lock().history_error = Some(message.to_string());
    }

    /// Pushes a live frame to every follower of the container.
    pub async fn emit(&self, engine_id: &str, text: &str) {
        let senders = self.followers(engine_id);
        for tx in senders {
            let frame = LogFrame::new(LogSource::Stdout, text.as_bytes().to_vec());
            let _ = tx.send(Ok(frame)).await;
        }
    }

    /// Fails every follower of the container.
    pub async fn break_stream(&self, engine_id: &str, message: &str) {
        let senders = self.followers(engine_id);
        for tx in senders {
            let _ = tx.send(Err(EngineError::LogStream(message.to_string()))).await;
        }
        self.lock().followers.remove(engine_id);
    }

    /// Ends every follow stream of the container naturally.
    pub fn end_streams(&self, engine_id: &str) {
        self.lock().followers.remove(engine_id);
    }

    /// Follow streams whose consumer is still attached.
    pub fn open_follow_streams(&self, engine_id: &str) -> usize {
        self.lock()
            .followers
            .get(engine_id)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn followers(&self, engine_id: &str) -> Vec<mpsc::Sender<Result<LogFrame, EngineError>>> {
        self.lock()
            .followers
            .get(engine_id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }

    fn not_found(engine_id: &str) -> EngineError {
        EngineError::ContainerNotFound {
            id: engine_id.to_string(),
        }
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        self.record(format!("create:{}", spec.name));
        let delay = self.lock().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if state.fail_create {
            return Err(EngineError::RequestFailed("create refused".to_string()));
        }
        state.next_id += 1;
        let id = format!("fake{:06}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                spec: spec.clone(),
                status: "created".to_string(),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, engine_id: &str) -> Result<(), EngineError> {
        self.record(format!("start:{engine_id}"));
        let mut state = self.lock();
        if state.fail_start {
            return Err(EngineError::RequestFailed("start refused".to_string()));
        }
        let container = state
            .containers
            .get_mut(engine_id)
            .ok_or_else(|| Self::not_found(engine_id))?;
        container.status = "running".to_string();
        Ok(())
    }

    async fn stop_container(&self, engine_id: &str) -> Result<(), EngineError> {
        self.record(format!("stop:{engine_id}"));
        let mut state = self.lock();
        if state.fail_stop {
            return Err(EngineError::RequestFailed("stop refused".to_string()));
        }
        let container = state
            .containers
            .get_mut(engine_id)
            .ok_or_else(|| Self::not_found(engine_id))?;
        container.status = "exited".to_string();
        Ok(())
    }

    async fn remove_container(&self, engine_id: &str, force: bool) -> Result<(), EngineError> {
        self.record(format!("remove:{engine_id}:{force}"));
        let mut state = self.lock();
        if state.fail_remove {
            return Err(EngineError::RequestFailed("remove refused".to_string()));
        }
        state
            .containers
            .remove(engine_id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(engine_id))
    }

    async fn inspect_container(&self, engine_id: &str) -> Result<EngineInspect, EngineError> {
        self.record(format!("inspect:{engine_id}"));
        let state = self.lock();
        if let Some(message) = &state.inspect_error {
            return Err(EngineError::DaemonUnavailable(message.clone()));
        }
        state
            .containers
            .get(engine_id)
            .map(|c| EngineInspect {
                status: c.status.clone(),
                exit_code: None,
            })
            .ok_or_else(|| Self::not_found(engine_id))
    }

    async fn image_exists(&self, image: &str) -> Result<bool, EngineError> {
        self.record(format!("image_exists:{image}"));
        Ok(self.lock().images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        self.record(format!("pull:{image}"));
        let (delay, error) = {
            let state = self.lock();
            (state.pull_delay, state.pull_error.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = error {
            return Err(EngineError::PullFailed(message));
        }
        self.lock().images.insert(image.to_string());
        Ok(())
    }

    fn stream_logs(&self, engine_id: &str, tail: LogTail, follow: bool) -> LogFrameStream {
        self.record(format!("logs:{engine_id}:{}:{follow}", tail.as_query()));
        let mut state = self.lock();

        if !state.containers.contains_key(engine_id) {
            let err = Self::not_found(engine_id);
            return Box::pin(stream::iter(vec![Err(err)]));
        }

        let history = state.history.get(engine_id).cloned().unwrap_or_default();
        let history: Vec<String> = match tail {
            LogTail::All => history,
            LogTail::Lines(n) => {
                let skip = history.len().saturating_sub(n);
                history.into_iter().skip(skip).collect()
            }
        };
        let frames = history
            .into_iter()
            .map(|text| Ok(LogFrame::new(LogSource::Stdout, text.into_bytes())));

        if follow {
            let (tx, rx) = mpsc::channel(64);
            for frame in frames {
                let _ = tx.try_send(frame);
            }
            state
                .followers
                .entry(engine_id.to_string())
                .or_default()
                .push(tx);
            Box::pin(ReceiverStream::new(rx))
        } else {
            let mut items: Vec<Result<LogFrame, EngineError>> = frames.collect();
            if let Some(message) = &state.history_error {
                items.push(Err(EngineError::LogStream(message.clone())));
            }
            Box::pin(stream::iter(items))
        }
    }
}

pub fn owners() -> Vec<Owner> {
    let mut carol = Owner::new(CAROL_DISABLED, "carol");
    carol.enabled = false;
    vec![Owner::new(ALICE, "alice"), Owner::new(BOB, "bob"), carol]
}

pub struct Harness {
    pub engine: Arc<FakeEngine>,
    pub store: Arc<MemoryStore>,
    pub service: Arc<ContainerService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PlatformConfig::default())
    }

    pub fn with_config(config: PlatformConfig) -> Self {
        let engine = Arc::new(FakeEngine::with_images(&["alpine:3.18", "ubuntu:22.04"]));
        Self::with_engine(engine, config)
    }

    pub fn with_engine(engine: Arc<FakeEngine>, config: PlatformConfig) -> Self {
        let store = Arc::new(MemoryStore::with_owners(owners()));
        let service = Arc::new(ContainerService::new(
            engine.clone(),
            store.clone(),
            config,
        ));
        Self {
            engine,
            store,
            service,
        }
    }
}
