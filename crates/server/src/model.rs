//! Model seam and process-wide load state
//!
//! The generation algorithm is external to this crate. It is reached through
//! [`TextGenerator`] (prompt in, lazy fragment sequence out) and created once
//! per process by a [`ModelLoader`]. [`ModelHost`] owns the loaded handle and
//! collapses concurrent load attempts into a single load.

use crate::template::ChatPrompt;
use brick_common::{BrickError, LatencyTimer, Result, METRICS};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Lazily produced fragments, borrowing from the generator and the prompt
pub type Fragments<'a> = Box<dyn Iterator<Item = Result<String>> + Send + 'a>;

/// Opaque generation algorithm
///
/// Implementations may block: the worker always drives them from a blocking
/// thread. They must be safe to use from several streams at once.
pub trait TextGenerator: Send + Sync + 'static {
    /// Start generating a completion of at most `max_tokens` fragments.
    ///
    /// An `Err` item ends the sequence; the stream is then reported as failed.
    fn generate<'a>(&'a self, prompt: &'a ChatPrompt, max_tokens: u32) -> Result<Fragments<'a>>;
}

/// Creates the generator for a model identifier
pub trait ModelLoader: Send + Sync + 'static {
    /// Load the model. Called at most once per [`ModelHost`].
    fn load(&self, model_id: &str) -> Result<Arc<dyn TextGenerator>>;
}

/// Observable load state of the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
    LoadFailed,
}

enum Slot {
    NotLoaded,
    Loading,
    Loaded(Arc<dyn TextGenerator>),
    LoadFailed(String),
}

/// Owner of the process-wide model handle
pub struct ModelHost {
    /// Model name/identifier
    model_id: String,

    /// Loader invoked by the first successful `load_model_once`
    loader: Arc<dyn ModelLoader>,

    /// Serialises load attempts; held across the load itself
    load_lock: Mutex<()>,

    /// Current state, readable without taking the load lock
    slot: RwLock<Slot>,
}

impl ModelHost {
    /// Create a host with nothing loaded yet
    pub fn new(model_id: impl Into<String>, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            model_id: model_id.into(),
            loader,
            load_lock: Mutex::new(()),
            slot: RwLock::new(Slot::NotLoaded),
        }
    }

    /// Model name/identifier
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Current load state
    pub fn state(&self) -> LoadState {
        match &*self.slot.read() {
            Slot::NotLoaded => LoadState::NotLoaded,
            Slot::Loading => LoadState::Loading,
            Slot::Loaded(_) => LoadState::Loaded,
            Slot::LoadFailed(_) => LoadState::LoadFailed,
        }
    }

    /// The loaded generator, or `NotReady`
    pub fn model(&self) -> Result<Arc<dyn TextGenerator>> {
        match &*self.slot.read() {
            Slot::Loaded(model) => Ok(model.clone()),
            Slot::LoadFailed(msg) => Err(BrickError::not_ready(format!(
                "model {} failed to load: {}",
                self.model_id, msg
            ))),
            Slot::NotLoaded | Slot::Loading => Err(BrickError::not_ready(format!(
                "model {} is not loaded",
                self.model_id
            ))),
        }
    }

    /// Load the model exactly once.
    ///
    /// Concurrent callers wait for the first load to finish. Once loaded this
    /// is a no-op; once failed every caller gets the same `Startup` error.
    pub async fn load_model_once(&self) -> Result<()> {
        let _guard = self.load_lock.lock().await;

        if let Some(outcome) = self.settled() {
            return outcome;
        }

        *self.slot.write() = Slot::Loading;
        info!("Loading model {}...", self.model_id);

        let loader = self.loader.clone();
        let model_id = self.model_id.clone();
        let result = tokio::task::spawn_blocking(move || {
            METRICS.lifecycle.model_load_duration.time(|| loader.load(&model_id))
        })
        .await
        .unwrap_or_else(|e| Err(BrickError::startup(format!("model loader panicked: {}", e))));

        match result {
            Ok(model) => {
                *self.slot.write() = Slot::Loaded(model);
                METRICS.lifecycle.model_loaded.set(1);
                info!("Model {} loaded", self.model_id);
                Ok(())
            }
            Err(err) => {
                let msg = match err {
                    BrickError::Startup(msg) => msg,
                    other => other.to_string(),
                };
                error!("Error loading model {}: {}", self.model_id, msg);
                *self.slot.write() = Slot::LoadFailed(msg.clone());
                Err(BrickError::Startup(msg))
            }
        }
    }

    /// Outcome of an earlier load, if one finished
    fn settled(&self) -> Option<Result<()>> {
        match &*self.slot.read() {
            Slot::Loaded(_) => Some(Ok(())),
            Slot::LoadFailed(msg) => Some(Err(BrickError::Startup(msg.clone()))),
            Slot::NotLoaded | Slot::Loading => None,
        }
    }
}
