//! Scripted generators and loaders shared by the unit tests

use crate::model::{Fragments, ModelLoader, TextGenerator};
use crate::template::ChatPrompt;
use brick_common::{BrickError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Replays a fixed list of fragments, optionally failing part-way
pub struct ScriptedGenerator {
    fragments: Vec<String>,
    delay: Duration,
    fail_at: Option<usize>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedGenerator {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            delay: Duration::ZERO,
            fail_at: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Raise instead of producing the fragment at `index`
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Number of `generate` calls made so far
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate<'a>(&'a self, _prompt: &'a ChatPrompt, max_tokens: u32) -> Result<Fragments<'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        let fail_at = self.fail_at;

        Ok(Box::new(
            self.fragments
                .iter()
                .enumerate()
                .take(max_tokens as usize)
                .map(move |(i, fragment)| {
                    std::thread::sleep(delay);
                    if fail_at == Some(i) {
                        Err(BrickError::generation("backend exploded"))
                    } else {
                        Ok(fragment.clone())
                    }
                }),
        ))
    }
}

/// Never finishes on its own; counts how many fragments were pulled
pub struct EndlessGenerator {
    pulled: Arc<AtomicUsize>,
}

impl EndlessGenerator {
    pub fn new() -> Self {
        Self {
            pulled: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn pulled(&self) -> Arc<AtomicUsize> {
        self.pulled.clone()
    }
}

impl TextGenerator for EndlessGenerator {
    fn generate<'a>(&'a self, _prompt: &'a ChatPrompt, _max_tokens: u32) -> Result<Fragments<'a>> {
        let pulled = self.pulled.clone();
        Ok(Box::new(std::iter::repeat_with(move || {
            std::thread::sleep(Duration::from_millis(1));
            pulled.fetch_add(1, Ordering::SeqCst);
            Ok("tick ".to_string())
        })))
    }
}

/// Hands out one prepared generator, or fails with a fixed message
pub struct StaticLoader {
    generator: Option<Arc<dyn TextGenerator>>,
    failure: Option<String>,
    delay: Duration,
    loads: Arc<AtomicUsize>,
}

impl StaticLoader {
    pub fn new(generator: impl TextGenerator) -> Self {
        Self {
            generator: Some(Arc::new(generator)),
            failure: None,
            delay: Duration::ZERO,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            generator: None,
            failure: Some(msg.to_string()),
            delay: Duration::ZERO,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `load` calls made so far
    pub fn loads(&self) -> Arc<AtomicUsize> {
        self.loads.clone()
    }
}

impl ModelLoader for StaticLoader {
    fn load(&self, _model_id: &str) -> Result<Arc<dyn TextGenerator>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);

        match (&self.generator, &self.failure) {
            (_, Some(msg)) => Err(BrickError::startup(msg.clone())),
            (Some(generator), None) => Ok(generator.clone()),
            (None, None) => Err(BrickError::startup("no generator configured")),
        }
    }
}
