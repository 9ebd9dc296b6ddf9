//! Built-in generation backends
//!
//! Real model inference lives outside this crate. The `echo` backend streams
//! the user prompt back word by word, which is enough to exercise the whole
//! streaming path without weights.

use crate::model::{Fragments, ModelLoader, TextGenerator};
use crate::template::ChatPrompt;
use brick_common::config::ModelBackend;
use brick_common::{BrickConfig, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Echoes the user prompt, one whitespace-terminated word per fragment
pub struct EchoGenerator {
    delay: Duration,
}

impl EchoGenerator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl TextGenerator for EchoGenerator {
    fn generate<'a>(&'a self, prompt: &'a ChatPrompt, max_tokens: u32) -> Result<Fragments<'a>> {
        let delay = self.delay;

        Ok(Box::new(
            prompt
                .user
                .split_inclusive(char::is_whitespace)
                .take(max_tokens as usize)
                .map(move |word| {
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    Ok(word.to_string())
                }),
        ))
    }
}

/// Loader for [`EchoGenerator`]
pub struct EchoLoader {
    delay: Duration,
}

impl EchoLoader {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl ModelLoader for EchoLoader {
    fn load(&self, model_id: &str) -> Result<Arc<dyn TextGenerator>> {
        info!("Using echo backend for model {}", model_id);
        Ok(Arc::new(EchoGenerator::new(self.delay)))
    }
}

/// Pick the loader for the configured backend
pub fn loader_for(config: &BrickConfig) -> Arc<dyn ModelLoader> {
    match config.model.backend {
        ModelBackend::Echo => Arc::new(EchoLoader::new(config.echo_delay())),
    }
}
