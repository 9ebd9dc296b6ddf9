//! Generation worker
//!
//! Runs the opaque generator on a blocking thread and pushes every fragment
//! it produces into a bounded handoff channel owned by the caller. Completion
//! and failure travel down the same channel as tagged [`StreamEvent`]s, so no
//! error ever has to cross the thread boundary as a panic.

use crate::model::{ModelHost, TextGenerator};
use crate::template::{ChatPrompt, ChatTemplate};
use brick_common::{BrickError, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Item carried by the handoff channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Next piece of generated text
    Fragment(String),

    /// Generation finished normally
    End,

    /// Generation failed; carries a human-readable detail
    Error(String),
}

impl StreamEvent {
    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Fragment(_))
    }
}

/// Wraps the loaded model and produces fragments in the background
#[derive(Clone)]
pub struct GenerationWorker {
    /// Process-wide model owner
    host: Arc<ModelHost>,

    /// Builds the model input from a raw prompt
    template: Arc<ChatTemplate>,
}

impl GenerationWorker {
    pub fn new(host: Arc<ModelHost>, template: ChatTemplate) -> Self {
        Self {
            host,
            template: Arc::new(template),
        }
    }

    /// Start generating for `prompt` into `sender`.
    ///
    /// Fails with `NotReady` before the model is loaded, in which case no task
    /// is spawned and nothing is written. Otherwise exactly one blocking task
    /// is spawned; it writes fragments followed by `End` or `Error` and exits.
    pub fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        sender: mpsc::Sender<StreamEvent>,
    ) -> Result<JoinHandle<()>> {
        let model = self.host.model()?;
        let input = self.template.render(prompt);

        debug!(
            "Starting generation: prompt_chars={}, max_tokens={}",
            input.user.chars().count(),
            max_tokens
        );

        Ok(tokio::task::spawn_blocking(move || {
            produce(model.as_ref(), &input, max_tokens, &sender)
        }))
    }
}

/// Drive the generator until it finishes, fails, or the consumer goes away
fn produce(
    model: &dyn TextGenerator,
    input: &ChatPrompt,
    max_tokens: u32,
    sender: &mpsc::Sender<StreamEvent>,
) {
    let fragments = match model.generate(input, max_tokens) {
        Ok(fragments) => fragments,
        Err(e) => {
            warn!("Generation failed to start: {}", e);
            let _ = sender.blocking_send(StreamEvent::Error(detail(e)));
            return;
        }
    };

    let mut produced = 0usize;
    for fragment in fragments.take(max_tokens as usize) {
        match fragment {
            Ok(text) => {
                if sender.blocking_send(StreamEvent::Fragment(text)).is_err() {
                    // Consumer released the stream; stop pulling from the model
                    debug!("Consumer gone after {} fragments, discarding output", produced);
                    return;
                }
                produced += 1;
            }
            Err(e) => {
                warn!("Generation failed after {} fragments: {}", produced, e);
                let _ = sender.blocking_send(StreamEvent::Error(detail(e)));
                return;
            }
        }
    }

    trace!("Generation finished: {} fragments", produced);
    let _ = sender.blocking_send(StreamEvent::End);
}

fn detail(err: BrickError) -> String {
    match err {
        BrickError::Generation(msg) => msg,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedGenerator, StaticLoader};
    use std::sync::atomic::Ordering;

    async fn loaded_worker(generator: ScriptedGenerator) -> GenerationWorker {
        let host = Arc::new(ModelHost::new("tiny", Arc::new(StaticLoader::new(generator))));
        host.load_model_once().await.unwrap();
        GenerationWorker::new(host, ChatTemplate::new("sys"))
    }

    async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_fragments_then_end() {
        let worker = loaded_worker(ScriptedGenerator::new(&["Hel", "lo", "!"])).await;
        let (tx, rx) = mpsc::channel(1);

        let producer = worker.generate("hi", 16, tx).unwrap();
        let events = drain(rx).await;
        producer.await.unwrap();

        assert_eq!(
            events,
            vec![
                StreamEvent::Fragment("Hel".into()),
                StreamEvent::Fragment("lo".into()),
                StreamEvent::Fragment("!".into()),
                StreamEvent::End,
            ]
        );
    }

    #[tokio::test]
    async fn test_max_tokens_caps_output() {
        let worker = loaded_worker(ScriptedGenerator::new(&["a", "b", "c", "d"])).await;
        let (tx, rx) = mpsc::channel(8);

        worker.generate("hi", 2, tx).unwrap();
        let events = drain(rx).await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Fragment("a".into()),
                StreamEvent::Fragment("b".into()),
                StreamEvent::End,
            ]
        );
    }

    #[tokio::test]
    async fn test_error_marker_after_fragments() {
        let worker = loaded_worker(ScriptedGenerator::new(&["a", "b", "c"]).failing_at(2)).await;
        let (tx, rx) = mpsc::channel(8);

        worker.generate("hi", 16, tx).unwrap();
        let events = drain(rx).await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Fragment("a".into()),
                StreamEvent::Fragment("b".into()),
                StreamEvent::Error("backend exploded".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_not_ready_spawns_nothing() {
        let generator = ScriptedGenerator::new(&["a"]);
        let calls = generator.calls();
        let host = Arc::new(ModelHost::new("tiny", Arc::new(StaticLoader::new(generator))));
        let worker = GenerationWorker::new(host, ChatTemplate::new("sys"));
        let (tx, mut rx) = mpsc::channel(1);

        let result = worker.generate("hi", 4, tx);

        assert!(matches!(result, Err(BrickError::NotReady(_))));
        assert_eq!(rx.recv().await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
