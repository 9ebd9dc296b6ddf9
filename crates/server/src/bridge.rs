//! Streaming bridge
//!
//! Turns the worker's push-based production into a pull-based sequence with
//! explicit termination. One [`StreamHandle`] per RPC call; dropping the
//! handle releases the channel and the producer's remaining output is
//! discarded.

use crate::generation::{GenerationWorker, StreamEvent};
use brick_common::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Opens handoff channels against a [`GenerationWorker`]
#[derive(Clone)]
pub struct StreamingBridge {
    /// Worker producing the fragments
    worker: GenerationWorker,

    /// Handoff channel capacity
    capacity: usize,
}

impl StreamingBridge {
    pub fn new(worker: GenerationWorker, capacity: usize) -> Self {
        Self {
            worker,
            capacity: capacity.max(1),
        }
    }

    /// Allocate a handoff channel and start generating into it
    pub fn open(&self, prompt: &str, max_tokens: u32) -> Result<StreamHandle> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let producer = self.worker.generate(prompt, max_tokens, sender)?;

        Ok(StreamHandle {
            receiver,
            producer: Some(producer),
            finished: false,
        })
    }
}

/// Consumer end of a single generation
pub struct StreamHandle {
    /// Handoff channel
    receiver: mpsc::Receiver<StreamEvent>,

    /// Background producer, awaited only to explain an unexpected close
    producer: Option<JoinHandle<()>>,

    /// Set once a terminal event was returned
    finished: bool,
}

impl StreamHandle {
    /// Wait for the next fragment, end-of-stream, or error.
    ///
    /// After a terminal event the handle is fused and returns `End`.
    pub async fn next(&mut self) -> StreamEvent {
        if self.finished {
            return StreamEvent::End;
        }

        let event = match self.receiver.recv().await {
            Some(event) => event,
            None => self.producer_exit().await,
        };

        if event.is_terminal() {
            self.finished = true;
        }
        event
    }

    /// Whether a terminal event has been returned
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Explain a channel that closed without a terminal marker
    async fn producer_exit(&mut self) -> StreamEvent {
        let Some(producer) = self.producer.take() else {
            return StreamEvent::Error("generation task already exited".to_string());
        };

        match producer.await {
            Err(e) if e.is_panic() => StreamEvent::Error("generation task panicked".to_string()),
            Err(e) => StreamEvent::Error(format!("generation task failed: {}", e)),
            Ok(()) => StreamEvent::Error("generation ended without completing".to_string()),
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Stream released before end-of-stream, producer output will be discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelHost, TextGenerator};
    use crate::template::ChatTemplate;
    use crate::testing::{EndlessGenerator, ScriptedGenerator, StaticLoader};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    async fn bridge(generator: impl TextGenerator, capacity: usize) -> StreamingBridge {
        let host = Arc::new(ModelHost::new("tiny", Arc::new(StaticLoader::new(generator))));
        host.load_model_once().await.unwrap();
        StreamingBridge::new(GenerationWorker::new(host, ChatTemplate::new("sys")), capacity)
    }

    #[tokio::test]
    async fn test_pull_in_order() {
        let bridge = bridge(ScriptedGenerator::new(&["one ", "two ", "three"]), 1).await;
        let mut handle = bridge.open("count", 10).unwrap();

        let mut text = String::new();
        loop {
            match handle.next().await {
                StreamEvent::Fragment(f) => text.push_str(&f),
                StreamEvent::End => break,
                StreamEvent::Error(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(text, "one two three");
        assert!(handle.is_finished());
        // Fused after the terminal event
        assert_eq!(handle.next().await, StreamEvent::End);
    }

    #[tokio::test]
    async fn test_error_surfaces_after_fragments() {
        let generator = ScriptedGenerator::new(&["a", "b", "c", "d"]).failing_at(3);
        let bridge = bridge(generator, 4).await;
        let mut handle = bridge.open("x", 10).unwrap();

        assert_eq!(handle.next().await, StreamEvent::Fragment("a".into()));
        assert_eq!(handle.next().await, StreamEvent::Fragment("b".into()));
        assert_eq!(handle.next().await, StreamEvent::Fragment("c".into()));
        assert_eq!(handle.next().await, StreamEvent::Error("backend exploded".into()));
        assert_eq!(handle.next().await, StreamEvent::End);
    }

    #[tokio::test]
    async fn test_drop_stops_producer() {
        let generator = EndlessGenerator::new();
        let pulled = generator.pulled();
        let bridge = bridge(generator, 1).await;
        let mut handle = bridge.open("forever", u32::MAX).unwrap();

        assert!(matches!(handle.next().await, StreamEvent::Fragment(_)));
        assert!(matches!(handle.next().await, StreamEvent::Fragment(_)));
        drop(handle);

        // Give the producer time to notice the closed channel
        tokio::time::sleep(Duration::from_millis(50)).await;
        let settled = pulled.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(pulled.load(Ordering::SeqCst), settled);
    }

    struct PanickingGenerator;

    impl TextGenerator for PanickingGenerator {
        fn generate<'a>(
            &'a self,
            _prompt: &'a crate::template::ChatPrompt,
            _max_tokens: u32,
        ) -> Result<crate::model::Fragments<'a>> {
            panic!("model crashed");
        }
    }

    #[tokio::test]
    async fn test_producer_panic_is_an_error() {
        let bridge = bridge(PanickingGenerator, 1).await;
        let mut handle = bridge.open("boom", 1).unwrap();

        assert_eq!(
            handle.next().await,
            StreamEvent::Error("generation task panicked".into())
        );
    }
}
