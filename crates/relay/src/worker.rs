//! Background execution unit: runs one streaming request on its own thread
//! with its own runtime, forwarding deltas to an [`EventSink`] as they
//! arrive and emitting exactly one terminal notification per run.

use providers::StreamProducer;
use shared::chat::{CancelFlag, StreamChunk, StreamEnd};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::unbounded_channel;

/// Receives stream progress on the worker thread. Exactly one of the
/// terminal callbacks fires per run, after all deltas.
pub trait EventSink: Send + Sync {
    fn on_delta(&self, text: &str);
    fn on_complete(&self, full_text: &str);
    fn on_error(&self, message: &str);
    fn on_cancelled(&self);
}

/// Final state of a finished worker. An errored run keeps only the message;
/// partial text already shown via deltas is not retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed(String),
    Errored(String),
    Cancelled,
}

/// One streaming request on a dedicated thread. The front end stays free to
/// poll transcripts and handle input while the stream runs; requesting a stop
/// only raises the flag, the adapter acts on it at its next check.
pub struct StreamWorker {
    cancel: CancelFlag,
    handle: Option<JoinHandle<WorkerOutcome>>,
    outcome: Option<WorkerOutcome>,
}

impl StreamWorker {
    pub fn spawn(producer: Box<dyn StreamProducer>, sink: Arc<dyn EventSink>) -> Self {
        let cancel = CancelFlag::new();
        let thread_cancel = cancel.clone();
        let handle = std::thread::spawn(move || run(producer, sink, thread_cancel));
        Self {
            cancel,
            handle: Some(handle),
            outcome: None,
        }
    }

    pub fn is_running(&self) -> bool {
        match &self.handle {
            Some(handle) => !handle.is_finished(),
            None => false,
        }
    }

    /// Raise the cancel flag without waiting.
    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the run finishes and return its outcome. Safe to call
    /// repeatedly; later calls return the cached outcome.
    pub fn wait(&mut self) -> WorkerOutcome {
        if let Some(handle) = self.handle.take() {
            let outcome = handle
                .join()
                .unwrap_or_else(|_| WorkerOutcome::Errored("worker thread panicked".to_string()));
            self.outcome = Some(outcome);
        }
        match &self.outcome {
            Some(outcome) => outcome.clone(),
            None => WorkerOutcome::Errored("worker was never started".to_string()),
        }
    }

    /// Cancel and block until the thread has fully exited, so a follow-up
    /// request can start with no stale stream still draining.
    pub fn stop(&mut self) -> WorkerOutcome {
        self.cancel.cancel();
        self.wait()
    }
}

fn run(
    producer: Box<dyn StreamProducer>,
    sink: Arc<dyn EventSink>,
    cancel: CancelFlag,
) -> WorkerOutcome {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let message = format!("failed to start async runtime: {}", e);
            sink.on_error(&message);
            return WorkerOutcome::Errored(message);
        }
    };

    let caught = std::panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.block_on(async {
            let (tx, mut rx) = unbounded_channel::<StreamChunk>();
            let producer_fut = producer.stream(&cancel, &tx);
            tokio::pin!(producer_fut);

            let mut full_text = String::new();
            let result = loop {
                tokio::select! {
                    result = &mut producer_fut => {
                        // Drain deltas buffered ahead of the producer's return.
                        while let Ok(chunk) = rx.try_recv() {
                            if let StreamChunk::Text(text) = chunk {
                                sink.on_delta(&text);
                                full_text.push_str(&text);
                            }
                        }
                        break result;
                    }
                    chunk = rx.recv() => {
                        if let Some(StreamChunk::Text(text)) = chunk {
                            sink.on_delta(&text);
                            full_text.push_str(&text);
                        }
                    }
                }
            };

            match result {
                Ok(StreamEnd::Completed) => {
                    sink.on_complete(&full_text);
                    WorkerOutcome::Completed(full_text)
                }
                Ok(StreamEnd::Cancelled) => {
                    tracing::info!("stream cancelled after {} chars", full_text.len());
                    sink.on_cancelled();
                    WorkerOutcome::Cancelled
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    tracing::error!("stream failed: {}", message);
                    sink.on_error(&message);
                    WorkerOutcome::Errored(message)
                }
            }
        })
    }));

    match caught {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = match payload.downcast_ref::<&str>() {
                Some(s) => format!("stream panicked: {}", s),
                None => match payload.downcast_ref::<String>() {
                    Some(s) => format!("stream panicked: {}", s),
                    None => "stream panicked".to_string(),
                },
            };
            sink.on_error(&message);
            WorkerOutcome::Errored(message)
        }
    }
}
