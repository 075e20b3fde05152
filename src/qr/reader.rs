//! Incoming side of the visual channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace};

use crate::engine::RpcEngine;
use crate::sync::lock;

use super::QrDisplay;

/// Camera plus QR detector supplied by the embedding application.
pub trait QrScanner: Send {
    /// Decoded text of the code in view, or `None` if nothing was detected.
    fn sample(&mut self) -> Option<String>;
}

/// Text held in view across consecutive samples.
struct Run {
    text: String,
    screen: u64,
}

/// Feeds scanned text into an engine.
///
/// Every scan handed to [`QrReader::on_scan`] reaches the engine; repeated
/// responses are harmless there because pending calls resolve once. The
/// polling path additionally skips a frame that simply stays in view: a
/// sample equal to the previous one is dropped until the camera loses the
/// code, sees different text, or this device's own screen changes.
pub struct QrReader {
    engine: Arc<RpcEngine>,
    screen: Option<Arc<QrDisplay>>,
    run: Mutex<Option<Run>>,
}

impl QrReader {
    pub fn new(engine: Arc<RpcEngine>) -> Self {
        Self {
            engine,
            screen: None,
            run: Mutex::new(None),
        }
    }

    /// Reader for a device whose own screen is `screen`. Showing something
    /// new there ends the current run, so an identical frame scanned next
    /// is fed again.
    pub fn with_display(engine: Arc<RpcEngine>, screen: Arc<QrDisplay>) -> Self {
        Self {
            screen: Some(screen),
            ..Self::new(engine)
        }
    }

    /// Handle one decoded scan. Returns false only for blank text.
    pub fn on_scan(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        debug!(len = text.len(), "qr frame scanned");
        self.engine.on_message(text);
        true
    }

    /// End the current run, so the frame in view is fed on the next sample.
    pub fn reset(&self) {
        *lock(&self.run) = None;
    }

    /// Take one sample from `scanner`. Failed detections are ignored and
    /// end the current run. Returns true if the sample reached the engine.
    pub fn poll_once(&self, scanner: &mut dyn QrScanner) -> bool {
        let sample = scanner.sample();
        let text = match sample.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text,
            _ => {
                self.reset();
                return false;
            }
        };

        let screen = self.screen_generation();
        let held = matches!(&*lock(&self.run), Some(run) if run.text == text && run.screen == screen);
        if held {
            trace!("frame still in view");
            return false;
        }

        let fed = self.on_scan(text);
        // Recorded after handling: a reply this scan put on screen does not
        // end the run.
        *lock(&self.run) = Some(Run {
            text: text.to_string(),
            screen: self.screen_generation(),
        });
        fed
    }

    fn screen_generation(&self) -> u64 {
        self.screen.as_ref().map_or(0, |screen| screen.generation())
    }

    /// Sample `scanner` every `interval` on a background thread until the
    /// returned handle is stopped or dropped.
    pub fn spawn_polling<S>(self: &Arc<Self>, interval: Duration, mut scanner: S) -> std::io::Result<PollHandle>
    where
        S: QrScanner + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let reader = Arc::clone(self);
        let thread = thread::Builder::new()
            .name("coldwire-qr-poll".to_string())
            .spawn(move || {
                while !flag.load(Ordering::SeqCst) {
                    reader.poll_once(&mut scanner);
                    thread::sleep(interval);
                }
            })?;
        Ok(PollHandle {
            stop,
            thread: Some(thread),
        })
    }
}

/// Running camera poller.
pub struct PollHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Stop polling and wait for the poller to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!("qr poller panicked");
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
