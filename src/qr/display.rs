//! Outgoing side of the visual channel.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::sync::lock;
use crate::transport::{MessageSink, TransportError};

use super::QrFrameSet;

struct Screen {
    set: Option<Arc<QrFrameSet>>,
    shown_since: Instant,
    generation: u64,
}

/// What the device shows. Each message the engine sends becomes a frame;
/// frames sent since the screen was last replaced cycle together.
///
/// The display never blocks and never fails: there is no "not ready" for a
/// screen.
pub struct QrDisplay {
    cycle_interval: Duration,
    max_frames: usize,
    screen: Mutex<Screen>,
}

impl QrDisplay {
    pub fn new(cycle_interval: Duration, max_frames: usize) -> Self {
        Self {
            cycle_interval,
            max_frames: max_frames.max(1),
            screen: Mutex::new(Screen {
                set: None,
                shown_since: Instant::now(),
                generation: 0,
            }),
        }
    }

    pub fn cycle_interval(&self) -> Duration {
        self.cycle_interval
    }

    /// Replace whatever is on screen.
    pub fn show(&self, set: QrFrameSet) {
        let mut screen = lock(&self.screen);
        screen.set = Some(Arc::new(set));
        screen.shown_since = Instant::now();
        screen.generation += 1;
    }

    /// Add one frame to the set on screen.
    pub fn push(&self, frame: String) {
        let mut screen = lock(&self.screen);
        let next = match &screen.set {
            Some(set) => set.with_frame(frame, self.max_frames),
            None => QrFrameSet::single(frame),
        };
        debug!(frames = next.len(), "qr frame set updated");
        screen.set = Some(Arc::new(next));
        screen.shown_since = Instant::now();
        screen.generation += 1;
    }

    pub fn clear(&self) {
        let mut screen = lock(&self.screen);
        screen.set = None;
        screen.generation += 1;
    }

    /// Counter bumped every time the screen content changes.
    pub fn generation(&self) -> u64 {
        lock(&self.screen).generation
    }

    pub fn frame_set(&self) -> Option<Arc<QrFrameSet>> {
        lock(&self.screen).set.clone()
    }

    /// The frame to render right now.
    pub fn current_frame(&self) -> Option<String> {
        let screen = lock(&self.screen);
        let set = screen.set.as_ref()?;
        Some(set.frame_at(screen.shown_since.elapsed(), self.cycle_interval).to_string())
    }

    /// The frame shown `elapsed` after the current set went up.
    pub fn frame_at(&self, elapsed: Duration) -> Option<String> {
        let screen = lock(&self.screen);
        let set = screen.set.as_ref()?;
        Some(set.frame_at(elapsed, self.cycle_interval).to_string())
    }
}

impl MessageSink for QrDisplay {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.push(text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pushed_frames_cycle_together() {
        let display = QrDisplay::new(Duration::from_millis(100), 4);
        assert!(display.current_frame().is_none());

        display.push("sign|1|[]".into());
        display.push("sign|2|[]".into());

        assert_eq!(display.frame_at(Duration::ZERO).as_deref(), Some("sign|1|[]"));
        assert_eq!(display.frame_at(Duration::from_millis(150)).as_deref(), Some("sign|2|[]"));
        assert_eq!(display.frame_set().unwrap().len(), 2);
        assert_eq!(display.generation(), 2);
    }

    #[test]
    fn test_show_replaces_set() {
        let display = QrDisplay::new(Duration::from_millis(100), 4);
        display.push("a".into());
        display.push("b".into());
        display.show(QrFrameSet::single("c"));
        assert_eq!(display.frame_set().unwrap().frames(), &["c".to_string()]);
    }

    #[test]
    fn test_max_frames_bound() {
        let display = QrDisplay::new(Duration::from_millis(100), 2);
        for frame in ["a", "b", "c"] {
            display.send_text(frame.to_string()).unwrap();
        }
        assert_eq!(
            display.frame_set().unwrap().frames(),
            &["b".to_string(), "c".to_string()]
        );
        display.clear();
        assert!(display.current_frame().is_none());
    }
}
