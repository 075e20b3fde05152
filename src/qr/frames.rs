//! Frame sets shown on screen.

use std::time::Duration;

/// Ordered, non-empty list of wire messages displayed together, one QR
/// code per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrFrameSet {
    frames: Vec<String>,
}

impl QrFrameSet {
    /// Returns `None` for an empty list.
    pub fn new(frames: Vec<String>) -> Option<Self> {
        if frames.is_empty() {
            None
        } else {
            Some(Self { frames })
        }
    }

    pub fn single(frame: impl Into<String>) -> Self {
        Self {
            frames: vec![frame.into()],
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false: a set holds at least one frame.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame(&self, index: usize) -> Option<&str> {
        self.frames.get(index).map(String::as_str)
    }

    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    /// Frame on screen `elapsed` after the set was shown, cycling every
    /// `interval`.
    pub fn frame_at(&self, elapsed: Duration, interval: Duration) -> &str {
        let index = if interval.is_zero() {
            0
        } else {
            (elapsed.as_nanos() / interval.as_nanos()) as usize % self.frames.len()
        };
        &self.frames[index]
    }

    /// A copy with `frame` appended, keeping only the newest `max_frames`.
    pub fn with_frame(&self, frame: String, max_frames: usize) -> Self {
        let mut frames = self.frames.clone();
        frames.push(frame);
        let keep = max_frames.max(1);
        if frames.len() > keep {
            frames.drain(..frames.len() - keep);
        }
        Self { frames }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(frames: &[&str]) -> QrFrameSet {
        QrFrameSet::new(frames.iter().map(|f| f.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_empty_set_rejected() {
        assert!(QrFrameSet::new(Vec::new()).is_none());
    }

    #[test]
    fn test_cycles_through_frames() {
        let frames = set(&["a", "b", "c"]);
        let tick = Duration::from_millis(275);
        assert_eq!(frames.frame_at(Duration::ZERO, tick), "a");
        assert_eq!(frames.frame_at(Duration::from_millis(274), tick), "a");
        assert_eq!(frames.frame_at(Duration::from_millis(275), tick), "b");
        assert_eq!(frames.frame_at(Duration::from_millis(600), tick), "c");
        assert_eq!(frames.frame_at(Duration::from_millis(825), tick), "a");
    }

    #[test]
    fn test_single_frame_never_changes() {
        let frames = QrFrameSet::single("|2|[]");
        assert_eq!(frames.frame_at(Duration::from_secs(60), Duration::from_millis(275)), "|2|[]");
    }

    #[test]
    fn test_with_frame_keeps_newest() {
        let frames = set(&["a", "b"]).with_frame("c".into(), 2);
        assert_eq!(frames.frames(), &["b".to_string(), "c".to_string()]);
    }
}
