//! Track selection for `load_track`
//!
//! `load_track` takes no argument: the backend asks its picker which file
//! to load. A desktop shell would show a file dialog; the CLI queues the
//! path typed by the user.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;

pub trait TrackPicker: Send + Sync {
    /// Next file to load, `None` when the user selected nothing
    fn pick(&self) -> Option<PathBuf>;
}

/// FIFO of paths handed out one per `pick`
#[derive(Debug, Default)]
pub struct QueuedPicker {
    queue: Mutex<VecDeque<PathBuf>>,
}

impl QueuedPicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, path: impl Into<PathBuf>) {
        self.queue.lock().push_back(path.into());
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl TrackPicker for QueuedPicker {
    fn pick(&self) -> Option<PathBuf> {
        self.queue.lock().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let picker = QueuedPicker::new();
        assert!(picker.pick().is_none());
        picker.push("a.mid");
        picker.push("b.mid");
        assert_eq!(picker.len(), 2);
        assert_eq!(picker.pick(), Some(PathBuf::from("a.mid")));
        assert_eq!(picker.pick(), Some(PathBuf::from("b.mid")));
        assert!(picker.is_empty());
    }
}
