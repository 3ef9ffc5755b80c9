use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag for one interaction.
///
/// The pipeline checks it at three points: before the generator call, between
/// retry attempts, and before the mutation commit. A commit that has started
/// always runs to completion.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let signal = CancelSignal::new();
        let other = signal.clone();
        assert!(!other.is_cancelled());
        signal.cancel();
        assert!(other.is_cancelled());
    }
}
