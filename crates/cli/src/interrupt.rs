//! When a signal may end a locked command
//!
//! Before a command starts writing snapshots or live files, SIGINT/SIGTERM
//! end the process at once. After [`CriticalSection::enter`], the signal is
//! held until the command reaches its terminal state, so no staged file is
//! left behind and the summary is still printed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared between the signal loop and the command it guards
#[derive(Debug, Clone, Default)]
pub struct CriticalSection {
    entered: Arc<AtomicBool>,
}

impl CriticalSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// From here on, signals wait for the command to finish
    pub fn enter(&self) {
        self.entered.store(true, Ordering::SeqCst);
    }

    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_is_shared_between_clones() {
        let section = CriticalSection::new();
        let command_side = section.clone();
        assert!(!section.is_entered());

        command_side.enter();

        assert!(section.is_entered());
    }
}
