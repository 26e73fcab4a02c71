use std::sync::RwLock;

use backbone_core::types::Mode;

/// Process-wide persona selector with a single-writer, lock-free-read shape
/// (spec.md §9 redesign flag: "Mode becomes a value guarded by a
/// single-writer abstraction; reads are lock-free snapshots"). Reads take a
/// read lock and clone immediately; the orchestrator reads mode exactly once
/// at the start of a turn and never mid-turn (spec.md §5 "the process-wide
/// mode is read at the start of a turn and never mid-turn").
pub struct ModeState {
    inner: RwLock<Mode>,
}

impl ModeState {
    pub fn new(initial: Mode) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    pub fn get(&self) -> Mode {
        self.inner.read().unwrap().clone()
    }

    pub fn set(&self, mode: Mode) {
        *self.inner.write().unwrap() = mode;
    }
}

impl Default for ModeState {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_set_then_get_round_trips() {
        let state = ModeState::default();
        state.set(Mode("work".to_string()));
        assert_eq!(state.get(), Mode("work".to_string()));
    }
}
