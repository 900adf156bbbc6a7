//! Progress of the single in-flight transfer.

use serde::{Deserialize, Serialize};

use super::ids::ModId;

/// Phase of the in-flight transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModProgressState {
    /// Slot acquired, metadata not yet resolved.
    Initializing,
    Downloading,
    Extracting,
    Compressing,
    Uploading,
}

/// Byte counters of one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounter {
    pub current: u64,
    pub total: u64,
}

/// Snapshot of the one transfer currently in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModProgressInfo {
    /// Mod being transferred.
    pub id: ModId,
    /// Current phase.
    pub state: ModProgressState,
    pub download: PhaseCounter,
    pub extract: PhaseCounter,
    pub compress: PhaseCounter,
    pub upload: PhaseCounter,
}

impl ModProgressInfo {
    pub const fn new(id: ModId) -> Self {
        Self {
            id,
            state: ModProgressState::Initializing,
            download: PhaseCounter { current: 0, total: 0 },
            extract: PhaseCounter { current: 0, total: 0 },
            compress: PhaseCounter { current: 0, total: 0 },
            upload: PhaseCounter { current: 0, total: 0 },
        }
    }

    /// Counters of `state`. `Initializing` has none and reports zeroes.
    pub const fn counter(&self, state: ModProgressState) -> PhaseCounter {
        match state {
            ModProgressState::Initializing => PhaseCounter { current: 0, total: 0 },
            ModProgressState::Downloading => self.download,
            ModProgressState::Extracting => self.extract,
            ModProgressState::Compressing => self.compress,
            ModProgressState::Uploading => self.upload,
        }
    }

    const fn counter_mut(&mut self, state: ModProgressState) -> Option<&mut PhaseCounter> {
        match state {
            ModProgressState::Initializing => None,
            ModProgressState::Downloading => Some(&mut self.download),
            ModProgressState::Extracting => Some(&mut self.extract),
            ModProgressState::Compressing => Some(&mut self.compress),
            ModProgressState::Uploading => Some(&mut self.upload),
        }
    }

    /// Enter `state`, resetting its counters.
    pub fn begin_phase(&mut self, state: ModProgressState) {
        self.state = state;
        if let Some(counter) = self.counter_mut(state) {
            *counter = PhaseCounter::default();
        }
    }

    /// Set the expected total of the current phase.
    pub fn set_total(&mut self, total: u64) {
        if let Some(counter) = self.counter_mut(self.state) {
            counter.total = total;
        }
    }

    /// Advance the current phase by `bytes`.
    pub fn add_progress(&mut self, bytes: u64) {
        if let Some(counter) = self.counter_mut(self.state) {
            counter.current = counter.current.saturating_add(bytes);
        }
    }

    /// Current phase completion in `0.0..=1.0`, if the total is known.
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> Option<f64> {
        let c = self.counter(self.state);
        (c.total > 0).then(|| (c.current as f64 / c.total as f64).min(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_counters() {
        let mut p = ModProgressInfo::new(ModId::new(1));
        p.add_progress(10);
        assert_eq!(p.fraction(), None);

        p.begin_phase(ModProgressState::Downloading);
        p.set_total(100);
        p.add_progress(25);
        assert_eq!(p.counter(ModProgressState::Downloading).current, 25);
        assert_eq!(p.fraction(), Some(0.25));

        p.begin_phase(ModProgressState::Extracting);
        assert_eq!(p.counter(ModProgressState::Extracting), PhaseCounter::default());
        assert_eq!(p.counter(ModProgressState::Downloading).current, 25);
    }
}
