//! Resident memory measurement for the analysis and export memory ceilings.

use sysinfo::{Pid, System};

const MB: u64 = 1024 * 1024;

/// Reports the current process's resident memory.
pub trait MemoryProbe: Send + Sync {
    /// Resident bytes, or `None` when the platform cannot tell.
    fn resident_bytes(&self) -> Option<u64>;

    fn resident_mb(&self) -> Option<u64> {
        self.resident_bytes().map(|b| b / MB)
    }
}

/// Probe backed by `sysinfo`.
pub struct ProcessMemory {
    pid: Option<Pid>,
}

impl ProcessMemory {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| tracing::warn!("Cannot determine process id, memory checks disabled: {e}"))
            .ok();
        Self { pid }
    }
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemory {
    fn resident_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = System::new();
        system.refresh_process(pid);
        system.process(pid).map(|p| p.memory())
    }
}

/// Checks resident memory against a ceiling at a fixed frame cadence.
pub struct MemoryGuard<'a> {
    probe: &'a dyn MemoryProbe,
    limit_mb: u64,
    interval: usize,
}

impl<'a> MemoryGuard<'a> {
    pub fn new(probe: &'a dyn MemoryProbe, limit_mb: u64, interval: usize) -> Self {
        Self {
            probe,
            limit_mb,
            interval: interval.max(1),
        }
    }

    /// Whether a check is due after `processed` frames.
    pub fn due(&self, processed: usize) -> bool {
        processed > 0 && processed % self.interval == 0
    }

    /// Current usage in megabytes when it exceeds the ceiling.
    pub fn over_limit(&self) -> Option<u64> {
        let used = self.probe.resident_mb()?;
        (used > self.limit_mb).then_some(used)
    }

    pub fn limit_mb(&self) -> u64 {
        self.limit_mb
    }
}

/// Probe returning a constant, for driving memory-pressure paths.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemory(pub u64);

impl MemoryProbe for FixedMemory {
    fn resident_bytes(&self) -> Option<u64> {
        Some(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_memory_reports_something() {
        let probe = ProcessMemory::new();
        assert!(probe.resident_bytes().is_some_and(|b| b > 0));
    }

    #[test]
    fn test_guard_cadence() {
        let probe = FixedMemory(0);
        let guard = MemoryGuard::new(&probe, 100, 8);
        assert!(!guard.due(0));
        assert!(!guard.due(7));
        assert!(guard.due(8));
        assert!(guard.due(16));
    }

    #[test]
    fn test_guard_over_limit() {
        let probe = FixedMemory(900 * MB);
        assert_eq!(MemoryGuard::new(&probe, 800, 1).over_limit(), Some(900));
        assert_eq!(MemoryGuard::new(&probe, 1000, 1).over_limit(), None);
    }
}
