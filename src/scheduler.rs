use crate::state::WarningKind;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Seven looping processes plus at most a couple of pending warning clears
const MAX_PENDING_TICKS: usize = 16;

/// One of the simulator's animation processes, or the one-shot that ends a
/// warning pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Process {
    Speed,
    Rpm,
    WarningPulse,
    WarningClear(WarningKind),
    Temperature,
    Odometer,
    Tanks,
    Battery,
}

impl Process {
    /// Self-rescheduling processes, in the order they are launched.
    pub const LOOPS: [Process; 7] = [
        Process::Speed,
        Process::Rpm,
        Process::WarningPulse,
        Process::Temperature,
        Process::Odometer,
        Process::Tanks,
        Process::Battery,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTick {
    pub process: Process,
    pub execution_time: u64,
    pub scheduled_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerStats {
    pub total_scheduled: u64,
    pub total_fired: u64,
    pub total_cancelled: u64,
    pub currently_scheduled: u8,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Tick queue full, dropping {0:?}")]
    QueueFull(Process),
}

/// Time-ordered queue of pending ticks.
///
/// Ticks due at the same instant fire in the order they were scheduled.
#[derive(Debug)]
pub struct TickScheduler {
    pending: Vec<ScheduledTick, MAX_PENDING_TICKS>,
    stats: SchedulerStats,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            stats: SchedulerStats::default(),
        }
    }

    pub fn schedule(&mut self, process: Process, execution_time: u64, current_time: u64) -> Result<(), SchedulerError> {
        let tick = ScheduledTick {
            process,
            execution_time,
            scheduled_at: current_time,
        };

        if self.pending.push(tick).is_err() {
            return Err(SchedulerError::QueueFull(process));
        }

        // Stable sort keeps insertion order among equal execution times
        self.pending.sort_by_key(|tick| tick.execution_time);

        self.stats.total_scheduled += 1;
        self.stats.currently_scheduled = self.pending.len() as u8;

        Ok(())
    }

    /// Removes and returns the earliest tick due at or before `current_time`.
    pub fn pop_due(&mut self, current_time: u64) -> Option<ScheduledTick> {
        match self.pending.first() {
            Some(tick) if tick.execution_time <= current_time => {}
            _ => return None,
        }

        let tick = self.pending.remove(0);
        self.stats.total_fired += 1;
        self.stats.currently_scheduled = self.pending.len() as u8;
        Some(tick)
    }

    pub fn next_due(&self) -> Option<u64> {
        self.pending.first().map(|tick| tick.execution_time)
    }

    /// Cancels every pending tick.
    pub fn clear_all(&mut self) {
        let cleared_count = self.pending.len();
        self.pending.clear();
        self.stats.total_cancelled += cleared_count as u64;
        self.stats.currently_scheduled = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn get_pending(&self) -> &[ScheduledTick] {
        &self.pending
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_creation() {
        let scheduler = TickScheduler::new();
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.get_stats().total_scheduled, 0);
        assert_eq!(scheduler.next_due(), None);
    }

    #[test]
    fn test_future_tick_not_due() {
        let mut scheduler = TickScheduler::new();
        scheduler.schedule(Process::Odometer, 1000, 0).unwrap();

        assert!(scheduler.pop_due(999).is_none());

        let tick = scheduler.pop_due(1000).unwrap();
        assert_eq!(tick.process, Process::Odometer);
        assert_eq!(tick.scheduled_at, 0);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_ticks_fire_in_time_order() {
        let mut scheduler = TickScheduler::new();
        scheduler.schedule(Process::Battery, 500, 0).unwrap();
        scheduler.schedule(Process::Rpm, 100, 0).unwrap();
        scheduler.schedule(Process::Speed, 16, 0).unwrap();

        let order: std::vec::Vec<Process> =
            std::iter::from_fn(|| scheduler.pop_due(1000)).map(|t| t.process).collect();
        assert_eq!(order, vec![Process::Speed, Process::Rpm, Process::Battery]);
    }

    #[test]
    fn test_simultaneous_ticks_keep_schedule_order() {
        let mut scheduler = TickScheduler::new();
        for process in Process::LOOPS {
            scheduler.schedule(process, 0, 0).unwrap();
        }

        let order: std::vec::Vec<Process> =
            std::iter::from_fn(|| scheduler.pop_due(0)).map(|t| t.process).collect();
        assert_eq!(order, Process::LOOPS.to_vec());
    }

    #[test]
    fn test_clear_all_cancels_pending() {
        let mut scheduler = TickScheduler::new();
        scheduler.schedule(Process::Tanks, 100, 0).unwrap();
        scheduler.schedule(Process::WarningClear(WarningKind::OilPressure), 2000, 0).unwrap();

        scheduler.clear_all();

        assert!(scheduler.pop_due(u64::MAX).is_none());
        assert_eq!(scheduler.get_stats().total_cancelled, 2);
        assert_eq!(scheduler.get_stats().currently_scheduled, 0);
    }

    #[test]
    fn test_queue_capacity() {
        let mut scheduler = TickScheduler::new();
        for i in 0..MAX_PENDING_TICKS as u64 {
            scheduler.schedule(Process::Speed, i, 0).unwrap();
        }

        assert_eq!(
            scheduler.schedule(Process::Rpm, 0, 0),
            Err(SchedulerError::QueueFull(Process::Rpm))
        );
    }
}
