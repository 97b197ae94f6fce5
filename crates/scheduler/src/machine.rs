use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Where a watched shadow file sits in its conversion loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    /// A debounce timer is armed. Also reported while a generation runs if another
    /// change is already waiting behind it.
    Scheduled,
    Generating,
    Stopped,
}

/// What the caller should do after the debounce deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDecision {
    /// The deadline moved since the sleep started.
    NotDue,
    /// A generation is still running; the timer was pushed out by one debounce period.
    Rearmed,
    /// Read the pseudocode and start a generation if it differs from the checkpoint.
    Evaluate,
    /// No timer is armed or the file is stopped.
    Ignore,
}

/// Pure debounce and in-flight bookkeeping for one shadow file.
///
/// Holds no handles and does no I/O so every transition can be driven directly in
/// tests with synthetic instants.
#[derive(Debug, Clone)]
pub struct GenerationMachine {
    debounce: Duration,
    deadline: Option<Instant>,
    in_flight: bool,
    stopped: bool,
}

impl GenerationMachine {
    pub const fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            deadline: None,
            in_flight: false,
            stopped: false,
        }
    }

    #[must_use]
    pub const fn debounce(&self) -> Duration {
        self.debounce
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.in_flight
    }

    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        if self.stopped {
            Phase::Stopped
        } else if self.deadline.is_some() {
            Phase::Scheduled
        } else if self.in_flight {
            Phase::Generating
        } else {
            Phase::Idle
        }
    }

    /// (Re)starts the debounce timer. Returns false once stopped.
    pub fn observe_change(&mut self, now: Instant) -> bool {
        if self.stopped {
            return false;
        }
        self.deadline = Some(now + self.debounce);
        true
    }

    pub fn timer_fired(&mut self, now: Instant) -> TimerDecision {
        if self.stopped {
            return TimerDecision::Ignore;
        }
        match self.deadline {
            None => TimerDecision::Ignore,
            Some(deadline) if now < deadline => TimerDecision::NotDue,
            Some(_) if self.in_flight => {
                self.deadline = Some(now + self.debounce);
                TimerDecision::Rearmed
            }
            Some(_) => {
                self.deadline = None;
                TimerDecision::Evaluate
            }
        }
    }

    /// Marks a generation as outstanding. Refused while one already is, or after stop.
    pub fn begin_generation(&mut self) -> bool {
        if self.stopped || self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub fn finish_generation(&mut self) {
        self.in_flight = false;
    }

    pub fn stop(&mut self) {
        self.stopped = true;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DEBOUNCE: Duration = Duration::from_millis(100);

    #[test]
    fn burst_of_changes_moves_the_deadline() {
        let start = Instant::now();
        let mut machine = GenerationMachine::new(DEBOUNCE);
        assert_eq!(machine.phase(), Phase::Idle);

        machine.observe_change(start);
        machine.observe_change(start + Duration::from_millis(60));
        assert_eq!(machine.phase(), Phase::Scheduled);
        assert_eq!(machine.deadline(), Some(start + Duration::from_millis(160)));

        assert_eq!(
            machine.timer_fired(start + Duration::from_millis(100)),
            TimerDecision::NotDue
        );
        assert_eq!(
            machine.timer_fired(start + Duration::from_millis(160)),
            TimerDecision::Evaluate
        );
        assert_eq!(machine.phase(), Phase::Idle);
        assert_eq!(machine.timer_fired(start + DEBOUNCE * 3), TimerDecision::Ignore);
    }

    #[test]
    fn change_while_generating_is_deferred_not_dropped() {
        let start = Instant::now();
        let mut machine = GenerationMachine::new(DEBOUNCE);
        machine.observe_change(start);
        assert_eq!(machine.timer_fired(start + DEBOUNCE), TimerDecision::Evaluate);
        assert!(machine.begin_generation());
        assert_eq!(machine.phase(), Phase::Generating);
        assert!(!machine.begin_generation());

        let edit = start + DEBOUNCE + Duration::from_millis(10);
        machine.observe_change(edit);
        assert_eq!(machine.timer_fired(edit + DEBOUNCE), TimerDecision::Rearmed);
        assert_eq!(machine.deadline(), Some(edit + DEBOUNCE * 2));
        assert_eq!(machine.phase(), Phase::Scheduled);

        machine.finish_generation();
        assert_eq!(
            machine.timer_fired(edit + DEBOUNCE * 2),
            TimerDecision::Evaluate
        );
        assert!(machine.begin_generation());
    }

    #[test]
    fn stop_is_terminal() {
        let start = Instant::now();
        let mut machine = GenerationMachine::new(DEBOUNCE);
        machine.observe_change(start);
        machine.stop();
        assert_eq!(machine.phase(), Phase::Stopped);
        assert_eq!(machine.deadline(), None);
        assert!(!machine.observe_change(start));
        assert!(!machine.begin_generation());
        assert_eq!(machine.timer_fired(start + DEBOUNCE), TimerDecision::Ignore);
    }
}
