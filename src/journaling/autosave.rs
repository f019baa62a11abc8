use std::time::{Duration, Instant};

use time::OffsetDateTime;

/// The one outstanding delayed write. Arming replaces any earlier deadline,
/// so there is never more than a single live timer.
#[derive(Debug, Clone)]
pub struct DebounceTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancels any pending deadline and schedules a new one. Returns true
    /// when an earlier deadline was superseded.
    pub fn arm(&mut self, now: Instant) -> bool {
        self.deadline.replace(now + self.delay).is_some()
    }

    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarms and returns true once the deadline has been reached.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    Debounced,
    Manual,
    Structural,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveStatus {
    Clean {
        last_saved_at: Option<OffsetDateTime>,
    },
    Dirty {
        since: OffsetDateTime,
    },
    Error {
        message: String,
        occurred_at: OffsetDateTime,
    },
}

impl AutoSaveStatus {
    pub fn is_dirty(&self) -> bool {
        !matches!(self, AutoSaveStatus::Clean { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            AutoSaveStatus::Clean { .. } => "All saved",
            AutoSaveStatus::Dirty { .. } => "Unsaved…",
            AutoSaveStatus::Error { .. } => "Save failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveEvent {
    Saved {
        trigger: SaveTrigger,
        timestamp: OffsetDateTime,
    },
    Error {
        trigger: SaveTrigger,
        message: String,
    },
}

impl AutoSaveEvent {
    pub fn is_saved(&self) -> bool {
        matches!(self, AutoSaveEvent::Saved { .. })
    }

    pub fn trigger(&self) -> SaveTrigger {
        match self {
            AutoSaveEvent::Saved { trigger, .. } | AutoSaveEvent::Error { trigger, .. } => *trigger,
        }
    }
}

/// Dirty tracking plus the debounce timer for tab content. The controller
/// decides *when* to write; the session performs the write.
#[derive(Debug, Clone)]
pub struct AutosaveController {
    timer: DebounceTimer,
    dirty_since: Option<OffsetDateTime>,
    last_saved_at: Option<OffsetDateTime>,
    last_error: Option<AutoSaveFailure>,
}

#[derive(Debug, Clone)]
struct AutoSaveFailure {
    message: String,
    occurred_at: OffsetDateTime,
}

impl AutosaveController {
    pub fn new(debounce: Duration) -> Self {
        Self {
            timer: DebounceTimer::new(debounce),
            dirty_since: None,
            last_saved_at: None,
            last_error: None,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.timer.delay()
    }

    pub fn status(&self) -> AutoSaveStatus {
        if let Some(failure) = &self.last_error {
            return AutoSaveStatus::Error {
                message: failure.message.clone(),
                occurred_at: failure.occurred_at,
            };
        }
        match self.dirty_since {
            Some(since) => AutoSaveStatus::Dirty { since },
            None => AutoSaveStatus::Clean {
                last_saved_at: self.last_saved_at,
            },
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_since.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.timer.is_armed()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Records a content-changing edit: dirty from now on, and the write is
    /// pushed back to a full debounce after this edit.
    pub fn note_edit(&mut self, now: Instant) {
        if self.dirty_since.is_none() {
            self.dirty_since = Some(wall_clock());
        }
        if self.timer.arm(now) {
            tracing::trace!("debounce re-armed");
        }
    }

    /// True when the debounce has elapsed and a write is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        self.timer.fire(now)
    }

    pub fn cancel_pending(&mut self) -> bool {
        self.timer.cancel()
    }

    pub fn mark_saved(&mut self, timestamp: OffsetDateTime) {
        self.dirty_since = None;
        self.last_saved_at = Some(timestamp);
        self.last_error = None;
    }

    /// Failed writes leave the content dirty so the next save retries it.
    pub fn mark_failed(&mut self, message: String) {
        let now = wall_clock();
        if self.dirty_since.is_none() {
            self.dirty_since = Some(now);
        }
        self.last_error = Some(AutoSaveFailure {
            message,
            occurred_at: now,
        });
    }

    /// Resets the indicator without a write (switching tabs). A pending
    /// timer stays armed so the flushed content still reaches the store.
    /// A stale failure is dropped along with the dirty mark; the next write
    /// reports afresh.
    pub fn reset_clean(&mut self) {
        self.dirty_since = None;
        self.last_error = None;
    }
}

pub(crate) fn wall_clock() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(700);

    #[test]
    fn rearming_replaces_the_deadline() {
        let start = Instant::now();
        let mut timer = DebounceTimer::new(DELAY);
        assert!(!timer.arm(start));
        assert!(timer.arm(start + Duration::from_millis(300)));
        assert_eq!(timer.deadline(), Some(start + Duration::from_millis(1000)));
        assert!(!timer.fire(start + Duration::from_millis(999)));
        assert!(timer.fire(start + Duration::from_millis(1000)));
        assert!(!timer.is_armed());
        assert!(!timer.fire(start + Duration::from_millis(5000)));
    }

    #[test]
    fn cancel_disarms() {
        let start = Instant::now();
        let mut timer = DebounceTimer::new(DELAY);
        assert!(!timer.cancel());
        timer.arm(start);
        assert!(timer.cancel());
        assert!(!timer.fire(start + DELAY));
    }

    #[test]
    fn edit_then_save_cycles_status() {
        let start = Instant::now();
        let mut autosave = AutosaveController::new(DELAY);
        assert_eq!(autosave.status(), AutoSaveStatus::Clean { last_saved_at: None });

        autosave.note_edit(start);
        assert!(autosave.is_dirty());
        assert_eq!(autosave.status().label(), "Unsaved…");
        assert!(!autosave.poll(start + Duration::from_millis(699)));
        assert!(autosave.poll(start + DELAY));

        let stamp = OffsetDateTime::UNIX_EPOCH;
        autosave.mark_saved(stamp);
        assert_eq!(
            autosave.status(),
            AutoSaveStatus::Clean {
                last_saved_at: Some(stamp)
            }
        );
    }

    #[test]
    fn failure_keeps_content_dirty_until_saved() {
        let mut autosave = AutosaveController::new(DELAY);
        autosave.mark_failed("disk full".into());
        assert!(autosave.is_dirty());
        assert!(matches!(autosave.status(), AutoSaveStatus::Error { ref message, .. } if message == "disk full"));
        autosave.mark_saved(OffsetDateTime::UNIX_EPOCH);
        assert!(!autosave.status().is_dirty());
    }

    #[test]
    fn reset_clean_keeps_timer_armed() {
        let start = Instant::now();
        let mut autosave = AutosaveController::new(DELAY);
        autosave.note_edit(start);
        autosave.reset_clean();
        assert!(!autosave.is_dirty());
        assert!(autosave.has_pending());
    }

    #[test]
    fn reset_clean_drops_a_stale_failure() {
        let mut autosave = AutosaveController::new(DELAY);
        autosave.mark_failed("disk full".into());
        autosave.reset_clean();
        assert!(!autosave.is_dirty());
        assert_eq!(autosave.status(), AutoSaveStatus::Clean { last_saved_at: None });
    }
}
