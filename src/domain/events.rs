use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use strum::Display;
use tracing::{info, warn};

/// Events the charge controller reports to the log collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum EventKind {
    #[strum(serialize = "over-volt")]
    OverVolt,
    #[strum(serialize = "under-volt")]
    UnderVolt,
    #[strum(serialize = "manual-on")]
    ManualOn,
    #[strum(serialize = "manual-off")]
    ManualOff,
    #[strum(serialize = "charged")]
    Charged,
    #[strum(serialize = "discharged")]
    Discharged,
    #[strum(serialize = "shunt-on")]
    ShuntOn,
    #[strum(serialize = "shunt-off")]
    ShuntOff,
    #[strum(serialize = "new-hour-max")]
    NewHourMax,
    #[strum(serialize = "new-day-max")]
    NewDayMax,
    #[strum(serialize = "new-hour-min")]
    NewHourMin,
    #[strum(serialize = "new-day-min")]
    NewDayMin,
    #[strum(serialize = "leak-adjust")]
    LeakAdjust,
    #[strum(serialize = "idle-adjust")]
    IdleAdjust,
}

impl EventKind {
    /// Record code used by the datalogger
    pub fn code(self) -> u8 {
        match self {
            EventKind::OverVolt => 0x01,
            EventKind::UnderVolt => 0x02,
            EventKind::ManualOn => 0x03,
            EventKind::ManualOff => 0x04,
            EventKind::Charged => 0x05,
            EventKind::Discharged => 0x06,
            EventKind::ShuntOn => 0x07,
            EventKind::ShuntOff => 0x08,
            EventKind::NewHourMax => 0x0a,
            EventKind::NewDayMax => 0x0b,
            EventKind::NewHourMin => 0x0c,
            EventKind::NewDayMin => 0x0d,
            EventKind::LeakAdjust => 0x0e,
            EventKind::IdleAdjust => 0x0f,
        }
    }
}

/// Flag OR-ed into the record code when the action behind the event failed
pub const ERROR_FLAG: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    /// The relay did not reach the requested state
    pub failed: bool,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self { kind, failed: false }
    }

    pub fn failed(kind: EventKind) -> Self {
        Self { kind, failed: true }
    }

    pub fn code(&self) -> u8 {
        if self.failed {
            self.kind.code() | ERROR_FLAG
        } else {
            self.kind.code()
        }
    }
}

/// Fire-and-forget sink for controller events
pub trait EventLog {
    fn emit(&mut self, event: Event);
}

/// In-process event log: traces every event and keeps a bounded history for
/// the UI and datalogger to drain.
pub struct EventJournal {
    events: VecDeque<(DateTime<Utc>, Event)>,
    max_history: usize,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(max_history: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_history.min(1024)),
            max_history: max_history.max(1),
        }
    }

    /// The most recent `count` events, oldest first
    pub fn recent(&self, count: usize) -> Vec<(DateTime<Utc>, Event)> {
        let start = self.events.len().saturating_sub(count);
        self.events.iter().skip(start).cloned().collect()
    }

    /// Kinds of every event still held, oldest first
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.iter().map(|(_, e)| e.kind).collect()
    }

    pub fn contains(&self, event: Event) -> bool {
        self.events.iter().any(|(_, e)| *e == event)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog for EventJournal {
    fn emit(&mut self, event: Event) {
        if event.failed {
            warn!(event = %event.kind, code = event.code(), "controller event (action failed)");
        } else {
            info!(event = %event.kind, code = event.code(), "controller event");
        }

        self.events.push_back((Utc::now(), event));
        if self.events.len() > self.max_history {
            self.events.pop_front();
        }
    }
}
