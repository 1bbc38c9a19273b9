//! Shared fixtures for unit tests.

use std::sync::Mutex;

use crate::hook::{CallContext, CallSite, Observer, TargetDescriptor, ValueCarrier};

// The method most tests intercept: `Core.Player::TakeDamage(int)` in `Game.dll`.
pub fn damage_target() -> TargetDescriptor {
    TargetDescriptor::new("Game.dll", "Core", "Player", "TakeDamage", 1)
}

pub fn damage_site() -> CallSite<'static> {
    CallSite::new("Game.dll", "Core", "Player", "TakeDamage", 1)
}

// Tests that share the global registry need keys no other test touches.
pub fn unique_target(method: &str) -> TargetDescriptor {
    TargetDescriptor::new("Tests.dll", "Hybrid.Tests", "Fixture", method, 0)
}

/// One notification seen by a [`RecordingObserver`], decoded as `int32`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Enter { call_id: u64, args: Vec<i32> },
    Exit { call_id: u64, ret: Option<i32> },
}

/// Observer that records every notification it receives.
pub struct RecordingObserver {
    target: TargetDescriptor,
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn new(target: TargetDescriptor) -> Self {
        Self {
            target,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl Observer for RecordingObserver {
    fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    fn on_enter(&self, call: &CallContext<'_>, args: &[ValueCarrier]) {
        self.events.lock().unwrap().push(Event::Enter {
            call_id: call.call_id(),
            args: args.iter().map(ValueCarrier::as_i32).collect(),
        });
    }

    fn on_exit(&self, call: &CallContext<'_>, ret: Option<&ValueCarrier>) {
        self.events.lock().unwrap().push(Event::Exit {
            call_id: call.call_id(),
            ret: ret.map(ValueCarrier::as_i32),
        });
    }
}
