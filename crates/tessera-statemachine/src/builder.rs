use crate::definition::{CallbackKey, CallbackKind, Definition};
use crate::types::{Callback, EventDesc, State};
use std::collections::HashMap;

/// Builds a [`Definition`] with explicit callback situations instead of
/// the string-keyed map, so a typo in a callback key is a missing method
/// rather than a silently dropped entry.
pub struct DefinitionBuilder {
    initial: State,
    events: Vec<EventDesc>,
    callbacks: HashMap<CallbackKey, Callback>,
}

impl DefinitionBuilder {
    pub fn new(initial: impl Into<State>) -> Self {
        Self {
            initial: initial.into(),
            events: Vec::new(),
            callbacks: HashMap::new(),
        }
    }

    pub fn event(mut self, name: &str, src: &[&str], dst: &str) -> Self {
        self.events.push(EventDesc::new(name, src, dst));
        self
    }

    pub fn on_before_event(self, name: &str, callback: Callback) -> Self {
        self.insert(name, CallbackKind::BeforeEvent, callback)
    }

    pub fn on_after_event(self, name: &str, callback: Callback) -> Self {
        self.insert(name, CallbackKind::AfterEvent, callback)
    }

    pub fn on_enter_state(self, name: &str, callback: Callback) -> Self {
        self.insert(name, CallbackKind::EnterState, callback)
    }

    pub fn on_leave_state(self, name: &str, callback: Callback) -> Self {
        self.insert(name, CallbackKind::LeaveState, callback)
    }

    pub fn before_any_event(self, callback: Callback) -> Self {
        self.insert("", CallbackKind::BeforeEvent, callback)
    }

    pub fn after_any_event(self, callback: Callback) -> Self {
        self.insert("", CallbackKind::AfterEvent, callback)
    }

    pub fn enter_any_state(self, callback: Callback) -> Self {
        self.insert("", CallbackKind::EnterState, callback)
    }

    pub fn leave_any_state(self, callback: Callback) -> Self {
        self.insert("", CallbackKind::LeaveState, callback)
    }

    pub fn build(self) -> Definition {
        Definition::from_parts(self.initial, self.events, self.callbacks)
    }

    fn insert(mut self, target: &str, kind: CallbackKind, callback: Callback) -> Self {
        self.callbacks.insert(
            CallbackKey {
                target: target.to_string(),
                kind,
            },
            callback,
        );
        self
    }
}
