use crate::definition::Definition;
use crate::types::{EventName, EventRecord, State};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FsmError {
    #[error("event {event} inappropriate in current state {state}")]
    InappropriateEvent { event: String, state: String },
}

/// A running instance of a machine [`Definition`].
pub struct StateMachine {
    definition: Arc<Definition>,
    current: State,
}

impl StateMachine {
    pub fn new(definition: Arc<Definition>) -> Self {
        let current = definition.initial().clone();
        Self {
            definition,
            current,
        }
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    pub fn current(&self) -> &State {
        &self.current
    }

    pub fn is(&self, state: &State) -> bool {
        &self.current == state
    }

    /// Move directly to `state` without firing any callbacks.
    pub fn set_state(&mut self, state: State) {
        self.current = state;
    }

    pub fn can(&self, event: &EventName) -> bool {
        self.definition.transition(event, &self.current).is_some()
    }

    pub fn cannot(&self, event: &EventName) -> bool {
        !self.can(event)
    }

    pub fn available_transitions(&self) -> Vec<EventName> {
        self.definition.available_transitions(&self.current)
    }

    /// Fire `event`, running callbacks in declaration order:
    /// before(event), before(any), leave(src), leave(any), move,
    /// enter(dst), enter(any), after(event), after(any).
    ///
    /// If no transition exists the state is left untouched. Once the
    /// transition is resolved it always commits; callbacks may stash an
    /// error in the record but cannot abort.
    pub fn fire(
        &mut self,
        event: impl Into<EventName>,
        args: Vec<serde_json::Value>,
    ) -> Result<(), FsmError> {
        let event = event.into();
        let dst = self
            .definition
            .transition(&event, &self.current)
            .cloned()
            .ok_or_else(|| FsmError::InappropriateEvent {
                event: event.to_string(),
                state: self.current.to_string(),
            })?;

        let src = self.current.clone();
        let mut record = EventRecord {
            event: event.clone(),
            src: src.clone(),
            dst: dst.clone(),
            args,
            err: None,
        };

        if let Some(cb) = self.definition.before_callback_for_event(&event) {
            cb(&mut record);
        }
        if let Some(cb) = self.definition.before_callback_all_events() {
            cb(&mut record);
        }
        if let Some(cb) = self.definition.leave_callback_for_state(&src) {
            cb(&mut record);
        }
        if let Some(cb) = self.definition.leave_callback_all_states() {
            cb(&mut record);
        }

        self.current = dst.clone();
        debug!(event = %event, from = %src, to = %dst, "fsm transition");

        if let Some(cb) = self.definition.enter_callback_for_state(&dst) {
            cb(&mut record);
        }
        if let Some(cb) = self.definition.enter_callback_all_states() {
            cb(&mut record);
        }
        if let Some(cb) = self.definition.after_callback_for_event(&event) {
            cb(&mut record);
        }
        if let Some(cb) = self.definition.after_callback_all_events() {
            cb(&mut record);
        }

        if let Some(err) = record.err {
            warn!(event = %event, error = %err, "fsm callback reported error");
        }
        Ok(())
    }
}
