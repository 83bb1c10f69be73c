use crate::types::{Callback, EventDesc, EventName, State};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) enum CallbackKind {
    BeforeEvent,
    LeaveState,
    EnterState,
    AfterEvent,
}

/// Key for a registered callback. An empty target is the all-events /
/// all-states wildcard for its kind.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) struct CallbackKey {
    pub target: String,
    pub kind: CallbackKind,
}

/// An immutable FSM definition: initial state, transition table and
/// situation callbacks. Build one with [`Definition::new`] (string-keyed
/// callback map, kept for compatibility with declarative tables) or with
/// [`crate::DefinitionBuilder`] (explicit situations).
pub struct Definition {
    initial: State,
    transitions: HashMap<(EventName, State), State>,
    pub(crate) callbacks: HashMap<CallbackKey, Callback>,
}

impl Definition {
    /// Define an FSM from events and a string-keyed callback map.
    ///
    /// Callback keys are parsed as:
    ///
    /// 1. `before_<EVENT>` - before the named event
    /// 2. `before_event` - before all events
    /// 3. `leave_<STATE>` - before leaving the named state
    /// 4. `leave_state` - before leaving all states
    /// 5. `enter_<STATE>` - after entering the named state
    /// 6. `enter_state` - after entering all states
    /// 7. `after_<EVENT>` - after the named event
    /// 8. `after_event` - after all events
    ///
    /// A bare state name is shorthand for `enter_<STATE>`, a bare event
    /// name for `after_<EVENT>`. Keys that resolve to neither a known
    /// state nor a known event are dropped.
    pub fn new(
        initial: State,
        events: Vec<EventDesc>,
        callbacks: HashMap<String, Callback>,
    ) -> Self {
        let mut transitions = HashMap::new();
        let mut all_events: HashSet<String> = HashSet::new();
        let mut all_states: HashSet<String> = HashSet::new();

        for event in &events {
            for src in &event.src {
                transitions.insert((event.name.clone(), src.clone()), event.dst.clone());
                all_states.insert(src.as_str().to_string());
            }
            all_states.insert(event.dst.as_str().to_string());
            all_events.insert(event.name.as_str().to_string());
        }

        let mut parsed = HashMap::new();
        for (name, callback) in callbacks {
            let resolved = parse_callback_key(&name, &all_events, &all_states);
            if let Some(key) = resolved {
                parsed.insert(key, callback);
            }
        }

        Self {
            initial,
            transitions,
            callbacks: parsed,
        }
    }

    pub(crate) fn from_parts(
        initial: State,
        events: Vec<EventDesc>,
        callbacks: HashMap<CallbackKey, Callback>,
    ) -> Self {
        let mut def = Self::new(initial, events, HashMap::new());
        def.callbacks = callbacks;
        def
    }

    /// The initial state of this machine definition.
    pub fn initial(&self) -> &State {
        &self.initial
    }

    /// The destination state for firing `event` in `src`, if the
    /// transition exists.
    pub fn transition(&self, event: &EventName, src: &State) -> Option<&State> {
        self.transitions.get(&(event.clone(), src.clone()))
    }

    pub fn leave_callback_for_state(&self, src: &State) -> Option<&Callback> {
        self.lookup(src.as_str(), CallbackKind::LeaveState)
    }

    pub fn leave_callback_all_states(&self) -> Option<&Callback> {
        self.lookup("", CallbackKind::LeaveState)
    }

    pub fn enter_callback_for_state(&self, dst: &State) -> Option<&Callback> {
        self.lookup(dst.as_str(), CallbackKind::EnterState)
    }

    pub fn enter_callback_all_states(&self) -> Option<&Callback> {
        self.lookup("", CallbackKind::EnterState)
    }

    pub fn before_callback_for_event(&self, event: &EventName) -> Option<&Callback> {
        self.lookup(event.as_str(), CallbackKind::BeforeEvent)
    }

    pub fn before_callback_all_events(&self) -> Option<&Callback> {
        self.lookup("", CallbackKind::BeforeEvent)
    }

    pub fn after_callback_for_event(&self, event: &EventName) -> Option<&Callback> {
        self.lookup(event.as_str(), CallbackKind::AfterEvent)
    }

    pub fn after_callback_all_events(&self) -> Option<&Callback> {
        self.lookup("", CallbackKind::AfterEvent)
    }

    /// Event names that can fire from `state`.
    pub fn available_transitions(&self, state: &State) -> Vec<EventName> {
        let mut events: Vec<EventName> = self
            .transitions
            .keys()
            .filter(|(_, src)| src == state)
            .map(|(event, _)| event.clone())
            .collect();
        events.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        events.dedup();
        events
    }

    fn lookup(&self, target: &str, kind: CallbackKind) -> Option<&Callback> {
        self.callbacks.get(&CallbackKey {
            target: target.to_string(),
            kind,
        })
    }
}

fn parse_callback_key(
    name: &str,
    all_events: &HashSet<String>,
    all_states: &HashSet<String>,
) -> Option<CallbackKey> {
    if let Some(target) = name.strip_prefix("before_") {
        if target == "event" {
            return Some(CallbackKey {
                target: String::new(),
                kind: CallbackKind::BeforeEvent,
            });
        }
        if all_events.contains(target) {
            return Some(CallbackKey {
                target: target.to_string(),
                kind: CallbackKind::BeforeEvent,
            });
        }
        return None;
    }
    if let Some(target) = name.strip_prefix("leave_") {
        if target == "state" {
            return Some(CallbackKey {
                target: String::new(),
                kind: CallbackKind::LeaveState,
            });
        }
        if all_states.contains(target) {
            return Some(CallbackKey {
                target: target.to_string(),
                kind: CallbackKind::LeaveState,
            });
        }
        return None;
    }
    if let Some(target) = name.strip_prefix("enter_") {
        if target == "state" {
            return Some(CallbackKey {
                target: String::new(),
                kind: CallbackKind::EnterState,
            });
        }
        if all_states.contains(target) {
            return Some(CallbackKey {
                target: target.to_string(),
                kind: CallbackKind::EnterState,
            });
        }
        return None;
    }
    if let Some(target) = name.strip_prefix("after_") {
        if target == "event" {
            return Some(CallbackKey {
                target: String::new(),
                kind: CallbackKind::AfterEvent,
            });
        }
        if all_events.contains(target) {
            return Some(CallbackKey {
                target: target.to_string(),
                kind: CallbackKind::AfterEvent,
            });
        }
        return None;
    }
    // Shorthand: a state name means enter_<state>, an event name means
    // after_<event>.
    if all_states.contains(name) {
        return Some(CallbackKey {
            target: name.to_string(),
            kind: CallbackKind::EnterState,
        });
    }
    if all_events.contains(name) {
        return Some(CallbackKey {
            target: name.to_string(),
            kind: CallbackKind::AfterEvent,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventRecord;
    use std::sync::Arc;

    fn noop() -> Callback {
        Arc::new(|_: &mut EventRecord| {})
    }

    fn sample_events() -> Vec<EventDesc> {
        vec![
            EventDesc::new("open", &["closed"], "opened"),
            EventDesc::new("close", &["opened", "ajar"], "closed"),
        ]
    }

    #[test]
    fn test_transition_table() {
        let def = Definition::new("closed".into(), sample_events(), HashMap::new());
        assert_eq!(def.initial().as_str(), "closed");
        assert_eq!(
            def.transition(&"open".into(), &"closed".into()),
            Some(&"opened".into())
        );
        assert_eq!(
            def.transition(&"close".into(), &"ajar".into()),
            Some(&"closed".into())
        );
        assert_eq!(def.transition(&"open".into(), &"opened".into()), None);
    }

    #[test]
    fn test_callback_key_parsing() {
        let mut callbacks: HashMap<String, Callback> = HashMap::new();
        callbacks.insert("before_open".into(), noop());
        callbacks.insert("before_event".into(), noop());
        callbacks.insert("leave_closed".into(), noop());
        callbacks.insert("leave_state".into(), noop());
        callbacks.insert("enter_opened".into(), noop());
        callbacks.insert("enter_state".into(), noop());
        callbacks.insert("after_close".into(), noop());
        callbacks.insert("after_event".into(), noop());
        // shorthands
        callbacks.insert("opened".into(), noop());
        callbacks.insert("close".into(), noop());
        // unknown target, dropped
        callbacks.insert("before_nothing".into(), noop());

        let def = Definition::new("closed".into(), sample_events(), callbacks);

        assert!(def.before_callback_for_event(&"open".into()).is_some());
        assert!(def.before_callback_all_events().is_some());
        assert!(def.leave_callback_for_state(&"closed".into()).is_some());
        assert!(def.leave_callback_all_states().is_some());
        assert!(def.enter_callback_for_state(&"opened".into()).is_some());
        assert!(def.enter_callback_all_states().is_some());
        assert!(def.after_callback_for_event(&"close".into()).is_some());
        assert!(def.after_callback_all_events().is_some());
        assert!(def.before_callback_for_event(&"nothing".into()).is_none());
    }

    #[test]
    fn test_available_transitions() {
        let def = Definition::new("closed".into(), sample_events(), HashMap::new());
        assert_eq!(
            def.available_transitions(&"opened".into()),
            vec![EventName::from("close")]
        );
        assert_eq!(
            def.available_transitions(&"closed".into()),
            vec![EventName::from("open")]
        );
    }
}
