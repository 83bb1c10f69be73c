use std::fmt;
use std::sync::Arc;

/// A named machine state.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct State(String);

impl State {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for State {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for State {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The name of an event that can drive a transition.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct EventName(String);

impl EventName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EventName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event declaration: firing `name` in any of `src` moves to `dst`.
#[derive(Clone, Debug)]
pub struct EventDesc {
    pub name: EventName,
    pub src: Vec<State>,
    pub dst: State,
}

impl EventDesc {
    pub fn new(name: &str, src: &[&str], dst: &str) -> Self {
        Self {
            name: name.into(),
            src: src.iter().map(|s| (*s).into()).collect(),
            dst: dst.into(),
        }
    }
}

/// What a callback sees when it fires. Callbacks may stash an error but
/// cannot abort a transition that has been resolved.
#[derive(Clone, Debug)]
pub struct EventRecord {
    pub event: EventName,
    pub src: State,
    pub dst: State,
    pub args: Vec<serde_json::Value>,
    pub err: Option<String>,
}

/// A situation callback.
pub type Callback = Arc<dyn Fn(&mut EventRecord) + Send + Sync>;
