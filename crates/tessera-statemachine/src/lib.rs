//! Declarative finite-state machines.
//!
//! A [`Definition`] is an immutable triple of initial state, transition
//! table and situation callbacks; a [`StateMachine`] wraps one with a
//! current state. Definitions come from the string-keyed constructor
//! (compatibility with declarative tables) or from [`DefinitionBuilder`]
//! with explicit callback situations.

pub mod builder;
pub mod definition;
pub mod machine;
pub mod types;

pub use builder::DefinitionBuilder;
pub use definition::Definition;
pub use machine::{FsmError, StateMachine};
pub use types::{Callback, EventDesc, EventName, EventRecord, State};
