//! Test doubles for task actions.
//!
//! These actions are used by the crate's own tests and are public so that
//! downstream graphs can be exercised without real collaborators.

mod mocks;

pub use mocks::{FailingAction, MockAction, RecordedCall, RecordingAction, ScriptedAction, SlowAction};
