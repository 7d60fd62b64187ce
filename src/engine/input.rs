//! Participant input: a timestamped event queue feeding the engine.

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::model::StateId;

/// A single user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Pointer click on a state node, or on the background (`None`).
    Click(Option<StateId>),
    MouseEnter(StateId),
    MouseLeave(StateId),
    Key(char),
    /// The on-screen continue button.
    Button,
}

/// An input stamped with when it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub at: Instant,
    pub input: Input,
}

/// Cloneable sender side of an engine's input queue.
///
/// Every method returns `false` once the engine is gone.
#[derive(Debug, Clone)]
pub struct InputHandle {
    tx: mpsc::UnboundedSender<InputEvent>,
}

impl InputHandle {
    pub fn send(&self, input: Input) -> bool {
        self.tx.send(InputEvent { at: Instant::now(), input }).is_ok()
    }

    pub fn click(&self, state: impl Into<StateId>) -> bool {
        self.send(Input::Click(Some(state.into())))
    }

    pub fn click_background(&self) -> bool {
        self.send(Input::Click(None))
    }

    pub fn hover(&self, state: impl Into<StateId>) -> bool {
        self.send(Input::MouseEnter(state.into()))
    }

    pub fn unhover(&self, state: impl Into<StateId>) -> bool {
        self.send(Input::MouseLeave(state.into()))
    }

    pub fn key(&self, key: char) -> bool {
        self.send(Input::Key(key))
    }

    pub fn press_button(&self) -> bool {
        self.send(Input::Button)
    }
}

pub(crate) fn channel() -> (InputHandle, mpsc::UnboundedReceiver<InputEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InputHandle { tx }, rx)
}
