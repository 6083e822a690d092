//! Host contract: what a suspended engine asks for and how it is answered
//!
//! The engine never blocks. When it needs something only the host can supply
//! (a line of input, a key, somewhere to put a save file) it stops and returns
//! a [`HostRequest`] from [`Engine::run`](super::engine::Engine::run). The
//! host answers with a matching [`HostReply`] through
//! [`Engine::resume_after_wait`](super::engine::Engine::resume_after_wait).
//!
//! Requests the host has not declared in [`Capabilities`] are answered by the
//! engine itself, without suspending.

use crate::opcodes::machine::DelayedStore;
use crate::opcodes::operands::StoreOperand;

/// Something the engine is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    ReadLine { max_len: u32 },
    ReadKey,
    /// Persist this Quetzal snapshot
    Save(Vec<u8>),
    /// Supply a previously saved snapshot
    Load,
    SaveUndo(Vec<u8>),
    RestoreUndo,
}

/// The host's answer to a [`HostRequest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostReply {
    Line(Option<String>),
    Key(Option<char>),
    Saved(bool),
    Loaded(Option<Vec<u8>>),
    UndoSaved(bool),
    UndoLoaded(Option<Vec<u8>>),
}

/// Which requests the host is prepared to answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub line_input: bool,
    pub key_input: bool,
    pub save: bool,
    pub load: bool,
    /// Route undo to the host instead of the built-in history
    pub undo: bool,
}

impl Capabilities {
    /// Line and key input plus save files; undo stays built in
    pub fn interactive() -> Self {
        Capabilities {
            line_input: true,
            key_input: true,
            save: true,
            load: true,
            undo: false,
        }
    }
}

/// Result of running until the engine cannot continue on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Halted,
    Waiting(HostRequest),
}

/// Engine-side record of an outstanding request
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Awaiting {
    Line {
        buffer: u32,
        size: u32,
        stores: Vec<StoreOperand>,
    },
    Key {
        stores: Vec<StoreOperand>,
    },
    Save(DelayedStore),
    Restore(DelayedStore),
    SaveUndo(DelayedStore),
    RestoreUndo(DelayedStore),
}
