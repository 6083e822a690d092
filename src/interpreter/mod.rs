//! Glulx execution engine
//!
//! This module provides the running VM:
//! - [`engine`]: the [`Engine`](engine::Engine) registers, main loop and operand access
//! - [`calls`]: call frames, call stubs and branches
//! - [`strings`]: printing modes and output systems
//! - [`saves`]: Quetzal save/restore, undo and restart
//! - [`fyrecall`]: FyreVM system calls and the Glk shim
//! - [`veneer`]: native Inform veneer routines
//! - [`host`]: requests and replies exchanged with the host
//! - [`output`]: channel output buffering
//! - [`errors`]: fatal error types
//!
//! # Execution Model
//!
//! The engine runs until the game ends or needs something from the host.
//! Opcode semantics live in [`crate::opcodes::handlers`], written against the
//! [`Machine`](crate::opcodes::machine::Machine) trait that the engine implements.

pub mod calls;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod fyrecall;
pub mod host;
mod machine;
pub mod output;
pub mod saves;
pub mod strings;
pub mod veneer;
