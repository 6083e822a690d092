//! # Introduction
//!
//! FyreVM-RS runs Glulx story files, the 32-bit bytecode produced by the
//! Inform compilers, with the FyreVM extensions: output multiplexed over named
//! channels and a `fyrecall` opcode for input and host services. A terminal
//! host built with [ratatui](https://docs.rs/ratatui) ships as the `fyrevm`
//! binary.
//!
//! ## Execution pipeline
//!
//! ```text
//! Game file → Image → Engine (decode → handlers) → ChannelOutput → host
//! ```
//!
//! 1. [`image`]: validates the header and holds ROM and RAM.
//! 2. [`opcodes`]: the opcode table, decoder/encoder and opcode semantics.
//! 3. [`interpreter`]: the [`Engine`] with its call frames, printing modes,
//!    saves and the native veneer.
//! 4. [`memory`]: byte regions, the stack and the heap allocator.
//! 5. [`snapshot`]: the Quetzal container and the undo history.
//! 6. [`ui`]: the terminal host; not part of the stable library API.
//!
//! ## Driving the engine
//!
//! [`Engine::start`] runs until the game ends or asks for something. A
//! [`RunState::Waiting`] carries a [`HostRequest`]; answer it with
//! [`Engine::resume_after_wait`].

pub mod config;
pub mod image;
pub mod interpreter;
pub mod memory;
pub mod opcodes;
pub mod snapshot;
pub mod ui;

pub use config::EngineOptions;
pub use interpreter::engine::{Engine, ExecMode, Step};
pub use interpreter::errors::{VmError, VmResult};
pub use interpreter::host::{Capabilities, HostReply, HostRequest, RunState};
pub use interpreter::output::ChannelOutput;
