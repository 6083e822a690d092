//! TUI pane rendering modules
//!
//! # Pane Modules
//!
//! - [`transcript`]: game text from the MAIN channel
//! - [`machine`]: VM registers and state
//! - [`input`]: the line the player is typing
//! - [`status`]: location line and status bar with keybindings
//!
//! Each pane module exports a stateless `render_*` function.

pub mod input;
pub mod machine;
pub mod status;
pub mod transcript;

pub use input::render_input_line;
pub use machine::render_machine_pane;
pub use status::{render_location_line, render_status_bar};
pub use transcript::render_transcript_pane;
