//! Terminal user interface built on [ratatui](https://github.com/ratatui-org/ratatui).
//!
//! The UI is organized into three layers:
//!
//! - **[`app`]**: application state, keyboard event loop, answering host requests
//! - **[`panes`]**: stateless render functions for each visible pane (transcript,
//!   machine, input line, status bars)
//! - **[`theme`]**: centralized color palette used by all panes
//!
//! The entry point for consumers is [`App`]: construct it with an [`Engine`],
//! call [`App::start`], then [`App::run`] to start the event loop.
//!
//! [`Engine`]: crate::interpreter::engine::Engine
//! [`App::start`]: app::App::start
//! [`App::run`]: app::App::run

pub mod app;
pub mod panes;
pub mod theme;

pub use app::App;
