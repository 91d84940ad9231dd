//! Control endpoint: a Unix socket speaking newline-delimited
//! s-expressions.  It is the only writer of the drive mode.

pub mod dispatch;
pub mod server;

pub use dispatch::{handle_message, ControlContext, Session};
pub use server::ControlServer;
