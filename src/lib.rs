//! Subcommand relay for mixed-revision game lobbies
//!
//! Clients of the current, trial, and binary-compatible revisions share
//! lobbies. Broadcast subcommands from one member update the sender's stored
//! position and are fanned out to the others, with the subcommand type and
//! header rewritten for members on a different revision.

pub mod config;
pub mod lobby;
pub mod net;

pub use lobby::dispatch::{DispatchOptions, Dispatcher};
pub use net::translate::{translate, translate_for, Direction, TranslateError};
