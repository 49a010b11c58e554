//! Lobbies, their members, and subcommand fan-out
//!
//! A lobby is a fixed slot array behind one lock. Inbound broadcast
//! subcommands are dispatched and fanned out under that lock.

pub mod broadcast;
pub mod dispatch;
pub mod manager;
pub mod player;
pub mod room;

#[cfg(test)]
pub(crate) mod testing;
