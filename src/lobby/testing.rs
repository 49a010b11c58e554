//! Test doubles shared by the lobby tests

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::lobby::player::{ClientHandle, Guildcard};
use crate::net::subcmd::ClientVersion;
use crate::net::transport::{SendError, Transport};

/// Transport that records every frame it is handed
#[derive(Default)]
pub struct RecordingTransport {
    frames: Mutex<Vec<Vec<u8>>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following send fail
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, frame: &[u8]) -> Result<(), SendError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SendError::Closed);
        }
        self.frames.lock().push(frame.to_vec());
        Ok(())
    }
}

pub fn client(guildcard: Guildcard, version: ClientVersion) -> (Arc<ClientHandle>, Arc<RecordingTransport>) {
    let transport = RecordingTransport::new();
    let client = Arc::new(ClientHandle::new(guildcard, version, transport.clone()));
    (client, transport)
}
