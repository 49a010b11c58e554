use std::net::{IpAddr, Ipv4Addr};

use crate::lobby::dispatch::DispatchOptions;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the relay to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Maximum number of concurrent lobbies
    pub max_lobbies: usize,
    /// Slots per lobby
    pub lobby_capacity: usize,
    /// Broadcast finish-load frames after the position resend
    pub broadcast_finish_load: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 5278,
            max_lobbies: 20,
            lobby_capacity: 12,
            broadcast_finish_load: true,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.port = parsed,
                Ok(_) => tracing::warn!("PORT must be > 0, using default"),
                Err(_) => tracing::warn!("Invalid PORT '{}', using default", port),
            }
        }

        if let Ok(max_lobbies) = std::env::var("MAX_LOBBIES") {
            match max_lobbies.parse::<usize>() {
                Ok(parsed) if parsed > 0 && parsed <= 10000 => config.max_lobbies = parsed,
                Ok(_) => tracing::warn!("MAX_LOBBIES must be 1-10000, using default"),
                Err(_) => tracing::warn!("Invalid MAX_LOBBIES '{}', using default", max_lobbies),
            }
        }

        if let Ok(capacity) = std::env::var("LOBBY_CAPACITY") {
            // Slot indices travel as a single byte
            match capacity.parse::<usize>() {
                Ok(parsed) if parsed > 0 && parsed <= 255 => config.lobby_capacity = parsed,
                Ok(_) => tracing::warn!("LOBBY_CAPACITY must be 1-255, using default"),
                Err(_) => tracing::warn!("Invalid LOBBY_CAPACITY '{}', using default", capacity),
            }
        }

        if let Ok(flag) = std::env::var("BROADCAST_FINISH_LOAD") {
            match parse_flag(&flag) {
                Some(value) => config.broadcast_finish_load = value,
                None => tracing::warn!("Invalid BROADCAST_FINISH_LOAD '{}', using default", flag),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.max_lobbies == 0 {
            return Err("max_lobbies must be at least 1".to_string());
        }
        if self.lobby_capacity == 0 || self.lobby_capacity > 255 {
            return Err("lobby_capacity must be 1-255".to_string());
        }
        Ok(())
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            broadcast_finish_load: self.broadcast_finish_load,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
