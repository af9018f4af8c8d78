//! Протокол relay. `payload` в `signal` relay не читает и пересылает как есть.

use serde::{Deserialize, Serialize};

/// Клиент -> relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Register,
    Signal {
        to: String,
        payload: serde_json::Value,
    },
}

/// Relay -> клиент
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    Registered {
        id: String,
    },
    Signal {
        from: String,
        payload: serde_json::Value,
    },
    UnknownPeer {
        id: String,
    },
    Error {
        message: String,
    },
}
