use crate::mode::Role;

/// Ошибки ядра, транспорта и консоли
#[derive(Debug, thiserror::Error)]
pub enum PadError {
    #[error("invalid rendezvous id: {0:?}")]
    InvalidId(String),

    #[error("invalid canvas size {width}x{height}")]
    InvalidViewport { width: f64, height: f64 },

    #[error("invalid ICE server config: {0}")]
    InvalidIceServer(String),

    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("transport endpoint is closed")]
    EndpointClosed,

    #[error("no established session")]
    NotConnected,

    #[error("command is only available in {0} mode")]
    WrongRole(Role),

    #[error("relay protocol error: {0}")]
    Relay(String),

    #[error("unknown command: {0}")]
    Console(String),

    #[error("pad task has stopped")]
    PadClosed,

    #[error("json codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("webrtc error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("qr encoding error: {0}")]
    Qr(#[from] qrcode::types::QrError),
}
