pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod mode;
pub mod pad;
pub mod peer;
pub mod qr;
pub mod rendezvous;
pub mod session;
pub mod signaling;
pub mod stroke;
pub mod surface;
pub mod utils;

pub use commands::{spawn_pad, PadCommand, PadHandle, PadSnapshot};
pub use config::Config;
pub use error::PadError;
pub use logger::{Emitter, PadEvent};
pub use mode::{ModeController, Role};
pub use pad::DrawPad;
pub use peer::{MemoryNetwork, RendezvousId, Transport, WebRtcTransport};
pub use session::{AcceptPolicy, FailureReason, SessionManager, SessionStatus};
pub use stroke::{Point, StrokeMessage, StrokeRelay};
pub use surface::{Canvas, DrawingSurface, PenStyle, Viewport};
