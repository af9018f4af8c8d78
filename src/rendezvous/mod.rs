//! Rendezvous relay: выдаёт endpoint'ам идентификаторы и пересылает SDP
//! между ними. Сами штрихи через relay не идут.

pub mod protocol;
pub mod registry;
pub mod server;

pub use protocol::{ClientMessage, RelayMessage};
pub use registry::Registry;
pub use server::RelayServer;
