pub mod console;
pub mod pad_api;

pub use console::{parse_line, run_console, run_relay, ConsoleLine};
pub use pad_api::{spawn_pad, PadCommand, PadHandle, PadSnapshot};
