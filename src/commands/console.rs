// Консоль поверх PadHandle: одна команда на строку

use crate::commands::pad_api::{spawn_pad, PadCommand, PadHandle, PadSnapshot};
use crate::config::Config;
use crate::error::PadError;
use crate::logger::PadEvent;
use crate::mode::Role;
use crate::peer::types::RendezvousId;
use crate::peer::WebRtcTransport;
use crate::qr;
use crate::rendezvous::RelayServer;
use crate::stroke::Point;
use crate::surface::Canvas;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub const HELP: &str = "\
commands:
  mode          switch between computer and phone
  clear         clear the drawing
  join CODE     connect to a computer (phone mode)
  down X Y      start a stroke
  move X Y      continue the stroke
  up            finish the stroke
  status        show mode and connection state
  quit          exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleLine {
    Pad(PadCommand),
    Status,
    Help,
    Quit,
    Empty,
}

pub fn parse_line(line: &str) -> Result<ConsoleLine, PadError> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(ConsoleLine::Empty);
    };

    let parsed = match word {
        "mode" => ConsoleLine::Pad(PadCommand::ToggleMode),
        "clear" => ConsoleLine::Pad(PadCommand::Clear),
        "join" => {
            let code = words
                .next()
                .ok_or_else(|| PadError::Console("join needs a code".into()))?;
            ConsoleLine::Pad(PadCommand::Join(code.to_string()))
        }
        "down" => ConsoleLine::Pad(PadCommand::GestureStart(parse_point(&mut words)?)),
        "move" => ConsoleLine::Pad(PadCommand::GestureMove(parse_point(&mut words)?)),
        "up" => ConsoleLine::Pad(PadCommand::GestureEnd),
        "status" => ConsoleLine::Status,
        "help" | "?" => ConsoleLine::Help,
        "quit" | "exit" => ConsoleLine::Quit,
        other => return Err(PadError::Console(other.to_string())),
    };

    if let Some(extra) = words.next() {
        return Err(PadError::Console(format!("unexpected argument {extra:?}")));
    }
    Ok(parsed)
}

fn parse_point<'a>(words: &mut impl Iterator<Item = &'a str>) -> Result<Point, PadError> {
    let mut coord = |axis: &str| -> Result<f64, PadError> {
        let raw = words
            .next()
            .ok_or_else(|| PadError::Console(format!("missing {axis} coordinate")))?;
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(PadError::Console(format!("bad {axis} coordinate {raw:?}"))),
        }
    };
    let x = coord("x")?;
    let y = coord("y")?;
    Ok(Point::new(x, y))
}

/// Размер модуля QR в файле `--qr-svg`, px
const QR_SVG_MODULE: u32 = 8;

/// Интерактивная сессия в терминале. Хост печатает код и QR;
/// при выходе рисунок сохраняется в `svg`, если путь задан.
/// `qr_svg` перезаписывается QR-кодом при каждом новом коде.
pub async fn run_console(
    config: &Config,
    role: Role,
    join: Option<String>,
    svg: Option<PathBuf>,
    qr_svg: Option<PathBuf>,
) -> Result<(), PadError> {
    let transport = Arc::new(WebRtcTransport::from_config(config)?);
    let canvas = Canvas::new(config.viewport()?, config.pen.clone());
    let (handle, mut notices, task) = spawn_pad(config, role, transport, canvas);

    if let Some(code) = join {
        handle.join(code)?;
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            notice = notices.recv() => match notice {
                Some(notice) => {
                    print_notice(&notice);
                    if let (PadEvent::IdentityAssigned(id), Some(path)) = (&notice, &qr_svg) {
                        match save_qr_svg(path, id).await {
                            Ok(()) => println!("QR code saved to {}", path.display()),
                            Err(e) => tracing::warn!(error = %e, path = %path.display(), "failed to save QR code"),
                        }
                    }
                }
                None => break,
            },

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !dispatch(&handle, &line).await? {
                    break;
                }
            }
        }
    }

    let _ = handle.shutdown();
    let canvas = task
        .await
        .map_err(|e| PadError::Console(format!("pad task failed: {e}")))?;

    if let Some(path) = svg {
        tokio::fs::write(&path, canvas.to_svg()).await?;
        println!("drawing saved to {}", path.display());
    }
    Ok(())
}

/// false, если пользователь вышел
async fn dispatch(handle: &PadHandle, line: &str) -> Result<bool, PadError> {
    match parse_line(line) {
        Ok(ConsoleLine::Pad(cmd)) => handle.send(cmd)?,
        Ok(ConsoleLine::Status) => print_snapshot(&handle.snapshot().await?),
        Ok(ConsoleLine::Help) => println!("{HELP}"),
        Ok(ConsoleLine::Quit) => return Ok(false),
        Ok(ConsoleLine::Empty) => {}
        Err(e) => eprintln!("{e}"),
    }
    Ok(true)
}

fn print_notice(notice: &PadEvent) {
    match notice {
        PadEvent::IdentityAssigned(id) => {
            println!("pairing code: {id}");
            match qr::render_unicode(id.as_str()) {
                Ok(code) => println!("{code}"),
                Err(e) => tracing::warn!(error = %e, "failed to render QR code"),
            }
        }
        PadEvent::StatusChanged(status) => println!("status: {status}"),
        PadEvent::RoleChanged(role) => println!("mode: {role}"),
        PadEvent::PeerRejected(conn) => {
            println!("another phone tried to connect ({conn}) and was rejected")
        }
        PadEvent::CommandFailed(message) => eprintln!("error: {message}"),
    }
}

async fn save_qr_svg(path: &Path, id: &RendezvousId) -> Result<(), PadError> {
    let svg = qr::render_svg(id.as_str(), QR_SVG_MODULE)?;
    tokio::fs::write(path, svg).await?;
    Ok(())
}

fn print_snapshot(snapshot: &PadSnapshot) {
    println!("mode: {}", snapshot.role);
    println!("status: {}", snapshot.status);
    if let Some(id) = &snapshot.identity {
        println!("pairing code: {id}");
    }
}

/// `drawpad relay`: работает до Ctrl-C
pub async fn run_relay(bind: &str) -> Result<(), PadError> {
    let server = RelayServer::bind(bind).await?;
    println!("relay listening on {}", server.local_addr()?);
    tokio::select! {
        _ = server.run() => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("relay shutting down");
        }
    }
    Ok(())
}
