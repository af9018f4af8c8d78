use crate::config::Config;
use crate::error::PadError;
use crate::logger::{Emitter, PadEvent};
use crate::mode::Role;
use crate::pad::DrawPad;
use crate::peer::types::{RendezvousId, TaggedEvent};
use crate::peer::Transport;
use crate::session::SessionStatus;
use crate::stroke::Point;
use crate::surface::DrawingSurface;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Команды пользовательской оболочки
#[derive(Debug, Clone, PartialEq)]
pub enum PadCommand {
    ToggleMode,
    Clear,
    Join(String),
    GestureStart(Point),
    GestureMove(Point),
    GestureEnd,
    Shutdown,
}

/// Состояние pad'а на момент запроса
#[derive(Debug, Clone, PartialEq)]
pub struct PadSnapshot {
    pub role: Role,
    pub status: SessionStatus,
    pub identity: Option<RendezvousId>,
    pub svg: Option<String>,
}

enum Request {
    Command(PadCommand),
    Snapshot(oneshot::Sender<PadSnapshot>),
}

/// Ручка для задачи pad'а. Клоны управляют одним и тем же pad'ом.
#[derive(Debug, Clone)]
pub struct PadHandle {
    tx: mpsc::UnboundedSender<Request>,
}

impl PadHandle {
    pub fn send(&self, cmd: PadCommand) -> Result<(), PadError> {
        self.tx
            .send(Request::Command(cmd))
            .map_err(|_| PadError::PadClosed)
    }

    pub fn toggle_mode(&self) -> Result<(), PadError> {
        self.send(PadCommand::ToggleMode)
    }

    pub fn clear(&self) -> Result<(), PadError> {
        self.send(PadCommand::Clear)
    }

    pub fn join(&self, code: impl Into<String>) -> Result<(), PadError> {
        self.send(PadCommand::Join(code.into()))
    }

    pub fn gesture_start(&self, x: f64, y: f64) -> Result<(), PadError> {
        self.send(PadCommand::GestureStart(Point::new(x, y)))
    }

    pub fn gesture_move(&self, x: f64, y: f64) -> Result<(), PadError> {
        self.send(PadCommand::GestureMove(Point::new(x, y)))
    }

    pub fn gesture_end(&self) -> Result<(), PadError> {
        self.send(PadCommand::GestureEnd)
    }

    pub fn shutdown(&self) -> Result<(), PadError> {
        self.send(PadCommand::Shutdown)
    }

    pub async fn snapshot(&self) -> Result<PadSnapshot, PadError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Request::Snapshot(tx))
            .map_err(|_| PadError::PadClosed)?;
        rx.await.map_err(|_| PadError::PadClosed)
    }
}

/// Запускает pad в отдельной задаче. Задача завершается по `Shutdown`
/// или когда все ручки закрыты, и возвращает холст.
pub fn spawn_pad<S>(
    config: &Config,
    role: Role,
    transport: Arc<dyn Transport>,
    surface: S,
) -> (PadHandle, mpsc::UnboundedReceiver<PadEvent>, JoinHandle<S>)
where
    S: DrawingSurface + Send + 'static,
{
    let (tx, commands) = mpsc::unbounded_channel();
    let (event_tx, events) = mpsc::unbounded_channel();
    let (notice_tx, notices) = mpsc::unbounded_channel();
    let pad = DrawPad::new(
        config,
        role,
        transport,
        event_tx,
        surface,
        Emitter::new(notice_tx),
    );
    let task = tokio::spawn(run_pad(pad, commands, events));
    (PadHandle { tx }, notices, task)
}

async fn run_pad<S: DrawingSurface>(
    mut pad: DrawPad<S>,
    mut commands: mpsc::UnboundedReceiver<Request>,
    mut events: mpsc::UnboundedReceiver<TaggedEvent>,
) -> S {
    pad.start();
    loop {
        let deadline = pad.deadline();
        tokio::select! {
            req = commands.recv() => match req {
                None | Some(Request::Command(PadCommand::Shutdown)) => break,
                Some(Request::Command(cmd)) => execute(&mut pad, cmd),
                Some(Request::Snapshot(reply)) => {
                    let _ = reply.send(snapshot(&pad));
                }
            },

            Some(ev) = events.recv() => pad.handle_transport_event(ev),

            _ = wait_until(deadline) => pad.check_deadline(Instant::now()),
        }
    }
    tracing::debug!("pad task stopping");
    pad.shutdown();
    pad.into_surface()
}

fn execute<S: DrawingSurface>(pad: &mut DrawPad<S>, cmd: PadCommand) {
    match cmd {
        PadCommand::ToggleMode => {
            pad.toggle_mode();
        }
        PadCommand::Clear => pad.clear(),
        PadCommand::Join(code) => {
            if let Err(e) = pad.join(&code, Instant::now()) {
                pad.emitter().emit_command_failed(e.to_string());
            }
        }
        PadCommand::GestureStart(point) => pad.gesture_start(point),
        PadCommand::GestureMove(point) => pad.gesture_move(point),
        PadCommand::GestureEnd => pad.gesture_end(),
        PadCommand::Shutdown => pad.shutdown(),
    }
}

fn snapshot<S: DrawingSurface>(pad: &DrawPad<S>) -> PadSnapshot {
    PadSnapshot {
        role: pad.role(),
        status: pad.status().clone(),
        identity: pad.identity().cloned(),
        svg: pad.surface().export_svg(),
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
