use crate::config::LogConfig;
use crate::mode::Role;
use crate::peer::types::{ConnectionId, RendezvousId};
use crate::session::SessionStatus;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use webrtc::peer_connection::RTCPeerConnection;

/// Инициализация tracing. `RUST_LOG` перекрывает фильтр из конфига.
/// Повторный вызов ничего не делает.
pub fn init(config: &LogConfig) {
    if !config.enabled {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_str()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// События для пользовательской оболочки (консоль, UI)
#[derive(Debug, Clone, PartialEq)]
pub enum PadEvent {
    IdentityAssigned(RendezvousId),
    StatusChanged(SessionStatus),
    RoleChanged(Role),
    PeerRejected(ConnectionId),
    CommandFailed(String),
}

/// Отправитель событий оболочке. Без получателя события только логируются.
#[derive(Debug, Clone, Default)]
pub struct Emitter {
    tx: Option<mpsc::UnboundedSender<PadEvent>>,
}

impl Emitter {
    pub fn new(tx: mpsc::UnboundedSender<PadEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Только логирование
    pub fn silent() -> Self {
        Self::default()
    }

    fn emit(&self, event: PadEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::trace!("event receiver is gone");
            }
        }
    }

    pub fn emit_identity(&self, id: &RendezvousId) {
        tracing::info!(code = %id, "pairing code ready");
        self.emit(PadEvent::IdentityAssigned(id.clone()));
    }

    pub fn emit_status(&self, status: &SessionStatus) {
        match status {
            SessionStatus::Connected { conn } => tracing::info!(%conn, "emit connected"),
            SessionStatus::Failed(reason) => tracing::warn!(%reason, "emit disconnected"),
            other => tracing::debug!(status = %other, "emit status"),
        }
        self.emit(PadEvent::StatusChanged(status.clone()));
    }

    pub fn emit_role(&self, role: Role) {
        tracing::debug!(%role, "emit role");
        self.emit(PadEvent::RoleChanged(role));
    }

    pub fn emit_peer_rejected(&self, conn: ConnectionId) {
        self.emit(PadEvent::PeerRejected(conn));
    }

    pub fn emit_command_failed(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "command failed");
        self.emit(PadEvent::CommandFailed(message));
    }
}

/// Быстрый снимок getStats → выбранная пара
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, report) in stats.reports {
        if let webrtc::stats::StatsReportType::CandidatePair(pair) = report {
            if pair.nominated {
                tracing::info!(
                    moment,
                    local = %pair.local_candidate_id,
                    remote = %pair.remote_candidate_id,
                    sent = pair.bytes_sent,
                    received = pair.bytes_received,
                    state = ?pair.state,
                    "selected candidate pair"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FailureReason;

    #[test]
    fn emitter_forwards_events_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = Emitter::new(tx);
        let id = RendezvousId::parse("abc123").unwrap();

        emitter.emit_identity(&id);
        emitter.emit_status(&SessionStatus::Failed(FailureReason::JoinTimedOut));
        emitter.emit_role(Role::Joiner);

        assert_eq!(rx.try_recv().unwrap(), PadEvent::IdentityAssigned(id));
        assert_eq!(
            rx.try_recv().unwrap(),
            PadEvent::StatusChanged(SessionStatus::Failed(FailureReason::JoinTimedOut))
        );
        assert_eq!(rx.try_recv().unwrap(), PadEvent::RoleChanged(Role::Joiner));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn silent_emitter_and_closed_receiver_do_not_panic() {
        Emitter::silent().emit_command_failed("nothing listens");

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        Emitter::new(tx).emit_peer_rejected(ConnectionId(3));
    }

    #[test]
    fn disabled_logging_skips_init() {
        init(&LogConfig {
            enabled: false,
            filter: "trace".into(),
        });
    }
}
