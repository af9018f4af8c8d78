//! Session Manager: владеет endpoint'ом транспорта и единственной сессией.
//!
//! Состояния: `Idle -> AwaitingPeer -> Connected` (хост),
//! `Idle -> Connecting -> Connected` (телефон), любая ошибка ведёт в
//! `Failed`, а `teardown` из любого состояния возвращает в `Idle`.
//! Вернуться из `Connected` в ожидание можно только через `Idle`.

use crate::error::PadError;
use crate::mode::Role;
use crate::peer::types::{
    ConnectionId, EndpointTag, EventSink, RendezvousId, TaggedEvent, TransportEvent,
};
use crate::peer::{Endpoint, Transport};
use crate::stroke::{StrokeMessage, StrokeSink};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Причина перехода в `Failed`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
    #[error("join timed out")]
    JoinTimedOut,
    #[error("no host with this code")]
    UnknownPeer,
    #[error("peer disconnected")]
    ConnectionDropped,
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    AwaitingPeer,
    Connecting { peer: RendezvousId },
    Connected { conn: ConnectionId },
    Failed(FailureReason),
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => f.write_str("idle"),
            SessionStatus::AwaitingPeer => f.write_str("waiting for phone to connect"),
            SessionStatus::Connecting { peer } => write!(f, "connecting to {peer}"),
            SessionStatus::Connected { .. } => f.write_str("connected"),
            SessionStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Что делать со вторым входящим соединением, пока первое занято
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptPolicy {
    /// Закрыть соединение и уведомить пользователя
    #[default]
    RejectExtra,
    /// Закрыть соединение, только запись в лог
    DropSilently,
}

/// Изменения, которые Session Manager отдаёт наружу
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    IdentityAssigned(RendezvousId),
    StatusChanged(SessionStatus),
    PeerRejected(ConnectionId),
    Payload(Bytes),
}

struct ActiveEndpoint {
    tag: EndpointTag,
    role: Role,
    endpoint: Box<dyn Endpoint>,
    /// Привязанное (или ожидаемое исходящее) соединение
    conn: Option<ConnectionId>,
    deadline: Option<Instant>,
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<TaggedEvent>,
    join_timeout: Duration,
    accept_policy: AcceptPolicy,
    next_tag: u64,
    active: Option<ActiveEndpoint>,
    status: SessionStatus,
    identity: Option<RendezvousId>,
    updates: Vec<SessionUpdate>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedSender<TaggedEvent>,
        join_timeout: Duration,
        accept_policy: AcceptPolicy,
    ) -> Self {
        Self {
            transport,
            events,
            join_timeout,
            accept_policy,
            next_tag: 0,
            active: None,
            status: SessionStatus::Idle,
            identity: None,
            updates: Vec::new(),
        }
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.status, SessionStatus::Connected { .. })
    }

    /// Код подключения хоста, пока endpoint жив
    pub fn identity(&self) -> Option<&RendezvousId> {
        self.identity.as_ref()
    }

    /// Срок ожидания исходящего соединения, если оно ещё не открыто
    pub fn deadline(&self) -> Option<Instant> {
        self.active.as_ref().and_then(|a| a.deadline)
    }

    /// Накопленные изменения с прошлого вызова
    pub fn drain_updates(&mut self) -> Vec<SessionUpdate> {
        std::mem::take(&mut self.updates)
    }

    /// Хост: выделяем endpoint и ждём идентификатор от транспорта.
    /// Ожидание входящего соединения не ограничено по времени.
    pub fn become_host(&mut self) {
        self.teardown();
        match self.allocate(Role::Host) {
            Ok(endpoint) => {
                self.active = Some(endpoint);
                self.set_status(SessionStatus::AwaitingPeer);
            }
            Err(e) => self.fail_on_allocate(e),
        }
    }

    /// Телефон: выделяем endpoint и подключаемся к `identity`.
    /// Если соединение не откроется до `now + join_timeout`, статус станет
    /// `Failed(JoinTimedOut)`.
    pub fn join_host(&mut self, identity: RendezvousId, now: Instant) {
        self.teardown();
        let mut active = match self.allocate(Role::Joiner) {
            Ok(active) => active,
            Err(e) => return self.fail_on_allocate(e),
        };
        match active.endpoint.connect(&identity) {
            Ok(conn) => {
                tracing::info!(peer = %identity, %conn, "joining host");
                active.conn = Some(conn);
                active.deadline = Some(now + self.join_timeout);
                self.active = Some(active);
                self.set_status(SessionStatus::Connecting { peer: identity });
            }
            Err(e) => {
                active.endpoint.disconnect();
                self.set_status(SessionStatus::Failed(FailureReason::Transport(e.to_string())));
            }
        }
    }

    /// Освобождает endpoint и сбрасывает сессию. Повторный вызов безопасен.
    pub fn teardown(&mut self) {
        self.release_endpoint();
        if self.status != SessionStatus::Idle {
            self.set_status(SessionStatus::Idle);
        }
    }

    /// Проверка срока join'а
    pub fn check_deadline(&mut self, now: Instant) {
        let expired = matches!(
            self.active.as_ref().and_then(|a| a.deadline),
            Some(deadline) if deadline <= now
        );
        if expired && matches!(self.status, SessionStatus::Connecting { .. }) {
            tracing::warn!("join timed out");
            self.fail(FailureReason::JoinTimedOut);
        }
    }

    /// Применяет событие транспорта. События от старых endpoint'ов игнорируются.
    pub fn handle_event(&mut self, tagged: TaggedEvent) {
        let Some(active) = self.active.as_mut() else {
            tracing::debug!(tag = ?tagged.tag, "event without active endpoint dropped");
            return;
        };
        if active.tag != tagged.tag {
            tracing::debug!(tag = ?tagged.tag, current = ?active.tag, "stale endpoint event dropped");
            return;
        }

        match tagged.event {
            TransportEvent::Open(id) => {
                if active.role == Role::Host && self.identity.is_none() {
                    tracing::info!(identity = %id, "rendezvous identity assigned");
                    self.identity = Some(id.clone());
                    self.updates.push(SessionUpdate::IdentityAssigned(id));
                } else {
                    tracing::debug!(own_id = %id, "joiner endpoint open");
                }
            }

            TransportEvent::IncomingConnection(conn) => {
                let accept =
                    active.role == Role::Host && self.status == SessionStatus::AwaitingPeer;
                if accept {
                    active.conn = Some(conn);
                    tracing::info!(%conn, "phone connected");
                    self.set_status(SessionStatus::Connected { conn });
                } else {
                    active.endpoint.close_connection(conn);
                    match self.accept_policy {
                        AcceptPolicy::RejectExtra => {
                            tracing::warn!(%conn, "extra connection rejected");
                            self.updates.push(SessionUpdate::PeerRejected(conn));
                        }
                        AcceptPolicy::DropSilently => {
                            tracing::debug!(%conn, "extra connection dropped");
                        }
                    }
                }
            }

            TransportEvent::ConnectionOpen(conn) => {
                let pending = matches!(self.status, SessionStatus::Connecting { .. })
                    && active.conn == Some(conn);
                if pending {
                    active.deadline = None;
                    tracing::info!(%conn, "session open");
                    self.set_status(SessionStatus::Connected { conn });
                } else {
                    tracing::debug!(%conn, "unexpected open ignored");
                }
            }

            TransportEvent::Data(conn, payload) => {
                if self.status == (SessionStatus::Connected { conn }) {
                    self.updates.push(SessionUpdate::Payload(payload));
                } else {
                    tracing::debug!(%conn, "data outside of session ignored");
                }
            }

            TransportEvent::ConnectionClosed(conn) => {
                if active.conn == Some(conn) {
                    tracing::warn!(%conn, "peer disconnected");
                    self.fail(FailureReason::ConnectionDropped);
                }
            }

            TransportEvent::ConnectFailed(conn, reason) => {
                let pending = matches!(self.status, SessionStatus::Connecting { .. })
                    && active.conn == Some(conn);
                if pending {
                    tracing::warn!(%conn, %reason, "join failed");
                    self.fail(reason);
                }
            }

            TransportEvent::Error(message) => {
                tracing::error!(%message, "transport error");
                let reason = if self.status == SessionStatus::AwaitingPeer && self.identity.is_none()
                {
                    FailureReason::TransportUnavailable(message)
                } else {
                    FailureReason::Transport(message)
                };
                self.fail(reason);
            }
        }
    }

    fn allocate(&mut self, role: Role) -> Result<ActiveEndpoint, PadError> {
        self.next_tag += 1;
        let tag = EndpointTag(self.next_tag);
        let endpoint = self
            .transport
            .create_endpoint(EventSink::new(tag, self.events.clone()))?;
        tracing::debug!(?tag, ?role, "endpoint allocated");
        Ok(ActiveEndpoint {
            tag,
            role,
            endpoint,
            conn: None,
            deadline: None,
        })
    }

    fn fail_on_allocate(&mut self, e: PadError) {
        tracing::error!(error = %e, "cannot create transport endpoint");
        let reason = match e {
            PadError::TransportUnavailable(msg) => FailureReason::TransportUnavailable(msg),
            other => FailureReason::TransportUnavailable(other.to_string()),
        };
        self.set_status(SessionStatus::Failed(reason));
    }

    /// Ошибка завершает endpoint: поздние колбэки от него уже не пройдут
    fn fail(&mut self, reason: FailureReason) {
        self.release_endpoint();
        self.set_status(SessionStatus::Failed(reason));
    }

    fn release_endpoint(&mut self) {
        if let Some(mut active) = self.active.take() {
            tracing::debug!(tag = ?active.tag, "releasing endpoint");
            active.endpoint.disconnect();
        }
        self.identity = None;
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status != status {
            tracing::info!(from = %self.status, to = %status, "session status");
            self.status = status.clone();
            self.updates.push(SessionUpdate::StatusChanged(status));
        }
    }
}

impl StrokeSink for SessionManager {
    fn send_stroke(&mut self, msg: &StrokeMessage) -> Result<(), PadError> {
        let SessionStatus::Connected { conn } = self.status else {
            return Err(PadError::NotConnected);
        };
        let active = self.active.as_mut().ok_or(PadError::EndpointClosed)?;
        active.endpoint.send(conn, msg.encode()?)
    }
}
