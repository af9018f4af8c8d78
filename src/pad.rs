//! Pad: связывает режим, сессию, штрихи и холст в одном владельце.
//! Все входы (команды пользователя, события транспорта, срок join'а)
//! проходят через него последовательно.

use crate::config::Config;
use crate::error::PadError;
use crate::logger::Emitter;
use crate::mode::{ModeController, Role};
use crate::peer::types::{RendezvousId, TaggedEvent};
use crate::peer::Transport;
use crate::session::{SessionManager, SessionStatus, SessionUpdate};
use crate::stroke::{Point, StrokeMessage, StrokeRelay, StrokeSink};
use crate::surface::DrawingSurface;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub struct DrawPad<S> {
    mode: ModeController,
    session: SessionManager,
    relay: StrokeRelay,
    surface: S,
    emitter: Emitter,
}

impl<S: DrawingSurface> DrawPad<S> {
    pub fn new(
        config: &Config,
        role: Role,
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedSender<TaggedEvent>,
        surface: S,
        emitter: Emitter,
    ) -> Self {
        Self {
            mode: ModeController::new(role),
            session: SessionManager::new(
                transport,
                events,
                config.join_timeout(),
                config.accept_policy,
            ),
            relay: StrokeRelay::new(),
            surface,
            emitter,
        }
    }

    /// Запуск в текущей роли: хост сразу запрашивает код
    pub fn start(&mut self) {
        self.emitter.emit_role(self.mode.role());
        self.mode.activate(&mut self.session);
        self.flush();
    }

    pub fn toggle_mode(&mut self) -> Role {
        self.relay.on_gesture_end();
        let role = self.mode.toggle(&mut self.session);
        self.emitter.emit_role(role);
        self.flush();
        role
    }

    /// Телефон: подключиться к хосту по введённому коду
    pub fn join(&mut self, raw: &str, now: Instant) -> Result<(), PadError> {
        if self.mode.role() != Role::Joiner {
            return Err(PadError::WrongRole(Role::Joiner));
        }
        let id = RendezvousId::parse(raw)?;
        self.session.join_host(id, now);
        self.flush();
        Ok(())
    }

    /// Очистка холста, сессию не трогает
    pub fn clear(&mut self) {
        self.surface.clear();
    }

    pub fn gesture_start(&mut self, point: Point) {
        let sink = outgoing(&self.mode, &mut self.session);
        self.relay.on_gesture_start(point, &mut self.surface, sink);
    }

    pub fn gesture_move(&mut self, point: Point) {
        let sink = outgoing(&self.mode, &mut self.session);
        self.relay.on_gesture_move(point, &mut self.surface, sink);
    }

    pub fn gesture_end(&mut self) {
        self.relay.on_gesture_end();
    }

    pub fn handle_transport_event(&mut self, event: TaggedEvent) {
        self.session.handle_event(event);
        self.flush();
    }

    pub fn check_deadline(&mut self, now: Instant) {
        self.session.check_deadline(now);
        self.flush();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.session.deadline()
    }

    pub fn shutdown(&mut self) {
        self.relay.on_gesture_end();
        self.session.teardown();
        self.flush();
    }

    pub fn role(&self) -> Role {
        self.mode.role()
    }

    pub fn status(&self) -> &SessionStatus {
        self.session.status()
    }

    pub fn identity(&self) -> Option<&RendezvousId> {
        self.session.identity()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub(crate) fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    fn flush(&mut self) {
        for update in self.session.drain_updates() {
            match update {
                SessionUpdate::IdentityAssigned(id) => self.emitter.emit_identity(&id),
                SessionUpdate::StatusChanged(status) => {
                    // путь прошлого собеседника не продолжается в новой сессии
                    if !matches!(status, SessionStatus::Connected { .. }) {
                        self.relay.reset_remote();
                    }
                    self.emitter.emit_status(&status);
                }
                SessionUpdate::PeerRejected(conn) => self.emitter.emit_peer_rejected(conn),
                SessionUpdate::Payload(bytes) => self.apply_payload(&bytes),
            }
        }
    }

    fn apply_payload(&mut self, bytes: &Bytes) {
        if self.mode.role() != Role::Host {
            tracing::debug!("stroke received outside of host mode ignored");
            return;
        }
        match StrokeMessage::decode(bytes) {
            Ok(msg) => self.relay.on_message_received(&msg, &mut self.surface),
            Err(e) => tracing::warn!(error = %e, "undecodable stroke message dropped"),
        }
    }
}

/// Отправлять штрихи может только подключённый телефон
fn outgoing<'a>(mode: &ModeController, session: &'a mut SessionManager) -> Option<&'a mut dyn StrokeSink> {
    if mode.role() == Role::Joiner && session.is_connected() {
        Some(session as &mut dyn StrokeSink)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::PadEvent;
    use crate::peer::MemoryNetwork;
    use crate::session::FailureReason;
    use crate::surface::test_support::{PathOp, RecordingSurface};
    use std::time::Duration;

    struct Side {
        pad: DrawPad<RecordingSurface>,
        events: mpsc::UnboundedReceiver<TaggedEvent>,
        notices: mpsc::UnboundedReceiver<PadEvent>,
    }

    impl Side {
        fn new(net: &MemoryNetwork, role: Role) -> Self {
            let (tx, events) = mpsc::unbounded_channel();
            let (notice_tx, notices) = mpsc::unbounded_channel();
            let pad = DrawPad::new(
                &Config::default(),
                role,
                Arc::new(net.clone()),
                tx,
                RecordingSurface::new(100.0, 100.0),
                Emitter::new(notice_tx),
            );
            Self {
                pad,
                events,
                notices,
            }
        }

        fn pump(&mut self) -> bool {
            let mut any = false;
            while let Ok(ev) = self.events.try_recv() {
                self.pad.handle_transport_event(ev);
                any = true;
            }
            any
        }

        fn notices(&mut self) -> Vec<PadEvent> {
            let mut out = Vec::new();
            while let Ok(ev) = self.notices.try_recv() {
                out.push(ev);
            }
            out
        }
    }

    fn pump_all(a: &mut Side, b: &mut Side) {
        while a.pump() | b.pump() {}
    }

    fn connected_pair() -> (Side, Side) {
        let net = MemoryNetwork::with_ids(["abc123", "phone01"]);
        let mut host = Side::new(&net, Role::Host);
        let mut phone = Side::new(&net, Role::Joiner);
        host.pad.start();
        phone.pad.start();
        pump_all(&mut host, &mut phone);
        assert_eq!(host.pad.identity().map(|id| id.as_str()), Some("abc123"));

        phone.pad.join("abc123", Instant::now()).unwrap();
        pump_all(&mut host, &mut phone);
        (host, phone)
    }

    #[test]
    fn joiner_strokes_reach_host_surface() {
        let (mut host, mut phone) = connected_pair();
        assert!(matches!(host.pad.status(), SessionStatus::Connected { .. }));
        assert!(matches!(phone.pad.status(), SessionStatus::Connected { .. }));

        phone.pad.gesture_start(Point::new(10.0, 20.0));
        phone.pad.gesture_move(Point::new(15.0, 25.0));
        phone.pad.gesture_end();
        pump_all(&mut host, &mut phone);

        assert_eq!(
            host.pad.surface().ops,
            vec![
                PathOp::Begin(10.0, 20.0),
                PathOp::LineTo(15.0, 25.0),
                PathOp::Stroke
            ]
        );
        // phone draws its own copy locally
        assert_eq!(host.pad.surface().ops, phone.pad.surface().ops);
    }

    #[test]
    fn host_publishes_identity_and_connection() {
        let (mut host, _phone) = connected_pair();
        let notices = host.notices();
        assert_eq!(notices[0], PadEvent::RoleChanged(Role::Host));
        assert!(notices.contains(&PadEvent::IdentityAssigned(
            RendezvousId::parse("abc123").unwrap()
        )));
        assert!(matches!(
            notices.last(),
            Some(PadEvent::StatusChanged(SessionStatus::Connected { .. }))
        ));
    }

    #[test]
    fn host_gestures_are_local_only() {
        let (mut host, mut phone) = connected_pair();
        host.pad.gesture_start(Point::new(1.0, 1.0));
        host.pad.gesture_move(Point::new(2.0, 2.0));
        pump_all(&mut host, &mut phone);
        assert!(phone.pad.surface().ops.is_empty());
        assert_eq!(host.pad.surface().ops.len(), 3);
    }

    #[test]
    fn move_before_start_is_noop() {
        let (mut host, mut phone) = connected_pair();
        phone.pad.gesture_move(Point::new(5.0, 5.0));
        pump_all(&mut host, &mut phone);
        assert!(phone.pad.surface().ops.is_empty());
        assert!(host.pad.surface().ops.is_empty());
    }

    #[test]
    fn clear_leaves_session_alone() {
        let (mut host, mut phone) = connected_pair();
        let before = host.pad.status().clone();
        host.pad.clear();
        phone.pad.clear();
        pump_all(&mut host, &mut phone);
        assert_eq!(host.pad.status(), &before);
        assert!(phone.pad.status() != &SessionStatus::Idle);
        assert_eq!(host.pad.surface().ops, vec![PathOp::Clear]);
    }

    #[test]
    fn join_requires_phone_mode() {
        let net = MemoryNetwork::new();
        let mut host = Side::new(&net, Role::Host);
        host.pad.start();
        assert!(matches!(
            host.pad.join("abc123", Instant::now()),
            Err(PadError::WrongRole(Role::Joiner))
        ));
    }

    #[test]
    fn join_rejects_malformed_code() {
        let net = MemoryNetwork::new();
        let mut phone = Side::new(&net, Role::Joiner);
        phone.pad.start();
        assert!(matches!(
            phone.pad.join("  ", Instant::now()),
            Err(PadError::InvalidId(_))
        ));
        assert_eq!(phone.pad.status(), &SessionStatus::Idle);
    }

    #[test]
    fn stalled_join_fails_after_deadline() {
        let net = MemoryNetwork::new();
        let mut phone = Side::new(&net, Role::Joiner);
        phone.pad.start();
        let now = Instant::now();
        phone.pad.join("nonexistent", now).unwrap();
        phone.pump();
        assert!(matches!(phone.pad.status(), SessionStatus::Connecting { .. }));

        let deadline = phone.pad.deadline().unwrap();
        assert_eq!(deadline, now + Duration::from_secs(15));
        phone.pad.check_deadline(deadline);
        assert_eq!(
            phone.pad.status(),
            &SessionStatus::Failed(FailureReason::JoinTimedOut)
        );
        assert_eq!(net.endpoint_count(), 0);
    }

    #[test]
    fn toggle_drops_peer_and_keeps_drawing() {
        let (mut host, mut phone) = connected_pair();
        phone.pad.gesture_start(Point::new(10.0, 20.0));
        phone.pad.gesture_move(Point::new(15.0, 25.0));
        pump_all(&mut host, &mut phone);

        assert_eq!(host.pad.toggle_mode(), Role::Joiner);
        pump_all(&mut host, &mut phone);
        assert_eq!(host.pad.status(), &SessionStatus::Idle);
        assert!(host.pad.identity().is_none());
        assert_eq!(host.pad.surface().ops.len(), 3);
        assert_eq!(
            phone.pad.status(),
            &SessionStatus::Failed(FailureReason::ConnectionDropped)
        );
    }

    #[test]
    fn dropped_peer_leaves_no_open_path() {
        let (mut host, mut phone) = connected_pair();
        phone.pad.gesture_start(Point::new(10.0, 20.0));
        pump_all(&mut host, &mut phone);
        assert!(host.pad.relay.has_remote_path());

        phone.pad.toggle_mode();
        pump_all(&mut host, &mut phone);
        assert_eq!(
            host.pad.status(),
            &SessionStatus::Failed(FailureReason::ConnectionDropped)
        );
        assert!(!host.pad.relay.has_remote_path());
    }
}
