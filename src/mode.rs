use crate::session::SessionManager;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Роль экземпляра: компьютер показывает код и принимает штрихи,
/// телефон подключается по коду и отправляет их.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Joiner,
}

impl Role {
    pub fn other(self) -> Self {
        match self {
            Role::Host => Role::Joiner,
            Role::Joiner => Role::Host,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => f.write_str("computer"),
            Role::Joiner => f.write_str("phone"),
        }
    }
}

/// Переключатель режима. Любая смена роли рвёт текущую сессию,
/// рисунок при этом не очищается.
#[derive(Debug)]
pub struct ModeController {
    role: Role,
}

impl ModeController {
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Запускает настройку сессии для текущей роли: хост сразу получает код,
    /// телефон ждёт, пока пользователь введёт код.
    pub fn activate(&self, session: &mut SessionManager) {
        session.teardown();
        if self.role == Role::Host {
            session.become_host();
        }
    }

    pub fn toggle(&mut self, session: &mut SessionManager) -> Role {
        self.role = self.role.other();
        tracing::info!(role = %self.role, "mode switched");
        self.activate(session);
        self.role
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::MemoryNetwork;
    use crate::session::{AcceptPolicy, SessionStatus};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn session(net: &MemoryNetwork) -> (SessionManager, mpsc::UnboundedReceiver<crate::peer::TaggedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let s = SessionManager::new(
            Arc::new(net.clone()),
            tx,
            Duration::from_secs(5),
            AcceptPolicy::default(),
        );
        (s, rx)
    }

    #[test]
    fn role_display_matches_device_names() {
        assert_eq!(Role::Host.to_string(), "computer");
        assert_eq!(Role::Joiner.to_string(), "phone");
        assert_eq!(Role::Host.other(), Role::Joiner);
    }

    #[test]
    fn toggle_from_awaiting_host_discards_identity() {
        let net = MemoryNetwork::new();
        let (mut s, mut rx) = session(&net);
        let mut mode = ModeController::new(Role::Host);
        mode.activate(&mut s);
        while let Ok(ev) = rx.try_recv() {
            s.handle_event(ev);
        }
        let first = s.identity().cloned().unwrap();
        assert_eq!(s.status(), &SessionStatus::AwaitingPeer);

        assert_eq!(mode.toggle(&mut s), Role::Joiner);
        assert_eq!(s.status(), &SessionStatus::Idle);
        assert!(s.identity().is_none());
        assert!(!s.is_connected());
        assert_eq!(net.endpoint_count(), 0);

        assert_eq!(mode.toggle(&mut s), Role::Host);
        while let Ok(ev) = rx.try_recv() {
            s.handle_event(ev);
        }
        let second = s.identity().cloned().unwrap();
        assert_ne!(first, second);
    }
}
