//! Живые клиенты relay: id -> канал исходящих сообщений.

use crate::utils::random_id;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Общий для всех соединений реестр
#[derive(Clone, Default)]
pub struct Registry {
    peers: Arc<RwLock<HashMap<String, mpsc::Sender<String>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Новый id, уникальный среди живых клиентов
    pub async fn register(&self, tx: mpsc::Sender<String>) -> String {
        let mut map = self.peers.write().await;
        let mut id = random_id();
        while map.contains_key(&id) {
            id = random_id();
        }
        map.insert(id.clone(), tx);
        id
    }

    pub async fn lookup(&self, id: &str) -> Option<mpsc::Sender<String>> {
        self.peers.read().await.get(id).cloned()
    }

    /// true, если id был зарегистрирован
    pub async fn unregister(&self, id: &str) -> bool {
        self.peers.write().await.remove(id).is_some()
    }

    pub async fn count(&self) -> usize {
        self.peers.read().await.len()
    }
}
