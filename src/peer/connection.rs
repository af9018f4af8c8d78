use crate::config::Config;
use crate::error::PadError;
use crate::logger::dump_selected_pair;
use crate::peer::data_channel::{attach_dc, LinkEvent, DATA_CHANNEL_LABEL};
use crate::peer::ice::{rtc_config, validate_ice_servers};
use crate::peer::types::{
    ConnectionId, EventSink, RendezvousId, SdpPayload, ServerConfig, TransportEvent,
};
use crate::peer::{Endpoint, Transport};
use crate::rendezvous::protocol::RelayMessage;
use crate::session::FailureReason;
use crate::signaling::{SignalSender, SignalingClient};
use crate::utils::random_id;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

/// Сколько ждём сбора ICE кандидатов перед отправкой SDP
pub const GATHER_TIMEOUT: Duration = Duration::from_secs(5);

/// Транспорт на WebRTC data channel'ах. Код подключения выдаёт relay,
/// через него же идут offer/answer; штрихи идут напрямую между устройствами.
#[derive(Debug, Clone)]
pub struct WebRtcTransport {
    relay_url: String,
    ice_servers: Vec<ServerConfig>,
}

impl WebRtcTransport {
    pub fn new(relay_url: impl Into<String>, ice_servers: Vec<ServerConfig>) -> Self {
        Self {
            relay_url: relay_url.into(),
            ice_servers,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, PadError> {
        validate_ice_servers(&config.ice_servers)?;
        Ok(Self::new(config.relay_url.clone(), config.ice_servers.clone()))
    }
}

impl Transport for WebRtcTransport {
    fn create_endpoint(&self, events: EventSink) -> Result<Box<dyn Endpoint>, PadError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PadError::TransportUnavailable(e.to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_ids = Arc::new(AtomicU64::new(1));
        let actor = EndpointActor {
            sink: events,
            ice_servers: self.ice_servers.clone(),
            conn_ids: conn_ids.clone(),
            links: HashMap::new(),
        };
        runtime.spawn(actor.run(self.relay_url.clone(), rx));
        Ok(Box::new(WebRtcEndpoint {
            commands: tx,
            conn_ids,
        }))
    }
}

enum EndpointCommand {
    Connect {
        conn: ConnectionId,
        peer: RendezvousId,
    },
    Send {
        conn: ConnectionId,
        payload: Bytes,
    },
    Close(ConnectionId),
    Disconnect,
}

/// Ручка endpoint'а: команды уходят actor'у, результат приходит событиями
struct WebRtcEndpoint {
    commands: mpsc::UnboundedSender<EndpointCommand>,
    conn_ids: Arc<AtomicU64>,
}

impl Endpoint for WebRtcEndpoint {
    fn connect(&mut self, peer: &RendezvousId) -> Result<ConnectionId, PadError> {
        let conn = ConnectionId(self.conn_ids.fetch_add(1, Ordering::Relaxed));
        self.commands
            .send(EndpointCommand::Connect {
                conn,
                peer: peer.clone(),
            })
            .map_err(|_| PadError::EndpointClosed)?;
        Ok(conn)
    }

    fn send(&mut self, conn: ConnectionId, payload: Bytes) -> Result<(), PadError> {
        self.commands
            .send(EndpointCommand::Send { conn, payload })
            .map_err(|_| PadError::EndpointClosed)
    }

    fn close_connection(&mut self, conn: ConnectionId) {
        let _ = self.commands.send(EndpointCommand::Close(conn));
    }

    fn disconnect(&mut self) {
        let _ = self.commands.send(EndpointCommand::Disconnect);
    }
}

struct PeerLink {
    pc: Arc<RTCPeerConnection>,
    dc: Option<Arc<RTCDataChannel>>,
    remote: RendezvousId,
    /// id из SdpPayload, связывает offer и answer
    correlation: String,
    /// Мы инициатор (телефон)
    outbound: bool,
    open: bool,
}

struct EndpointActor {
    sink: EventSink,
    ice_servers: Vec<ServerConfig>,
    conn_ids: Arc<AtomicU64>,
    links: HashMap<ConnectionId, PeerLink>,
}

impl EndpointActor {
    async fn run(mut self, relay_url: String, mut commands: mpsc::UnboundedReceiver<EndpointCommand>) {
        let mut client = match SignalingClient::connect(&relay_url).await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(relay = %relay_url, error = %e, "relay unreachable");
                self.sink
                    .emit(TransportEvent::Error(format!("relay {relay_url} unreachable: {e}")));
                return;
            }
        };
        let id = match client.register().await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(error = %e, "relay registration failed");
                self.sink.emit(TransportEvent::Error(e.to_string()));
                return;
            }
        };
        tracing::info!(id = %id, "registered with relay");
        self.sink.emit(TransportEvent::Open(id));

        let (mut signals, mut relay) = client.into_split();
        let (link_tx, mut link_rx) = mpsc::unbounded_channel();
        let mut relay_alive = true;

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    None | Some(EndpointCommand::Disconnect) => break,
                    Some(cmd) => self.handle_command(cmd, &link_tx).await,
                },

                msg = relay.recv(), if relay_alive => match msg {
                    Ok(Some(msg)) => self.handle_relay(msg, &link_tx).await,
                    other => {
                        relay_alive = false;
                        if let Err(e) = other {
                            tracing::warn!(error = %e, "relay connection error");
                        }
                        // установленным соединениям relay уже не нужен
                        if self.links.values().any(|l| l.open) {
                            tracing::warn!("relay connection lost, keeping open peer links");
                        } else {
                            self.sink.emit(TransportEvent::Error("relay closed the connection".into()));
                            break;
                        }
                    }
                },

                Some(ev) = link_rx.recv() => self.handle_link(ev, &mut signals).await,
            }
        }

        tracing::debug!(links = self.links.len(), "endpoint actor stopping");
        self.close_all().await;
        signals.close().await;
    }

    async fn handle_command(&mut self, cmd: EndpointCommand, link_tx: &mpsc::UnboundedSender<LinkEvent>) {
        match cmd {
            EndpointCommand::Connect { conn, peer } => {
                if let Err(e) = self.open_outbound(conn, peer, link_tx).await {
                    tracing::warn!(%conn, error = %e, "outbound connection failed");
                    self.fail_outbound(conn, FailureReason::Transport(e.to_string()))
                        .await;
                }
            }
            EndpointCommand::Send { conn, payload } => {
                match self.links.get(&conn).and_then(|l| l.dc.clone()) {
                    Some(dc) => {
                        if let Err(e) = dc.send(&payload).await {
                            tracing::warn!(%conn, error = %e, "data channel send failed");
                        }
                    }
                    None => tracing::debug!(%conn, "send on unknown connection"),
                }
            }
            EndpointCommand::Close(conn) => {
                self.drop_link(conn).await;
            }
            EndpointCommand::Disconnect => {}
        }
    }

    /// Телефон: создаём peer и data channel. Offer собирается в отдельной
    /// задаче и уходит хосту по `LinkEvent::LocalDescription`
    async fn open_outbound(
        &mut self,
        conn: ConnectionId,
        peer: RendezvousId,
        link_tx: &mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<(), PadError> {
        let pc = new_peer_connection(&self.ice_servers, conn, link_tx.clone()).await?;
        let dc = pc
            .create_data_channel(DATA_CHANNEL_LABEL, Some(RTCDataChannelInit::default()))
            .await?;
        attach_dc(&dc, conn, link_tx.clone());

        self.links.insert(
            conn,
            PeerLink {
                pc: pc.clone(),
                dc: Some(dc),
                remote: peer,
                correlation: random_id(),
                outbound: true,
                open: false,
            },
        );

        let events = link_tx.clone();
        tokio::spawn(async move {
            let offer = make_offer(&pc).await;
            let _ = events.send(LinkEvent::LocalDescription(conn, offer));
        });
        Ok(())
    }

    /// Хост: принимаем offer, answer собирается в отдельной задаче
    async fn accept_offer(
        &mut self,
        conn: ConnectionId,
        from: RendezvousId,
        offer: SdpPayload,
        link_tx: &mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<(), PadError> {
        tracing::info!(%conn, from = %from, "incoming offer");
        let pc = new_peer_connection(&self.ice_servers, conn, link_tx.clone()).await?;
        self.links.insert(
            conn,
            PeerLink {
                pc: pc.clone(),
                dc: None,
                remote: from,
                correlation: offer.id,
                outbound: false,
                open: false,
            },
        );

        let events = link_tx.clone();
        tokio::spawn(async move {
            let answer = make_answer(&pc, offer.sdp).await;
            let _ = events.send(LinkEvent::LocalDescription(conn, answer));
        });
        Ok(())
    }

    /// Собранный SDP уходит собеседнику через relay
    async fn send_local_description(
        &mut self,
        conn: ConnectionId,
        sdp: Result<RTCSessionDescription, PadError>,
        signals: &mut SignalSender,
    ) {
        let Some(link) = self.links.get(&conn) else {
            tracing::debug!(%conn, "negotiation finished for a closed link");
            return;
        };
        let outbound = link.outbound;
        let remote = link.remote.clone();
        let payload = sdp.map(|sdp| signal_payload(link, sdp));

        let sent = match payload {
            Ok(payload) => {
                tracing::info!(%conn, peer = %remote, sdp_type = %payload.sdp.sdp_type, "sending local description");
                signals.signal(&remote, &payload).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            tracing::warn!(%conn, error = %e, "negotiation failed");
            if outbound {
                self.fail_outbound(conn, FailureReason::Transport(e.to_string()))
                    .await;
            } else {
                self.drop_link(conn).await;
            }
        }
    }

    async fn handle_relay(&mut self, msg: RelayMessage, link_tx: &mpsc::UnboundedSender<LinkEvent>) {
        match msg {
            RelayMessage::Signal { from, payload } => {
                let from = match RendezvousId::parse(&from) {
                    Ok(from) => from,
                    Err(e) => {
                        tracing::warn!(error = %e, "signal with bad sender id");
                        return;
                    }
                };
                let payload: SdpPayload = match serde_json::from_value(payload) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(from = %from, error = %e, "undecodable signal payload");
                        return;
                    }
                };

                match payload.sdp.sdp_type {
                    RTCSdpType::Offer => {
                        let conn = ConnectionId(self.conn_ids.fetch_add(1, Ordering::Relaxed));
                        if let Err(e) = self.accept_offer(conn, from, payload, link_tx).await {
                            tracing::warn!(%conn, error = %e, "failed to answer offer");
                            self.drop_link(conn).await;
                        }
                    }
                    RTCSdpType::Answer => {
                        let found = self
                            .links
                            .iter()
                            .find(|(_, l)| l.outbound && l.correlation == payload.id)
                            .map(|(conn, l)| (*conn, l.pc.clone()));
                        let Some((conn, pc)) = found else {
                            tracing::debug!(id = %payload.id, "answer for unknown offer");
                            return;
                        };
                        tracing::info!(%conn, from = %from, "answer received");
                        if let Err(e) = pc.set_remote_description(payload.sdp).await {
                            tracing::warn!(%conn, error = %e, "bad answer");
                            self.fail_outbound(conn, FailureReason::Transport(e.to_string()))
                                .await;
                        }
                    }
                    other => {
                        tracing::debug!(sdp_type = ?other, "unsupported sdp type ignored");
                    }
                }
            }

            RelayMessage::UnknownPeer { id } => {
                let failed: Vec<ConnectionId> = self
                    .links
                    .iter()
                    .filter(|(_, l)| l.outbound && !l.open && l.remote.as_str() == id)
                    .map(|(conn, _)| *conn)
                    .collect();
                for conn in failed {
                    tracing::warn!(%conn, peer = %id, "no host with this code");
                    self.fail_outbound(conn, FailureReason::UnknownPeer).await;
                }
            }

            RelayMessage::Error { message } => {
                tracing::warn!(%message, "relay reported an error");
            }

            RelayMessage::Registered { id } => {
                tracing::debug!(id = %id, "duplicate registration ack ignored");
            }
        }
    }

    async fn handle_link(&mut self, ev: LinkEvent, signals: &mut SignalSender) {
        match ev {
            LinkEvent::LocalDescription(conn, sdp) => {
                self.send_local_description(conn, sdp, signals).await;
            }
            LinkEvent::Channel(conn, dc) => {
                if let Some(link) = self.links.get_mut(&conn) {
                    link.dc = Some(dc);
                }
            }
            LinkEvent::ChannelOpen(conn) => {
                if let Some(link) = self.links.get_mut(&conn) {
                    if !link.open {
                        link.open = true;
                        let event = if link.outbound {
                            TransportEvent::ConnectionOpen(conn)
                        } else {
                            TransportEvent::IncomingConnection(conn)
                        };
                        self.sink.emit(event);
                    }
                }
            }
            LinkEvent::Message(conn, data) => {
                if self.links.contains_key(&conn) {
                    self.sink.emit(TransportEvent::Data(conn, data));
                }
            }
            LinkEvent::Closed(conn) => {
                if let Some(link) = self.links.remove(&conn) {
                    let (was_open, outbound) = (link.open, link.outbound);
                    close_link(link).await;
                    if was_open {
                        self.sink.emit(TransportEvent::ConnectionClosed(conn));
                    } else if outbound {
                        self.sink.emit(TransportEvent::ConnectFailed(
                            conn,
                            FailureReason::Transport("peer connection failed".into()),
                        ));
                    }
                }
            }
        }
    }

    async fn fail_outbound(&mut self, conn: ConnectionId, reason: FailureReason) {
        self.drop_link(conn).await;
        self.sink.emit(TransportEvent::ConnectFailed(conn, reason));
    }

    async fn drop_link(&mut self, conn: ConnectionId) -> bool {
        match self.links.remove(&conn) {
            Some(link) => {
                close_link(link).await;
                true
            }
            None => false,
        }
    }

    async fn close_all(&mut self) {
        for (_, link) in self.links.drain() {
            close_link(link).await;
        }
    }
}

/// создаём Peer с обработчиками состояния и входящего data-channel
async fn new_peer_connection(
    servers: &[ServerConfig],
    conn: ConnectionId,
    events: mpsc::UnboundedSender<LinkEvent>,
) -> Result<Arc<RTCPeerConnection>, PadError> {
    let api = APIBuilder::new().build();
    let pc = Arc::new(api.new_peer_connection(rtc_config(servers)).await?);

    let pc_stats = Arc::downgrade(&pc);
    let state_events = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        tracing::debug!(%conn, state = ?st, "peer connection state changed");
        match st {
            RTCPeerConnectionState::Failed => {
                if let Some(pc) = pc_stats.upgrade() {
                    tokio::spawn(async move {
                        dump_selected_pair(&pc, "FAILED").await;
                    });
                }
                let _ = state_events.send(LinkEvent::Closed(conn));
            }
            RTCPeerConnectionState::Closed => {
                let _ = state_events.send(LinkEvent::Closed(conn));
            }
            _ => {}
        }
        Box::pin(async {})
    }));

    pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
        let _ = events.send(LinkEvent::Channel(conn, dc.clone()));
        attach_dc(&dc, conn, events.clone());
        Box::pin(async {})
    }));

    Ok(pc)
}

async fn make_offer(pc: &RTCPeerConnection) -> Result<RTCSessionDescription, PadError> {
    let offer = pc.create_offer(None).await?;
    set_local_and_gather(pc, offer).await
}

async fn make_answer(
    pc: &RTCPeerConnection,
    offer: RTCSessionDescription,
) -> Result<RTCSessionDescription, PadError> {
    pc.set_remote_description(offer).await?;
    let answer = pc.create_answer(None).await?;
    set_local_and_gather(pc, answer).await
}

/// Answer несёт id своего offer'а, по нему телефон находит соединение
fn signal_payload(link: &PeerLink, sdp: RTCSessionDescription) -> SdpPayload {
    SdpPayload {
        sdp,
        id: link.correlation.clone(),
        ts: chrono::Utc::now().timestamp(),
    }
}

/// Ставим local description и ждём кандидатов: SDP уходит целиком, без trickle
async fn set_local_and_gather(
    pc: &RTCPeerConnection,
    desc: RTCSessionDescription,
) -> Result<RTCSessionDescription, PadError> {
    let mut gathered = pc.gathering_complete_promise().await;
    pc.set_local_description(desc).await?;
    if timeout(GATHER_TIMEOUT, gathered.recv()).await.is_err() {
        tracing::warn!("ICE gathering timed out, sending collected candidates");
    }
    pc.local_description()
        .await
        .ok_or_else(|| PadError::TransportUnavailable("local description missing".into()))
}

async fn close_link(link: PeerLink) {
    if let Some(dc) = link.dc {
        let _ = dc.close().await;
    }
    let _ = link.pc.close().await;
}
