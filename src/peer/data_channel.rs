use crate::error::PadError;
use crate::peer::types::ConnectionId;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Метка канала для штрихов
pub const DATA_CHANNEL_LABEL: &str = "drawpad-strokes";

/// События из колбэков webrtc и задач согласования,
/// которые обрабатывает actor endpoint'а
pub enum LinkEvent {
    /// Offer/answer собран вместе с кандидатами, можно слать через relay
    LocalDescription(ConnectionId, Result<RTCSessionDescription, PadError>),
    /// Удалённая сторона открыла канал (сторона, принявшая offer)
    Channel(ConnectionId, Arc<RTCDataChannel>),
    ChannelOpen(ConnectionId),
    Message(ConnectionId, Bytes),
    Closed(ConnectionId),
}

/// общий обработчик data-channel
pub fn attach_dc(dc: &Arc<RTCDataChannel>, conn: ConnectionId, events: mpsc::UnboundedSender<LinkEvent>) {
    tracing::debug!(%conn, label = dc.label(), "attaching data channel handlers");

    dc.on_open(Box::new({
        let events = events.clone();
        move || {
            tracing::debug!(%conn, "data channel opened");
            let _ = events.send(LinkEvent::ChannelOpen(conn));
            Box::pin(async {})
        }
    }));

    dc.on_message(Box::new({
        let events = events.clone();
        move |msg: DataChannelMessage| {
            let _ = events.send(LinkEvent::Message(conn, msg.data));
            Box::pin(async {})
        }
    }));

    dc.on_close(Box::new(move || {
        tracing::debug!(%conn, "data channel closed");
        let _ = events.send(LinkEvent::Closed(conn));
        Box::pin(async {})
    }));
}
