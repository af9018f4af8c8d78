use std::sync::Arc;
use std::time::Duration;

use drawpad_lib::{
    spawn_pad, Canvas, Config, FailureReason, MemoryNetwork, PadEvent, PadHandle, PenStyle, Role,
    SessionStatus, Viewport,
};
use tokio::sync::mpsc::UnboundedReceiver;

fn canvas() -> Canvas {
    Canvas::new(Viewport::new(800.0, 600.0).unwrap(), PenStyle::default())
}

fn spawn(
    net: &MemoryNetwork,
    role: Role,
) -> (
    PadHandle,
    UnboundedReceiver<PadEvent>,
    tokio::task::JoinHandle<Canvas>,
) {
    spawn_pad(&Config::default(), role, Arc::new(net.clone()), canvas())
}

async fn wait_for<F>(notices: &mut UnboundedReceiver<PadEvent>, mut pred: F) -> PadEvent
where
    F: FnMut(&PadEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let event = notices.recv().await.expect("pad stopped");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for pad event")
}

fn is_connected(event: &PadEvent) -> bool {
    matches!(event, PadEvent::StatusChanged(SessionStatus::Connected { .. }))
}

#[tokio::test]
async fn phone_draws_on_computer() {
    let net = MemoryNetwork::with_ids(["abc123", "phone01"]);
    let (host, mut host_events, host_task) = spawn(&net, Role::Host);
    let event = wait_for(&mut host_events, |e| matches!(e, PadEvent::IdentityAssigned(_))).await;
    let PadEvent::IdentityAssigned(code) = event else {
        unreachable!()
    };
    assert_eq!(code.as_str(), "abc123");

    let (phone, mut phone_events, _phone_task) = spawn(&net, Role::Joiner);
    phone.join(code.as_str()).unwrap();
    wait_for(&mut phone_events, is_connected).await;
    wait_for(&mut host_events, is_connected).await;

    phone.gesture_start(10.0, 20.0).unwrap();
    phone.gesture_move(15.0, 25.0).unwrap();
    phone.gesture_end().unwrap();

    // the phone's own snapshot orders after its gestures were sent
    let phone_view = phone.snapshot().await.unwrap();
    assert!(phone_view.svg.unwrap().contains("d=\"M10 20 L15 25\""));

    let mut drawn = false;
    for _ in 0..100 {
        let svg = host.snapshot().await.unwrap().svg.unwrap();
        if svg.contains("d=\"M10 20 L15 25\"") {
            drawn = true;
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(drawn, "stroke never reached the computer");

    host.shutdown().unwrap();
    let canvas = host_task.await.unwrap();
    let paths: Vec<_> = canvas.paths().collect();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].points, vec![(10.0, 20.0), (15.0, 25.0)]);
}

#[tokio::test(start_paused = true)]
async fn stalled_join_times_out() {
    let net = MemoryNetwork::new();
    let (phone, mut events, _task) = spawn(&net, Role::Joiner);
    phone.join("nonexistent").unwrap();

    wait_for(&mut events, |e| {
        matches!(e, PadEvent::StatusChanged(SessionStatus::Connecting { .. }))
    })
    .await;
    let started = tokio::time::Instant::now();

    wait_for(&mut events, |e| {
        matches!(e, PadEvent::StatusChanged(SessionStatus::Failed(_)))
    })
    .await;
    assert!(started.elapsed() >= Duration::from_secs(15));

    let snapshot = phone.snapshot().await.unwrap();
    assert_eq!(
        snapshot.status,
        SessionStatus::Failed(FailureReason::JoinTimedOut)
    );
    assert_eq!(net.endpoint_count(), 0);
}

#[tokio::test]
async fn second_phone_is_rejected() {
    let net = MemoryNetwork::with_ids(["abc123"]);
    let (host, mut host_events, _host_task) = spawn(&net, Role::Host);
    wait_for(&mut host_events, |e| matches!(e, PadEvent::IdentityAssigned(_))).await;

    let (first, mut first_events, _t1) = spawn(&net, Role::Joiner);
    first.join("abc123").unwrap();
    wait_for(&mut first_events, is_connected).await;
    wait_for(&mut host_events, is_connected).await;

    let (second, mut second_events, _t2) = spawn(&net, Role::Joiner);
    second.join("abc123").unwrap();
    wait_for(&mut host_events, |e| matches!(e, PadEvent::PeerRejected(_))).await;
    wait_for(&mut second_events, |e| {
        matches!(
            e,
            PadEvent::StatusChanged(SessionStatus::Failed(FailureReason::ConnectionDropped))
        )
    })
    .await;

    assert!(matches!(
        host.snapshot().await.unwrap().status,
        SessionStatus::Connected { .. }
    ));
    assert!(matches!(
        first.snapshot().await.unwrap().status,
        SessionStatus::Connected { .. }
    ));
}

#[tokio::test]
async fn switching_modes_issues_a_fresh_code() {
    let net = MemoryNetwork::with_ids(["first1", "second2"]);
    let (pad, mut events, _task) = spawn(&net, Role::Host);
    wait_for(&mut events, |e| matches!(e, PadEvent::IdentityAssigned(_))).await;

    pad.toggle_mode().unwrap();
    wait_for(&mut events, |e| *e == PadEvent::RoleChanged(Role::Joiner)).await;
    let snapshot = pad.snapshot().await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Idle);
    assert!(snapshot.identity.is_none());

    pad.toggle_mode().unwrap();
    let event = wait_for(&mut events, |e| matches!(e, PadEvent::IdentityAssigned(_))).await;
    assert_eq!(
        event,
        PadEvent::IdentityAssigned(drawpad_lib::RendezvousId::parse("second2").unwrap())
    );
}

#[tokio::test]
async fn join_in_computer_mode_is_reported() {
    let net = MemoryNetwork::new();
    let (pad, mut events, _task) = spawn(&net, Role::Host);
    pad.join("abc123").unwrap();
    let event = wait_for(&mut events, |e| matches!(e, PadEvent::CommandFailed(_))).await;
    assert!(matches!(event, PadEvent::CommandFailed(msg) if msg.contains("phone")));
}

#[tokio::test]
async fn handle_reports_closed_pad() {
    let net = MemoryNetwork::new();
    let (pad, _events, task) = spawn(&net, Role::Joiner);
    pad.shutdown().unwrap();
    task.await.unwrap();
    assert!(pad.clear().is_err());
    assert!(pad.snapshot().await.is_err());
}
