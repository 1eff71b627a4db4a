use std::{sync::Arc, time::Duration};

use padlink_session::{
    Command, ConnectionState, EventType, MemoryPeer, MemoryTransport, SessionConfig,
    SessionHandle, SessionManager, SessionNotice,
};
use tokio::{
    sync::{broadcast, mpsc},
    time::{Instant, timeout},
};

const SUBSCRIBE_ALL: &str = r#"{"Subscribe":{"event_types":["command_response","sensor_stream","active_player_broadcast"]}}"#;
const START: &str = r#"{"StartSensorStream":null}"#;

fn config() -> SessionConfig {
    SessionConfig {
        reconnect_base_delay_ms: 100,
        reconnect_max_delay_ms: 1_000,
        max_reconnect_attempts: 3,
        send_stagger_ms: 50,
        connect_on_start: false,
        ..Default::default()
    }
}

fn start(
    config: SessionConfig,
) -> (SessionHandle, MemoryTransport, mpsc::UnboundedReceiver<MemoryPeer>) {
    let (transport, accepted) = MemoryTransport::new();
    let handle = SessionManager::from_config(config)
        .unwrap()
        .start_with_transport(Arc::new(transport.clone()));
    (handle, transport, accepted)
}

async fn wait_for_state(handle: &SessionHandle, state: ConnectionState) {
    let mut state_rx = handle.subscribe_state();
    let _ = state_rx.wait_for(|s| *s == state).await.unwrap();
}

async fn wait_for_notice<F>(notices: &mut broadcast::Receiver<SessionNotice>, mut matches: F)
where
    F: FnMut(&SessionNotice) -> bool,
{
    loop {
        let notice = notices.recv().await.unwrap();
        if matches(&notice) {
            return;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn queued_commands_flush_in_order_after_open() {
    let (handle, _transport, mut accepted) = start(config());

    handle
        .submit(Command::ChangeProfile { name: "A".into() })
        .unwrap();
    handle
        .submit(Command::ChangeProfile { name: "B".into() })
        .unwrap();
    handle.connect().unwrap();

    let mut peer = accepted.recv().await.unwrap();
    assert_eq!(peer.recv().await.unwrap(), SUBSCRIBE_ALL);

    assert_eq!(
        peer.recv().await.unwrap(),
        r#"{"ChangeProfile":{"name":"A"}}"#
    );
    let first = Instant::now();
    assert_eq!(
        peer.recv().await.unwrap(),
        r#"{"ChangeProfile":{"name":"B"}}"#
    );
    assert!(first.elapsed() >= Duration::from_millis(50));

    assert_eq!(peer.recv().await.unwrap(), START);
    assert_eq!(handle.connection_state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn channel_drop_mid_replay_keeps_unsent_commands() {
    let (handle, _transport, mut accepted) = start(config());

    handle
        .submit(Command::ChangeProfile { name: "A".into() })
        .unwrap();
    handle
        .submit(Command::ChangeProfile { name: "B".into() })
        .unwrap();
    handle.connect().unwrap();

    // server drops before the first stagger elapses
    let mut first = accepted.recv().await.unwrap();
    assert_eq!(first.recv().await.unwrap(), SUBSCRIBE_ALL);
    first.close();
    assert_eq!(first.recv().await, None);

    let mut second = accepted.recv().await.unwrap();
    assert_eq!(second.recv().await.unwrap(), SUBSCRIBE_ALL);
    assert_eq!(
        second.recv().await.unwrap(),
        r#"{"ChangeProfile":{"name":"A"}}"#
    );
    assert_eq!(
        second.recv().await.unwrap(),
        r#"{"ChangeProfile":{"name":"B"}}"#
    );
    assert_eq!(second.recv().await.unwrap(), START);
}

#[tokio::test(start_paused = true)]
async fn queued_start_is_not_sent_twice() {
    let (handle, _transport, mut accepted) = start(config());

    handle.submit(Command::StartSensorStream).unwrap();
    handle.connect().unwrap();

    let mut peer = accepted.recv().await.unwrap();
    assert_eq!(peer.recv().await.unwrap(), SUBSCRIBE_ALL);
    assert_eq!(peer.recv().await.unwrap(), START);
    assert!(timeout(Duration::from_secs(1), peer.recv()).await.is_err());
    assert_eq!(handle.connection_state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn refused_opens_back_off_then_succeed() {
    let (handle, transport, mut accepted) = start(config());
    transport.refuse_next(2);

    let started = Instant::now();
    handle.connect().unwrap();
    let mut peer = accepted.recv().await.unwrap();

    // 100ms + 200ms of backoff before the third open
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(transport.opens(), 3);
    assert_eq!(peer.recv().await.unwrap(), SUBSCRIBE_ALL);
    wait_for_state(&handle, ConnectionState::Open).await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_until_manual_reconnect() {
    let (handle, transport, mut accepted) = start(SessionConfig {
        max_reconnect_attempts: 2,
        ..config()
    });
    let mut notices = handle.notices();
    transport.refuse_next(3);

    handle.connect().unwrap();
    wait_for_notice(&mut notices, |n| {
        matches!(n, SessionNotice::RetriesExhausted { attempts: 2 })
    })
    .await;
    assert_eq!(handle.connection_state(), ConnectionState::Failed);
    assert_eq!(transport.opens(), 3);

    // nothing more happens on its own
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.opens(), 3);

    handle.connect().unwrap();
    wait_for_notice(&mut notices, |n| matches!(n, SessionNotice::Rejected { .. })).await;
    assert_eq!(handle.connection_state(), ConnectionState::Failed);

    handle.manual_reconnect().unwrap();
    let mut peer = accepted.recv().await.unwrap();
    assert_eq!(peer.recv().await.unwrap(), SUBSCRIBE_ALL);
    wait_for_state(&handle, ConnectionState::Open).await;
}

#[tokio::test(start_paused = true)]
async fn server_restart_replays_commands_submitted_while_down() {
    let (handle, _transport, mut accepted) = start(config());
    handle.connect().unwrap();

    let mut first = accepted.recv().await.unwrap();
    assert_eq!(first.recv().await.unwrap(), SUBSCRIBE_ALL);
    assert_eq!(first.recv().await.unwrap(), START);

    first.close();
    wait_for_state(&handle, ConnectionState::Reconnecting).await;
    handle
        .submit(Command::ChangeProfile { name: "X".into() })
        .unwrap();

    let mut second = accepted.recv().await.unwrap();
    assert_eq!(second.recv().await.unwrap(), SUBSCRIBE_ALL);
    assert_eq!(
        second.recv().await.unwrap(),
        r#"{"ChangeProfile":{"name":"X"}}"#
    );
    assert_eq!(second.recv().await.unwrap(), START);
}

#[tokio::test(start_paused = true)]
async fn repeated_manual_reconnect_leaves_one_live_channel() {
    let (handle, _transport, mut accepted) = start(config());
    handle.connect().unwrap();

    let mut first = accepted.recv().await.unwrap();
    assert_eq!(first.recv().await.unwrap(), SUBSCRIBE_ALL);
    assert_eq!(first.recv().await.unwrap(), START);

    let mut notices = handle.notices();
    handle.manual_reconnect().unwrap();
    handle.manual_reconnect().unwrap();
    wait_for_notice(&mut notices, |n| {
        matches!(
            n,
            SessionNotice::StateChanged {
                to: ConnectionState::Open,
                ..
            }
        )
    })
    .await;

    // the superseded channel was closed by the client
    assert_eq!(first.recv().await, None);

    let mut live = 0;
    while let Ok(Some(mut peer)) = timeout(Duration::from_millis(100), accepted.recv()).await {
        match timeout(Duration::from_secs(1), peer.recv()).await {
            Ok(Some(frame)) => {
                assert_eq!(frame, SUBSCRIBE_ALL);
                live += 1;
            }
            Ok(None) => {}
            Err(_) => panic!("superseded channel was left open"),
        }
    }
    assert_eq!(live, 1);
}

#[tokio::test(start_paused = true)]
async fn frames_reach_registered_handlers() {
    let (samples_tx, mut samples) = mpsc::unbounded_channel();
    let (players_tx, mut players) = mpsc::unbounded_channel();
    let (transport, mut accepted) = MemoryTransport::new();
    let handle = SessionManager::from_config(config())
        .unwrap()
        .on_sensor_stream(move |values| {
            let _ = samples_tx.send(values);
        })
        .on_presence_changed(move |msg| {
            let current = msg.data.as_ref().map(|d| d.current_player.clone());
            let _ = players_tx.send(current);
        })
        .start_with_transport(Arc::new(transport));
    let mut notices = handle.notices();
    handle.connect().unwrap();

    let peer = accepted.recv().await.unwrap();
    assert!(peer.send(
        r#"{"success":true,"message":"Sensor stream data","response_type":"sensor_stream","sensor_values":[1,2,3,4]}"#
    ));
    assert!(peer.send("not json"));
    assert!(peer.send(
        r#"{"success":true,"message":"Active player changed","response_type":"active_player_broadcast","data":{"profiles":{},"current_profile":"DEFAULT","current_player":"ann"}}"#
    ));

    assert_eq!(samples.recv().await.unwrap(), [1, 2, 3, 4]);
    assert_eq!(players.recv().await.unwrap(), Some("ann".to_string()));
    wait_for_notice(&mut notices, |n| {
        matches!(n, SessionNotice::MalformedFrame { .. })
    })
    .await;
    assert_eq!(handle.connection_state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn close_keeps_queue_for_next_connect() {
    let (handle, _transport, mut accepted) = start(SessionConfig {
        auto_start_stream: false,
        ..config()
    });
    handle.connect().unwrap();
    let mut first = accepted.recv().await.unwrap();
    assert_eq!(first.recv().await.unwrap(), SUBSCRIBE_ALL);

    handle.close().unwrap();
    wait_for_state(&handle, ConnectionState::Disconnected).await;
    assert_eq!(first.recv().await, None);

    handle
        .submit(Command::unsubscribe([EventType::SensorStream]))
        .unwrap();
    handle.submit(Command::GetCurrentThresholds).unwrap();

    // stays down on its own
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.connection_state(), ConnectionState::Disconnected);

    handle.connect().unwrap();
    let mut second = accepted.recv().await.unwrap();
    assert_eq!(
        second.recv().await.unwrap(),
        r#"{"Subscribe":{"event_types":["command_response","active_player_broadcast"]}}"#
    );
    assert_eq!(
        second.recv().await.unwrap(),
        r#"{"Unsubscribe":{"event_types":["sensor_stream"]}}"#
    );
    assert_eq!(
        second.recv().await.unwrap(),
        r#"{"GetCurrentThresholds":null}"#
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_channel_and_stops_driver() {
    let (handle, _transport, mut accepted) = start(SessionConfig {
        connect_on_start: true,
        ..config()
    });
    let mut peer = accepted.recv().await.unwrap();
    assert_eq!(peer.recv().await.unwrap(), SUBSCRIBE_ALL);

    handle.shutdown();
    wait_for_state(&handle, ConnectionState::Disconnected).await;

    // START may still be in the pipe; the channel must end after it
    while let Some(frame) = peer.recv().await {
        assert_eq!(frame, START);
    }
}
