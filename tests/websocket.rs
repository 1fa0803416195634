//! Websocket broadcast tests against a live server on an ephemeral port.
//!
//! Run with: cargo test --test websocket -- --nocapture

use chaos_strategist::{
    predictor::FixedPace, radio::RadioEngineer, server, BroadcastMessage, PitWall, Session,
    SimulationEngine,
};
use futures_util::{SinkExt, StreamExt};
use std::{sync::Arc, time::Duration};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> (String, Session) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let engine = SimulationEngine::new(Arc::new(FixedPace::new(81.5)))
        .with_trials(1_000)
        .with_seed(11);
    let session = Session::new();
    tokio::spawn(server::serve(
        listener,
        PitWall::new(engine, RadioEngineer::offline()),
        session.clone(),
    ));
    (format!("ws://{}/ws/chaos", addr), session)
}

async fn connect(url: &str) -> Client {
    let (ws, _) = connect_async(url).await.expect("connect");
    ws
}

async fn wait_for_members(session: &Session, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while session.len() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("membership never settled");
}

async fn recv(ws: &mut Client) -> BroadcastMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no broadcast within 5s")
            .expect("stream ended")
            .expect("protocol error");
        if let Message::Text(t) = msg {
            return serde_json::from_str(&t).expect("broadcast json");
        }
    }
}

#[tokio::test]
async fn test_broadcast_reaches_all_clients() {
    println!("\n=== Test: Broadcast fan-out ===");
    let (url, session) = start().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    wait_for_members(&session, 2).await;

    a.send(Message::text(
        r#"{"event":"tyre_failure","current_tire_age":12,"compound":"MEDIUM","laps_left":25}"#,
    ))
    .await
    .unwrap();

    let got_a = recv(&mut a).await;
    let got_b = recv(&mut b).await;
    assert_eq!(got_a, got_b);
    assert_eq!(got_a.event, "tyre_failure");
    assert_eq!(
        got_a.math_results.as_result().unwrap().recommendation,
        "Box box box! Sudden puncture, change tyres now!"
    );
    println!("✓ both clients received {:?}", got_a.event);
}

#[tokio::test]
async fn test_disconnect_does_not_affect_others() {
    println!("\n=== Test: Disconnect isolation ===");
    let (url, session) = start().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    wait_for_members(&session, 2).await;

    b.close(None).await.unwrap();
    drop(b);
    wait_for_members(&session, 1).await;

    a.send(Message::text("heatwave")).await.unwrap();
    let got = recv(&mut a).await;
    assert_eq!(got.event, "heatwave");
    assert!(got.math_results.as_result().is_some());
    println!("✓ remaining client still served");
}

#[tokio::test]
async fn test_events_from_one_client_are_processed_in_order() {
    let (url, session) = start().await;
    let mut a = connect(&url).await;
    wait_for_members(&session, 1).await;

    for tag in ["rain", "traffic", "penalty_5s"] {
        a.send(Message::text(format!(r#"{{"event":"{tag}"}}"#)))
            .await
            .unwrap();
    }
    for tag in ["rain", "traffic", "penalty_5s"] {
        assert_eq!(recv(&mut a).await.event, tag);
    }
}
