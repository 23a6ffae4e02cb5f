mod common;

use std::net::SocketAddr;
use std::time::Duration;

use chiacchiera_core::{
    AckStatus, Authenticate, ClientEvent, ClientFrame, GroupRef, SendMessage, ServerEvent,
};
use chiacchiera_server::routes::router;
use common::TestEnv;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

// Avvia il router vero su una porta libera
async fn serve(env: &TestEnv) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = router(env.state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

async fn open(addr: SocketAddr, token: Option<&str>) -> Socket {
    let url = match token {
        Some(t) => format!("ws://{}/ws?token={}", addr, t),
        None => format!("ws://{}/ws", addr),
    };
    let (ws, _) = connect_async(url).await.expect("websocket handshake");
    ws
}

async fn send(ws: &mut Socket, frame: &ClientFrame) {
    let text = serde_json::to_string(frame).expect("serialize frame");
    ws.send(Message::Text(text)).await.expect("send frame");
}

/// Prossimo evento applicativo, saltando ping/pong.
async fn next_event(ws: &mut Socket) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .expect("socket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("valid server event"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame {:?}", other),
        }
    }
}

/// `true` se il server chiude la connessione (close frame, EOF o reset).
async fn closed_by_server(ws: &mut Socket) -> bool {
    match tokio::time::timeout(WAIT, ws.next()).await {
        Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => true,
        _ => false,
    }
}

async fn join(ws: &mut Socket, group_id: &str) {
    let frame = ClientFrame::new(ClientEvent::JoinGroup(GroupRef { group_id: group_id.to_string() }))
        .with_request_id("join");
    send(ws, &frame).await;
    match next_event(ws).await {
        ServerEvent::Ack(ack) => assert_eq!(ack.status, AckStatus::Ok, "join failed: {:?}", ack.error),
        other => panic!("expected join ack, got {:?}", other),
    }
}

#[tokio::test]
async fn token_in_query_gets_auth_ok() {
    let env = common::setup().await;
    let (alice, token) = env.user("alice").await;
    let addr = serve(&env).await;

    let mut ws = open(addr, Some(&token)).await;
    match next_event(&mut ws).await {
        ServerEvent::AuthOk(user) => assert_eq!(user, alice),
        other => panic!("expected authOk, got {:?}", other),
    }
}

#[tokio::test]
async fn first_frame_can_authenticate() {
    let env = common::setup().await;
    let (alice, token) = env.user("alice").await;
    let addr = serve(&env).await;

    let mut ws = open(addr, None).await;
    send(&mut ws, &ClientFrame::new(ClientEvent::Authenticate(Authenticate { token }))).await;
    match next_event(&mut ws).await {
        ServerEvent::AuthOk(user) => assert_eq!(user.user_id, alice.user_id),
        other => panic!("expected authOk, got {:?}", other),
    }
}

#[tokio::test]
async fn bad_token_gets_error_then_close() {
    let env = common::setup().await;
    let addr = serve(&env).await;

    let mut ws = open(addr, Some("bogus")).await;
    match next_event(&mut ws).await {
        ServerEvent::Error(e) => assert_eq!(e.code, "unauthenticated"),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(closed_by_server(&mut ws).await);
}

// senza token il primo frame deve essere authenticate
#[tokio::test]
async fn first_frame_other_than_authenticate_is_refused() {
    let env = common::setup().await;
    let addr = serve(&env).await;

    let mut ws = open(addr, None).await;
    let frame = ClientFrame::new(ClientEvent::JoinGroup(GroupRef { group_id: "g".to_string() }));
    send(&mut ws, &frame).await;
    match next_event(&mut ws).await {
        ServerEvent::Error(e) => assert_eq!(e.code, "auth_required"),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(closed_by_server(&mut ws).await);
}

#[tokio::test]
async fn unparseable_frame_keeps_connection_open() {
    let env = common::setup().await;
    let (alice, token) = env.user("alice").await;
    let group = env.group(&alice, &[]).await;
    let addr = serve(&env).await;

    let mut ws = open(addr, Some(&token)).await;
    assert!(matches!(next_event(&mut ws).await, ServerEvent::AuthOk(_)));

    ws.send(Message::Text("{not json".to_string())).await.expect("send");
    match next_event(&mut ws).await {
        ServerEvent::Error(e) => assert_eq!(e.code, "invalid_argument"),
        other => panic!("expected error, got {:?}", other),
    }

    join(&mut ws, &group.group_id).await;
}

#[tokio::test]
async fn chat_over_sockets_reaches_the_room() {
    let env = common::setup().await;
    let (alice, alice_token) = env.user("alice").await;
    let (bob, bob_token) = env.user("bob").await;
    let group = env.group(&alice, &[&bob]).await;
    let addr = serve(&env).await;

    let mut a = open(addr, Some(&alice_token)).await;
    let mut b = open(addr, Some(&bob_token)).await;
    assert!(matches!(next_event(&mut a).await, ServerEvent::AuthOk(_)));
    assert!(matches!(next_event(&mut b).await, ServerEvent::AuthOk(_)));
    join(&mut a, &group.group_id).await;
    join(&mut b, &group.group_id).await;

    let frame = ClientFrame::new(ClientEvent::ChatMessage(SendMessage {
        group_id: group.group_id.clone(),
        content: "ciao".to_string(),
        kind: None,
        media_url: None,
        media_type: None,
        reply_to: None,
    }))
    .with_request_id("r1");
    send(&mut a, &frame).await;

    let created = match next_event(&mut b).await {
        ServerEvent::NewMessage(m) => m,
        other => panic!("expected newMessage, got {:?}", other),
    };
    assert_eq!(created.sender_id, alice.user_id);
    assert_eq!(next_event(&mut b).await, ServerEvent::ChatMessage(created.clone()));

    assert_eq!(next_event(&mut a).await, ServerEvent::NewMessage(created.clone()));
    assert_eq!(next_event(&mut a).await, ServerEvent::ChatMessage(created.clone()));
    match next_event(&mut a).await {
        ServerEvent::Ack(ack) => {
            assert_eq!(ack.in_reply_to, "r1");
            assert_eq!(ack.message_id.as_deref(), Some(created.message_id.as_str()));
        }
        other => panic!("expected ack, got {:?}", other),
    }
}

#[tokio::test]
async fn disconnect_releases_subscriptions() {
    let env = common::setup().await;
    let (alice, token) = env.user("alice").await;
    let group = env.group(&alice, &[]).await;
    let addr = serve(&env).await;

    let mut ws = open(addr, Some(&token)).await;
    assert!(matches!(next_event(&mut ws).await, ServerEvent::AuthOk(_)));
    join(&mut ws, &group.group_id).await;
    assert_eq!(env.state.presence.subscriber_count(&group.group_id), 1);

    ws.close(None).await.expect("close");
    drop(ws);

    let released = tokio::time::timeout(WAIT, async {
        while env.state.presence.subscriber_count(&group.group_id) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "subscription still held after disconnect");
}
