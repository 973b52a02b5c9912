//! End-to-end flows over real sockets: REST through reqwest, the chat relay
//! through a tokio-tungstenite client.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pollchat_api::{AppStateInner, build_router};
use pollchat_auth::TokenCodec;
use pollchat_db::store::DEFAULT_STORE_TIMEOUT;
use pollchat_db::{Database, Store};
use pollchat_gateway::ConnectionConfig;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "integration-test-secret";

/// Serve a fresh in-memory instance on a random port. Returns the host:port.
async fn start_test_server() -> String {
    let store = Store::new(Database::open_in_memory().unwrap(), DEFAULT_STORE_TIMEOUT);
    let state = AppStateInner::new(
        store,
        TokenCodec::new(SECRET),
        ConnectionConfig::default(),
    );
    let app = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

struct Session {
    id: String,
    token: String,
}

async fn register_and_login(client: &reqwest::Client, host: &str, name: &str) -> Session {
    let res = client
        .post(format!("http://{}/register", host))
        .json(&json!({
            "username": name,
            "email": format!("{}@x.com", name),
            "password": "password1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(format!("http://{}/login", host))
        .json(&json!({ "username": name, "password": "password1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["username"], name);

    let id = body["user"]["id"].as_str().unwrap().to_string();
    let token = body["token"].as_str().unwrap().to_string();

    // The token itself names the user who logged in
    let claims = TokenCodec::new(SECRET).verify(&token).unwrap();
    assert_eq!(claims.username, name);
    assert_eq!(claims.sub.to_string(), id);

    Session { id, token }
}

async fn connect(host: &str, token: &str) -> Ws {
    let (ws, _) = connect_async(format!("ws://{}/?token={}", host, token))
        .await
        .unwrap();
    ws
}

/// Next JSON frame from the server, skipping control frames.
async fn next_json(ws: &mut Ws) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

#[tokio::test]
async fn chat_between_two_users() {
    let host = start_test_server().await;
    let client = reqwest::Client::new();
    let alice = register_and_login(&client, &host, "alice").await;
    let bob = register_and_login(&client, &host, "bob").await;

    let mut alice_ws = connect(&host, &alice.token).await;
    let mut bob_ws = connect(&host, &bob.token).await;
    assert_eq!(next_json(&mut alice_ws).await["type"], "ready");
    let ready = next_json(&mut bob_ws).await;
    assert_eq!(ready["userId"], bob.id);
    assert_eq!(ready["username"], "bob");

    send_json(
        &mut alice_ws,
        json!({ "type": "send-message", "recipient": bob.id, "body": "hi", "tempId": "t1" }),
    )
    .await;

    let echo = next_json(&mut alice_ws).await;
    assert_eq!(echo["type"], "send-message");
    assert_eq!(echo["tempId"], "t1");
    let message_id = echo["message"]["id"].as_str().unwrap().to_string();

    let delivered = next_json(&mut bob_ws).await;
    assert_eq!(delivered["type"], "send-message");
    assert_eq!(delivered["message"]["id"], message_id.as_str());
    assert_eq!(delivered["message"]["body"], "hi");
    assert_eq!(delivered["message"]["sender"], alice.id);
    assert!(delivered.get("tempId").is_none());

    // Bob reads it; alice hears about it
    send_json(&mut bob_ws, json!({ "type": "read-receipt", "messageId": message_id })).await;
    let receipt = next_json(&mut alice_ws).await;
    assert_eq!(receipt["type"], "read-receipt");
    assert_eq!(receipt["readerId"], bob.id);

    send_json(
        &mut alice_ws,
        json!({ "type": "fetch-messages", "participants": [alice.id, bob.id] }),
    )
    .await;
    let history = next_json(&mut alice_ws).await;
    assert_eq!(history["type"], "fetch-messages");
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["body"], "hi");
    assert_eq!(messages[0]["readBy"], json!([bob.id]));

    // Same history over REST
    let res = client
        .get(format!("http://{}/chats/{}/{}", host, bob.id, alice.id))
        .bearer_auth(&alice.token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let rest_history: Vec<Value> = res.json().await.unwrap();
    assert_eq!(rest_history.len(), 1);
    assert_eq!(rest_history[0]["id"], message_id.as_str());

    // A garbage frame gets an error reply and the socket stays usable
    alice_ws.send(Message::Text("{oops".into())).await.unwrap();
    assert_eq!(next_json(&mut alice_ws).await["type"], "error");
    send_json(
        &mut alice_ws,
        json!({ "type": "fetch-messages", "participants": [alice.id, bob.id] }),
    )
    .await;
    assert_eq!(next_json(&mut alice_ws).await["type"], "fetch-messages");
}

#[tokio::test]
async fn users_list_excludes_caller() {
    let host = start_test_server().await;
    let client = reqwest::Client::new();
    let alice = register_and_login(&client, &host, "alice").await;
    let bob = register_and_login(&client, &host, "bob").await;

    let res = client
        .get(format!("http://{}/users", host))
        .bearer_auth(&alice.token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let users: Vec<Value> = res.json().await.unwrap();
    assert_eq!(users, vec![json!({ "id": bob.id, "username": "bob" })]);

    let res = client
        .get(format!("http://{}/singleUser/{}", host, bob.id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let user: Value = res.json().await.unwrap();
    assert_eq!(user["username"], "bob");
    assert_eq!(user["role"], "user");
    assert!(user.get("password").is_none());
}

#[tokio::test]
async fn duplicate_username_is_rejected() {
    let host = start_test_server().await;
    let client = reqwest::Client::new();
    register_and_login(&client, &host, "alice").await;

    let res = client
        .post(format!("http://{}/register", host))
        .json(&json!({ "username": "alice", "email": "other@x.com", "password": "password1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "BAD_REQUEST");
    assert_eq!(body["message"], "Username already exists.");
}

#[tokio::test]
async fn poll_lifecycle() {
    let host = start_test_server().await;
    let client = reqwest::Client::new();
    let alice = register_and_login(&client, &host, "alice").await;
    let bob = register_and_login(&client, &host, "bob").await;

    let res = client
        .post(format!("http://{}/polls", host))
        .bearer_auth(&alice.token)
        .json(&json!({ "title": "Lunch?", "options": ["Pizza", "Sushi"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let poll_id = created["pollId"].as_str().unwrap().to_string();

    let polls: Vec<Value> = client
        .get(format!("http://{}/polls", host))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(polls.iter().any(|p| p["id"] == poll_id.as_str()));

    let vote = |token: &str| {
        client
            .post(format!("http://{}/polls/{}/vote", host, poll_id))
            .bearer_auth(token)
            .json(&json!({ "optionIndex": 0 }))
            .send()
    };

    let res = vote(&bob.token).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["poll"]["options"][0]["votes"], 1);

    let res = vote(&bob.token).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(format!("http://{}/polls/{}/vote", host, poll_id))
        .bearer_auth(&alice.token)
        .json(&json!({ "optionIndex": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let poll: Value = client
        .get(format!("http://{}/polls/{}", host, poll_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(poll["options"][0]["votes"], 1);
    assert_eq!(poll["options"][1]["votes"], 0);
}

#[tokio::test]
async fn bad_websocket_token_is_closed_with_policy_violation() {
    let host = start_test_server().await;

    for url in [
        format!("ws://{}/", host),
        format!("ws://{}/?token=garbage", host),
    ] {
        let (mut ws, _) = connect_async(url).await.unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for close")
            .expect("stream ended without a close frame")
            .unwrap();
        let Message::Close(Some(frame)) = msg else {
            panic!("expected a close frame");
        };
        assert_eq!(u16::from(frame.code), 1008);
    }
}

#[tokio::test]
async fn reconnect_replaces_previous_socket() {
    let host = start_test_server().await;
    let client = reqwest::Client::new();
    let alice = register_and_login(&client, &host, "alice").await;

    let mut first = connect(&host, &alice.token).await;
    assert_eq!(next_json(&mut first).await["type"], "ready");
    let mut second = connect(&host, &alice.token).await;
    assert_eq!(next_json(&mut second).await["type"], "ready");

    let msg = tokio::time::timeout(Duration::from_secs(5), first.next())
        .await
        .expect("timed out waiting for close")
        .expect("stream ended without a close frame")
        .unwrap();
    let Message::Close(Some(frame)) = msg else {
        panic!("expected a close frame");
    };
    assert_eq!(u16::from(frame.code), 4000);
}
