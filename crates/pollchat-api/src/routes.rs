use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{require_admin, require_auth};
use crate::state::AppState;
use crate::{auth, chats, polls, users, ws};

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(ws::ws_upgrade))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/singleUser/{id}", get(users::single_user))
        .route("/polls", get(polls::list_polls))
        .route("/polls/{id}", get(polls::get_poll));

    let admin_routes = Router::new()
        .route("/admin", get(auth::admin))
        .layer(middleware::from_fn(require_admin));

    let protected_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/chats/{a}/{b}", get(chats::get_chat))
        .route("/polls", post(polls::create_poll))
        .route("/polls/{id}/vote", post(polls::vote))
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use pollchat_auth::TokenCodec;
    use pollchat_db::store::DEFAULT_STORE_TIMEOUT;
    use pollchat_db::{Database, Store};
    use pollchat_gateway::ConnectionConfig;
    use pollchat_types::models::Role;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::state::AppStateInner;

    const SECRET: &str = "router-test-secret";

    fn app() -> Router {
        let store = Store::new(Database::open_in_memory().unwrap(), DEFAULT_STORE_TIMEOUT);
        build_router(AppStateInner::new(
            store,
            TokenCodec::new(SECRET),
            ConnectionConfig::default(),
        ))
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::get(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        req.body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn missing_token_is_401_and_bad_token_is_403() {
        let app = app();

        let (status, body) = send(&app, get("/users", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "UNAUTHORIZED");
        assert_eq!(body["message"], "No token provided.");

        let (status, body) = send(&app, get("/users", Some("not.a.jwt"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Invalid token.");

        let forged = TokenCodec::new("some-other-secret")
            .issue(Uuid::new_v4(), "mallory", Role::Admin)
            .unwrap();
        let (status, _) = send(&app, get("/admin", Some(&forged))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn first_user_is_admin() {
        let app = app();
        for (name, email) in [("alice", "a@x.com"), ("bob", "b@x.com")] {
            let (status, _) = send(
                &app,
                post_json(
                    "/register",
                    None,
                    json!({ "username": name, "email": email, "password": "password1" }),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let login = |name: &str| {
            post_json("/login", None, json!({ "username": name, "password": "password1" }))
        };
        let (_, alice) = send(&app, login("alice")).await;
        let (_, bob) = send(&app, login("bob")).await;
        let alice_token = alice["token"].as_str().unwrap().to_string();
        let bob_token = bob["token"].as_str().unwrap().to_string();

        let (status, body) = send(&app, get("/admin", Some(&alice_token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Permission granted. Welcome, alice.");

        let (status, body) = send(&app, get("/admin", Some(&bob_token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Admin access required.");
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let app = app();
        let register = |name: &str, email: &str| {
            post_json(
                "/register",
                None,
                json!({ "username": name, "email": email, "password": "password1" }),
            )
        };
        assert_eq!(send(&app, register("alice", "a@x.com")).await.0, StatusCode::CREATED);

        let (status, body) = send(&app, register("alice2", "A@x.com")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email already exists.");
    }

    #[tokio::test]
    async fn login_failures() {
        let app = app();
        send(
            &app,
            post_json(
                "/register",
                None,
                json!({ "username": "alice", "email": "a@x.com", "password": "password1" }),
            ),
        )
        .await;

        let (status, _) = send(&app, post_json("/login", None, json!({ "username": "alice" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            post_json("/login", None, json!({ "username": "alice", "password": "wrong-pass" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            post_json("/login", None, json!({ "username": "nobody", "password": "password1" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn lookups_of_unknown_ids_are_404() {
        let app = app();
        let (status, body) = send(&app, get(&format!("/singleUser/{}", Uuid::new_v4()), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");

        let (status, _) = send(&app, get(&format!("/polls/{}", Uuid::new_v4()), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, get("/singleUser/not-a-uuid", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn poll_validation() {
        let app = app();
        let token = TokenCodec::new(SECRET)
            .issue(Uuid::new_v4(), "alice", Role::User)
            .unwrap();

        for bad in [
            json!({ "title": "Lunch?", "options": ["Pizza"] }),
            json!({ "title": "  ", "options": ["Pizza", "Sushi"] }),
            json!({ "title": "Lunch?", "options": ["Pizza", " "] }),
            json!({ "title": "Lunch?", "options": ["Pizza", "Sushi"], "expiryDate": "2001-01-01T00:00:00Z" }),
        ] {
            let (status, _) = send(&app, post_json("/polls", Some(&token), bad.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", bad);
        }
    }

    #[tokio::test]
    async fn outsiders_cannot_read_a_chat() {
        let app = app();
        let token = TokenCodec::new(SECRET)
            .issue(Uuid::new_v4(), "carol", Role::User)
            .unwrap();
        let uri = format!("/chats/{}/{}", Uuid::new_v4(), Uuid::new_v4());
        let (status, _) = send(&app, get(&uri, Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
