pub mod auth;
mod cases;
pub mod error;
mod validation;

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::CorsConfig;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/auth/verify-email/resend", post(auth::resend_verification))
        .route("/auth/logout", post(auth::logout));

    // Routes requiring a live session
    let session_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/subscription", post(auth::update_subscription))
        .route("/cases", get(cases::list_cases).post(cases::create_case))
        .route("/cases/:id", get(cases::get_case).delete(cases::delete_case))
        .route("/cases/:id/assign", post(cases::assign_lawyer))
        .route("/cases/:id/documents", post(cases::attach_document))
        .route(
            "/cases/:id/documents/:document_id",
            delete(cases::delete_document),
        )
        .route(
            "/cases/:id/documents/:document_id/download",
            get(cases::download_document),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_middleware,
        ));

    Router::new()
        .route("/healthz", get(health_check))
        .nest("/api/v1", public_routes.merge(session_routes))
        .layer(cors_layer(&state.config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ManualClock;
    use crate::config::Config;
    use crate::store::{SqliteStore, Store};
    use crate::test_support;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use chrono::Duration;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        clock: Arc<ManualClock>,
        store: Arc<SqliteStore>,
    }

    struct Reply {
        status: StatusCode,
        set_cookie: Option<String>,
        body: Value,
    }

    async fn app_with(config: Config) -> TestApp {
        let store = test_support::store().await;
        let clock = test_support::clock();
        let state = Arc::new(AppState::new(config, store.clone(), clock.clone()));
        TestApp {
            router: create_router(state),
            clock,
            store,
        }
    }

    async fn app() -> TestApp {
        app_with(Config::default()).await
    }

    impl TestApp {
        async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header("Authorization", format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => builder
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.raw(request).await;
            let status = response.status();
            let set_cookie = response
                .headers()
                .get("set-cookie")
                .map(|v| v.to_str().unwrap().to_string());
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };

            Reply {
                status,
                set_cookie,
                body,
            }
        }

        async fn raw(&self, request: Request<Body>) -> Response {
            self.router.clone().oneshot(request).await.unwrap()
        }

        /// Register, verify and log in; returns (user id, session token)
        async fn onboard(&self, email: &str, role: &str) -> (String, String) {
            let reply = self
                .send(
                    "POST",
                    "/api/v1/auth/register",
                    None,
                    Some(json!({
                        "companyName": format!("{} co", role),
                        "email": email,
                        "password": test_support::PASSWORD,
                        "role": role,
                    })),
                )
                .await;
            assert_eq!(reply.status, StatusCode::CREATED);
            let user_id = reply.body["user"]["id"].as_str().unwrap().to_string();
            let code = reply.body["verificationCode"].as_str().unwrap().to_string();

            let reply = self
                .send(
                    "POST",
                    "/api/v1/auth/verify-email",
                    None,
                    Some(json!({ "email": email, "code": code })),
                )
                .await;
            assert_eq!(reply.status, StatusCode::OK);

            (user_id, self.login(email).await)
        }

        async fn login(&self, email: &str) -> String {
            let reply = self
                .send(
                    "POST",
                    "/api/v1/auth/login",
                    None,
                    Some(json!({ "email": email, "password": test_support::PASSWORD })),
                )
                .await;
            assert_eq!(reply.status, StatusCode::OK);
            reply.body["sessionToken"].as_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = app().await;
        let reply = app.send("GET", "/healthz", None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_client_assigns_lawyer_who_then_sees_case() {
        let app = app().await;

        // Register client and receive a code
        let reply = app
            .send(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({
                    "companyName": "Acme Holdings",
                    "email": "Legal@Acme.test",
                    "password": test_support::PASSWORD,
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.body["user"]["email"], "legal@acme.test");
        assert_eq!(reply.body["user"]["role"], "client");
        assert_eq!(reply.body["user"]["verified"], false);
        let code = reply.body["verificationCode"].as_str().unwrap().to_string();
        assert_eq!(code.len(), 6);

        // Wrong code
        let wrong = if code == "000000" { "000001" } else { "000000" };
        let reply = app
            .send(
                "POST",
                "/api/v1/auth/verify-email",
                None,
                Some(json!({ "email": "legal@acme.test", "code": wrong })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body["error"]["message"], "Invalid verification code");

        // Right code
        let reply = app
            .send(
                "POST",
                "/api/v1/auth/verify-email",
                None,
                Some(json!({ "email": "legal@acme.test", "code": code })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["user"]["verified"], true);

        let client_token = app.login("legal@acme.test").await;

        let reply = app
            .send(
                "POST",
                "/api/v1/cases",
                Some(&client_token),
                Some(json!({
                    "name": "Supplier dispute",
                    "documents": [{ "name": "Contract.pdf" }],
                    "personalDocuments": [{ "name": "Notes" }],
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);
        let case_id = reply.body["case"]["id"].as_str().unwrap().to_string();
        assert_eq!(reply.body["case"]["priority"], "Medium");
        assert_eq!(reply.body["case"]["status"], "Draft");
        assert_eq!(reply.body["case"]["documents"][1]["category"], "personal");

        let (lawyer_id, lawyer_token) = app.onboard("counsel@firm.test", "lawyer").await;

        let assign_uri = format!("/api/v1/cases/{}/assign", case_id);
        let reply = app
            .send(
                "POST",
                &assign_uri,
                Some(&client_token),
                Some(json!({ "lawyerId": lawyer_id, "notes": "Lead counsel" })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.body["assignment"]["id"], lawyer_id.as_str());

        // Same pair again only updates the notes
        let reply = app
            .send(
                "POST",
                &assign_uri,
                Some(&client_token),
                Some(json!({ "lawyerId": lawyer_id, "notes": "Second chair" })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["assignment"]["notes"], "Second chair");

        let reply = app.send("GET", "/api/v1/cases", Some(&lawyer_token), None).await;
        assert_eq!(reply.status, StatusCode::OK);
        let cases = reply.body["cases"].as_array().unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0]["id"], case_id.as_str());
        assert_eq!(cases[0]["client"]["email"], "legal@acme.test");
        assert_eq!(cases[0]["assignedLawyers"].as_array().unwrap().len(), 1);

        // Clients never get the client block
        let reply = app
            .send("GET", &format!("/api/v1/cases/{}", case_id), Some(&client_token), None)
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body["case"].get("client").is_none());
    }

    #[tokio::test]
    async fn test_unverified_login_is_forbidden_with_fresh_code() {
        let app = app().await;
        app.send(
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({
                "companyName": "Acme",
                "email": "new@acme.test",
                "password": test_support::PASSWORD,
            })),
        )
        .await;

        let reply = app
            .send(
                "POST",
                "/api/v1/auth/login",
                None,
                Some(json!({ "email": "new@acme.test", "password": test_support::PASSWORD })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        assert_eq!(reply.body["error"]["message"], "Email not verified");
        assert_eq!(reply.body["error"]["details"]["verificationValid"], 15);
        assert!(reply.body["error"]["details"]["verificationCode"].is_string());
    }

    #[tokio::test]
    async fn test_codes_hidden_when_not_exposed() {
        let mut config = Config::default();
        config.auth.expose_verification_code = false;
        let app = app_with(config).await;

        let reply = app
            .send(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({
                    "companyName": "Acme",
                    "email": "quiet@acme.test",
                    "password": test_support::PASSWORD,
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);
        assert!(reply.body.get("verificationCode").is_none());
    }

    #[tokio::test]
    async fn test_bad_credentials_and_duplicate_email() {
        let app = app().await;
        app.onboard("dup@acme.test", "client").await;

        let reply = app
            .send(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({
                    "companyName": "Again",
                    "email": "DUP@acme.test",
                    "password": test_support::PASSWORD,
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CONFLICT);

        let reply = app
            .send(
                "POST",
                "/api/v1/auth/login",
                None,
                Some(json!({ "email": "dup@acme.test", "password": "wrong-password" })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let app = app().await;
        let reply = app
            .send(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({
                    "companyName": "",
                    "email": "not-an-email",
                    "password": "short",
                    "role": "admin",
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["error"]["code"], "validation_error");
        let details = &reply.body["error"]["details"];
        for field in ["companyName", "email", "password", "role"] {
            assert!(details.get(field).is_some(), "missing {}", field);
        }
    }

    #[tokio::test]
    async fn test_missing_session_clears_cookie() {
        let app = app().await;
        let reply = app.send("GET", "/api/v1/auth/me", None, None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert!(reply.set_cookie.unwrap().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_idle_session_expires() {
        let app = app().await;
        let (_, token) = app.onboard("idle@acme.test", "client").await;

        let reply = app.send("GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.set_cookie.unwrap().contains("Max-Age=600"));

        app.clock.advance(Duration::minutes(11));
        let reply = app.send("GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body["error"]["message"], "Session expired");
    }

    #[tokio::test]
    async fn test_logout_destroys_session() {
        let app = app().await;
        let (_, token) = app.onboard("bye@acme.test", "client").await;

        let reply = app.send("POST", "/api/v1/auth/logout", Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["status"], "logged out");

        let reply = app.send("GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_lawyer_cannot_create_cases() {
        let app = app().await;
        let (_, token) = app.onboard("counsel@firm.test", "lawyer").await;

        let reply = app
            .send("POST", "/api/v1/cases", Some(&token), Some(json!({ "name": "Mine" })))
            .await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        assert_eq!(
            reply.body["error"]["message"],
            "Only client workspaces can create cases"
        );
    }

    #[tokio::test]
    async fn test_subscription_update() {
        let app = app().await;
        let (_, token) = app.onboard("plan@acme.test", "client").await;

        let reply = app
            .send(
                "POST",
                "/api/v1/auth/subscription",
                Some(&token),
                Some(json!({ "plan": "growth" })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["user"]["subscription"], "growth");

        let reply = app.send("GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(reply.body["user"]["subscription"], "growth");
    }

    #[tokio::test]
    async fn test_document_lifecycle() {
        let app = app().await;
        let (_, token) = app.onboard("docs@acme.test", "client").await;
        let reply = app
            .send("POST", "/api/v1/cases", Some(&token), Some(json!({ "name": "Audit" })))
            .await;
        let case_id = reply.body["case"]["id"].as_str().unwrap().to_string();

        let reply = app
            .send(
                "POST",
                &format!("/api/v1/cases/{}/documents", case_id),
                Some(&token),
                Some(json!({ "name": "Ledger", "category": "Finance" })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);
        assert_eq!(reply.body["document"]["category"], "finance");
        let document_id = reply.body["document"]["id"].as_str().unwrap().to_string();

        // Nothing stored on disk for this record
        let document_uri = format!("/api/v1/cases/{}/documents/{}", case_id, document_id);
        let reply = app
            .send("GET", &format!("{}/download", document_uri), Some(&token), None)
            .await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(
            reply.body["error"]["message"],
            "Document not available for download"
        );

        let reply = app.send("DELETE", &document_uri, Some(&token), None).await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);

        let reply = app
            .send("DELETE", &format!("/api/v1/cases/{}", case_id), Some(&token), None)
            .await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);

        let reply = app.send("GET", "/api/v1/cases", Some(&token), None).await;
        assert!(reply.body["cases"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_case_id_is_rejected() {
        let app = app().await;
        let (_, token) = app.onboard("ids@acme.test", "client").await;
        let reply = app
            .send("GET", "/api/v1/cases/not-a-uuid", Some(&token), None)
            .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cookie_alone_authenticates_and_is_refreshed() {
        let app = app().await;
        let (_, token) = app.onboard("jar@acme.test", "client").await;

        let request = Request::builder()
            .method("GET")
            .uri("/api/v1/auth/me")
            .header("Cookie", format!("theme=dark; lexiflow_session={}", token))
            .body(Body::empty())
            .unwrap();
        let response = app.raw(request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = response
            .headers()
            .get("set-cookie")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with(&format!("lexiflow_session={}", token)));
        assert!(cookie.contains("Max-Age=600"));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn test_download_streams_stored_file() {
        let root = std::env::temp_dir().join(format!("lexiflow-docs-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("leases")).unwrap();
        std::fs::write(root.join("leases/lease.pdf"), b"%PDF-1.4 lease").unwrap();

        let mut config = Config::default();
        config.server.documents_dir = Some(root.clone());
        let app = app_with(config).await;

        let (_, client_token) = app.onboard("owner@acme.test", "client").await;
        let (lawyer_id, lawyer_token) = app.onboard("counsel@firm.test", "lawyer").await;

        let reply = app
            .send(
                "POST",
                "/api/v1/cases",
                Some(&client_token),
                Some(json!({ "name": "Office lease" })),
            )
            .await;
        let case_id = reply.body["case"]["id"].as_str().unwrap().to_string();

        let reply = app
            .send(
                "POST",
                &format!("/api/v1/cases/{}/documents", case_id),
                Some(&client_token),
                Some(json!({ "name": "Lease Agreement.pdf", "storagePath": "leases/lease.pdf" })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);
        let document_id = reply.body["document"]["id"].as_str().unwrap().to_string();
        let download_uri = format!(
            "/api/v1/cases/{}/documents/{}/download",
            case_id, document_id
        );

        let download = |token: &str| {
            Request::builder()
                .method("GET")
                .uri(download_uri.as_str())
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap()
        };

        let response = app.raw(download(&client_token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/octet-stream"
        );
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"Lease_Agreement.pdf\""
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"%PDF-1.4 lease");

        // Unassigned lawyers cannot tell the document exists
        let reply = app
            .send("GET", &download_uri, Some(&lawyer_token), None)
            .await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body["error"]["message"], "Document not found");

        let reply = app
            .send(
                "POST",
                &format!("/api/v1/cases/{}/assign", case_id),
                Some(&client_token),
                Some(json!({ "lawyerId": lawyer_id })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);

        let response = app.raw(download(&lawyer_token)).await;
        assert_eq!(response.status(), StatusCode::OK);

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_concurrent_resend_leaves_one_code() {
        let app = app().await;
        let reply = app
            .send(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({
                    "companyName": "Acme",
                    "email": "twice@acme.test",
                    "password": test_support::PASSWORD,
                })),
            )
            .await;
        let user_id = reply.body["user"]["id"].as_str().unwrap().to_string();

        let resend = || {
            app.send(
                "POST",
                "/api/v1/auth/verify-email/resend",
                None,
                Some(json!({ "email": "twice@acme.test" })),
            )
        };
        for _ in 0..20 {
            let (a, b) = tokio::join!(resend(), resend());
            let a = a.body["verificationCode"].as_str().unwrap().to_string();
            let b = b.body["verificationCode"].as_str().unwrap().to_string();
            if a == b {
                continue;
            }
            let a_valid = app.store.find_verification_token(&user_id, &a).await.unwrap();
            let b_valid = app.store.find_verification_token(&user_id, &b).await.unwrap();
            assert!(a_valid.is_some() != b_valid.is_some());
        }
    }

    #[tokio::test]
    async fn test_assign_on_unknown_case_is_forbidden() {
        let app = app().await;
        let (_, client_token) = app.onboard("owner@acme.test", "client").await;
        let (lawyer_id, _) = app.onboard("counsel@firm.test", "lawyer").await;

        let reply = app
            .send(
                "POST",
                &format!("/api/v1/cases/{}/assign", uuid::Uuid::new_v4()),
                Some(&client_token),
                Some(json!({ "lawyerId": lawyer_id })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_email_login_matches_wrong_password() {
        let app = app().await;
        app.onboard("known@acme.test", "client").await;

        let unknown = app
            .send(
                "POST",
                "/api/v1/auth/login",
                None,
                Some(json!({ "email": "ghost@acme.test", "password": "whatever-123" })),
            )
            .await;
        let wrong = app
            .send(
                "POST",
                "/api/v1/auth/login",
                None,
                Some(json!({ "email": "known@acme.test", "password": "whatever-123" })),
            )
            .await;
        assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.body, wrong.body);
    }
}
