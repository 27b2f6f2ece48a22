pub mod auth;
pub mod billing;
pub mod checkout;
pub mod extract;
pub mod health;
pub mod learning;
pub mod profile;
pub mod routes;
pub mod storage;
pub mod webhook;

use actix_web::web;

/// Mount every route: the API under `/api/v1` plus public storage reads.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(profile::MAX_UPLOAD_BYTES))
        .service(
            web::scope("/api/v1")
                // Identity
                .service(
                    web::scope("/auth")
                        .service(auth::sign_up)
                        .service(auth::confirm_email)
                        .service(auth::sign_in)
                        .service(auth::sign_out)
                        .service(auth::get_session)
                        .service(auth::refresh_session)
                        .service(auth::forgot_password)
                        .service(auth::reset_password),
                )
                // Profiles and uploads
                .service(
                    web::scope("/profiles")
                        .service(profile::get_my_profile)
                        .service(profile::update_my_profile)
                        .service(profile::get_public_profile)
                        .service(profile::username_available)
                        .service(profile::upload_avatar)
                        .service(profile::upload_banner),
                )
                .service(
                    web::scope("/billing")
                        .service(billing::list_history)
                        .service(billing::delete_history_entry),
                )
                // Checkout, reconciliation and cancellation
                .service(checkout::start_checkout)
                .service(checkout::checkout_return)
                .service(checkout::checkout_refocus)
                .service(checkout::cancel_subscription)
                .service(web::scope("/payments").service(webhook::payment_webhook))
                .service(web::scope("/learning-paths").service(learning::search))
                .service(web::scope("/routes").service(routes::resolve_route))
                .route("/health", web::get().to(health::health_check)),
        )
        .service(storage::public_object);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::{json, Value};

    use crate::config::{AppConfig, Config, FunctionsConfig, GatewayConfig, StorageConfig};
    use crate::models::profile::SubscriptionTier;
    use crate::services::{auth::tests::signed_in, database::DatabaseService, gateway::sign_payload, Services};

    async fn test_services(storage_root: &std::path::Path) -> Services {
        let config = Config {
            database_url: "memory://".to_string(),
            gateway: GatewayConfig::default(),
            functions: FunctionsConfig::default(),
            storage: StorageConfig {
                root: storage_root.to_string_lossy().to_string(),
                bucket: "user-uploads".to_string(),
                public_url: "http://localhost:8080".to_string(),
            },
            app: AppConfig::default(),
        };
        let db = DatabaseService::new(&config.database_url).await.unwrap();
        Services::new(&config, db)
    }

    macro_rules! test_app {
        ($services:expr) => {{
            let services = $services.clone();
            test::init_service(App::new().configure(move |cfg| {
                services.register(cfg);
                configure(cfg);
            }))
            .await
        }};
    }

    fn bearer(token: &str) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", token))
    }

    #[actix_web::test]
    async fn test_protected_routes_require_session() {
        let dir = tempfile::tempdir().unwrap();
        let services = test_services(dir.path()).await;
        let app = test_app!(services);

        let req = test::TestRequest::get().uri("/api/v1/billing/history").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/v1/profiles/me")
            .insert_header(bearer("not-a-token"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_username_availability() {
        let dir = tempfile::tempdir().unwrap();
        let services = test_services(dir.path()).await;
        signed_in(&services.auth, "ada@example.com", "ada").await;
        let app = test_app!(services);

        let req = test::TestRequest::get()
            .uri("/api/v1/profiles/username-available?username=ADA")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["available"], false);

        let req = test::TestRequest::get()
            .uri("/api/v1/profiles/username-available?username=grace")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["available"], true);

        let req = test::TestRequest::get()
            .uri("/api/v1/profiles/username-available?username=a")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_checkout_return_is_reconciled_once() {
        let dir = tempfile::tempdir().unwrap();
        let services = test_services(dir.path()).await;
        let session = signed_in(&services.auth, "ada@example.com", "ada").await;
        let app = test_app!(services);

        let req = test::TestRequest::post()
            .uri("/api/v1/checkout")
            .insert_header(bearer(&session.access_token))
            .set_json(json!({
                "plan": "premium",
                "cycle": "annual",
                "customer_name": "Ada Lovelace",
                "customer_email": "ada@example.com",
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["mocked"], true);

        let url = reqwest::Url::parse(body["data"]["checkout_url"].as_str().unwrap()).unwrap();
        let mut observation: serde_json::Map<String, Value> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect();
        observation.insert("path".to_string(), json!("/feed?status=success"));

        let observe = || {
            test::TestRequest::post()
                .uri("/api/v1/checkout/return")
                .insert_header(bearer(&session.access_token))
                .set_json(Value::Object(observation.clone()))
                .to_request()
        };

        let first: Value = test::call_and_read_body_json(&app, observe()).await;
        assert_eq!(first["data"]["outcome"], "processed");
        assert_eq!(first["data"]["redirect_to"], "/feed");
        assert_eq!(first["toast"]["title"], "Payment successful");

        let second: Value = test::call_and_read_body_json(&app, observe()).await;
        assert_eq!(second["data"]["outcome"], "duplicate");

        let req = test::TestRequest::get()
            .uri("/api/v1/billing/history")
            .insert_header(bearer(&session.access_token))
            .to_request();
        let history: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(history["data"].as_array().unwrap().len(), 1);
        assert_eq!(history["data"][0]["plan_name"], "Premium (annual)");

        let profile = services.db.get_profile(&session.user.id).await.unwrap().unwrap();
        assert_eq!(profile.subscription_tier, SubscriptionTier::Premium);
    }

    #[actix_web::test]
    async fn test_return_without_session_waits() {
        let dir = tempfile::tempdir().unwrap();
        let services = test_services(dir.path()).await;
        let app = test_app!(services);

        let req = test::TestRequest::post()
            .uri("/api/v1/checkout/return")
            .set_json(json!({ "status": "success", "session_id": "order_1", "plan": "pro" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["outcome"], "awaiting_user");
    }

    #[actix_web::test]
    async fn test_webhook_signature_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let services = test_services(dir.path()).await;
        let session = signed_in(&services.auth, "ada@example.com", "ada").await;
        let app = test_app!(services);

        let payload = serde_json::to_vec(&json!({
            "type": "PAYMENT_SUCCESS_WEBHOOK",
            "data": {
                "order_id": "order_42",
                "user_id": session.user.id,
                "plan": "pro",
                "cycle": "monthly",
                "amount": 9.99,
            }
        }))
        .unwrap();

        let req = test::TestRequest::post()
            .uri("/api/v1/payments/webhook")
            .insert_header(("x-webhook-signature", "deadbeef"))
            .set_payload(payload.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/v1/payments/webhook")
            .insert_header(("x-webhook-signature", sign_payload("test_webhook_secret", &payload)))
            .set_payload(payload)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["handled"], true);

        let profile = services.db.get_profile(&session.user.id).await.unwrap().unwrap();
        assert_eq!(profile.subscription_tier, SubscriptionTier::Pro);
    }

    #[actix_web::test]
    async fn test_cancel_requires_paid_plan() {
        let dir = tempfile::tempdir().unwrap();
        let services = test_services(dir.path()).await;
        let session = signed_in(&services.auth, "ada@example.com", "ada").await;
        let app = test_app!(services);

        let req = test::TestRequest::post()
            .uri("/api/v1/subscription/cancel")
            .insert_header(bearer(&session.access_token))
            .set_json(json!({ "confirm": true }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_avatar_upload_is_served_back() {
        let dir = tempfile::tempdir().unwrap();
        let services = test_services(dir.path()).await;
        let session = signed_in(&services.auth, "ada@example.com", "ada").await;
        let app = test_app!(services);

        let req = test::TestRequest::post()
            .uri("/api/v1/profiles/me/avatar")
            .insert_header(bearer(&session.access_token))
            .insert_header(("Content-Type", "image/png"))
            .set_payload(b"fake-png".to_vec())
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let avatar_url = body["data"]["avatar_url"].as_str().unwrap().to_string();
        let public_path = avatar_url.trim_start_matches("http://localhost:8080");
        assert!(public_path.starts_with("/storage/v1/object/public/user-uploads/avatars/"));

        let req = test::TestRequest::get().uri(public_path).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = test::read_body(resp).await;
        assert_eq!(&bytes[..], b"fake-png");
    }

    #[actix_web::test]
    async fn test_route_resolution_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let services = test_services(dir.path()).await;
        let app = test_app!(services);

        let req = test::TestRequest::get().uri("/api/v1/routes/resolve?path=/library").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"], json!({ "decision": "redirect", "to": "/signin" }));
    }
}
