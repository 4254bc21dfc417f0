//! Identity provider webhook.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use match_magnet_core::FunnelEvent;
use serde_json::{Map, Value, json};
use tracing::instrument;

use crate::analytics::conversions::{content_data, overlay};
use crate::analytics::{ConversionEvent, UserData, send_logged};
use crate::error::Result;
use crate::identity::webhook::{ID_HEADER, SIGNATURE_HEADER, SignedHeaders, TIMESTAMP_HEADER};
use crate::identity::ClerkEvent;
use crate::state::AppState;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Receive an identity webhook.
///
/// Signed deliveries are verified when a signing secret is configured.
/// `user.created` sends a server-side `complete_registration` conversion;
/// other events are acknowledged and ignored.
///
/// # Errors
///
/// 401 for a missing or invalid signature, 400 for a body that is not an
/// event.
#[instrument(skip_all)]
pub async fn clerk_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    if let Some(verifier) = state.webhook_verifier() {
        let signed = SignedHeaders {
            id: header(&headers, ID_HEADER),
            timestamp: header(&headers, TIMESTAMP_HEADER),
            signature: header(&headers, SIGNATURE_HEADER),
        };
        verifier.verify(signed, &body, chrono::Utc::now().timestamp())?;
    }

    let event = ClerkEvent::parse(&body)?;
    tracing::info!(event_type = %event.event_type, "Identity webhook received");

    if let Some(user) = event.created_user() {
        let mut signup = Map::new();
        signup.insert("user_id".to_string(), Value::from(user.id.as_str()));
        signup.insert("name".to_string(), Value::from(user.full_name()));
        signup.insert("signup_method".to_string(), Value::from("Clerk"));
        signup.insert("signup_source".to_string(), Value::from("Webhook"));

        let funnel_event = FunnelEvent::CompleteRegistration;
        let custom = overlay(
            content_data(&funnel_event, None).unwrap_or_default(),
            Some(&signup),
        );
        let conversion = ConversionEvent::new(
            &funnel_event,
            UserData::hashed(user.primary_email(), None).merged(None),
        )
        .with_custom_data(custom);

        if send_logged(state.conversions().as_ref(), &conversion).await {
            tracing::info!(user_id = %user.id, "Sign-up conversion sent");
        }
    }

    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use secrecy::SecretString;

    use super::super::test_support::{router, send};
    use super::*;
    use crate::analytics::hash_email;
    use crate::identity::webhook::tests::{SECRET, sign};
    use crate::testing::{TestApp, test_config};

    const USER_CREATED: &str = r#"{
        "type": "user.created",
        "data": {
            "id": "user_2abc",
            "first_name": "Jane",
            "last_name": "Doe",
            "email_addresses": [{"email_address": "jane@example.com"}]
        }
    }"#;

    fn signed_app() -> TestApp {
        let mut config = test_config();
        config.clerk.webhook_secret = Some(SecretString::from(SECRET));
        TestApp::with_config(config)
    }

    fn delivery(body: &str, signature: Option<String>) -> Request<Body> {
        let now = chrono::Utc::now().timestamp();
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/clerk-webhook")
            .header("content-type", "application/json")
            .header(ID_HEADER, "msg_1")
            .header(TIMESTAMP_HEADER, now.to_string());
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_signed_user_created_sends_conversion() {
        let app = signed_app();
        let now = chrono::Utc::now().timestamp();
        let signature = sign("msg_1", now, USER_CREATED.as_bytes());

        let (status, _, body) = send(&router(&app), delivery(USER_CREATED, Some(signature))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let events = app.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "complete_registration");
        assert_eq!(
            events[0].user_data["em"],
            serde_json::json!([hash_email("jane@example.com")])
        );
        let custom = events[0].custom_data.as_ref().unwrap();
        assert_eq!(custom["name"], "Jane Doe");
        assert_eq!(custom["content_name"], "Onboarding Form");
    }

    #[tokio::test]
    async fn test_missing_signature_unauthorized() {
        let app = signed_app();
        let (status, _, body) = send(&router(&app), delivery(USER_CREATED, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert!(app.sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_bad_signature_unauthorized() {
        let app = signed_app();
        let signature = sign("msg_other", chrono::Utc::now().timestamp(), b"{}");
        let (status, _, _) = send(&router(&app), delivery(USER_CREATED, Some(signature))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(app.sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_unsigned_accepted_without_secret() {
        let app = TestApp::new();
        let (status, _, _) = send(
            &router(&app),
            delivery(r#"{"type":"session.created","data":{}}"#, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(app.sink.events().is_empty());
    }
}
