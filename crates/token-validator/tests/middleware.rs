//! Bearer auth middleware over signed tokens
#![cfg(feature = "middleware")]

mod common;

use std::convert::Infallible;

use common::*;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{Request, Response, StatusCode};
use jsonwebtoken::Algorithm;
use serde_json::json;
use token_validator::tower::BearerAuthLayer;
use token_validator::{DecodedClaims, TokenInfo};
use tower::{Layer, ServiceExt, service_fn};

/// Echoes the partner claim from the request extensions
async fn handler(req: Request<()>) -> Result<Response<String>, Infallible> {
    let partner = req
        .extensions()
        .get::<TokenInfo>()
        .and_then(|info| info.get("partner_guid"))
        .and_then(|value| value.as_str())
        .unwrap_or("none")
        .to_string();
    assert!(req.extensions().get::<DecodedClaims>().is_some());
    Ok(Response::new(partner))
}

fn bearer(token: &str) -> Request<()> {
    Request::builder()
        .uri("/invoices")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(())
        .unwrap()
}

#[tokio::test]
async fn test_valid_token_reaches_handler_with_token_info() {
    // GIVEN: A service requiring billing:read
    let idp = MockIdp::start().await;
    idp.mock_jwks(&[primary_key()], 1).await;
    let service = BearerAuthLayer::new(validator(&idp))
        .require_scope("billing:read")
        .layer(service_fn(handler));

    // WHEN: A valid token with that scope is presented
    let token = primary_key().sign(&valid_claims(&idp), Algorithm::RS512);
    let response = service.oneshot(bearer(&token)).await.unwrap();

    // THEN: The handler sees the business claims
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.into_body(), "p_123");
}

#[tokio::test]
async fn test_missing_scope_is_401() {
    let idp = MockIdp::start().await;
    idp.mock_jwks(&[primary_key()], 1).await;
    let service = BearerAuthLayer::new(validator(&idp))
        .realm("billing")
        .require_scope("admin")
        .layer(service_fn(handler));

    let token = primary_key().sign(&valid_claims(&idp), Algorithm::RS512);
    let response = service.oneshot(bearer(&token)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer realm=\"billing\"");
}

#[tokio::test]
async fn test_policy_rejection_is_401() {
    let idp = MockIdp::start().await;
    idp.mock_jwks(&[primary_key()], 1).await;
    let service = BearerAuthLayer::new(validator(&idp))
        .policy(|claims| claims.get("partner_guid") == Some(&json!("p_999")))
        .layer(service_fn(handler));

    let token = primary_key().sign(&valid_claims(&idp), Algorithm::RS512);
    let response = service.oneshot(bearer(&token)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_401() {
    let idp = MockIdp::start().await;
    idp.mock_jwks(&[primary_key()], 1).await;
    let service = BearerAuthLayer::new(validator(&idp)).layer(service_fn(handler));

    let mut claims = valid_claims(&idp);
    claims["exp"] = json!(current_timestamp() - 60);
    let token = primary_key().sign(&claims, Algorithm::RS512);
    let response = service.oneshot(bearer(&token)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_basic_scheme_is_400() {
    let idp = MockIdp::start().await;
    idp.mock_jwks(&[primary_key()], 0).await;
    let service = BearerAuthLayer::new(validator(&idp)).layer(service_fn(handler));

    let request = Request::builder()
        .header(AUTHORIZATION, "Basic dXNlcjpwdw==")
        .body(())
        .unwrap();
    let response = service.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
