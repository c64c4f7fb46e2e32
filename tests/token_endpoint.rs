//! Black-box scenarios for the token endpoint driver, named after the
//! end-to-end scenarios this crate's behavior is checked against (see
//! `DESIGN.md`). Each test drives `handle_token_request` directly against an
//! in-memory `Provider` fixture and a `FixedClock`, with no HTTP framework
//! involved.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;

use oidc_token_core::codec::jwt::JwtCodec;
use oidc_token_core::codec::{TokenCodec, Usage};
use oidc_token_core::config::ServerOptions;
use oidc_token_core::extensions::{Outcome, ProtocolError, TokenEndpointOutcome};
use oidc_token_core::message::OidcMessage;
use oidc_token_core::{
    handle_token_request, Claim, Clock, EndpointOptions, FixedClock, Identity, Principal,
    Provider, Ticket, TokenOutcome, TokenRequest,
};

fn keypair() -> (String, String) {
    use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
    use rsa::{RsaPrivateKey, RsaPublicKey};

    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
    let public_key = RsaPublicKey::from(&private_key);
    let private_pem = private_key.to_pkcs1_pem(LineEnding::LF).expect("pem").to_string();
    let public_pem = public_key.to_pkcs1_pem(LineEnding::LF).expect("pem");
    (private_pem, public_pem)
}

/// A fixture `Provider`: recognizes one confidential client (`client-1` /
/// `secret`) and hands grant decisions straight through, mirroring what a
/// thin host binding would do once it has already looked up its own client
/// and user stores.
struct FixtureProvider {
    known_client_secret: Option<(&'static str, &'static str)>,
    password_grant_ticket: Option<Ticket>,
}

impl FixtureProvider {
    fn new() -> Self {
        Self {
            known_client_secret: Some(("client-1", "secret")),
            password_grant_ticket: None,
        }
    }

    fn with_password_grant_ticket(mut self, ticket: Ticket) -> Self {
        self.password_grant_ticket = Some(ticket);
        self
    }
}

#[async_trait]
impl Provider for FixtureProvider {
    async fn validate_client_authentication(&self, message: &OidcMessage) -> Outcome<String> {
        match (message.client_id(), message.client_secret()) {
            (Some(id), Some(secret)) => match self.known_client_secret {
                Some((known_id, known_secret)) if id == known_id && secret == known_secret => {
                    Outcome::Accept(id.to_string())
                }
                _ => Outcome::Reject(ProtocolError::unset()),
            },
            (Some(id), None) => Outcome::Accept(id.to_string()),
            _ => Outcome::Skip,
        }
    }

    async fn grant_authorization_code(&self, _message: &OidcMessage, ticket: Ticket) -> Outcome<Ticket> {
        Outcome::Accept(ticket)
    }

    async fn grant_refresh_token(&self, _message: &OidcMessage, ticket: Ticket) -> Outcome<Ticket> {
        Outcome::Accept(ticket)
    }

    async fn grant_resource_owner_credentials(&self, _message: &OidcMessage) -> Outcome<Ticket> {
        match &self.password_grant_ticket {
            Some(ticket) => Outcome::Accept(ticket.copy()),
            None => Outcome::Reject(ProtocolError::unset()),
        }
    }

    async fn token_endpoint(&self, _message: &OidcMessage, ticket: Ticket) -> TokenEndpointOutcome {
        TokenEndpointOutcome::Ticket(Some(ticket))
    }
}

struct Harness {
    options: EndpointOptions,
    clock: FixedClock,
}

fn harness(provider: FixtureProvider) -> Harness {
    let (private_pem, public_pem) = keypair();
    let clock = FixedClock(Utc::now());

    let make_codec = |usage: Usage| -> Arc<dyn TokenCodec> {
        Arc::new(
            JwtCodec::new(usage, "https://op.example", &private_pem, &public_pem, None)
                .expect("codec construction"),
        )
    };

    let server = ServerOptions {
        issuer: "https://op.example".to_string(),
        access_token_lifetime: std::time::Duration::from_secs(3600),
        identity_token_lifetime: std::time::Duration::from_secs(3600),
        refresh_token_lifetime: std::time::Duration::from_secs(1_209_600),
        authorization_code_lifetime: std::time::Duration::from_secs(300),
        use_sliding_expiration: true,
        allow_response_type_token_selection: false,
        signing_private_key_pem: private_pem.clone(),
        signing_public_key_pem: public_pem.clone(),
        signing_key_id: None,
        opaque_codec_key: *b"01234567890123456789012345678901",
    };

    let options = EndpointOptions {
        provider: Arc::new(provider),
        clock: Arc::new(clock),
        authorization_code_codec: make_codec(Usage::AuthorizationCode),
        access_token_codec: make_codec(Usage::AccessToken),
        identity_token_codec: make_codec(Usage::IdentityToken),
        refresh_token_codec: make_codec(Usage::RefreshToken),
        server,
    };

    Harness { options, clock }
}

fn authorization_code_ticket(now: chrono::DateTime<Utc>) -> Ticket {
    let mut ticket = Ticket::new(Principal::new(vec![Identity::new(vec![Claim::new(
        "sub", "user-1",
    )])]));
    ticket.set_usage("code");
    ticket.set_scopes(vec!["openid", "profile"]).unwrap();
    ticket.set_presenters(vec!["client-1"]).unwrap();
    ticket.set_resources(vec!["api-1"]).unwrap();
    ticket.set_redirect_uri("https://app/cb");
    ticket.issued_utc = Some(now);
    ticket.expires_utc = Some(now + Duration::minutes(5));
    ticket
}

fn basic_auth(client_id: &str, client_secret: &str) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    format!("Basic {}", STANDARD.encode(format!("{client_id}:{client_secret}")))
}

fn body_value(body: &serde_json::Map<String, Value>, key: &str) -> String {
    body.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

#[tokio::test]
async fn s1_authorization_code_happy_path() {
    let h = harness(FixtureProvider::new());
    let ticket = authorization_code_ticket(h.clock.now());
    let code = h.options.authorization_code_codec.protect(&ticket).unwrap();

    let request = TokenRequest {
        method: "POST".to_string(),
        content_type: Some("application/x-www-form-urlencoded".to_string()),
        body: format!("grant_type=authorization_code&code={code}&redirect_uri=https://app/cb"),
        authorization_header: Some(basic_auth("client-1", "secret")),
    };

    match handle_token_request(&request, &h.options).await {
        TokenOutcome::Response(response) => {
            assert_eq!(response.status, 200);
            assert!(response.body.contains_key("access_token"));
            assert!(response.body.contains_key("id_token"));
            assert_eq!(body_value(&response.body, "token_type"), "Bearer");
            assert_eq!(body_value(&response.body, "scope"), "openid profile");
            assert_eq!(body_value(&response.body, "resource"), "api-1");
            let expires_in: i64 = body_value(&response.body, "expires_in").parse().unwrap();
            assert!((3599..=3601).contains(&expires_in));
        }
        other => panic!("expected a response, got {other:?}"),
    }
}

#[tokio::test]
async fn s2_mismatched_redirect_uri_is_rejected() {
    let h = harness(FixtureProvider::new());
    let ticket = authorization_code_ticket(h.clock.now());
    let code = h.options.authorization_code_codec.protect(&ticket).unwrap();

    let request = TokenRequest {
        method: "POST".to_string(),
        content_type: Some("application/x-www-form-urlencoded".to_string()),
        body: format!("grant_type=authorization_code&code={code}&redirect_uri=https://evil/cb"),
        authorization_header: Some(basic_auth("client-1", "secret")),
    };

    match handle_token_request(&request, &h.options).await {
        TokenOutcome::Response(response) => {
            assert_eq!(response.status, 400);
            assert_eq!(body_value(&response.body, "error"), "invalid_grant");
            assert_eq!(
                body_value(&response.body, "error_description"),
                "Authorization code does not contain matching redirect_uri"
            );
        }
        other => panic!("expected a response, got {other:?}"),
    }
}

#[tokio::test]
async fn s3_refresh_of_confidential_ticket_without_client_auth_is_rejected() {
    let h = harness(FixtureProvider::new());
    let now = h.clock.now();
    let mut ticket = Ticket::new(Principal::new(vec![Identity::new(vec![Claim::new(
        "sub", "user-1",
    )])]));
    ticket.set_usage("refresh_token");
    ticket.set_presenters(vec!["client-1"]).unwrap();
    ticket.set_confidential(true);
    ticket.issued_utc = Some(now);
    ticket.expires_utc = Some(now + Duration::days(14));
    let refresh_token = h.options.refresh_token_codec.protect(&ticket).unwrap();

    let request = TokenRequest {
        method: "POST".to_string(),
        content_type: Some("application/x-www-form-urlencoded".to_string()),
        body: format!("grant_type=refresh_token&refresh_token={refresh_token}"),
        authorization_header: None,
    };

    match handle_token_request(&request, &h.options).await {
        TokenOutcome::Response(response) => {
            assert_eq!(response.status, 400);
            assert_eq!(body_value(&response.body, "error"), "invalid_grant");
        }
        other => panic!("expected a response, got {other:?}"),
    }
}

#[tokio::test]
async fn s4_scope_widening_is_rejected() {
    let h = harness(FixtureProvider::new());
    let ticket = authorization_code_ticket(h.clock.now());
    let code = h.options.authorization_code_codec.protect(&ticket).unwrap();

    let request = TokenRequest {
        method: "POST".to_string(),
        content_type: Some("application/x-www-form-urlencoded".to_string()),
        body: format!(
            "grant_type=authorization_code&code={code}&redirect_uri=https://app/cb&scope=openid+profile+email"
        ),
        authorization_header: Some(basic_auth("client-1", "secret")),
    };

    match handle_token_request(&request, &h.options).await {
        TokenOutcome::Response(response) => {
            assert_eq!(response.status, 400);
            assert_eq!(body_value(&response.body, "error"), "invalid_grant");
        }
        other => panic!("expected a response, got {other:?}"),
    }
}

#[tokio::test]
async fn s5_client_credentials_without_authentication_is_rejected() {
    let h = harness(FixtureProvider::new());

    let request = TokenRequest {
        method: "POST".to_string(),
        content_type: Some("application/x-www-form-urlencoded".to_string()),
        body: "grant_type=client_credentials".to_string(),
        authorization_header: None,
    };

    match handle_token_request(&request, &h.options).await {
        TokenOutcome::Response(response) => {
            assert_eq!(response.status, 400);
            assert_eq!(body_value(&response.body, "error"), "invalid_grant");
            assert_eq!(
                body_value(&response.body, "error_description"),
                "client authentication is required when using client_credentials"
            );
        }
        other => panic!("expected a response, got {other:?}"),
    }
}

#[tokio::test]
async fn s6_password_grant_happy_path_issues_all_three_tokens() {
    let mut granted = Ticket::new(Principal::new(vec![Identity::new(vec![Claim::new(
        "sub", "user-1",
    )])]));
    granted.set_scopes(vec!["openid", "offline_access"]).unwrap();
    let provider = FixtureProvider::new().with_password_grant_ticket(granted);
    let h = harness(provider);

    let request = TokenRequest {
        method: "POST".to_string(),
        content_type: Some("application/x-www-form-urlencoded".to_string()),
        body: "grant_type=password&username=user-1&password=hunter2&client_id=public-client".to_string(),
        authorization_header: None,
    };

    match handle_token_request(&request, &h.options).await {
        TokenOutcome::Response(response) => {
            assert_eq!(response.status, 200);
            assert!(response.body.contains_key("access_token"));
            assert!(response.body.contains_key("id_token"));
            assert!(response.body.contains_key("refresh_token"));
        }
        other => panic!("expected a response, got {other:?}"),
    }
}

#[tokio::test]
async fn content_type_with_charset_suffix_is_accepted() {
    let h = harness(FixtureProvider::new());
    let request = TokenRequest {
        method: "POST".to_string(),
        content_type: Some("application/x-www-form-urlencoded; charset=utf-8".to_string()),
        body: "grant_type=client_credentials".to_string(),
        authorization_header: None,
    };

    // Still rejected (no client auth), but for invalid_grant, not invalid_request --
    // proving the Content-Type precondition itself passed.
    match handle_token_request(&request, &h.options).await {
        TokenOutcome::Response(response) => {
            assert_eq!(body_value(&response.body, "error"), "invalid_grant");
        }
        other => panic!("expected a response, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_grant_type_is_invalid_request_even_with_valid_client_auth() {
    let h = harness(FixtureProvider::new());
    let request = TokenRequest {
        method: "POST".to_string(),
        content_type: Some("application/x-www-form-urlencoded".to_string()),
        body: "foo=bar".to_string(),
        authorization_header: Some(basic_auth("client-1", "secret")),
    };

    match handle_token_request(&request, &h.options).await {
        TokenOutcome::Response(response) => {
            assert_eq!(response.status, 400);
            assert_eq!(body_value(&response.body, "error"), "invalid_request");
        }
        other => panic!("expected a response, got {other:?}"),
    }
}

#[tokio::test]
async fn expires_utc_equal_to_now_is_rejected() {
    let h = harness(FixtureProvider::new());
    let now = h.clock.now();
    let mut ticket = authorization_code_ticket(now);
    ticket.expires_utc = Some(now);
    let code = h.options.authorization_code_codec.protect(&ticket).unwrap();

    let request = TokenRequest {
        method: "POST".to_string(),
        content_type: Some("application/x-www-form-urlencoded".to_string()),
        body: format!("grant_type=authorization_code&code={code}&redirect_uri=https://app/cb"),
        authorization_header: Some(basic_auth("client-1", "secret")),
    };

    match handle_token_request(&request, &h.options).await {
        TokenOutcome::Response(response) => {
            assert_eq!(response.status, 400);
            assert_eq!(body_value(&response.body, "error"), "invalid_grant");
            assert_eq!(body_value(&response.body, "error_description"), "Expired ticket");
        }
        other => panic!("expected a response, got {other:?}"),
    }
}
