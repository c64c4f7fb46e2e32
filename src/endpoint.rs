//! Token endpoint driver (component E): the state machine orchestrating the
//! message model, ticket model, extension protocol, and token codec.
//!
//! Grounded on the source project's `handlers::oauth::token_handler` for the
//! grant-type dispatch shape and `services::oauth` for the cross-check
//! ordering (see `DESIGN.md`), generalized to a framework-agnostic request
//! shape in the style of oxide-auth's `access_token()` entry point.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::clock::Clock;
use crate::codec::TokenCodec;
use crate::config::ServerOptions;
use crate::error::{ErrorCode, OidcError};
use crate::extensions::{Outcome, Provider, TokenEndpointOutcome};
use crate::message::OidcMessage;
use crate::ticket::Ticket;

/// A minimal, framework-agnostic view of an incoming token request. An
/// `http` adapter (or any other host binding) is responsible for producing
/// this from whatever request type it owns.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub method: String,
    pub content_type: Option<String>,
    pub body: String,
    pub authorization_header: Option<String>,
}

/// The four headers the JSON emission step (`SPEC_FULL.md` §4.E) always
/// attaches to a successful or protocol-error response.
pub fn standard_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Content-Type", "application/json;charset=UTF-8"),
        ("Cache-Control", "no-cache"),
        ("Pragma", "no-cache"),
        ("Expires", "-1"),
    ]
}

#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub status: u16,
    pub body: Map<String, Value>,
    pub headers: Vec<(&'static str, &'static str)>,
}

/// What the driver produced for a single request.
#[derive(Debug, Clone)]
pub enum TokenOutcome {
    Response(JsonResponse),
    /// A `Provider::token_endpoint` handler marked the response fully
    /// handled; the driver performed no further processing and the host is
    /// responsible for having already written a response.
    Handled,
}

/// Everything the driver needs: the extension-point vtable, the four token
/// codecs, the clock, and the protocol-level configuration knobs.
pub struct EndpointOptions {
    pub provider: Arc<dyn Provider>,
    pub clock: Arc<dyn Clock>,
    pub authorization_code_codec: Arc<dyn TokenCodec>,
    pub access_token_codec: Arc<dyn TokenCodec>,
    pub identity_token_codec: Arc<dyn TokenCodec>,
    pub refresh_token_codec: Arc<dyn TokenCodec>,
    pub server: ServerOptions,
}

/// Runs the full token-endpoint state machine described in `SPEC_FULL.md`
/// §4.E and returns the outcome; this function never panics on malformed
/// client input — every protocol fault is expressed as an `Err(OidcError)`
/// and converted to a JSON error response by the caller below.
pub async fn handle_token_request(request: &TokenRequest, options: &EndpointOptions) -> TokenOutcome {
    match drive(request, options).await {
        Ok(outcome) => outcome,
        Err(error) => {
            tracing::warn!(error = %error.code, description = ?error.description, "token endpoint rejected request");
            TokenOutcome::Response(JsonResponse {
                status: error.code.status(),
                body: error_body(&error),
                headers: standard_headers(),
            })
        }
    }
}

fn error_body(error: &OidcError) -> Map<String, Value> {
    let body = crate::error::ErrorBody::from(error);
    let mut map = Map::new();
    map.insert("error".to_string(), Value::String(body.error));
    if let Some(description) = body.error_description {
        map.insert("error_description".to_string(), Value::String(description));
    }
    if let Some(uri) = body.error_uri {
        map.insert("error_uri".to_string(), Value::String(uri));
    }
    map
}

async fn drive(request: &TokenRequest, options: &EndpointOptions) -> Result<TokenOutcome, OidcError> {
    let mut message = parse_request(request)?;

    let grant_type = message
        .grant_type()
        .ok_or_else(|| OidcError::invalid_request("grant_type is required"))?
        .to_string();

    check_grant_preconditions(&grant_type, &message)?;

    let client_validated = resolve_client_authentication(&mut message, request, options).await?;

    let reconstructs_ticket = message.is_authorization_code_grant_type() || message.is_refresh_token_grant_type();

    if !reconstructs_ticket {
        run_validate_token_request(options, &message, None).await?;
    }

    let (ticket, original_expires_utc) = if reconstructs_ticket {
        let (mut ticket, original_expires_utc) =
            reconstruct_ticket(&grant_type, &message, client_validated, options).await?;
        run_validate_token_request(options, &message, Some(&ticket)).await?;
        ticket = dispatch_reconstructing_grant(&grant_type, &message, ticket, options).await?;
        (ticket, Some(original_expires_utc))
    } else {
        let ticket = dispatch_non_reconstructing_grant(&grant_type, &message, options).await?;
        (ticket, None)
    };

    let ticket = match options.provider.token_endpoint(&message, ticket).await {
        TokenEndpointOutcome::Handled => return Ok(TokenOutcome::Handled),
        TokenEndpointOutcome::Ticket(Some(ticket)) => ticket,
        TokenEndpointOutcome::Ticket(None) => {
            return Err(OidcError::new(ErrorCode::ServerError)
                .with_description("token endpoint handler returned no ticket"))
        }
    };

    let mut ticket = ticket;
    if client_validated {
        ticket.set_confidential(true);
    }
    if !ticket.properties.contains(crate::ticket::SCOPES) && message.has_scope("openid") {
        ticket.set_scopes(vec!["openid"]).map_err(|e| OidcError::server(e))?;
    }

    let mut response = response_parameter_economy(&grant_type, &message, &ticket);

    mint_tokens(
        &grant_type,
        &message,
        &ticket,
        original_expires_utc,
        options,
        &mut response,
    )?;

    match options
        .provider
        .token_endpoint_response(&message, &mut response)
        .await
    {
        Outcome::Reject(err) => {
            return Err(OidcError::from_protocol_error(err, ErrorCode::ServerError))
        }
        Outcome::Accept(()) | Outcome::Skip => {}
    }

    Ok(TokenOutcome::Response(JsonResponse {
        status: 200,
        body: response,
        headers: standard_headers(),
    }))
}

fn parse_request(request: &TokenRequest) -> Result<OidcMessage, OidcError> {
    if !request.method.eq_ignore_ascii_case("POST") {
        return Err(OidcError::invalid_request("method must be POST"));
    }

    let content_type = request
        .content_type
        .as_deref()
        .ok_or_else(|| OidcError::invalid_request("Content-Type header is required"))?;
    let media_type = content_type.split(';').next().unwrap_or("").trim();
    if !media_type.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        return Err(OidcError::invalid_request(
            "Content-Type must be application/x-www-form-urlencoded",
        ));
    }

    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(request.body.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    Ok(OidcMessage::from_pairs(pairs))
}

fn check_grant_preconditions(grant_type: &str, message: &OidcMessage) -> Result<(), OidcError> {
    match grant_type {
        "authorization_code" if message.code().is_none() => {
            Err(OidcError::invalid_request("code is required"))
        }
        "refresh_token" if message.refresh_token().is_none() => {
            Err(OidcError::invalid_request("refresh_token is required"))
        }
        "password" if message.username().is_none() || message.password().is_none() => {
            Err(OidcError::invalid_request("username and password are required"))
        }
        _ => Ok(()),
    }
}

/// Resolves client credentials (falling back to HTTP Basic) and dispatches
/// `ValidateClientAuthentication`. Returns whether the client was validated.
async fn resolve_client_authentication(
    message: &mut OidcMessage,
    request: &TokenRequest,
    options: &EndpointOptions,
) -> Result<bool, OidcError> {
    if message.client_id().is_none() && message.client_secret().is_none() {
        if let Some((client_id, client_secret)) = decode_basic_auth(request.authorization_header.as_deref()) {
            message.set("client_id", client_id);
            message.set("client_secret", client_secret);
        }
    }

    match options.provider.validate_client_authentication(message).await {
        Outcome::Reject(err) => Err(OidcError::from_protocol_error(err, ErrorCode::InvalidClient)),
        Outcome::Skip => {
            if message.is_client_credentials_grant_type() {
                Err(OidcError::invalid_grant(
                    "client authentication is required when using client_credentials",
                ))
            } else {
                Ok(false)
            }
        }
        Outcome::Accept(client_id) => {
            if client_id.is_empty() {
                Err(OidcError::new(ErrorCode::ServerError)
                    .with_description("client authentication validated without a client_id"))
            } else {
                message.set("client_id", client_id);
                Ok(true)
            }
        }
    }
}

/// Decodes a `Basic <base64(client_id:client_secret)>` Authorization header.
/// Malformed input is non-fatal: the caller proceeds with no credentials.
fn decode_basic_auth(header: Option<&str>) -> Option<(String, String)> {
    let header = header?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = decoded.split_once(':')?;
    Some((client_id.to_string(), client_secret.to_string()))
}

async fn run_validate_token_request(
    options: &EndpointOptions,
    message: &OidcMessage,
    ticket: Option<&Ticket>,
) -> Result<(), OidcError> {
    match options.provider.validate_token_request(message, ticket).await {
        Outcome::Reject(err) => Err(OidcError::from_protocol_error(err, ErrorCode::InvalidRequest)),
        Outcome::Accept(()) | Outcome::Skip => Ok(()),
    }
}

fn codec_for_grant<'a>(grant_type: &str, options: &'a EndpointOptions) -> &'a Arc<dyn TokenCodec> {
    if grant_type == "authorization_code" {
        &options.authorization_code_codec
    } else {
        &options.refresh_token_codec
    }
}

/// Deserializes the code/refresh token and runs the cross-checks of
/// `SPEC_FULL.md` §4.E. Returns the reconstructed ticket and its original
/// (pre-grant) `expires_utc`, needed later for the sliding-expiration clamp.
async fn reconstruct_ticket(
    grant_type: &str,
    message: &OidcMessage,
    client_validated: bool,
    options: &EndpointOptions,
) -> Result<(Ticket, DateTime<Utc>), OidcError> {
    let codec = codec_for_grant(grant_type, options);
    let token_str = if grant_type == "authorization_code" {
        message.code()
    } else {
        message.refresh_token()
    }
    .expect("precondition check guarantees presence");

    let mut ticket = codec
        .unprotect(token_str)
        .ok_or_else(|| OidcError::invalid_grant("Invalid ticket"))?;

    let now = options.clock.now();
    let expires_utc = ticket
        .expires_utc
        .ok_or_else(|| OidcError::invalid_grant("Expired ticket"))?;
    if expires_utc <= now {
        return Err(OidcError::invalid_grant("Expired ticket"));
    }

    if grant_type == "refresh_token" && !client_validated && ticket.is_confidential() {
        return Err(OidcError::invalid_grant(
            "refresh of a confidential ticket requires client authentication",
        ));
    }

    let presenters = ticket.get_presenters();
    if grant_type == "authorization_code" && presenters.is_empty() {
        return Err(OidcError::new(ErrorCode::ServerError)
            .with_description("authorization code ticket has no presenters"));
    }

    if grant_type == "authorization_code" && message.client_id().is_none() {
        return Err(OidcError::invalid_request("client_id is required for authorization_code"));
    }

    if let Some(client_id) = message.client_id() {
        if !presenters.is_empty() && !presenters.iter().any(|p| p == client_id) {
            return Err(OidcError::invalid_grant("client_id is not a presenter of this ticket"));
        }
    }

    if grant_type == "authorization_code" {
        if let Some(stored_redirect_uri) = ticket.get_redirect_uri().map(str::to_string) {
            match message.redirect_uri() {
                None => {
                    ticket.properties.remove(crate::ticket::REDIRECT_URI);
                    return Err(OidcError::invalid_request("redirect_uri is required"));
                }
                Some(provided) if provided != stored_redirect_uri => {
                    ticket.properties.remove(crate::ticket::REDIRECT_URI);
                    return Err(OidcError::invalid_grant(
                        "Authorization code does not contain matching redirect_uri",
                    ));
                }
                Some(_) => {
                    ticket.properties.remove(crate::ticket::REDIRECT_URI);
                }
            }
        }
    }

    narrow_list_parameter(message.resource().map(str::to_string), &message.get_resources(), &mut ticket, true)?;
    narrow_list_parameter(message.scope().map(str::to_string), &message.get_scopes(), &mut ticket, false)?;

    Ok((ticket, expires_utc))
}

/// Implements §4.E steps 7/8: if the request names an explicit `resource`
/// (or `scope`), the stored set must be a superset of the requested set;
/// on success the ticket's set narrows to exactly the requested set.
fn narrow_list_parameter(
    requested_param: Option<String>,
    requested_set: &[String],
    ticket: &mut Ticket,
    is_resource: bool,
) -> Result<(), OidcError> {
    if requested_param.is_none() {
        return Ok(());
    }
    let stored = if is_resource {
        ticket.get_resources()
    } else {
        ticket.get_scopes()
    };
    if stored.is_empty() {
        return Err(OidcError::invalid_grant(if is_resource {
            "resource was requested but the ticket has none"
        } else {
            "scope was requested but the ticket has none"
        }));
    }
    if !requested_set.iter().all(|r| stored.iter().any(|s| s == r)) {
        return Err(OidcError::invalid_grant(if is_resource {
            "requested resource is not a subset of the ticket's resources"
        } else {
            "requested scope is not a subset of the ticket's scopes"
        }));
    }
    let result = if is_resource {
        ticket.set_resources(requested_set.to_vec())
    } else {
        ticket.set_scopes(requested_set.to_vec())
    };
    result.map_err(|e| OidcError::server(e))
}

async fn dispatch_reconstructing_grant(
    grant_type: &str,
    message: &OidcMessage,
    ticket: Ticket,
    options: &EndpointOptions,
) -> Result<Ticket, OidcError> {
    let ticket_copy = ticket.copy();
    let input_issued = ticket_copy.issued_utc;
    let input_expires = ticket_copy.expires_utc;

    let outcome = if grant_type == "authorization_code" {
        options
            .provider
            .grant_authorization_code(message, ticket_copy)
            .await
    } else {
        options.provider.grant_refresh_token(message, ticket_copy).await
    };

    let mut granted = match outcome {
        Outcome::Accept(ticket) => ticket,
        Outcome::Reject(err) => return Err(OidcError::from_protocol_error(err, ErrorCode::InvalidGrant)),
        Outcome::Skip => return Err(OidcError::new(ErrorCode::InvalidGrant)),
    };

    if granted.issued_utc == input_issued && granted.expires_utc == input_expires {
        granted.issued_utc = None;
        granted.expires_utc = None;
    }

    Ok(granted)
}

async fn dispatch_non_reconstructing_grant(
    grant_type: &str,
    message: &OidcMessage,
    options: &EndpointOptions,
) -> Result<Ticket, OidcError> {
    let (outcome, default_code) = match grant_type {
        "password" => (
            options.provider.grant_resource_owner_credentials(message).await,
            ErrorCode::InvalidGrant,
        ),
        "client_credentials" => (
            options.provider.grant_client_credentials(message).await,
            ErrorCode::UnauthorizedClient,
        ),
        _ => (
            options.provider.grant_custom_extension(message).await,
            ErrorCode::UnsupportedGrantType,
        ),
    };

    match outcome {
        Outcome::Accept(ticket) => Ok(ticket),
        Outcome::Reject(err) => Err(OidcError::from_protocol_error(err, default_code)),
        Outcome::Skip => Err(OidcError::new(default_code)),
    }
}

fn response_parameter_economy(grant_type: &str, message: &OidcMessage, ticket: &Ticket) -> Map<String, Value> {
    let mut response = Map::new();

    if grant_type == "authorization_code" {
        let resources = ticket.get_resources();
        if !resources.is_empty() {
            response.insert("resource".to_string(), Value::String(resources.join(" ")));
        }
        let scopes = ticket.get_scopes();
        if !scopes.is_empty() {
            response.insert("scope".to_string(), Value::String(scopes.join(" ")));
        }
    } else if grant_type == "refresh_token" {
        if let Some(requested) = message.resource() {
            let ticket_resource = ticket.get_resources().join(" ");
            if requested != ticket_resource {
                response.insert("resource".to_string(), Value::String(ticket_resource));
            }
        }
        if let Some(requested) = message.scope() {
            let ticket_scope = ticket.get_scopes().join(" ");
            if requested != ticket_scope {
                response.insert("scope".to_string(), Value::String(ticket_scope));
            }
        }
    }

    response
}

fn response_type_allows(message: &OidcMessage, allow_selector: bool, kind: &str) -> bool {
    if !allow_selector {
        return true;
    }
    message.response_type().is_none() || message.has_response_type(kind)
}

fn mint_tokens(
    grant_type: &str,
    message: &OidcMessage,
    ticket: &Ticket,
    original_expires_utc: Option<DateTime<Utc>>,
    options: &EndpointOptions,
    response: &mut Map<String, Value>,
) -> Result<(), OidcError> {
    let allow_selector = options.server.allow_response_type_token_selection;
    let include_access = response_type_allows(message, allow_selector, "token");
    let include_identity = ticket.has_scope("openid") && response_type_allows(message, allow_selector, "id_token");
    let include_refresh =
        ticket.has_scope("offline_access") && response_type_allows(message, allow_selector, "refresh_token");

    let now = options.clock.now();
    let clamp_to = if grant_type == "refresh_token" && !options.server.use_sliding_expiration {
        original_expires_utc
    } else {
        None
    };

    if include_access {
        let (token, expires_utc, issued_utc) = mint_one(
            ticket,
            "access_token",
            options.server.access_token_lifetime,
            now,
            clamp_to,
            options.access_token_codec.as_ref(),
        )?;
        response.insert("token_type".to_string(), Value::String("Bearer".to_string()));
        response.insert("access_token".to_string(), Value::String(token));
        let lifetime_seconds = (expires_utc - issued_utc).num_milliseconds() as f64 / 1000.0;
        let expires_in = ((lifetime_seconds + 0.5).floor()) as i64;
        response.insert("expires_in".to_string(), Value::String(expires_in.to_string()));
    }

    if include_identity {
        let (token, _, _) = mint_one(
            ticket,
            "id_token",
            options.server.identity_token_lifetime,
            now,
            clamp_to,
            options.identity_token_codec.as_ref(),
        )?;
        response.insert("id_token".to_string(), Value::String(token));
    }

    if include_refresh {
        let (token, _, _) = mint_one(
            ticket,
            "refresh_token",
            options.server.refresh_token_lifetime,
            now,
            clamp_to,
            options.refresh_token_codec.as_ref(),
        )?;
        response.insert("refresh_token".to_string(), Value::String(token));
    }

    Ok(())
}

fn mint_one(
    ticket: &Ticket,
    usage: &str,
    default_lifetime: std::time::Duration,
    now: DateTime<Utc>,
    clamp_to: Option<DateTime<Utc>>,
    codec: &dyn TokenCodec,
) -> Result<(String, DateTime<Utc>, DateTime<Utc>), OidcError> {
    let mut minted = ticket.copy();
    minted.set_usage(usage);

    let issued_utc = minted.issued_utc.unwrap_or(now);
    minted.issued_utc = Some(issued_utc);

    let default_expires = issued_utc
        + chrono::Duration::from_std(default_lifetime).map_err(|e| OidcError::server(e))?;
    let mut expires_utc = minted.expires_utc.unwrap_or(default_expires);
    if let Some(clamp) = clamp_to {
        expires_utc = expires_utc.min(clamp);
    }
    minted.expires_utc = Some(expires_utc);

    let token = codec.protect(&minted)?;
    Ok((token, expires_utc, issued_utc))
}
