//! Extension protocol (component C): the host-facing vtable through which an
//! application authenticates clients, validates requests, grants tickets,
//! and may override token issuance.
//!
//! The source material expresses each extension point as an event object
//! carrying a tri-state Validated/Rejected/Skipped status. Modelled here as
//! a tagged outcome returned from an async trait method instead, per
//! `SPEC_FULL.md` §9 ("Event-object tri-state vs exceptions"): the driver
//! pattern-matches the outcome and resolves a default error code when a
//! rejection carries none.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::message::OidcMessage;
use crate::ticket::Ticket;

/// A protocol error as it will eventually be written into the `{error,
/// error_description, error_uri}` JSON body (§6). `error` is `None` when the
/// handler rejected without naming a code, in which case the driver supplies
/// the extension point's default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolError {
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
}

impl ProtocolError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            error_description: None,
            error_uri: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.error_description = Some(description.into());
        self
    }

    pub fn unset() -> Self {
        Self::default()
    }

    /// Resolves to a concrete `(error, description, uri)` triple, falling
    /// back to `default_error` when the handler did not name one.
    pub fn resolve(self, default_error: &str) -> (String, Option<String>, Option<String>) {
        (
            self.error.unwrap_or_else(|| default_error.to_string()),
            self.error_description,
            self.error_uri,
        )
    }
}

/// The outcome of dispatching one extension point.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The handler validated the request and supplies `T`.
    Accept(T),
    /// The handler rejected the request, optionally naming an error.
    Reject(ProtocolError),
    /// The handler declined to act (e.g. a public client skipping
    /// authentication); the driver applies the extension point's own
    /// fallback behavior.
    Skip,
}

/// Outcome of the `TokenEndpoint` extension point: the host may replace the
/// ticket, leave it unchanged, or take over the response entirely.
#[derive(Debug)]
pub enum TokenEndpointOutcome {
    /// Continue the driver's post-grant normalization with this ticket
    /// (`None` signals the host explicitly nulled the ticket out, which the
    /// driver maps to `server_error`).
    Ticket(Option<Ticket>),
    /// The host has already written the full response; the driver returns
    /// immediately without further processing.
    Handled,
}

/// The extension-point vtable. Every method has a default implementation so
/// a host only overrides the grants and checks it actually supports; the
/// driver treats an un-overridden grant handler as a rejection using that
/// extension point's default error code.
#[async_trait]
pub trait Provider: Send + Sync {
    /// May accept (supplying the resolved `client_id`), skip (public
    /// client), or reject.
    async fn validate_client_authentication(&self, _message: &OidcMessage) -> Outcome<String> {
        Outcome::Skip
    }

    /// Invoked once before grant dispatch for non-reconstructing grants, and
    /// once more after ticket reconstruction for code/refresh grants.
    async fn validate_token_request(
        &self,
        _message: &OidcMessage,
        _ticket: Option<&Ticket>,
    ) -> Outcome<()> {
        Outcome::Accept(())
    }

    async fn grant_authorization_code(&self, _message: &OidcMessage, _ticket: Ticket) -> Outcome<Ticket> {
        Outcome::Reject(ProtocolError::unset())
    }

    async fn grant_refresh_token(&self, _message: &OidcMessage, _ticket: Ticket) -> Outcome<Ticket> {
        Outcome::Reject(ProtocolError::unset())
    }

    async fn grant_resource_owner_credentials(&self, _message: &OidcMessage) -> Outcome<Ticket> {
        Outcome::Reject(ProtocolError::unset())
    }

    async fn grant_client_credentials(&self, _message: &OidcMessage) -> Outcome<Ticket> {
        Outcome::Reject(ProtocolError::unset())
    }

    async fn grant_custom_extension(&self, _message: &OidcMessage) -> Outcome<Ticket> {
        Outcome::Reject(ProtocolError::unset())
    }

    /// Lets the host inspect or replace the granted ticket, or take over the
    /// response entirely. Default: pass the ticket through unchanged.
    async fn token_endpoint(&self, _message: &OidcMessage, ticket: Ticket) -> TokenEndpointOutcome {
        TokenEndpointOutcome::Ticket(Some(ticket))
    }

    /// Lets the host inspect or replace the outgoing JSON payload. Default:
    /// leave it unchanged.
    async fn token_endpoint_response(
        &self,
        _message: &OidcMessage,
        _response: &mut Map<String, Value>,
    ) -> Outcome<()> {
        Outcome::Accept(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopProvider;
    impl Provider for NoopProvider {}

    #[tokio::test]
    async fn default_client_authentication_skips() {
        let provider = NoopProvider;
        let message = OidcMessage::new();
        assert!(matches!(
            provider.validate_client_authentication(&message).await,
            Outcome::Skip
        ));
    }

    #[tokio::test]
    async fn default_grant_handlers_reject_with_unset_error() {
        let provider = NoopProvider;
        let message = OidcMessage::new();
        let ticket = crate::ticket::Ticket::new(crate::ticket::Principal::new(vec![]));
        match provider.grant_authorization_code(&message, ticket).await {
            Outcome::Reject(err) => assert_eq!(err.error, None),
            other => panic!("expected reject, got {other:?}"),
        }
    }

    #[test]
    fn protocol_error_resolves_to_default_when_unset() {
        let (error, description, uri) = ProtocolError::unset().resolve("invalid_grant");
        assert_eq!(error, "invalid_grant");
        assert_eq!(description, None);
        assert_eq!(uri, None);
    }

    #[test]
    fn protocol_error_keeps_explicit_code_over_default() {
        let (error, _, _) = ProtocolError::new("invalid_client").resolve("invalid_grant");
        assert_eq!(error, "invalid_client");
    }
}
