//! A framework-agnostic OAuth 2.0 / OpenID Connect token endpoint core.
//!
//! This crate implements the token-endpoint state machine (grant dispatch,
//! client authentication, ticket reconstruction, and token issuance) behind
//! a small set of host-supplied extension points (see [`extensions::Provider`]),
//! so it can sit underneath any HTTP framework. An optional [`http`] adapter
//! for `axum` is provided behind the `http` feature for hosts that don't want
//! to write their own binding.

pub mod clock;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod extensions;
pub mod message;
pub mod ticket;

#[cfg(feature = "http")]
pub mod http;

pub use clock::{Clock, FixedClock, UtcClock};
pub use config::ServerOptions;
pub use endpoint::{handle_token_request, EndpointOptions, JsonResponse, TokenOutcome, TokenRequest};
pub use error::{ErrorCode, OidcError};
pub use extensions::{Outcome, ProtocolError, Provider, TokenEndpointOutcome};
pub use message::OidcMessage;
pub use ticket::{Claim, Identity, Principal, Ticket};
