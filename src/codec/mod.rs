//! Token codec (component D): serializes a [`Ticket`] to an opaque string
//! (an authorization code, a refresh token, or a bearer access/identity
//! token) and reverses the operation. Two modes exist per token kind — JWT
//! and symmetric opaque — behind the single capability interface this
//! module defines, per `SPEC_FULL.md` §9 ("Codec pluggability").

pub mod jwt;
pub mod opaque;

use crate::error::OidcError;
use crate::ticket::Ticket;

/// One of the four `usage` tags a codec is bound to, matching the reserved
/// `.usage` property values of `SPEC_FULL.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    AuthorizationCode,
    AccessToken,
    IdentityToken,
    RefreshToken,
}

impl Usage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Usage::AuthorizationCode => "code",
            Usage::AccessToken => "access_token",
            Usage::IdentityToken => "id_token",
            Usage::RefreshToken => "refresh_token",
        }
    }
}

/// The serialize/deserialize capability shared by both codec modes.
pub trait TokenCodec: Send + Sync {
    /// Serializes `ticket` to an opaque wire string. Failures here are
    /// signing/encryption faults and surface as `server_error`
    /// (`SPEC_FULL.md` §7).
    fn protect(&self, ticket: &Ticket) -> Result<String, OidcError>;

    /// Deserializes `token`. Any failure — malformed input, a signature/MAC
    /// mismatch, or a `usage` tag mismatch — yields `None`; the driver maps
    /// that uniformly to `invalid_grant "Invalid ticket"`.
    fn unprotect(&self, token: &str) -> Option<Ticket>;

    fn usage(&self) -> Usage;
}
