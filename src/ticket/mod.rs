mod principal;

pub use principal::{Claim, Identity, Principal};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const AUDIENCES: &str = ".audiences";
pub const PRESENTERS: &str = ".presenters";
pub const RESOURCES: &str = ".resources";
pub const SCOPES: &str = ".scopes";
pub const NONCE: &str = ".nonce";
pub const USAGE: &str = ".usage";
pub const CONFIDENTIAL: &str = ".confidential";
pub const REDIRECT_URI: &str = ".redirect_uri";

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("property list element must not contain a space: {0:?}")]
    InvalidArgument(String),
}

/// A string-keyed bag of OIDC-specific properties, stored on a [`Ticket`].
///
/// List-valued entries (scopes, audiences, presenters, resources) are always
/// stored as a single space-joined, ordinally-deduplicated string; this is
/// the wire-level invariant the protocol relies on (see `SPEC_FULL.md` §9,
/// "List-as-space-joined string").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties(HashMap<String, String>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Splits a list-valued entry on space; empty if unset.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        crate::message::split_set(self.get(key))
    }

    /// Ordinal membership test on the raw (non-deduplicated) split value.
    pub fn has_list_member(&self, key: &str, member: &str) -> bool {
        self.get(key)
            .map(|v| v.split(' ').any(|t| t == member))
            .unwrap_or(false)
    }

    /// Writes a deduplicated, space-joined list. Fails if any element
    /// contains a space.
    pub fn set_list<I, S>(&mut self, key: &str, values: I) -> Result<(), TicketError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = std::collections::HashSet::new();
        let mut ordered = Vec::new();
        for value in values {
            let value = value.into();
            if value.contains(' ') {
                return Err(TicketError::InvalidArgument(value));
            }
            if seen.insert(value.clone()) {
                ordered.push(value);
            }
        }
        self.0.insert(key.to_string(), ordered.join(" "));
        Ok(())
    }
}

/// A value aggregating a [`Principal`], its OIDC-specific [`Properties`],
/// and optional issuance/expiry timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    principal: Arc<Principal>,
    pub properties: Properties,
    pub issued_utc: Option<DateTime<Utc>>,
    pub expires_utc: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal: Arc::new(principal),
            properties: Properties::new(),
            issued_utc: None,
            expires_utc: None,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn set_principal(&mut self, principal: Principal) {
        self.principal = Arc::new(principal);
    }

    /// Deep-copies the properties map; shares the principal by reference
    /// (the principal is treated as immutable for the duration of a
    /// request, per `SPEC_FULL.md` §4.B).
    pub fn copy(&self) -> Ticket {
        Ticket {
            principal: Arc::clone(&self.principal),
            properties: self.properties.clone(),
            issued_utc: self.issued_utc,
            expires_utc: self.expires_utc,
        }
    }

    pub fn get_audiences(&self) -> Vec<String> {
        self.properties.get_list(AUDIENCES)
    }
    pub fn get_presenters(&self) -> Vec<String> {
        self.properties.get_list(PRESENTERS)
    }
    pub fn get_resources(&self) -> Vec<String> {
        self.properties.get_list(RESOURCES)
    }
    pub fn get_scopes(&self) -> Vec<String> {
        self.properties.get_list(SCOPES)
    }

    pub fn set_audiences<I: IntoIterator<Item = S>, S: Into<String>>(
        &mut self,
        values: I,
    ) -> Result<(), TicketError> {
        self.properties.set_list(AUDIENCES, values)
    }
    pub fn set_presenters<I: IntoIterator<Item = S>, S: Into<String>>(
        &mut self,
        values: I,
    ) -> Result<(), TicketError> {
        self.properties.set_list(PRESENTERS, values)
    }
    pub fn set_resources<I: IntoIterator<Item = S>, S: Into<String>>(
        &mut self,
        values: I,
    ) -> Result<(), TicketError> {
        self.properties.set_list(RESOURCES, values)
    }
    pub fn set_scopes<I: IntoIterator<Item = S>, S: Into<String>>(
        &mut self,
        values: I,
    ) -> Result<(), TicketError> {
        self.properties.set_list(SCOPES, values)
    }

    pub fn has_audience(&self, value: &str) -> bool {
        self.properties.has_list_member(AUDIENCES, value)
    }
    pub fn has_presenter(&self, value: &str) -> bool {
        self.properties.has_list_member(PRESENTERS, value)
    }
    pub fn has_resource(&self, value: &str) -> bool {
        self.properties.has_list_member(RESOURCES, value)
    }
    pub fn has_scope(&self, value: &str) -> bool {
        self.properties.has_list_member(SCOPES, value)
    }

    pub fn get_usage(&self) -> Option<&str> {
        self.properties.get(USAGE)
    }

    pub fn set_usage(&mut self, usage: &str) {
        self.properties.set(USAGE, usage);
    }

    fn usage_is(&self, expected: &str) -> bool {
        self.get_usage()
            .map(|u| u.eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    }

    pub fn is_authorization_code(&self) -> bool {
        self.usage_is("code")
    }
    pub fn is_access_token(&self) -> bool {
        self.usage_is("access_token")
    }
    pub fn is_identity_token(&self) -> bool {
        self.usage_is("id_token")
    }
    pub fn is_refresh_token(&self) -> bool {
        self.usage_is("refresh_token")
    }

    pub fn is_confidential(&self) -> bool {
        self.properties
            .get(CONFIDENTIAL)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn set_confidential(&mut self, confidential: bool) {
        if confidential {
            self.properties.set(CONFIDENTIAL, "true");
        } else {
            self.properties.remove(CONFIDENTIAL);
        }
    }

    pub fn get_redirect_uri(&self) -> Option<&str> {
        self.properties.get(REDIRECT_URI)
    }

    pub fn set_redirect_uri(&mut self, uri: impl Into<String>) {
        self.properties.set(REDIRECT_URI, uri.into());
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_utc {
            Some(expires) => expires <= now,
            None => true,
        }
    }
}
