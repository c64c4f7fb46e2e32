use std::collections::HashMap;

/// A case-insensitive OIDC parameter bag with typed accessors for the
/// well-known token-endpoint parameters.
///
/// Lookups are case-insensitive on the parameter *name*; parameter *values*
/// (grant types, response types, scopes, ...) are always compared ordinally,
/// per the protocol's case-sensitive string tokens.
#[derive(Debug, Clone, Default)]
pub struct OidcMessage {
    params: HashMap<String, String>,
}

fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl OidcMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut message = Self::new();
        for (k, v) in pairs {
            message.set(k.as_ref(), v.into());
        }
        message
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.params.insert(normalize_name(name), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(&normalize_name(name)).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// Hand-written rather than macro-generated: the well-known accessor set is
// fixed and small, and a macro would obscure which parameter name maps to
// which method for a reader skimming this file.
impl OidcMessage {
    pub fn grant_type(&self) -> Option<&str> {
        self.get("grant_type")
    }
    pub fn response_type(&self) -> Option<&str> {
        self.get("response_type")
    }
    pub fn response_mode(&self) -> Option<&str> {
        self.get("response_mode")
    }
    pub fn scope(&self) -> Option<&str> {
        self.get("scope")
    }
    pub fn resource(&self) -> Option<&str> {
        self.get("resource")
    }
    pub fn code(&self) -> Option<&str> {
        self.get("code")
    }
    pub fn refresh_token(&self) -> Option<&str> {
        self.get("refresh_token")
    }
    pub fn redirect_uri(&self) -> Option<&str> {
        self.get("redirect_uri")
    }
    pub fn username(&self) -> Option<&str> {
        self.get("username")
    }
    pub fn password(&self) -> Option<&str> {
        self.get("password")
    }
    pub fn client_id(&self) -> Option<&str> {
        self.get("client_id")
    }
    pub fn client_secret(&self) -> Option<&str> {
        self.get("client_secret")
    }
    pub fn error(&self) -> Option<&str> {
        self.get("error")
    }
    pub fn error_description(&self) -> Option<&str> {
        self.get("error_description")
    }
    pub fn error_uri(&self) -> Option<&str> {
        self.get("error_uri")
    }
    pub fn access_token(&self) -> Option<&str> {
        self.get("access_token")
    }
    pub fn id_token(&self) -> Option<&str> {
        self.get("id_token")
    }
    pub fn token_type(&self) -> Option<&str> {
        self.get("token_type")
    }
    pub fn expires_in(&self) -> Option<&str> {
        self.get("expires_in")
    }
}

/// Splits a space-separated parameter value into its ordinal-deduplicated
/// members, preserving first-seen order. Returns an empty vec if `value` is
/// `None` or empty.
pub fn split_set(value: Option<&str>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    if let Some(value) = value {
        for token in value.split(' ').filter(|t| !t.is_empty()) {
            if seen.insert(token) {
                out.push(token.to_string());
            }
        }
    }
    out
}

fn has_member(value: Option<&str>, member: &str) -> bool {
    value
        .map(|v| v.split(' ').any(|t| t == member))
        .unwrap_or(false)
}

impl OidcMessage {
    pub fn get_scopes(&self) -> Vec<String> {
        split_set(self.scope())
    }

    pub fn get_resources(&self) -> Vec<String> {
        split_set(self.resource())
    }

    pub fn has_scope(&self, value: &str) -> bool {
        has_member(self.scope(), value)
    }

    pub fn has_response_type(&self, value: &str) -> bool {
        has_member(self.response_type(), value)
    }

    fn response_type_set(&self) -> Vec<&str> {
        self.response_type()
            .map(|v| v.split(' ').filter(|t| !t.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn is_authorization_code_flow(&self) -> bool {
        self.response_type() == Some("code")
    }

    pub fn is_none_flow(&self) -> bool {
        self.response_type() == Some("none")
    }

    pub fn is_implicit_flow(&self) -> bool {
        let mut set = self.response_type_set();
        set.sort_unstable();
        matches!(set.as_slice(), ["id_token"] | ["token"] | ["id_token", "token"])
    }

    pub fn is_hybrid_flow(&self) -> bool {
        let mut set = self.response_type_set();
        set.sort_unstable();
        matches!(
            set.as_slice(),
            ["code", "id_token"] | ["code", "token"] | ["code", "id_token", "token"]
        )
    }

    pub fn is_fragment_response_mode(&self) -> bool {
        match self.response_mode() {
            Some("fragment") => true,
            Some(_) => false,
            None => self.is_implicit_flow() || self.is_hybrid_flow(),
        }
    }

    pub fn is_query_response_mode(&self) -> bool {
        match self.response_mode() {
            Some("query") => true,
            Some(_) => false,
            None => self.is_authorization_code_flow() || self.is_none_flow(),
        }
    }

    pub fn is_form_post_response_mode(&self) -> bool {
        self.response_mode() == Some("form_post")
    }

    pub fn is_authorization_code_grant_type(&self) -> bool {
        self.grant_type() == Some("authorization_code")
    }

    pub fn is_refresh_token_grant_type(&self) -> bool {
        self.grant_type() == Some("refresh_token")
    }

    pub fn is_password_grant_type(&self) -> bool {
        self.grant_type() == Some("password")
    }

    pub fn is_client_credentials_grant_type(&self) -> bool {
        self.grant_type() == Some("client_credentials")
    }
}
