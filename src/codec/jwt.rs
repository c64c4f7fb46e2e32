use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{json, Value};
use sha1::{Digest, Sha1};

use crate::error::OidcError;
use crate::ticket::Ticket;

use super::{TokenCodec, Usage};

/// Signed-JWT mode of the token codec, grounded on the source project's
/// `JwtManager` (RS256 signing via `jsonwebtoken`).
///
/// Claims carry the registered `iss`/`sub`/`aud`/`nbf`/`exp` set plus the
/// primary identity's claims flattened in (the "compatibility shim" of
/// `SPEC_FULL.md` §4.D, letting a resource server read claims without
/// knowing this crate's internal ticket format) and a private `tkt` claim
/// holding the full ticket, base64-encoded, for lossless round-tripping by
/// this codec's own `unprotect`.
pub struct JwtCodec {
    usage: Usage,
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    kid: Option<String>,
}

impl JwtCodec {
    pub fn new(
        usage: Usage,
        issuer: impl Into<String>,
        private_key_pem: &str,
        public_key_pem: &str,
        key_id: Option<String>,
    ) -> Result<Self, OidcError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| OidcError::server(e))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| OidcError::server(e))?;
        let kid = Some(key_id.unwrap_or_else(|| thumbprint(public_key_pem)));
        Ok(Self {
            usage,
            issuer: issuer.into(),
            encoding_key,
            decoding_key,
            algorithm: Algorithm::RS256,
            kid,
        })
    }

    fn audience_claim(&self, ticket: &Ticket) -> Value {
        let audiences = ticket.get_audiences();
        match audiences.len() {
            0 => Value::Null,
            1 => Value::String(audiences.into_iter().next().unwrap()),
            _ => Value::Array(audiences.into_iter().map(Value::String).collect()),
        }
    }
}

impl TokenCodec for JwtCodec {
    fn protect(&self, ticket: &Ticket) -> Result<String, OidcError> {
        let mut header = Header::new(self.algorithm);
        header.kid = self.kid.clone();

        let encoded_ticket = serde_json::to_vec(ticket).map_err(|e| OidcError::server(e))?;

        let mut claims = json!({
            "iss": self.issuer,
            "usage": self.usage.as_str(),
            "tkt": URL_SAFE_NO_PAD.encode(encoded_ticket),
        });
        let map = claims.as_object_mut().expect("claims is always an object");

        if let Some(sub) = ticket.principal().subject() {
            map.insert("sub".to_string(), Value::String(sub.to_string()));
        }
        let aud = self.audience_claim(ticket);
        if !aud.is_null() {
            map.insert("aud".to_string(), aud);
        }
        if let Some(issued) = ticket.issued_utc {
            map.insert("nbf".to_string(), json!(issued.timestamp()));
        }
        if let Some(expires) = ticket.expires_utc {
            map.insert("exp".to_string(), json!(expires.timestamp()));
        }
        if let Some(primary) = ticket.principal().primary() {
            for claim in &primary.claims {
                if !map.contains_key(&claim.claim_type) {
                    map.insert(claim.claim_type.clone(), Value::String(claim.value.clone()));
                }
            }
        }

        encode(&header, &claims, &self.encoding_key).map_err(|e| OidcError::server(e))
    }

    fn unprotect(&self, token: &str) -> Option<Ticket> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_audience::<&str>(&[]);
        validation.required_spec_claims.clear();

        let data = decode::<Value>(token, &self.decoding_key, &validation).ok()?;
        let claims = data.claims.as_object()?;

        let usage = claims.get("usage")?.as_str()?;
        if usage != self.usage.as_str() {
            return None;
        }

        let encoded_ticket = claims.get("tkt")?.as_str()?;
        let bytes = URL_SAFE_NO_PAD.decode(encoded_ticket).ok()?;
        serde_json::from_slice::<Ticket>(&bytes).ok()
    }

    fn usage(&self) -> Usage {
        self.usage
    }
}

/// Derives a fallback `kid` from a PEM-encoded key when no explicit key id
/// is configured: the SHA-1 thumbprint (uppercase hex) of the decoded key
/// material, in the spirit of `SPEC_FULL.md` §4.D's certificate-thumbprint
/// fallback, adapted to work from a PEM file rather than a parsed X.509
/// certificate (no ASN.1/X.509 parser is in this crate's dependency stack).
fn thumbprint(pem: &str) -> String {
    use base64::engine::general_purpose::STANDARD;

    let body: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let der = STANDARD.decode(body).unwrap_or_default();
    let mut hasher = Sha1::new();
    hasher.update(&der);
    hex::encode_upper(hasher.finalize())
}
