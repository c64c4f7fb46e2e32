use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

use crate::error::OidcError;
use crate::ticket::Ticket;

use super::{TokenCodec, Usage};

const NONCE_LEN: usize = 12;

/// Opaque mode of the token codec: encrypt-and-authenticate the serialized
/// ticket with AES-256-GCM, matching the symmetric data-protection scheme
/// several example repos in the retrieval pack reach for `aes-gcm` to
/// implement (see `DESIGN.md`). The output carries no structure a bearer
/// could introspect; only the configured key can reverse it.
pub struct OpaqueCodec {
    usage: Usage,
    cipher: Aes256Gcm,
}

impl OpaqueCodec {
    pub fn new(usage: Usage, key: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        Self { usage, cipher }
    }
}

impl TokenCodec for OpaqueCodec {
    fn protect(&self, ticket: &Ticket) -> Result<String, OidcError> {
        let plaintext = serde_json::to_vec(ticket).map_err(OidcError::server)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|_| OidcError::server(anyhow::anyhow!("opaque codec encryption failed")))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    fn unprotect(&self, token: &str) -> Option<Ticket> {
        let raw = URL_SAFE_NO_PAD.decode(token).ok()?;
        if raw.len() < NONCE_LEN {
            return None;
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self.cipher.decrypt(nonce, ciphertext).ok()?;
        let ticket: Ticket = serde_json::from_slice(&plaintext).ok()?;
        if ticket.get_usage() != Some(self.usage.as_str()) {
            return None;
        }
        Some(ticket)
    }

    fn usage(&self) -> Usage {
        self.usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::{Claim, Identity, Principal};

    fn key() -> [u8; 32] {
        *b"01234567890123456789012345678901"
    }

    fn sample_ticket(usage: &str) -> Ticket {
        let mut t = Ticket::new(Principal::new(vec![Identity::new(vec![Claim::new(
            "sub", "user-1",
        )])]));
        t.set_usage(usage);
        t.set_scopes(vec!["openid"]).unwrap();
        t
    }

    #[test]
    fn protect_then_unprotect_round_trips() {
        let codec = OpaqueCodec::new(Usage::AuthorizationCode, &key());
        let ticket = sample_ticket("code");
        let token = codec.protect(&ticket).unwrap();
        let recovered = codec.unprotect(&token).unwrap();
        assert_eq!(recovered.get_scopes(), vec!["openid"]);
    }

    #[test]
    fn usage_mismatch_yields_null_ticket() {
        let codec = OpaqueCodec::new(Usage::RefreshToken, &key());
        let token = codec.protect(&sample_ticket("code")).unwrap();
        assert!(codec.unprotect(&token).is_none());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let codec_a = OpaqueCodec::new(Usage::AuthorizationCode, &key());
        let mut other_key = key();
        other_key[0] ^= 0xFF;
        let codec_b = OpaqueCodec::new(Usage::AuthorizationCode, &other_key);
        let token = codec_a.protect(&sample_ticket("code")).unwrap();
        assert!(codec_b.unprotect(&token).is_none());
    }

    #[test]
    fn truncated_token_fails_gracefully() {
        let codec = OpaqueCodec::new(Usage::AuthorizationCode, &key());
        assert!(codec.unprotect("short").is_none());
    }
}
