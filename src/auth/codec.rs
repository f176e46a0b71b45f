//! Signed bearer tokens.
//!
//! Format: `<header>.<payload>.<signature>`, each segment base64url without
//! padding. Header and payload are JSON; the signature is HMAC-SHA256 over
//! `"<header>.<payload>"`.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;

use super::random_hex;
use crate::clock::Clock;

type HmacSha256 = Hmac<Sha256>;

const HEADER_JSON: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Payload keys owned by the codec; callers cannot override them.
const RESERVED_CLAIMS: [&str; 4] = ["sub", "iat", "exp", "jti"];

/// Random bytes in the `jti` claim; tokens minted in the same second differ.
const TOKEN_ID_BYTES: usize = 16;

/// Decoded token payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iat: i64,
    /// Tokens without `exp` never expire on their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    pub fn username(&self) -> Option<&str> {
        self.extra.get("username").and_then(Value::as_str)
    }

    pub fn role(&self) -> Option<&str> {
        self.extra.get("role").and_then(Value::as_str)
    }

    pub fn token_id(&self) -> Option<&str> {
        self.extra.get("jti").and_then(Value::as_str)
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        if secret.is_empty() {
            anyhow::bail!("token secret must not be empty");
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|e| anyhow::anyhow!("invalid token secret: {}", e))?;
        Ok(Self { mac, clock })
    }

    pub fn issue(&self, subject: &str, claims: &Map<String, Value>, ttl_secs: i64) -> String {
        let now = self.clock.now_secs();
        let mut extra = claims.clone();
        for key in RESERVED_CLAIMS {
            extra.remove(key);
        }
        extra.insert("jti".to_string(), Value::String(random_hex(TOKEN_ID_BYTES)));
        let payload = TokenClaims { sub: subject.to_string(), iat: now, exp: Some(now + ttl_secs), extra };
        // Serializing a struct of strings, integers and a JSON map cannot fail.
        let payload_json = serde_json::to_vec(&payload).unwrap_or_default();

        let header = URL_SAFE_NO_PAD.encode(HEADER_JSON);
        let body = URL_SAFE_NO_PAD.encode(payload_json);
        let signing_input = format!("{}.{}", header, body);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(signing_input.as_bytes()));
        format!("{}.{}", signing_input, signature)
    }

    /// Returns the payload when the token is well formed, correctly signed and
    /// not past `exp`. Revocation is not checked here.
    pub fn verify(&self, token: &str) -> Option<TokenClaims> {
        let mut parts = token.split('.');
        let (header, body, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(b), Some(s), None) => (h, b, s),
            _ => return None,
        };

        let provided = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = self.mac.clone();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(body.as_bytes());
        mac.verify_slice(&provided).ok()?;

        let payload = URL_SAFE_NO_PAD.decode(body).ok()?;
        let claims: TokenClaims = serde_json::from_slice(&payload).ok()?;
        if let Some(exp) = claims.exp {
            if exp <= self.clock.now_secs() {
                return None;
            }
        }
        Some(claims)
    }

    fn sign(&self, input: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(input);
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn codec() -> (TokenCodec, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        (TokenCodec::new(SECRET, Arc::new(clock.clone())).unwrap(), clock)
    }

    fn claims() -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("username".into(), json!("alice"));
        m.insert("role".into(), json!("user"));
        m
    }

    #[test]
    fn test_issue_then_verify_returns_claims() {
        let (codec, _) = codec();
        let token = codec.issue("user-1", &claims(), 3600);
        assert_eq!(token.split('.').count(), 3);

        let decoded = codec.verify(&token).expect("valid token");
        assert_eq!(decoded.sub, "user-1");
        assert_eq!(decoded.username(), Some("alice"));
        assert_eq!(decoded.role(), Some("user"));
        assert_eq!(decoded.iat, 1_700_000_000);
        assert_eq!(decoded.exp, Some(1_700_003_600));
    }

    #[test]
    fn test_token_expires_after_ttl() {
        let (codec, clock) = codec();
        let token = codec.issue("user-1", &claims(), 60);
        clock.advance_secs(59);
        assert!(codec.verify(&token).is_some());
        clock.advance_secs(1);
        assert!(codec.verify(&token).is_none());
    }

    #[test]
    fn test_tampered_payload_fails() {
        let (codec, _) = codec();
        let token = codec.issue("user-1", &claims(), 3600);
        let parts: Vec<&str> = token.split('.').collect();

        let forged_payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&json!({"sub": "admin", "iat": 1_700_000_000, "exp": 1_900_000_000})).unwrap(),
        );
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert!(codec.verify(&forged).is_none());

        // Flip every position of the payload segment in turn.
        let payload = parts[1].as_bytes();
        for i in 0..payload.len() {
            let mut bytes = payload.to_vec();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = format!("{}.{}.{}", parts[0], String::from_utf8(bytes).unwrap(), parts[2]);
            assert!(codec.verify(&tampered).is_none(), "byte {} flip accepted", i);
        }
    }

    #[test]
    fn test_malformed_tokens_fail() {
        let (codec, _) = codec();
        let token = codec.issue("user-1", &claims(), 3600);
        assert!(codec.verify("").is_none());
        assert!(codec.verify("a.b").is_none());
        assert!(codec.verify(&format!("{}.extra", token)).is_none());
        assert!(codec.verify("not-base64!.x.y").is_none());
    }

    #[test]
    fn test_wrong_secret_fails() {
        let (codec, clock) = codec();
        let other = TokenCodec::new(b"another-secret-another-secret-xx", Arc::new(clock)).unwrap();
        let token = codec.issue("user-1", &claims(), 3600);
        assert!(other.verify(&token).is_none());
    }

    #[test]
    fn test_reserved_claims_cannot_be_overridden() {
        let (codec, _) = codec();
        let mut sneaky = claims();
        sneaky.insert("sub".into(), json!("admin"));
        sneaky.insert("exp".into(), json!(0));
        sneaky.insert("jti".into(), json!("fixed"));
        let decoded = codec.verify(&codec.issue("user-1", &sneaky, 3600)).unwrap();
        assert_eq!(decoded.sub, "user-1");
        assert_eq!(decoded.exp, Some(1_700_003_600));
        assert_ne!(decoded.token_id(), Some("fixed"));
    }

    #[test]
    fn test_same_second_tokens_are_distinct() {
        let (codec, _) = codec();
        let first = codec.issue("user-1", &claims(), 3600);
        let second = codec.issue("user-1", &claims(), 3600);
        assert_ne!(first, second);

        let a = codec.verify(&first).unwrap();
        let b = codec.verify(&second).unwrap();
        assert_eq!(a.iat, b.iat);
        assert_eq!(a.token_id().map(str::len), Some(32));
        assert_ne!(a.token_id(), b.token_id());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(TokenCodec::new(b"", Arc::new(ManualClock::new(0))).is_err());
    }
}
