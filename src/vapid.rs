//! VAPID (Voluntary Application Server Identification, RFC 8292).
//!
//! The key pair is the process-wide sender identity: generated once, stored
//! on disk, and never regenerated at runtime. Every push request carries an
//! ES256 JWT scoped to the destination push service's origin so the service
//! can attribute (and rate-limit) all traffic from this deployment.

use crate::codec::{b64url_decode, b64url_encode};
use crate::error::PushError;
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;

/// Token lifetime. Long enough to avoid re-signing per notification batch,
/// short enough to bound a leaked token's blast radius.
const TOKEN_LIFETIME_HOURS: i64 = 12;

/// VAPID key pair plus contact subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VapidKeys {
    /// The public key (shared with clients) - base64url encoded 65-byte
    /// uncompressed P-256 point
    pub public_key: String,
    /// The private key (kept secret on server) - base64url encoded 32-byte
    /// scalar
    pub private_key: String,
    /// Contact URI for the `sub` claim (`mailto:` or `https:`)
    pub subject: String,
    /// When the keys were generated
    pub created_at: String,
}

/// Header values authenticating one push request.
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    /// `Authorization: vapid t=<jwt>,k=<public key>`
    pub authorization: String,
    /// `Crypto-Key: p256ecdsa=<public key>` - compatibility duplication
    /// expected by some push services
    pub crypto_key: String,
}

/// Generate a new VAPID key pair using the P-256 curve.
pub fn generate_vapid_keys(subject: impl Into<String>) -> VapidKeys {
    use rand::rngs::OsRng;

    let signing_key = SigningKey::random(&mut OsRng);

    // 32-byte scalar and 65-byte uncompressed point
    let private_key = b64url_encode(signing_key.to_bytes().as_slice());
    let public_key = b64url_encode(signing_key.verifying_key().to_encoded_point(false).as_bytes());

    VapidKeys {
        public_key,
        private_key,
        subject: subject.into(),
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// Load VAPID keys from a file, if present.
pub fn load_vapid_keys(path: &Path) -> Result<Option<VapidKeys>, PushError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| PushError::KeyStorage(format!("failed to read {}: {}", path.display(), e)))?;
    let keys = serde_json::from_str(&text)
        .map_err(|e| PushError::KeyStorage(format!("failed to parse {}: {}", path.display(), e)))?;
    Ok(Some(keys))
}

/// Save VAPID keys to a file.
pub fn save_vapid_keys(path: &Path, keys: &VapidKeys) -> Result<(), PushError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            PushError::KeyStorage(format!("failed to create {}: {}", parent.display(), e))
        })?;
    }
    let text = serde_json::to_string_pretty(keys)
        .map_err(|e| PushError::KeyStorage(format!("failed to serialize keys: {}", e)))?;
    std::fs::write(path, text)
        .map_err(|e| PushError::KeyStorage(format!("failed to write {}: {}", path.display(), e)))
}

/// Get existing VAPID keys or create and persist new ones.
pub fn get_or_create_vapid_keys(
    path: &Path,
    subject: impl Into<String>,
) -> Result<VapidKeys, PushError> {
    if let Some(keys) = load_vapid_keys(path)? {
        log::debug!("Loaded existing VAPID keys");
        return Ok(keys);
    }

    log::info!("Generating new VAPID keys");
    let keys = generate_vapid_keys(subject);
    save_vapid_keys(path, &keys)?;

    Ok(keys)
}

/// Build a compact ES256 JWT with the given audience, subject, and expiry.
///
/// Header and claims are base64url-encoded JSON segments joined by `.`; the
/// joined pair is signed with ECDSA P-256/SHA-256 and the raw 64-byte
/// `r || s` signature appended as the third segment.
pub fn build_jwt(
    audience: &str,
    subject: &str,
    keys: &VapidKeys,
    expires_at: i64,
) -> Result<String, PushError> {
    let header = json!({ "typ": "JWT", "alg": "ES256" });
    let claims = json!({ "aud": audience, "exp": expires_at, "sub": subject });

    let header_segment = b64url_encode(
        serde_json::to_vec(&header)
            .map_err(|e| PushError::Signing(format!("header serialization: {}", e)))?
            .as_slice(),
    );
    let claims_segment = b64url_encode(
        serde_json::to_vec(&claims)
            .map_err(|e| PushError::Signing(format!("claims serialization: {}", e)))?
            .as_slice(),
    );
    let signing_input = format!("{}.{}", header_segment, claims_segment);

    let private_key = b64url_decode(&keys.private_key)
        .map_err(|_| PushError::Signing("private key is not valid base64url".to_string()))?;
    let signing_key = SigningKey::from_slice(&private_key)
        .map_err(|e| PushError::Signing(format!("private key import: {}", e)))?;

    let signature: Signature = signing_key.sign(signing_input.as_bytes());

    Ok(format!(
        "{}.{}",
        signing_input,
        b64url_encode(signature.to_bytes().as_slice())
    ))
}

/// Build the `Authorization` and `Crypto-Key` values for one push request.
///
/// The audience is the endpoint's origin, so tokens are never reusable
/// across push services; expiry is always computed from the wall clock at
/// call time.
pub fn build_auth_header(endpoint: &str, keys: &VapidKeys) -> Result<AuthHeaders, PushError> {
    let audience = endpoint_audience(endpoint)?;
    let expires_at =
        (chrono::Utc::now() + chrono::Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp();

    let jwt = build_jwt(&audience, &keys.subject, keys, expires_at)?;

    Ok(AuthHeaders {
        authorization: format!("vapid t={},k={}", jwt, keys.public_key),
        crypto_key: format!("p256ecdsa={}", keys.public_key),
    })
}

/// Derive the VAPID audience (scheme + host, plus any non-default port) from
/// a push endpoint URL.
fn endpoint_audience(endpoint: &str) -> Result<String, PushError> {
    let url = url::Url::parse(endpoint)
        .map_err(|e| PushError::Signing(format!("invalid endpoint URL: {}", e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| PushError::Signing("endpoint URL has no host".to_string()))?;

    let mut audience = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        audience.push_str(&format!(":{}", port));
    }
    Ok(audience)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{signature::Verifier, VerifyingKey};

    fn test_keys() -> VapidKeys {
        generate_vapid_keys("mailto:admin@example.com")
    }

    #[test]
    fn test_generated_keys_have_expected_lengths() {
        let keys = test_keys();

        // Public key should be 65 bytes (uncompressed EC point)
        let public = b64url_decode(&keys.public_key).unwrap();
        assert_eq!(public.len(), 65);
        assert_eq!(public[0], 0x04);

        // Private key should be 32 bytes
        let private = b64url_decode(&keys.private_key).unwrap();
        assert_eq!(private.len(), 32);
    }

    #[test]
    fn test_jwt_structure_and_claims() {
        let keys = test_keys();
        let jwt = build_jwt("https://push.example.net", &keys.subject, &keys, 1_700_000_000)
            .unwrap();

        let segments: Vec<&str> = jwt.split('.').collect();
        assert_eq!(segments.len(), 3);

        let header: serde_json::Value =
            serde_json::from_slice(&b64url_decode(segments[0]).unwrap()).unwrap();
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["typ"], "JWT");

        let claims: serde_json::Value =
            serde_json::from_slice(&b64url_decode(segments[1]).unwrap()).unwrap();
        assert_eq!(claims["aud"], "https://push.example.net");
        assert_eq!(claims["sub"], "mailto:admin@example.com");
        assert_eq!(claims["exp"], 1_700_000_000);
    }

    #[test]
    fn test_jwt_signature_verifies() {
        let keys = test_keys();
        let jwt = build_jwt("https://push.example.net", &keys.subject, &keys, 1_700_000_000)
            .unwrap();

        let (signing_input, signature_segment) = jwt.rsplit_once('.').unwrap();
        let signature_bytes = b64url_decode(signature_segment).unwrap();
        assert_eq!(signature_bytes.len(), 64);

        let public = b64url_decode(&keys.public_key).unwrap();
        let verifying_key = VerifyingKey::from_sec1_bytes(&public).unwrap();
        let signature = Signature::from_slice(&signature_bytes).unwrap();
        verifying_key
            .verify(signing_input.as_bytes(), &signature)
            .expect("JWT signature should verify under the VAPID public key");
    }

    #[test]
    fn test_audience_differs_per_host() {
        let keys = test_keys();
        let a = build_auth_header("https://fcm.googleapis.com/send/abc", &keys).unwrap();
        let b = build_auth_header("https://push.mozilla.org/send/def", &keys).unwrap();

        let aud = |headers: &AuthHeaders| -> String {
            let token = headers
                .authorization
                .strip_prefix("vapid t=")
                .unwrap()
                .split(',')
                .next()
                .unwrap();
            let claims: serde_json::Value =
                serde_json::from_slice(&b64url_decode(token.split('.').nth(1).unwrap()).unwrap())
                    .unwrap();
            claims["aud"].as_str().unwrap().to_string()
        };

        assert_eq!(aud(&a), "https://fcm.googleapis.com");
        assert_eq!(aud(&b), "https://push.mozilla.org");
    }

    #[test]
    fn test_expiry_is_twelve_hours_out() {
        let keys = test_keys();
        let headers = build_auth_header("https://push.example.net/send/abc", &keys).unwrap();

        let token = headers
            .authorization
            .strip_prefix("vapid t=")
            .unwrap()
            .split(',')
            .next()
            .unwrap();
        let claims: serde_json::Value =
            serde_json::from_slice(&b64url_decode(token.split('.').nth(1).unwrap()).unwrap())
                .unwrap();

        let now = chrono::Utc::now().timestamp();
        let exp = claims["exp"].as_i64().unwrap();
        assert!(exp > now);
        assert!(exp <= now + 12 * 3600);
    }

    #[test]
    fn test_crypto_key_header_carries_public_key() {
        let keys = test_keys();
        let headers = build_auth_header("https://push.example.net/send/abc", &keys).unwrap();
        assert_eq!(headers.crypto_key, format!("p256ecdsa={}", keys.public_key));
    }

    #[test]
    fn test_bad_private_key_is_signing_error() {
        let mut keys = test_keys();
        keys.private_key = "AAAA".to_string(); // wrong length scalar
        let result = build_auth_header("https://push.example.net/send/abc", &keys);
        assert!(matches!(result, Err(PushError::Signing(_))));
    }

    #[test]
    fn test_keys_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vapid_keys.json");

        let keys = get_or_create_vapid_keys(&path, "mailto:admin@example.com").unwrap();
        let reloaded = get_or_create_vapid_keys(&path, "mailto:other@example.com").unwrap();

        // Second call loads, never regenerates.
        assert_eq!(reloaded.public_key, keys.public_key);
        assert_eq!(reloaded.private_key, keys.private_key);
        assert_eq!(reloaded.subject, "mailto:admin@example.com");
    }
}
