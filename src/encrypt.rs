//! RFC 8291 message encryption (`aes128gcm` content coding).
//!
//! Each call derives a one-time content-encryption key from a fresh
//! ephemeral P-256 key pair and a fresh 16-byte salt, so two encryptions of
//! the same plaintext for the same recipient never produce the same bytes.
//! The output is a single self-describing record:
//!
//! ```text
//! salt(16) || record_size(4, BE) || key_id_len(1) || ephemeral_public(65) || ciphertext
//! ```

use crate::codec::{b64url_decode, concat};
use crate::error::PushError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Nonce,
};
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::{rngs::OsRng, CryptoRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroize;

/// Record-size field value. This engine only emits single-record messages,
/// so the field is constant regardless of actual payload length.
const RECORD_SIZE: u32 = 4096;

/// Delimiter for the final (and only) record of a message.
const PAD_DELIMITER: u8 = 0x02;

/// Length of an uncompressed P-256 point (`0x04 || X || Y`).
const UNCOMPRESSED_POINT_LEN: usize = 65;

/// Required auth-secret length per RFC 8291.
const AUTH_SECRET_LEN: usize = 16;

/// Encrypt a plaintext for one recipient.
///
/// `client_public_key` and `auth_secret` are the base64url values from the
/// recipient's push subscription. Randomness comes from the OS CSPRNG.
pub fn encrypt(
    plaintext: &[u8],
    client_public_key: &str,
    auth_secret: &str,
) -> Result<Vec<u8>, PushError> {
    encrypt_with_rng(plaintext, client_public_key, auth_secret, &mut OsRng)
}

/// [`encrypt`] with caller-supplied randomness, for deterministic tests.
pub fn encrypt_with_rng<R: CryptoRng + RngCore>(
    plaintext: &[u8],
    client_public_key: &str,
    auth_secret: &str,
    rng: &mut R,
) -> Result<Vec<u8>, PushError> {
    let client_public = b64url_decode(client_public_key).map_err(|_| {
        PushError::MalformedKeyMaterial("client public key is not valid base64url".to_string())
    })?;
    if client_public.len() != UNCOMPRESSED_POINT_LEN {
        return Err(PushError::MalformedKeyMaterial(format!(
            "client public key must be {} bytes, got {}",
            UNCOMPRESSED_POINT_LEN,
            client_public.len()
        )));
    }
    let recipient_key = p256::PublicKey::from_sec1_bytes(&client_public).map_err(|_| {
        PushError::MalformedKeyMaterial("client public key is not a valid P-256 point".to_string())
    })?;

    let auth = b64url_decode(auth_secret).map_err(|_| {
        PushError::MalformedKeyMaterial("auth secret is not valid base64url".to_string())
    })?;
    if auth.len() != AUTH_SECRET_LEN {
        return Err(PushError::MalformedKeyMaterial(format!(
            "auth secret must be {} bytes, got {}",
            AUTH_SECRET_LEN,
            auth.len()
        )));
    }

    // Fresh ephemeral key pair and salt for this call only.
    let ephemeral = EphemeralSecret::random(rng);
    let ephemeral_public = ephemeral.public_key().to_encoded_point(false);
    let shared_secret = ephemeral.diffie_hellman(&recipient_key);

    let mut salt = [0u8; 16];
    rng.fill_bytes(&mut salt);

    let (mut cek, mut nonce) = derive_key_and_nonce(
        shared_secret.raw_secret_bytes().as_slice(),
        &auth,
        &client_public,
        ephemeral_public.as_bytes(),
        &salt,
    )?;

    // Final-record delimiter, then seal. No additional authenticated data;
    // the GCM tag rides at the end of the ciphertext.
    let mut padded = Vec::with_capacity(plaintext.len() + 1);
    padded.extend_from_slice(plaintext);
    padded.push(PAD_DELIMITER);

    let cipher = Aes128Gcm::new_from_slice(&cek)
        .map_err(|_| PushError::MalformedKeyMaterial("AES key init failed".to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), padded.as_slice())
        .map_err(|_| PushError::MalformedKeyMaterial("AES-GCM sealing failed".to_string()))?;

    cek.zeroize();
    nonce.zeroize();

    Ok(concat(&[
        &salt,
        &RECORD_SIZE.to_be_bytes(),
        &[UNCOMPRESSED_POINT_LEN as u8],
        ephemeral_public.as_bytes(),
        &ciphertext,
    ]))
}

/// Derive the 16-byte content-encryption key and 12-byte nonce.
///
/// Two HKDF-SHA256 stages per RFC 8291: extract/expand with the auth secret
/// and the `WebPush: info` label binding both public keys, then expand from
/// the salted IKM with distinct `aes128gcm`/`nonce` info strings so key and
/// nonce are independent.
fn derive_key_and_nonce(
    shared_secret: &[u8],
    auth_secret: &[u8],
    client_public: &[u8],
    ephemeral_public: &[u8],
    salt: &[u8; 16],
) -> Result<([u8; 16], [u8; 12]), PushError> {
    let key_info = concat(&[b"WebPush: info\0", client_public, ephemeral_public]);
    let mut ikm = [0u8; 32];
    Hkdf::<Sha256>::new(Some(auth_secret), shared_secret)
        .expand(&key_info, &mut ikm)
        .map_err(|_| PushError::MalformedKeyMaterial("HKDF ikm expand failed".to_string()))?;

    let hk = Hkdf::<Sha256>::new(Some(salt), &ikm);
    let mut cek = [0u8; 16];
    hk.expand(b"Content-Encoding: aes128gcm\0", &mut cek)
        .map_err(|_| PushError::MalformedKeyMaterial("HKDF cek expand failed".to_string()))?;
    let mut nonce = [0u8; 12];
    hk.expand(b"Content-Encoding: nonce\0", &mut nonce)
        .map_err(|_| PushError::MalformedKeyMaterial("HKDF nonce expand failed".to_string()))?;

    ikm.zeroize();
    Ok((cek, nonce))
}
