//! `aes128gcm` content encoding for Web Push (RFC 8188 framing, RFC 8291 keys).
//!
//! Every message is a single record:
//!
//! ```text
//! salt (16) | rs (4, big-endian) | idlen (1) | keyid = sender public key (65) | ciphertext + tag
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use hkdf::Hkdf;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::Rng;
use sha2::Sha256;

use super::CryptoError;

/// Record size advertised in the header; payloads must fit in one record
pub const RECORD_SIZE: u32 = 4096;

pub const SALT_LEN: usize = 16;

/// Uncompressed SEC1 P-256 point length
pub const PUBLIC_KEY_LEN: usize = 65;

pub const AUTH_SECRET_LEN: usize = 16;

pub const HEADER_LEN: usize = SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN;

const TAG_LEN: usize = 16;

/// Delimiter closing the final (and only) record
const LAST_RECORD_DELIMITER: u8 = 0x02;

const KEY_INFO_PREFIX: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";

/// Largest plaintext that still fits in one record
pub const MAX_PLAINTEXT_LEN: usize = RECORD_SIZE as usize - TAG_LEN - 1;

/// Encrypt `plaintext` for the user agent identified by `ua_public` (the
/// subscription's `p256dh`) and `auth_secret`, using a fresh ephemeral key
/// and salt.
pub fn encrypt(
    plaintext: &[u8],
    ua_public: &[u8],
    auth_secret: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill(&mut salt);
    let ephemeral = super::random_secret_key();
    encrypt_with(plaintext, ua_public, auth_secret, &salt, &ephemeral)
}

/// Deterministic form of [`encrypt`] with caller supplied salt and sender key.
pub fn encrypt_with(
    plaintext: &[u8],
    ua_public: &[u8],
    auth_secret: &[u8],
    salt: &[u8; SALT_LEN],
    as_secret: &SecretKey,
) -> Result<Vec<u8>, CryptoError> {
    if plaintext.len() > MAX_PLAINTEXT_LEN {
        return Err(CryptoError::PayloadTooLarge {
            size: plaintext.len(),
            limit: RECORD_SIZE as usize,
        });
    }

    let ua_key = parse_public_key(ua_public)?;
    check_auth_secret(auth_secret)?;

    let as_public = as_secret.public_key().to_encoded_point(false);
    let as_public = as_public.as_bytes();

    let shared = p256::ecdh::diffie_hellman(as_secret.to_nonzero_scalar(), ua_key.as_affine());
    let (cek, nonce) = derive_key_and_nonce(
        shared.raw_secret_bytes(),
        auth_secret,
        ua_public,
        as_public,
        salt,
    )?;

    let mut record = Vec::with_capacity(plaintext.len() + 1);
    record.extend_from_slice(plaintext);
    record.push(LAST_RECORD_DELIMITER);

    let cipher = Aes128Gcm::new_from_slice(&cek).map_err(|_| CryptoError::Cipher)?;
    let ciphertext = cipher
        .encrypt(&Nonce::from(nonce), record.as_slice())
        .map_err(|_| CryptoError::Cipher)?;

    let mut body = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    body.extend_from_slice(salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(as_public);
    body.extend_from_slice(&ciphertext);
    Ok(body)
}

/// Decrypt a single-record `aes128gcm` body as the user agent would.
pub fn decrypt(
    body: &[u8],
    ua_secret: &SecretKey,
    auth_secret: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if body.len() < HEADER_LEN + TAG_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "body of {} bytes is shorter than the header",
            body.len()
        )));
    }
    check_auth_secret(auth_secret)?;

    let (salt, rest) = body.split_at(SALT_LEN);
    let id_len = rest[4] as usize;
    if id_len != PUBLIC_KEY_LEN {
        return Err(CryptoError::invalid_key(
            "keyid",
            format!("expected {} bytes, found {}", PUBLIC_KEY_LEN, id_len),
        ));
    }
    let as_public = &rest[5..5 + PUBLIC_KEY_LEN];
    let ciphertext = &rest[5 + PUBLIC_KEY_LEN..];

    let as_key = parse_public_key(as_public)?;
    let ua_public = ua_secret.public_key().to_encoded_point(false);

    let shared = p256::ecdh::diffie_hellman(ua_secret.to_nonzero_scalar(), as_key.as_affine());
    let (cek, nonce) = derive_key_and_nonce(
        shared.raw_secret_bytes(),
        auth_secret,
        ua_public.as_bytes(),
        as_public,
        salt,
    )?;

    let cipher = Aes128Gcm::new_from_slice(&cek).map_err(|_| CryptoError::Cipher)?;
    let mut record = cipher
        .decrypt(&Nonce::from(nonce), ciphertext)
        .map_err(|_| CryptoError::Cipher)?;

    // Strip zero padding, then the delimiter
    while record.last() == Some(&0) {
        record.pop();
    }
    match record.pop() {
        Some(LAST_RECORD_DELIMITER) => Ok(record),
        _ => Err(CryptoError::KeyDerivation(
            "missing last-record delimiter".to_string(),
        )),
    }
}

/// Two-stage HKDF from RFC 8291 section 3.4.
///
/// Stage one mixes the ECDH secret with the auth secret over both public
/// keys; stage two keys the content encryption key and nonce off the salt.
fn derive_key_and_nonce(
    ecdh_secret: &[u8],
    auth_secret: &[u8],
    ua_public: &[u8],
    as_public: &[u8],
    salt: &[u8],
) -> Result<([u8; 16], [u8; 12]), CryptoError> {
    let mut key_info = Vec::with_capacity(KEY_INFO_PREFIX.len() + 2 * PUBLIC_KEY_LEN);
    key_info.extend_from_slice(KEY_INFO_PREFIX);
    key_info.extend_from_slice(ua_public);
    key_info.extend_from_slice(as_public);

    let mut ikm = [0u8; 32];
    Hkdf::<Sha256>::new(Some(auth_secret), ecdh_secret)
        .expand(&key_info, &mut ikm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let prk = Hkdf::<Sha256>::new(Some(salt), &ikm);

    let mut cek = [0u8; 16];
    prk.expand(CEK_INFO, &mut cek)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let mut nonce = [0u8; 12];
    prk.expand(NONCE_INFO, &mut nonce)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok((cek, nonce))
}

fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    if bytes.len() != PUBLIC_KEY_LEN || bytes[0] != 0x04 {
        return Err(CryptoError::invalid_key(
            "p256dh",
            format!(
                "expected a {}-byte uncompressed point, got {} bytes",
                PUBLIC_KEY_LEN,
                bytes.len()
            ),
        ));
    }
    PublicKey::from_sec1_bytes(bytes)
        .map_err(|_| CryptoError::invalid_key("p256dh", "point is not on the P-256 curve"))
}

fn check_auth_secret(auth_secret: &[u8]) -> Result<(), CryptoError> {
    if auth_secret.len() != AUTH_SECRET_LEN {
        return Err(CryptoError::invalid_key(
            "auth",
            format!(
                "expected {} bytes, got {}",
                AUTH_SECRET_LEN,
                auth_secret.len()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{b64url_decode, b64url_encode, random_secret_key};

    // RFC 8291 Appendix A
    const PLAINTEXT: &str = "When I grow up, I want to be a watermelon";
    const AS_PRIVATE: &str = "yfWPiYE-n46HLnH0KqZOF1fJJU3MYrct3AELtAQ-oRw";
    const AS_PUBLIC: &str =
        "BP4z9KsN6nGRTbVYI_c7VJSPQTBtkgcy27mlmlMoZIIgDll6e3vCYLocInmYWAmS6TlzAC8wEqKK6PBru3jl7A8";
    const UA_PRIVATE: &str = "q1dXpw3UpT5VOmu_cf_v6ih07Aems3njxI-JWgLcM94";
    const UA_PUBLIC: &str =
        "BCVxsr7N_eNgVRqvHtD0zTZsEc6-VV-JvLexhqUzORcxaOzi6-AYWXvTBHm4bjyPjs7Vd8pZGH6SRpkNtoIAiw4";
    const SALT: &str = "DGv6ra1nlYgDCS1FRnbzlw";
    const AUTH_SECRET: &str = "BTBZMqHH6r4Tts7J_aSIgg";
    const ECDH_SECRET: &str = "kyrL1jIIOHEzg3sM2ZWRHDRB62YACZhhSlknJ672kSs";
    const CEK: &str = "oIhVW04MRdy2XN9CiKLxTg";
    const NONCE: &str = "4h_95klXJ5E_qnoN";
    const ENCRYPTED: &str = "DGv6ra1nlYgDCS1FRnbzlwAAEABBBP4z9KsN6nGRTbVYI_c7VJSPQTBtkgcy27mlmlMoZIIgDll6e3vCYLocInmYWAmS6TlzAC8wEqKK6PBru3jl7A_yl95bQpu6cVPTpK4Mqgkf1CXztLVBSt2Ks3oZwbuwXPXLWyouBWLVWGNWQexSgSxsj_Qulcy4a-fN";

    fn d(value: &str) -> Vec<u8> {
        b64url_decode(value, "vector").unwrap()
    }

    fn secret(value: &str) -> SecretKey {
        SecretKey::from_slice(&d(value)).unwrap()
    }

    fn salt() -> [u8; SALT_LEN] {
        d(SALT).try_into().unwrap()
    }

    #[test]
    fn test_rfc8291_key_schedule() {
        let as_secret = secret(AS_PRIVATE);
        let ua_key = PublicKey::from_sec1_bytes(&d(UA_PUBLIC)).unwrap();
        let shared = p256::ecdh::diffie_hellman(as_secret.to_nonzero_scalar(), ua_key.as_affine());
        assert_eq!(b64url_encode(shared.raw_secret_bytes()), ECDH_SECRET);

        let (cek, nonce) = derive_key_and_nonce(
            shared.raw_secret_bytes(),
            &d(AUTH_SECRET),
            &d(UA_PUBLIC),
            &d(AS_PUBLIC),
            &salt(),
        )
        .unwrap();
        assert_eq!(b64url_encode(cek), CEK);
        assert_eq!(b64url_encode(nonce), NONCE);
    }

    #[test]
    fn test_rfc8291_encrypted_message() {
        let body = encrypt_with(
            PLAINTEXT.as_bytes(),
            &d(UA_PUBLIC),
            &d(AUTH_SECRET),
            &salt(),
            &secret(AS_PRIVATE),
        )
        .unwrap();
        assert_eq!(b64url_encode(&body), ENCRYPTED);
    }

    #[test]
    fn test_rfc8291_decrypts_as_user_agent() {
        let plaintext = decrypt(&d(ENCRYPTED), &secret(UA_PRIVATE), &d(AUTH_SECRET)).unwrap();
        assert_eq!(plaintext, PLAINTEXT.as_bytes());
    }

    #[test]
    fn test_header_layout() {
        let ua_secret = random_secret_key();
        let ua_public = ua_secret.public_key().to_encoded_point(false);
        let auth = [7u8; AUTH_SECRET_LEN];

        let body = encrypt(b"{\"title\":\"T\"}", ua_public.as_bytes(), &auth).unwrap();

        let rs = u32::from_be_bytes(body[16..20].try_into().unwrap());
        assert_eq!(rs, 4096);
        assert_eq!(body[20], 65);
        assert_eq!(body[21], 0x04);
        assert_eq!(body.len(), HEADER_LEN + 13 + 1 + TAG_LEN);
    }

    #[test]
    fn test_fresh_salt_and_key_per_message() {
        let ua_secret = random_secret_key();
        let ua_public = ua_secret.public_key().to_encoded_point(false);
        let auth = [1u8; AUTH_SECRET_LEN];

        let first = encrypt(b"same", ua_public.as_bytes(), &auth).unwrap();
        let second = encrypt(b"same", ua_public.as_bytes(), &auth).unwrap();
        assert_ne!(first[..SALT_LEN], second[..SALT_LEN]);
        assert_ne!(first[21..HEADER_LEN], second[21..HEADER_LEN]);

        assert_eq!(decrypt(&first, &ua_secret, &auth).unwrap(), b"same");
        assert_eq!(decrypt(&second, &ua_secret, &auth).unwrap(), b"same");
    }

    #[test]
    fn test_rejects_bad_client_key() {
        let err = encrypt(b"x", &[0x04; 10], &[0u8; AUTH_SECRET_LEN]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey { field: "p256dh", .. }));

        let mut off_curve = vec![0x04];
        off_curve.extend([0xab; 64]);
        assert!(encrypt(b"x", &off_curve, &[0u8; AUTH_SECRET_LEN]).is_err());
    }

    #[test]
    fn test_rejects_bad_auth_secret() {
        let ua_public = random_secret_key().public_key().to_encoded_point(false);
        let err = encrypt(b"x", ua_public.as_bytes(), &[0u8; 8]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey { field: "auth", .. }));
    }

    #[test]
    fn test_rejects_payload_over_one_record() {
        let ua_public = random_secret_key().public_key().to_encoded_point(false);
        let auth = [0u8; AUTH_SECRET_LEN];

        let largest = vec![b'a'; MAX_PLAINTEXT_LEN];
        assert!(encrypt(&largest, ua_public.as_bytes(), &auth).is_ok());

        let too_large = vec![b'a'; MAX_PLAINTEXT_LEN + 1];
        assert!(matches!(
            encrypt(&too_large, ua_public.as_bytes(), &auth),
            Err(CryptoError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_decrypt_with_wrong_secret_fails() {
        let ua_public = random_secret_key().public_key().to_encoded_point(false);
        let auth = [3u8; AUTH_SECRET_LEN];
        let body = encrypt(b"hello", ua_public.as_bytes(), &auth).unwrap();

        assert!(matches!(
            decrypt(&body, &random_secret_key(), &auth),
            Err(CryptoError::Cipher)
        ));
    }
}
