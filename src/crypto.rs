use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::Engine;
use rand::distr::Alphanumeric;
use rand::Rng;
use sha1::{Digest, Sha1};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const RANDOM_PREFIX: usize = 16;
const LENGTH_FIELD: usize = 4;
const HEADER_LEN: usize = RANDOM_PREFIX + LENGTH_FIELD;
const MAX_PAD: usize = 32; // Counterparts pad to 32-byte blocks, we pad to 16

/// The platform's keys are 43 characters with the final `=` dropped, and their
/// last character does not always leave the unused bits zeroed.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true)
);

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("AES key must be {KEY_LEN} bytes, got {0}")]
    KeyLength(usize),

    #[error("Ciphertext is not a whole number of blocks")]
    Misaligned,

    #[error("Invalid padding")]
    Padding,

    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("Frame declares {declared} content bytes but only {available} are present")]
    FrameLength { declared: usize, available: usize }
}

/// SHA-1 over the lexicographically sorted concatenation of the parts.
pub fn signature(parts: &[&str]) -> String {
    let mut sorted = parts.to_vec();
    sorted.sort_unstable();
    hex::encode(Sha1::digest(sorted.concat().as_bytes()))
}

fn random_alphanumeric(len: usize) -> Vec<u8> {
    rand::rng().sample_iter(&Alphanumeric).take(len).collect()
}

/// Strip a PKCS#7 tail of up to `MAX_PAD` bytes.
fn unpad(plain: &mut Vec<u8>) -> Result<(), CryptoError> {
    let pad = *plain.last().ok_or(CryptoError::Padding)? as usize;
    if pad == 0 || pad > MAX_PAD || pad > plain.len() {
        return Err(CryptoError::Padding);
    }
    plain.truncate(plain.len() - pad);
    Ok(())
}

/// Signing and payload encryption for the chat platform's callback protocol.
///
/// The IV is the first 16 bytes of the key. The counterpart does the same, so
/// this is part of the wire format rather than something to harden.
pub struct WebhookCrypto {
    token: String,
    key: [u8; KEY_LEN]
}
impl WebhookCrypto {
    pub fn new(token: &str, encoding_aes_key: &str) -> Result<Self, CryptoError> {
        let decoded = KEY_ENGINE.decode(format!("{encoding_aes_key}="))?;
        let key: [u8; KEY_LEN] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::KeyLength(decoded.len()))?;

        Ok(Self {
            token: token.to_string(),
            key
        })
    }

    fn iv(&self) -> &[u8] {
        &self.key[..IV_LEN]
    }

    pub fn sign(&self, timestamp: &str, nonce: &str, payload: &str) -> String {
        signature(&[&self.token, timestamp, nonce, payload])
    }

    /// Plain string equality, the same check the platform performs.
    pub fn verify(&self, signature: &str, timestamp: &str, nonce: &str, payload: &str) -> bool {
        self.sign(timestamp, nonce, payload) == signature
    }

    /// Frame as `[16 random][u32 BE length][content][random tail]`, then
    /// AES-256-CBC with PKCS#7 and base64.
    pub fn encrypt(&self, content: &[u8]) -> String {
        let tail = rand::rng().random_range(1..=16);
        let mut frame = Vec::with_capacity(HEADER_LEN + content.len() + tail);
        frame.extend(random_alphanumeric(RANDOM_PREFIX));
        frame.extend((content.len() as u32).to_be_bytes());
        frame.extend_from_slice(content);
        frame.extend(random_alphanumeric(tail));

        let cipher = Aes256CbcEnc::new(&self.key.into(), self.iv().into());
        STANDARD.encode(cipher.encrypt_padded_vec_mut::<Pkcs7>(&frame))
    }

    /// Reverse of `encrypt`, returning only the framed content.
    pub fn decrypt(&self, payload: &str) -> Result<Vec<u8>, CryptoError> {
        let encrypted = STANDARD.decode(payload.trim())?;
        let cipher = Aes256CbcDec::new(&self.key.into(), self.iv().into());
        let mut plain = cipher
            .decrypt_padded_vec_mut::<NoPadding>(&encrypted)
            .map_err(|_| CryptoError::Misaligned)?;
        unpad(&mut plain)?;

        if plain.len() < HEADER_LEN {
            return Err(CryptoError::FrameTooShort(plain.len()));
        }
        let mut length = [0; LENGTH_FIELD];
        length.copy_from_slice(&plain[RANDOM_PREFIX..HEADER_LEN]);
        let declared = u32::from_be_bytes(length) as usize;

        let available = plain.len() - HEADER_LEN;
        if declared > available {
            return Err(CryptoError::FrameLength { declared, available });
        }
        Ok(plain[HEADER_LEN..HEADER_LEN + declared].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "wx-token";
    const AES_KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";

    /// Produced by an independent AES implementation: a 128 byte frame with
    /// an 18 byte PKCS#7 tail (32-byte block padding) and a "wx" trailer.
    const PLATFORM_CIPHERTEXT: &str = "Q3stYC6hdFzMh9T8HCvyDH5j99hqxZoKC4z+emJjDcEB0i/BaHr5lxUi7mkz2wLdkyBPDnRuDPAcJsyPvSAP5N2cQbRfWlJZbnbEZkJ1MFgiwGCViwkCGoWNujCwVWjrLBgyzKogcUOg2CDMN6Ee1Njrv7s+hXAqzw7Z4ipf1Lo=";
    const PLATFORM_CONTENT: &str = "<xml><MsgType><![CDATA[text]]></MsgType><Content><![CDATA[dial::10086]]></Content></xml>";

    fn crypto() -> WebhookCrypto {
        WebhookCrypto::new(TOKEN, AES_KEY).unwrap()
    }

    fn encrypt_raw(crypto: &WebhookCrypto, frame: &[u8]) -> String {
        let cipher = Aes256CbcEnc::new(&crypto.key.into(), crypto.iv().into());
        STANDARD.encode(cipher.encrypt_padded_vec_mut::<Pkcs7>(frame))
    }

    #[test]
    fn key_accepts_dirty_trailing_bits() {
        let crypto = crypto();
        assert_eq!(hex::encode(crypto.key), "69b71d79f8218a39259a7a29aabb2dbafc31cb3d35db7e39ebbf3d0010831051");
    }

    #[test]
    fn key_must_be_32_bytes() {
        assert!(matches!(WebhookCrypto::new(TOKEN, "c2hvcnQ"), Err(CryptoError::KeyLength(5))));
        assert!(matches!(WebhookCrypto::new(TOKEN, "not base64!"), Err(CryptoError::Base64(_))));
    }

    #[test]
    fn signature_matches_reference() {
        let crypto = crypto();
        let expected = "4eedbfbcdad474aed17347ded7b32f4446c5df9a";
        assert_eq!(crypto.sign("1700000000", "424242", "ZXhhbXBsZQ=="), expected);
        assert!(crypto.verify(expected, "1700000000", "424242", "ZXhhbXBsZQ=="));
    }

    #[test]
    fn signature_is_order_independent() {
        let sorted = hex::encode(Sha1::digest(b"1700000000424242ZXhhbXBsZQ==wx-token"));
        assert_eq!(signature(&["wx-token", "1700000000", "424242", "ZXhhbXBsZQ=="]), sorted);
        assert_eq!(signature(&["ZXhhbXBsZQ==", "424242", "wx-token", "1700000000"]), sorted);
    }

    #[test]
    fn changing_any_input_breaks_verification() {
        let crypto = crypto();
        let signature = crypto.sign("1700000000", "424242", "payload");
        assert!(crypto.verify(&signature, "1700000000", "424242", "payload"));
        assert!(!crypto.verify(&signature, "1700000001", "424242", "payload"));
        assert!(!crypto.verify(&signature, "1700000000", "424243", "payload"));
        assert!(!crypto.verify(&signature, "1700000000", "424242", "payload2"));

        let other = WebhookCrypto::new("other-token", AES_KEY).unwrap();
        assert!(!other.verify(&signature, "1700000000", "424242", "payload"));
    }

    #[test]
    fn empty_payload_is_signable() {
        let crypto = crypto();
        let signature = crypto.sign("1", "2", "");
        assert!(crypto.verify(&signature, "1", "2", ""));
    }

    #[test]
    fn decrypts_platform_payload() {
        let content = crypto().decrypt(PLATFORM_CIPHERTEXT).unwrap();
        assert_eq!(content, PLATFORM_CONTENT.as_bytes());
    }

    #[test]
    fn round_trips_short_content() {
        let crypto = crypto();
        let encrypted = crypto.encrypt(b"secret");
        assert_eq!(crypto.decrypt(&encrypted).unwrap(), b"secret");
    }

    #[test]
    fn round_trips_multi_block_content() {
        let crypto = crypto();
        let content = "多块内容 spanning several AES blocks ".repeat(8);
        let encrypted = crypto.encrypt(content.as_bytes());
        assert_eq!(crypto.decrypt(&encrypted).unwrap(), content.as_bytes());
    }

    #[test]
    fn round_trips_empty_content() {
        let crypto = crypto();
        assert_eq!(crypto.decrypt(&crypto.encrypt(b"")).unwrap(), b"");
    }

    #[test]
    fn encryption_is_randomised() {
        let crypto = crypto();
        assert_ne!(crypto.encrypt(b"same"), crypto.encrypt(b"same"));
    }

    #[test]
    fn rejects_misaligned_ciphertext() {
        let encrypted = STANDARD.encode([0u8; 20]);
        assert!(matches!(crypto().decrypt(&encrypted), Err(CryptoError::Misaligned)));
    }

    #[test]
    fn rejects_short_frames() {
        let crypto = crypto();
        let encrypted = encrypt_raw(&crypto, b"tiny");
        assert!(matches!(crypto.decrypt(&encrypted), Err(CryptoError::FrameTooShort(4))));
    }

    #[test]
    fn rejects_overlong_length_field() {
        let crypto = crypto();
        let mut frame = b"0123456789abcdef".to_vec();
        frame.extend(1000u32.to_be_bytes());
        frame.extend(b"short");
        let encrypted = encrypt_raw(&crypto, &frame);
        assert!(matches!(
            crypto.decrypt(&encrypted),
            Err(CryptoError::FrameLength { declared: 1000, available: 5 })
        ));
    }

    #[test]
    fn wrong_key_does_not_panic() {
        let encrypted = crypto().encrypt(b"hello");
        let other = WebhookCrypto::new(TOKEN, "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopq").unwrap();
        let _ = other.decrypt(&encrypted);
    }
}
