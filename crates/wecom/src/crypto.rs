//! Signing and AES-CBC envelope for the platform callback protocol.
//!
//! Every callback payload travels as `base64(AES-256-CBC(frame))` plus a
//! SHA-1 signature over the sorted tuple (token, timestamp, nonce,
//! ciphertext). The decrypted frame is
//! `[16-byte random][u32 BE payload length][payload][corp id]`.

use {
    aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding},
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    rand::{RngCore, rngs::OsRng},
    sha1::{Digest, Sha1},
};

use crate::message::{EncryptedRequest, EncryptedResponse, Message};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// The platform pads plaintext frames to 32-byte blocks.
const PAD_BLOCK: usize = 32;
/// Random prefix length inside the plaintext frame.
const PREFIX_LEN: usize = 16;

/// Envelope failures.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The configured encoding AES key does not decode to 32 bytes.
    #[error("bad encoding aes key: {0}")]
    BadKey(String),
    /// Computed signature does not match the one supplied.
    #[error("signature mismatch")]
    BadSignature,
    /// Decrypted frame carries invalid PKCS#7 padding.
    #[error("bad padding")]
    BadPadding,
    /// The corp id at the end of the frame is not ours.
    #[error("corp id mismatch")]
    BadCorpId,
    /// Base64, framing, UTF-8 or JSON decoding failed.
    #[error("bad encoding: {0}")]
    BadEncoding(String),
}

/// Immutable crypto context: token, 32-byte AES key, corp id.
///
/// Safe to share across tasks; clone freely or wrap in an `Arc`.
#[derive(Clone)]
pub struct Crypt {
    token: String,
    key: [u8; 32],
    iv: [u8; 16],
    corp_id: String,
}

impl std::fmt::Debug for Crypt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crypt")
            .field("token", &"[REDACTED]")
            .field("key", &"[REDACTED]")
            .field("corp_id", &self.corp_id)
            .finish()
    }
}

impl Crypt {
    /// Build a context from the console-issued credentials. The AES key is
    /// the usual 43-character unpadded base64 of 32 raw bytes; padded input
    /// is accepted too.
    pub fn new(
        token: impl Into<String>,
        encoding_aes_key: &str,
        corp_id: impl Into<String>,
    ) -> Result<Self, CryptoError> {
        let mut padded = encoding_aes_key.trim_end_matches('=').to_string();
        while padded.len() % 4 != 0 {
            padded.push('=');
        }
        let key_bytes = BASE64
            .decode(&padded)
            .map_err(|e| CryptoError::BadKey(e.to_string()))?;
        let key: [u8; 32] = key_bytes
            .try_into()
            .map_err(|v: Vec<u8>| CryptoError::BadKey(format!("{} bytes, want 32", v.len())))?;
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&key[..16]);

        Ok(Self {
            token: token.into(),
            key,
            iv,
            corp_id: corp_id.into(),
        })
    }

    /// Echo verification for the callback URL (GET path).
    ///
    /// `echostr` must already be URL-decoded; the ciphertext regularly
    /// contains `+`, which naive query parsing turns into a space.
    pub fn verify_url(
        &self,
        signature: &str,
        timestamp: &str,
        nonce: &str,
        echostr: &str,
    ) -> Result<String, CryptoError> {
        if self.signature(timestamp, nonce, echostr) != signature {
            return Err(CryptoError::BadSignature);
        }
        let plain = self.decrypt(echostr)?;
        String::from_utf8(plain).map_err(|e| CryptoError::BadEncoding(e.to_string()))
    }

    /// Verify and decrypt an inbound POST callback body.
    pub fn decrypt_message(
        &self,
        signature: &str,
        timestamp: &str,
        nonce: &str,
        req: &EncryptedRequest,
    ) -> Result<Message, CryptoError> {
        if self.signature(timestamp, nonce, &req.encrypt) != signature {
            return Err(CryptoError::BadSignature);
        }
        let plain = self.decrypt(&req.encrypt)?;
        Message::parse(&plain).map_err(|e| CryptoError::BadEncoding(e.to_string()))
    }

    /// Serialize, encrypt, and sign a reply object.
    pub fn encrypt_response(
        &self,
        reply: &serde_json::Value,
        timestamp: &str,
        nonce: &str,
    ) -> Result<EncryptedResponse, CryptoError> {
        let plain = serde_json::to_vec(reply).map_err(|e| CryptoError::BadEncoding(e.to_string()))?;
        let encrypt = self.encrypt(&plain);
        let msgsignature = self.signature(timestamp, nonce, &encrypt);
        Ok(EncryptedResponse {
            encrypt,
            msgsignature,
            timestamp: timestamp.to_string(),
            nonce: nonce.to_string(),
        })
    }

    /// Compute the callback signature over the sorted argument tuple.
    pub fn signature(&self, timestamp: &str, nonce: &str, ciphertext: &str) -> String {
        let mut parts = [self.token.as_str(), timestamp, nonce, ciphertext];
        parts.sort_unstable();
        let mut hasher = Sha1::new();
        for part in parts {
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Frame, pad, and encrypt a plaintext payload to base64 ciphertext.
    pub(crate) fn encrypt(&self, payload: &[u8]) -> String {
        let mut frame = Vec::with_capacity(PREFIX_LEN + 4 + payload.len() + self.corp_id.len());
        let mut prefix = [0u8; PREFIX_LEN];
        OsRng.fill_bytes(&mut prefix);
        frame.extend_from_slice(&prefix);
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(payload);
        frame.extend_from_slice(self.corp_id.as_bytes());

        let pad = PAD_BLOCK - (frame.len() % PAD_BLOCK);
        frame.resize(frame.len() + pad, pad as u8);

        let cipher = Aes256CbcEnc::new((&self.key).into(), (&self.iv).into());
        let ciphertext = cipher.encrypt_padded_vec_mut::<NoPadding>(&frame);
        BASE64.encode(ciphertext)
    }

    /// Decrypt base64 ciphertext, strip padding, validate the frame, and
    /// return the payload bytes.
    pub(crate) fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, CryptoError> {
        let data = BASE64
            .decode(ciphertext)
            .map_err(|e| CryptoError::BadEncoding(e.to_string()))?;
        if data.is_empty() || data.len() % 16 != 0 {
            return Err(CryptoError::BadEncoding(format!(
                "ciphertext length {} not a block multiple",
                data.len()
            )));
        }

        let cipher = Aes256CbcDec::new((&self.key).into(), (&self.iv).into());
        let mut frame = cipher
            .decrypt_padded_vec_mut::<NoPadding>(&data)
            .map_err(|e| CryptoError::BadEncoding(e.to_string()))?;

        // Peers pad to either 16- or 32-byte blocks; accept both.
        let pad = *frame.last().ok_or(CryptoError::BadPadding)? as usize;
        if pad == 0 || pad > PAD_BLOCK || pad >= frame.len() {
            return Err(CryptoError::BadPadding);
        }
        frame.truncate(frame.len() - pad);

        if frame.len() < PREFIX_LEN + 4 {
            return Err(CryptoError::BadEncoding("frame too short".into()));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&frame[PREFIX_LEN..PREFIX_LEN + 4]);
        let payload_len = u32::from_be_bytes(len_bytes) as usize;
        let payload_end = PREFIX_LEN + 4 + payload_len;
        if payload_end > frame.len() {
            return Err(CryptoError::BadEncoding("payload length out of range".into()));
        }

        if frame[payload_end..] != *self.corp_id.as_bytes() {
            return Err(CryptoError::BadCorpId);
        }

        Ok(frame[PREFIX_LEN + 4..payload_end].to_vec())
    }
}
