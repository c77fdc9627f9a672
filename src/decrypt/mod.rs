//! Segment decryption.
//!
//! Decrypts AES-128-CBC (PKCS#7) protected segments using the content key
//! looked up by key-ID from the session. Decryption happens inline in the
//! download worker; a failure never emits partially-decrypted bytes — the
//! segment (and with it the lecture) fails instead.

use aes::Aes128;
use bytes::Bytes;
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, KeyIvInit};
use thiserror::Error;
use tracing::{instrument, trace};

use crate::session::SessionContext;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Errors decrypting a segment. All fatal for the owning lecture; the
/// scheduler retries as a fresh fetch-and-decrypt attempt up to the ceiling.
#[derive(Debug, Error)]
pub enum DecryptError {
    /// The manifest declared a key-ID the session does not hold.
    #[error("content key '{key_id}' not found in session key map")]
    KeyNotFound {
        /// The missing key-ID.
        key_id: String,
    },

    /// Ciphertext length is not a whole number of cipher blocks.
    #[error("ciphertext length {len} is not a multiple of the AES block size")]
    MisalignedCiphertext {
        /// The offending length.
        len: usize,
    },

    /// Padding verification failed: wrong key, wrong IV, or corrupt data.
    #[error("decryption failed for key '{key_id}': bad padding (wrong key, wrong IV, or corrupt segment)")]
    BadPadding {
        /// The key-ID used for the failed attempt.
        key_id: String,
    },
}

/// Decrypts one segment's bytes with the session key for `key_id`.
///
/// # Errors
///
/// [`DecryptError::KeyNotFound`] when the key-ID is absent from the session
/// (checked before touching the ciphertext), and padding/alignment errors
/// for corrupt input. On any error no plaintext is returned at all.
#[instrument(level = "debug", skip(data, session), fields(key_id = %key_id, len = data.len()))]
pub fn decrypt_segment(
    data: Bytes,
    key_id: &str,
    iv: &[u8; 16],
    session: &SessionContext,
) -> Result<Bytes, DecryptError> {
    let key = session
        .content_key(key_id)
        .ok_or_else(|| DecryptError::KeyNotFound {
            key_id: key_id.to_string(),
        })?;

    if data.len() % 16 != 0 {
        return Err(DecryptError::MisalignedCiphertext { len: data.len() });
    }

    let mut buffer = data.to_vec();
    // new_from_slices cannot fail here: key and IV are fixed 16-byte arrays.
    let cipher = Aes128CbcDec::new(key.into(), iv.into());

    let plaintext_len = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut buffer)
        .map_err(|_| DecryptError::BadPadding {
            key_id: key_id.to_string(),
        })?
        .len();

    buffer.truncate(plaintext_len);
    trace!(plaintext_len, "segment decrypted");
    Ok(Bytes::from(buffer))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    //! Encryption helper for tests that need valid ciphertext.

    use cipher::block_padding::Pkcs7;
    use cipher::{BlockEncryptMut, KeyIvInit};

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    /// Encrypts plaintext with AES-128-CBC/PKCS#7 for round-trip tests.
    pub fn encrypt(plaintext: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
        let cipher = Aes128CbcEnc::new(key.into(), iv.into());
        let padded_len = (plaintext.len() / 16 + 1) * 16;
        let mut buffer = vec![0u8; padded_len];
        buffer[..plaintext.len()].copy_from_slice(plaintext);
        cipher
            .encrypt_padded_mut::<Pkcs7>(&mut buffer, plaintext.len())
            .unwrap()
            .to_vec()
    }
}
