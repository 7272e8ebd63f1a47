//! Keyed signatures over a link's raw representation.
//!
//! HMAC-SHA256, hex encoded. Verification fails closed: an unsigned link is
//! never valid, and digests are compared in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::link::CxLink;

type HmacSha256 = Hmac<Sha256>;

/// Default environment variable holding the signing secret.
pub const DEFAULT_SECRET_ENV: &str = "CX_SECRET";

/// Errors from constructing a validator.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// No secret was configured.
    #[error("signing secret {var} is not set")]
    MissingSecret {
        /// Environment variable that was consulted.
        var: String,
    },

    /// The secret was present but empty.
    #[error("signing secret must not be empty")]
    EmptySecret,

    /// The MAC rejected the key.
    #[error("signing secret rejected by HMAC")]
    InvalidKey,
}

/// Computes and verifies link signatures under one secret.
///
/// Holds the keyed MAC state; each signature starts from a clone of it.
#[derive(Clone)]
pub struct SignatureValidator {
    keyed: HmacSha256,
}

impl std::fmt::Debug for SignatureValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureValidator")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl SignatureValidator {
    /// Create a validator from an explicit secret.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::EmptySecret`] for an empty secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, SignatureError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(SignatureError::EmptySecret);
        }
        Ok(Self {
            keyed: HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?,
        })
    }

    /// Create a validator from the secret in environment variable `var`.
    ///
    /// There is no built-in fallback secret.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::MissingSecret`] when the variable is unset
    /// and [`SignatureError::EmptySecret`] when it is blank.
    pub fn from_env(var: &str) -> Result<Self, SignatureError> {
        let secret = std::env::var(var).map_err(|_| SignatureError::MissingSecret {
            var: var.to_owned(),
        })?;
        if secret.trim().is_empty() {
            return Err(SignatureError::EmptySecret);
        }
        Self::new(secret)
    }

    /// Hex digest of `raw` under this validator's secret.
    pub fn sign(&self, raw: &str) -> String {
        let mut mac = self.keyed.clone();
        mac.update(raw.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Sign `link.raw` in place.
    pub fn sign_link(&self, link: &mut CxLink) {
        link.signature = Some(self.sign(&link.raw));
    }

    /// Whether the link carries a valid signature over its raw field.
    pub fn verify(&self, link: &CxLink) -> bool {
        let Some(signature) = link.signature.as_deref() else {
            debug!(link = %link.target(), "no signature present");
            return false;
        };
        let expected = self.sign(&link.raw);
        constant_time_eq(expected.as_bytes(), signature.as_bytes())
    }
}

/// Constant-time byte comparison, also constant in the length check.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let max_len = a.len().max(b.len());
    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];
    a_padded[..a.len()].copy_from_slice(a);
    b_padded[..b.len()].copy_from_slice(b);

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);
    (lengths_equal & contents_equal).into()
}
