use std::collections::BTreeMap;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::CookieValue;
use crate::config::Protection;
use crate::crypto::{CryptoError, Encrypter};

type HmacSha256 = Hmac<Sha256>;

/// Length of the hex-encoded HMAC-SHA256 suffix appended to signed values.
pub const MAC_LENGTH: usize = 64;

/// Encodes and decodes cookie values under one [`Protection`] method.
///
/// Decoding untrusted input never fails loudly: a value that does not
/// authenticate comes back as `None` and the caller treats the cookie as
/// absent.
#[derive(Clone)]
pub struct CookieCodec {
    method: Protection,
    encrypter: Arc<dyn Encrypter>,
}

impl CookieCodec {
    pub fn new(method: Protection, encrypter: Arc<dyn Encrypter>) -> Self {
        Self { method, encrypter }
    }

    pub fn method(&self) -> Protection {
        self.method
    }

    pub fn encode(&self, value: &CookieValue) -> Result<CookieValue, CryptoError> {
        match value {
            CookieValue::Scalar(value) => self.encode_str(value).map(CookieValue::Scalar),
            CookieValue::Nested(map) => map
                .iter()
                .map(|(key, value)| Ok((key.clone(), self.encode(value)?)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(CookieValue::Nested),
        }
    }

    /// Nested entries that fail to decode are dropped from the result.
    pub fn decode(&self, value: &CookieValue) -> Option<CookieValue> {
        match value {
            CookieValue::Scalar(value) => self.decode_str(value).map(CookieValue::Scalar),
            CookieValue::Nested(map) => Some(CookieValue::Nested(
                map.iter()
                    .filter_map(|(key, value)| Some((key.clone(), self.decode(value)?)))
                    .collect(),
            )),
        }
    }

    pub fn encode_str(&self, value: &str) -> Result<String, CryptoError> {
        match self.method {
            Protection::Unprotected => Ok(value.to_owned()),
            Protection::Encrypt => self.encrypter.encrypt(value.as_bytes()),
            Protection::Hmac => {
                let mut signed = value.to_owned();
                signed.push_str(&self.sign(value)?);
                Ok(signed)
            }
        }
    }

    pub fn decode_str(&self, value: &str) -> Option<String> {
        match self.method {
            Protection::Unprotected => Some(value.to_owned()),
            Protection::Encrypt => {
                let plaintext = self.encrypter.decrypt(value).ok()?;
                String::from_utf8(plaintext).ok()
            }
            Protection::Hmac => {
                let split = value.len().checked_sub(MAC_LENGTH)?;
                if !value.is_char_boundary(split) {
                    return None;
                }
                let (payload, mac) = value.split_at(split);
                let expected = self.sign(payload).ok()?;
                bool::from(expected.as_bytes().ct_eq(mac.as_bytes())).then(|| payload.to_owned())
            }
        }
    }

    fn sign(&self, value: &str) -> Result<String, CryptoError> {
        let mut mac = HmacSha256::new_from_slice(self.encrypter.key())
            .map_err(|_| CryptoError::InvalidKey)?;
        mac.update(value.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}
