use crate::core::errors::ExchangeError;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signer for authenticated requests.
///
/// The signature covers the byte-exact query string as it will be
/// transmitted; callers are responsible for serializing parameters in a
/// stable order before signing.
pub trait QuerySigner: Send + Sync {
    /// Compute the signature for the given canonical query string.
    fn sign(&self, payload: &str) -> Result<String, ExchangeError>;

    /// API key to send in the `X-MBX-APIKEY` header.
    fn api_key(&self) -> &str;
}

/// HMAC-SHA256 signer producing lowercase hexadecimal signatures.
pub struct HmacSigner {
    api_key: String,
    secret_key: Secret<String>,
}

impl HmacSigner {
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key: Secret::new(secret_key),
        }
    }
}

impl QuerySigner for HmacSigner {
    fn sign(&self, payload: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.expose_secret().as_bytes())
            .map_err(|e| ExchangeError::AuthError(format!("Invalid secret key: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn api_key(&self) -> &str {
        &self.api_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference vector from the provider's API documentation.
    const SECRET: &str = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
    const QUERY: &str = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
    const EXPECTED: &str = "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71";

    #[test]
    fn matches_reference_signature() {
        let signer = HmacSigner::new("key".to_string(), SECRET.to_string());
        assert_eq!(signer.sign(QUERY).unwrap(), EXPECTED);
    }

    #[test]
    fn signing_is_deterministic() {
        let signer = HmacSigner::new("key".to_string(), SECRET.to_string());
        assert_eq!(signer.sign(QUERY).unwrap(), signer.sign(QUERY).unwrap());
    }

    #[test]
    fn reordered_parameters_change_the_signature() {
        let signer = HmacSigner::new("key".to_string(), SECRET.to_string());
        let reordered = "side=BUY&symbol=LTCBTC&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_ne!(signer.sign(reordered).unwrap(), EXPECTED);
    }

    #[test]
    fn output_is_lowercase_hex() {
        let signer = HmacSigner::new("key".to_string(), "secret".to_string());
        let signature = signer.sign("a=1").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
