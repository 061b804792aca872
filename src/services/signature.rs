use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook body signature.
pub const SIGNATURE_HEADER: &str = "X-ImgGo-Signature";

const SCHEME_PREFIX: &str = "sha256=";

/// HMAC-SHA256 signer/verifier for webhook deliveries.
#[derive(Clone)]
pub struct WebhookSigner {
    keyed: HmacSha256,
}

impl WebhookSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, SignatureError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(SignatureError::EmptySecret);
        }
        let keyed = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::EmptySecret)?;
        Ok(Self { keyed })
    }

    fn mac(&self) -> HmacSha256 {
        self.keyed.clone()
    }

    /// Signature header value for `body`, e.g. `sha256=3f2a…`.
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(body);
        format!("{}{}", SCHEME_PREFIX, hex::encode(mac.finalize().into_bytes()))
    }

    /// Check a signature header against `body` in constant time.
    pub fn verify(&self, body: &[u8], header: &str) -> Result<(), SignatureError> {
        let encoded = header
            .trim()
            .strip_prefix(SCHEME_PREFIX)
            .ok_or(SignatureError::Malformed)?;
        let expected = hex::decode(encoded).map_err(|_| SignatureError::Malformed)?;

        let mut mac = self.mac();
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }
}

impl std::fmt::Debug for WebhookSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSigner").finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Webhook secret must not be empty")]
    EmptySecret,

    #[error("Signature header is not of the form sha256=<hex>")]
    Malformed,

    #[error("Signature does not match body")]
    Mismatch,
}
