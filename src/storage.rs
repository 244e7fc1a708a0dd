//! Object-storage URL signing used by computed attributes (avatars, documents)

use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Turns a stored object key into a URL clients can fetch
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn sign(&self, key: &str, is_public: bool) -> CoreResult<String>;
}

/// Signs `key:expires` with HMAC-SHA256; public objects get a bare URL
///
/// ```
/// use asset_tracker::storage::{HmacUrlSigner, UrlSigner};
///
/// # tokio_test::block_on(async {
/// let signer = HmacUrlSigner::new("https://files.example.com", "secret", 300);
/// let logo = signer.sign("logos/acme.png", true).await.unwrap();
/// assert_eq!(logo, "https://files.example.com/logos/acme.png");
///
/// let invoice = signer.sign("invoices/7.pdf", false).await.unwrap();
/// assert!(invoice.contains("?expires="));
/// # });
/// ```
pub struct HmacUrlSigner {
    public_url: String,
    secret: String,
    ttl_secs: i64,
}

impl HmacUrlSigner {
    pub fn new(public_url: impl Into<String>, secret: impl Into<String>, ttl_secs: i64) -> Self {
        Self {
            public_url: public_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
            ttl_secs,
        }
    }

    fn signature(&self, key: &str, expires: i64) -> CoreResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| CoreError::Graph(anyhow::anyhow!("Invalid signing secret: {}", e)))?;
        mac.update(format!("{}:{}", key, expires).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl UrlSigner for HmacUrlSigner {
    async fn sign(&self, key: &str, is_public: bool) -> CoreResult<String> {
        let key = key.trim_start_matches('/');
        let url = format!("{}/{}", self.public_url, urlencoding::encode(key).replace("%2F", "/"));
        if is_public {
            return Ok(url);
        }
        let expires = chrono::Utc::now().timestamp() + self.ttl_secs;
        let signature = self.signature(key, expires)?;
        Ok(format!("{}?expires={}&signature={}", url, expires, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> HmacUrlSigner {
        HmacUrlSigner::new("https://files.example.com/", "signing-secret", 300)
    }

    fn query_value<'a>(url: &'a str, key: &str) -> &'a str {
        url.split_once('?')
            .unwrap()
            .1
            .split('&')
            .find_map(|pair| pair.strip_prefix(&format!("{}=", key)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_public_keys_are_unsigned() {
        let url = signer().sign("logos/acme.png", true).await.unwrap();
        assert_eq!(url, "https://files.example.com/logos/acme.png");
    }

    #[tokio::test]
    async fn test_private_keys_carry_a_key_bound_signature() {
        let s = signer();
        let url = s.sign("/avatars/e1 photo.png", false).await.unwrap();
        assert!(url.starts_with("https://files.example.com/avatars/e1%20photo.png?expires="));

        let expires: i64 = query_value(&url, "expires").parse().unwrap();
        assert!(expires > chrono::Utc::now().timestamp());
        let signature = query_value(&url, "signature");
        assert_eq!(signature, s.signature("avatars/e1 photo.png", expires).unwrap());
        assert_ne!(signature, s.signature("avatars/other.png", expires).unwrap());
        assert_ne!(
            signature,
            HmacUrlSigner::new("https://x", "other-secret", 300)
                .signature("avatars/e1 photo.png", expires)
                .unwrap()
        );
    }
}
