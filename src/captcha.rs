use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// Answers whether a client-supplied CAPTCHA token is valid.
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> bool;
}

/// reCAPTCHA `siteverify` client.
pub struct RecaptchaVerifier {
    client: reqwest::Client,
    secret: String,
    verify_url: String,
}

#[derive(Deserialize)]
struct SiteVerifyResponse {
    #[serde(default)]
    success: bool,
}

impl RecaptchaVerifier {
    pub fn new(
        secret: impl Into<String>,
        verify_url: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(client, secret, verify_url))
    }

    pub fn with_client(
        client: reqwest::Client,
        secret: impl Into<String>,
        verify_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            secret: secret.into(),
            verify_url: verify_url.into(),
        }
    }

    async fn site_verify(&self, token: &str) -> anyhow::Result<bool> {
        let body = self
            .client
            .post(&self.verify_url)
            .form(&[("secret", self.secret.as_str()), ("response", token)])
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let parsed: SiteVerifyResponse = serde_json::from_slice(&body)?;
        Ok(parsed.success)
    }
}

#[async_trait]
impl CaptchaVerifier for RecaptchaVerifier {
    async fn verify(&self, token: &str) -> bool {
        if token.is_empty() {
            debug!("empty captcha token");
            return false;
        }
        match self.site_verify(token).await {
            Ok(success) => success,
            Err(e) => {
                warn!("Captcha verification against {} failed: {}", self.verify_url, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}/siteverify")
    }

    fn verifier(url: String) -> RecaptchaVerifier {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        RecaptchaVerifier::with_client(client, "secret", url)
    }

    #[tokio::test]
    async fn verify_reads_success_flag() {
        let url = serve_once(r#"{"success": true, "hostname": "example.com"}"#).await;
        assert!(verifier(url).verify("token").await);
    }

    #[tokio::test]
    async fn verify_rejects_failed_response() {
        let url = serve_once(r#"{"success": false, "error-codes": ["invalid-input-response"]}"#).await;
        assert!(!verifier(url).verify("token").await);
    }

    #[test]
    fn new_builds_timeout_bounded_client() {
        let verifier = RecaptchaVerifier::new("secret", DEFAULT_VERIFY_URL);
        assert!(verifier.is_ok());
        assert_eq!(verifier.unwrap().verify_url, DEFAULT_VERIFY_URL);
    }

    #[tokio::test]
    async fn verify_rejects_empty_token_without_request() {
        let verifier = RecaptchaVerifier::new("secret", "http://127.0.0.1:1/unused")
            .expect("client builds");
        assert!(!verifier.verify("").await);
    }
}
