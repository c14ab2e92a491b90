//! Twilio WhatsApp delivery

use super::{DeliveryError, DeliveryReceipt, MessagingProvider};
use crate::config::MessagingConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Twilio Messages API client for the WhatsApp channel
pub struct TwilioWhatsApp {
    client: Client,
    account_sid: String,
    auth_token: String,
    url: String,
}

impl TwilioWhatsApp {
    pub fn new(config: &MessagingConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;

        Ok(Self {
            client,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            url: format!(
                "{}/2010-04-01/Accounts/{}/Messages.json",
                config.base_url.trim_end_matches('/'),
                config.account_sid
            ),
        })
    }
}

/// Twilio addresses WhatsApp numbers as `whatsapp:+E164`
fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{number}")
    }
}

#[async_trait]
impl MessagingProvider for TwilioWhatsApp {
    async fn send(
        &self,
        recipient: &str,
        sender: &str,
        text: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let to = whatsapp_address(recipient);
        let from = whatsapp_address(sender);

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to.as_str()), ("From", from.as_str()), ("Body", text)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::timeout(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    DeliveryError::network(format!("Connection failed: {e}"))
                } else {
                    DeliveryError::network(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::timeout(format!("Timed out reading response: {e}"))
            } else {
                DeliveryError::network(format!("Failed to read response: {e}"))
            }
        })?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<TwilioErrorResponse>(&body) {
                Ok(err) => DeliveryError::from_status(status.as_u16(), &err.message)
                    .with_provider_code(err.code),
                Err(_) => {
                    tracing::warn!(status = status.as_u16(), body = %body, "Unparseable error response");
                    DeliveryError::from_status(
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("unknown error"),
                    )
                }
            });
        }

        let message: TwilioMessageResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(error = %e, body = %body, "Unparseable provider response");
            DeliveryError::malformed(format!("Failed to parse response: {e}"))
        })?;

        Ok(DeliveryReceipt {
            provider_id: message.sid,
            status: message.status.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TwilioMessageResponse {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorResponse {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::error::DeliveryErrorKind;
    use crate::relay::testing::spawn_stub_server;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn config(base_url: &str) -> MessagingConfig {
        MessagingConfig {
            account_sid: "AC123".to_string(),
            auth_token: "token".to_string(),
            whatsapp_number: "+14155238886".to_string(),
            base_url: base_url.to_string(),
        }
    }

    type Captured = Arc<Mutex<Option<(String, HeaderMap, HashMap<String, String>)>>>;

    #[tokio::test]
    async fn test_send_posts_whatsapp_form() {
        let seen: Captured = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let app = Router::new().route(
            "/2010-04-01/Accounts/:sid/Messages.json",
            post(
                move |Path(sid): Path<String>,
                      headers: HeaderMap,
                      Form(form): Form<HashMap<String, String>>| {
                    let captured = captured.clone();
                    async move {
                        *captured.lock().unwrap() = Some((sid, headers, form));
                        (
                            StatusCode::CREATED,
                            Json(json!({ "sid": "SM42", "status": "queued" })),
                        )
                    }
                },
            ),
        );
        let base = spawn_stub_server(app).await;

        let client = TwilioWhatsApp::new(&config(&base), Duration::from_secs(5)).unwrap();
        let receipt = client
            .send("+1000", "+14155238886", "hello")
            .await
            .unwrap();
        assert_eq!(receipt.provider_id, "SM42");
        assert_eq!(receipt.status, "queued");

        let (sid, headers, form) = seen.lock().unwrap().take().unwrap();
        assert_eq!(sid, "AC123");
        assert_eq!(headers["authorization"], "Basic QUMxMjM6dG9rZW4=");
        assert_eq!(form["To"], "whatsapp:+1000");
        assert_eq!(form["From"], "whatsapp:+14155238886");
        assert_eq!(form["Body"], "hello");
    }

    #[tokio::test]
    async fn test_provider_rejection_keeps_code() {
        let app = Router::new().route(
            "/2010-04-01/Accounts/:sid/Messages.json",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "code": 63007,
                        "message": "Twilio could not find a Channel with the specified From address",
                        "status": 400
                    })),
                )
            }),
        );
        let base = spawn_stub_server(app).await;

        let err = TwilioWhatsApp::new(&config(&base), Duration::from_secs(5))
            .unwrap()
            .send("+1000", "+14155238886", "hello")
            .await
            .unwrap_err();
        assert_eq!(err.kind, DeliveryErrorKind::Rejected);
        assert_eq!(err.provider_code, Some(63007));
        assert!(err.message.contains("Channel"));
    }

    #[tokio::test]
    async fn test_auth_failure() {
        let app = Router::new().route(
            "/2010-04-01/Accounts/:sid/Messages.json",
            post(|| async { (StatusCode::UNAUTHORIZED, "Authenticate") }),
        );
        let base = spawn_stub_server(app).await;

        let err = TwilioWhatsApp::new(&config(&base), Duration::from_secs(5))
            .unwrap()
            .send("+1000", "+14155238886", "hello")
            .await
            .unwrap_err();
        assert_eq!(err.kind, DeliveryErrorKind::Auth);
        assert_eq!(err.provider_code, None);
        assert_eq!(err.message, "Authentication failed: Unauthorized");
    }

    #[tokio::test]
    async fn test_unparseable_success_body_is_malformed() {
        let app = Router::new().route(
            "/2010-04-01/Accounts/:sid/Messages.json",
            post(|| async { (StatusCode::CREATED, "<html>AC123 token dump</html>") }),
        );
        let base = spawn_stub_server(app).await;

        let err = TwilioWhatsApp::new(&config(&base), Duration::from_secs(5))
            .unwrap()
            .send("+1000", "+14155238886", "hello")
            .await
            .unwrap_err();
        assert_eq!(err.kind, DeliveryErrorKind::MalformedResponse);
        assert!(!err.message.contains("token dump"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let app = Router::new().route(
            "/2010-04-01/Accounts/:sid/Messages.json",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "sid": "SM1", "status": "queued" }))
            }),
        );
        let base = spawn_stub_server(app).await;

        let err = TwilioWhatsApp::new(&config(&base), Duration::from_millis(200))
            .unwrap()
            .send("+1000", "+14155238886", "hello")
            .await
            .unwrap_err();
        assert_eq!(err.kind, DeliveryErrorKind::Timeout);
    }

    #[test]
    fn test_whatsapp_address() {
        assert_eq!(whatsapp_address("+1000"), "whatsapp:+1000");
        assert_eq!(whatsapp_address("whatsapp:+1000"), "whatsapp:+1000");
    }
}
