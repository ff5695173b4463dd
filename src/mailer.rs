use async_trait::async_trait;
use tracing::{debug, info};

/// Message-delivery sink. Delivery must complete before the calling
/// operation reports success; retries are the implementation's problem.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_message(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// SendGrid v3 `mail/send` delivery.
pub struct SendgridMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl SendgridMailer {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for SendgridMailer {
    async fn send_message(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": body }],
        });
        let response = self
            .client
            .post("https://api.sendgrid.com/v3/mail/send")
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("sendgrid returned {status}");
        }
        debug!(to = %to, "mail delivered");
        Ok(())
    }
}

/// Dev fallback used when no SendGrid key is configured: logs the message
/// instead of sending it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_message(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(to = %to, subject = %subject, body = %body, "mail (log only)");
        Ok(())
    }
}
