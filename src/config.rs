use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub reset_secret: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub reset_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub sendgrid_api_key: Option<String>,
    pub from_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub auth: AuthConfig,
    pub mail: MailConfig,
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let auth = AuthConfig {
            access_secret: std::env::var("ACCESS_TOKEN_SECRET")?,
            refresh_secret: std::env::var("REFRESH_TOKEN_SECRET")?,
            reset_secret: std::env::var("RESET_TOKEN_SECRET")?,
            access_ttl_secs: env_u64("ACCESS_TOKEN_TTL_SECS", 60 * 60),
            refresh_ttl_secs: env_u64("REFRESH_TOKEN_TTL_SECS", 60 * 60 * 24 * 365),
            reset_ttl_secs: env_u64("RESET_TOKEN_TTL_SECS", 60 * 10),
        };

        // A leaked secret for one token kind must never validate another.
        if auth.access_secret == auth.refresh_secret
            || auth.access_secret == auth.reset_secret
            || auth.refresh_secret == auth.reset_secret
        {
            anyhow::bail!("token signing secrets must be pairwise distinct");
        }

        let mail = MailConfig {
            sendgrid_api_key: std::env::var("SENDGRID_API_KEY").ok(),
            from_address: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@authgate.local".into()),
        };

        Ok(Self {
            database_url,
            auth,
            mail,
        })
    }
}
