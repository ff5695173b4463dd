use std::sync::Arc;

use sqlx::PgPool;
use tracing::warn;

use crate::{
    auth::store::{PgUserStore, UserStore},
    config::AppConfig,
    mailer::{LogMailer, Mailer, SendgridMailer},
};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;

        let store = Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>;

        let mailer: Arc<dyn Mailer> = match config.mail.sendgrid_api_key.clone() {
            Some(api_key) => Arc::new(SendgridMailer::new(
                api_key,
                config.mail.from_address.clone(),
            )),
            None => {
                warn!("SENDGRID_API_KEY not set; reset codes will only be logged");
                Arc::new(LogMailer)
            }
        };

        Ok(Self {
            db,
            config,
            store,
            mailer,
        })
    }

    pub fn from_parts(
        db: PgPool,
        config: Arc<AppConfig>,
        store: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            db,
            config,
            store,
            mailer,
        }
    }
}
