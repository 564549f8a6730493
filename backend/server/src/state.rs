use std::{sync::Arc, time::Instant};

use payments::{Gateway, MercadoPago};

use super::{
    auth::Keys,
    config::Config,
    database::RedisStore,
    mail::{Mailer, SmtpMailer},
    store::Store,
};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub mailer: Arc<dyn Mailer>,
    pub gateway: Arc<dyn Gateway>,
    pub keys: Keys,
    pub started_at: Instant,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let store = RedisStore::connect(&config.redis_url).await?;
        let mailer = SmtpMailer::new(&config.mail)?;
        let gateway = MercadoPago::with_base_url(
            &config.mercado_pago.api_url,
            &config.mercado_pago.access_token,
        )?;

        Ok(Self::from_parts(
            config,
            Arc::new(store),
            Arc::new(mailer),
            Arc::new(gateway),
        ))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        gateway: Arc<dyn Gateway>,
    ) -> Arc<Self> {
        let keys = Keys::new(config.jwt_secret.as_bytes());

        Arc::new(Self {
            config,
            store,
            mailer,
            gateway,
            keys,
            started_at: Instant::now(),
        })
    }
}
