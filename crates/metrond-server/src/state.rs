use std::sync::Arc;

use metrond_crypto::Decryptor;

use crate::service::MetricsService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MetricsService>,
    /// HMAC key for request verification and response signing.
    pub sign_key: Option<Arc<String>>,
    /// Private-key half of the hybrid envelope.
    pub decryptor: Option<Arc<Decryptor>>,
}

impl AppState {
    pub fn new(
        service: Arc<MetricsService>,
        sign_key: Option<String>,
        decryptor: Option<Decryptor>,
    ) -> Self {
        Self {
            service,
            sign_key: sign_key.filter(|key| !key.is_empty()).map(Arc::new),
            decryptor: decryptor.map(Arc::new),
        }
    }
}
