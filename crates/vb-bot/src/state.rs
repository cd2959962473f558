use std::sync::Arc;

use crate::auth::SignatureVerifier;
use crate::config::AppConfig;
use crate::lifecycle::LifecycleManager;
use crate::notify::Notifier;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleManager>,
    pub notifier: Arc<dyn Notifier>,
    pub verifier: SignatureVerifier,
    pub config: AppConfig,
}
