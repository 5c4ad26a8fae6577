use std::sync::Arc;

use tracing::error;

use fete_db::Database;
use fete_gateway::Dispatcher;
use fete_payments::PaymentGateway;

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub payments: Arc<dyn PaymentGateway>,
    /// Stripe endpoint secret; webhooks are refused while unset.
    pub webhook_secret: Option<String>,
}

/// Run blocking DB work off the async runtime.
pub async fn with_db<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&AppStateInner) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
}
