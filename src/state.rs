use sqlx::SqlitePool;

use crate::config::DeliveryConfig;
use crate::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: DeliveryConfig,
    pub dispatcher: Dispatcher,
    pub operator_api_token: Option<String>,
}
