use crate::config::AppConfig;
use crate::db::{DbPool, OrmConn};

/// Shared handler state. Services use the ORM connection for entity work and
/// the raw pool for audit writes and reporting queries.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: AppConfig,
}
