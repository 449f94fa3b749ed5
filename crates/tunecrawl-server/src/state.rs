use std::sync::Arc;

use tunecrawl_core::CrawlControl;
use tunecrawl_db::Database;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub crawler: Arc<dyn CrawlControl>,
    /// Catalog connection, checked by `/health`. `None` when songs are kept in memory.
    pub db: Option<Database>,
    /// Admin token protecting the crawler's write endpoints (None = endpoints disabled).
    pub admin_token: Option<String>,
}
