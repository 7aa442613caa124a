pub mod api;
pub mod assistant;
pub mod config;
pub mod db;

pub use db::DbPool;

use assistant::AssistantClient;
use config::Config;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub assistant: AssistantClient,
    /// Fixed synthetic user the assistant posts messages as.
    pub assistant_user_id: String,
}

impl AppState {
    pub fn new(
        config: Config,
        db: DbPool,
        assistant: AssistantClient,
        assistant_user_id: String,
    ) -> Self {
        Self {
            config,
            db,
            assistant,
            assistant_user_id,
        }
    }
}
