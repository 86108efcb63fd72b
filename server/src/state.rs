use std::sync::Arc;
use std::time::Duration;

use crate::rooms::RoomRegistry;

pub const DEFAULT_HISTORY_LIMIT: usize = 1000;
pub const MAX_POINTS_PER_STROKE: usize = 5000;
pub const MAX_ID_LEN: usize = 64;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub history_limit: usize,
    /// Strokes older than this are evicted periodically. `None` keeps them
    /// for the lifetime of the room.
    pub max_stroke_age: Option<Duration>,
    pub eviction_interval: Duration,
    /// Minimum spacing between two cursor broadcasts of one participant.
    pub cursor_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_stroke_age: None,
            eviction_interval: Duration::from_secs(60),
            cursor_interval: Duration::from_millis(16),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            registry: Arc::new(RoomRegistry::new(config.history_limit)),
            config: Arc::new(config),
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
