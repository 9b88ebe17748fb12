use crate::{cache::CacheManager, channels::ChannelLayer, db::DbPool};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub cache: CacheManager,
    pub channels: ChannelLayer,
}

impl AppState {
    pub fn new(pool: DbPool, cache: CacheManager, channels: ChannelLayer) -> Self {
        Self {
            pool,
            cache,
            channels,
        }
    }
}
