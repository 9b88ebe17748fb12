use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClearCacheRequest {
    pub groups: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CacheClearResult {
    pub cleared_groups: Vec<String>,
    pub keys_deleted: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CacheFlushResult {
    pub keys_deleted: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CacheWarmResult {
    pub warmed: Vec<String>,
}
