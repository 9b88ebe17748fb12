use axum::extract::State;
use storefront_api::{
    cache::CacheManager, channels::ChannelLayer, routes::health::health_check, state::AppState,
};

#[tokio::test]
async fn health_check_returns_ok() {
    // The handler never touches the pool, so a lazy connection is enough.
    let state = AppState::new(
        sqlx::PgPool::connect_lazy("postgres://localhost/unused").unwrap(),
        CacheManager::disabled(),
        ChannelLayer::default(),
    );

    let response = health_check(State(state)).await;
    assert_eq!(response.0.message, "Health check");

    let data = response.0.data.expect("health data");
    let raw = serde_json::to_value(&data).unwrap();
    assert_eq!(raw["status"], "ok");
    assert_eq!(raw["cache"], "disabled");
}
