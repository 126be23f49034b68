use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch},
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use cache::ResponseCache;
use config::Config;
use limiter::{ChannelRateLimiter, RateLimitConfig, RateLimiter};
use middleware::{RateLimitPolicy, RateLimitTier, auth_middleware, log_errors, rate_limit};
use routes::chat::ChatMessage;
use store::StudyStore;

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod middleware;
pub mod routes;
pub mod store;
pub mod utils;

/// 聊天广播通道容量
const CHAT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn StudyStore>,
    pub cache: Arc<ResponseCache>,
    pub global_limit: Arc<RateLimitPolicy>,
    pub api_limit: Arc<RateLimitPolicy>,
    pub notices_limit: Arc<RateLimitPolicy>,
    pub message_limit: Arc<RateLimitPolicy>,
    pub chat_limiter: Arc<ChannelRateLimiter>,
    pub chat_tx: broadcast::Sender<ChatMessage>,
}

impl AppState {
    /// 组装应用状态，缓存和限流器都归这里所有
    pub fn new(config: Config, store: Arc<dyn StudyStore>) -> Self {
        let idle = config.bucket_idle();
        let build_limiter = |limit: &RateLimitConfig| {
            Arc::new(RateLimiter::new(limit.clone()).idle_after(idle))
        };

        let policy = |tier: RateLimitTier, limit: &RateLimitConfig| {
            Arc::new(RateLimitPolicy::for_tier(tier, build_limiter(limit)))
        };

        let global_limit = policy(RateLimitTier::Global, &config.global_rate_limit);
        let api_limit = policy(RateLimitTier::Api, &config.api_rate_limit);
        let notices_limit = policy(RateLimitTier::Notices, &config.notices_rate_limit);
        let message_limit = policy(RateLimitTier::Message, &config.message_rate_limit);
        let chat_limiter = Arc::new(ChannelRateLimiter::from_limiter(build_limiter(
            &config.chat_rate_limit,
        )));
        let (chat_tx, _) = broadcast::channel(CHAT_CHANNEL_CAPACITY);

        Self {
            config,
            store,
            cache: Arc::new(ResponseCache::new()),
            global_limit,
            api_limit,
            notices_limit,
            message_limit,
            chat_limiter,
            chat_tx,
        }
    }

    /// 启动限流桶和缓存的后台清理任务
    pub fn spawn_maintenance(&self) -> Vec<JoinHandle<()>> {
        let period = self.config.maintenance_interval();
        vec![
            self.global_limit.limiter().spawn_sweeper(period),
            self.api_limit.limiter().spawn_sweeper(period),
            self.notices_limit.limiter().spawn_sweeper(period),
            self.message_limit.limiter().spawn_sweeper(period),
            self.chat_limiter.limiter().spawn_sweeper(period),
            self.cache.spawn_sweeper(period),
        ]
    }
}

pub fn build_router(state: AppState) -> Router {
    // 公告和聊天连接在通用限流之外还有各自的档位
    let notice_routes = Router::new()
        .route(
            "/notices",
            get(routes::notice::list_notices).post(routes::notice::create_notice),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.notices_limit.clone(),
            rate_limit,
        ));
    let chat_routes = Router::new()
        .route("/chat/ws", get(routes::chat::chat_socket))
        .layer(axum::middleware::from_fn_with_state(
            state.message_limit.clone(),
            rate_limit,
        ));

    let protected_routes = Router::new()
        // 待办路由
        .route(
            "/todos",
            get(routes::todo::list_todos).post(routes::todo::create_todo),
        )
        .route(
            "/todos/{id}",
            patch(routes::todo::update_todo).delete(routes::todo::delete_todo),
        )
        // 用户路由
        .route("/users/leaderboard", get(routes::user::leaderboard))
        .route(
            "/users/me",
            get(routes::user::get_me).put(routes::user::update_me),
        )
        .merge(notice_routes)
        .merge(chat_routes)
        // 先认证，再按用户限流
        .layer(axum::middleware::from_fn_with_state(
            state.api_limit.clone(),
            rate_limit,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let base = state.config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        Router::new().merge(protected_routes)
    } else {
        Router::new().nest(base, protected_routes)
    };

    router
        .layer(axum::middleware::from_fn_with_state(
            state.global_limit.clone(),
            rate_limit,
        ))
        .layer(axum::middleware::from_fn(log_errors))
        .with_state(state)
}
