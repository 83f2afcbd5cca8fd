use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    auth::{AuthService, SessionStore, TokenKeys},
    config::Config,
    error::Result,
    mirror::MarkdownMirror,
    render::MarkdownRenderer,
    service::{GeoLocator, LogSink, PassageService, ViewRecorder},
    storage::DBPool,
};

/// 应用程序上下文
///
/// [`AppState`] 持有连接池和各个服务，处理函数通过 [`FromRef`] 按类型取用。
#[derive(Clone, FromRef)]
pub struct AppState {
    pool: DBPool,
    passages: PassageService,
    views: ViewRecorder,
    auth: AuthService,
}

impl AppState {
    pub fn new(
        pool: DBPool,
        passages: PassageService,
        views: ViewRecorder,
        auth: AuthService,
    ) -> Self {
        Self {
            pool,
            passages,
            views,
            auth,
        }
    }

    /// 按配置组装默认的服务
    pub fn from_config(pool: DBPool, config: &Config) -> Result<Self> {
        let passages = PassageService::new(
            pool.clone(),
            Arc::new(MarkdownRenderer),
            MarkdownMirror::new(config.markdown_root()),
            Arc::new(LogSink),
        );
        let views = ViewRecorder::new(
            pool.clone(),
            Arc::new(GeoLocator::open(config.geoip_path().as_deref())),
        );
        let auth = AuthService::new(
            pool.clone(),
            TokenKeys::new(config.resolve_jwt_secret()?.as_bytes(), config.token_ttl_hours),
            Arc::new(SessionStore::new(config.session_ttl())),
        );
        Ok(Self::new(pool, passages, views, auth))
    }

    pub fn pool(&self) -> &DBPool {
        &self.pool
    }

    pub fn passages(&self) -> &PassageService {
        &self.passages
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }
}
