mod admin;
mod analytics;
mod auth;
mod extract;
mod passages;
mod query;

use std::{any::Any, net::SocketAddr, time::Duration};

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::instrument;

pub use self::extract::{AUTH_COOKIE, AdminCaller, ApiJson, ApiPath, ApiQuery, Caller, Client};
use crate::{error::Result, state::AppState};

/// 设置应用的路由。
///
/// 公开接口、认证接口和管理接口都挂在 `/api` 下，并绑定应用状态。
pub fn setup_route(app: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            passages::setup_route()
                .merge(query::setup_route())
                .merge(auth::setup_route())
                .merge(admin::setup_route())
                .merge(analytics::setup_route()),
        )
        .with_state(app)
}

/// 启动 HTTP 服务，并使用给定的路由处理请求。
///
/// 连接信息随请求传入，用于取客户端地址。
#[instrument(name = "http server", skip_all)]
pub async fn run_server_with_router(router: Router, listen: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;

    tracing::info!("listening on {listen}");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// 启动 HTTP 服务，自动设置路由和中间件。
///
/// 1. 生成路由
/// 2. 添加日志、追踪和 panic 保护中间件
/// 3. 启动服务器
pub async fn run_server(app: AppState, listen: &str) -> Result<()> {
    let router = setup_route(app);
    let router = add_middlewares(router);
    run_server_with_router(router, listen).await
}

/// 为路由添加中间件。
///
/// 请求失败时输出错误日志；处理函数 panic 时记录日志并返回 500。
pub fn add_middlewares(router: Router) -> Router {
    fn log_failure(
        err: tower_http::classify::ServerErrorsFailureClass,
        latency: Duration,
        _span: &tracing::Span,
    ) {
        tracing::error!(error = %err, latency_ms = latency.as_millis(), "request failed");
    }

    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(
            TraceLayer::new_for_http()
                .on_failure(log_failure)
                .on_request(|_req: &_, _span: &tracing::Span| {
                    // 空实现，关闭请求日志
                }),
        )
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "success": false,
            "code": "INTERNAL_ERROR",
            "message": "服务器内部错误",
        })),
    )
        .into_response()
}

/// 成功响应 `{success: true, data}`
#[derive(Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    data: T,
}

impl<T: Serialize> Success<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// 成功但没有数据的响应
pub fn done(message: &str) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "message": message }))
}
