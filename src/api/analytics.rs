use axum::{Router, extract::State, routing::get};
use serde::Deserialize;
use serde_json::{Value, to_value};

use super::{AdminCaller, ApiQuery, Success};
use crate::{
    error::{Error, Result},
    state::AppState,
    storage::{DBPool, ViewStore},
};

/// 配置访问统计路由。
///
/// `GET /admin/analytics?action=...&days=N`，`action` 为
/// `most-viewed`、`view-sources`、`view-trend`、`article-stats`、`view-by-city`、`view-by-ip`。
pub fn setup_route() -> Router<AppState> {
    Router::new().route("/admin/analytics", get(analytics))
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AnalyticsParams {
    action: String,
    days: i64,
    id: Option<i64>,
    limit: i64,
}

impl Default for AnalyticsParams {
    fn default() -> Self {
        Self {
            action: String::new(),
            days: 30,
            id: None,
            limit: 10,
        }
    }
}

async fn analytics(
    _: AdminCaller,
    ApiQuery(params): ApiQuery<AnalyticsParams>,
    State(pool): State<DBPool>,
) -> Result<Success<Value>> {
    let days = params.days.clamp(1, 365);
    let limit = params.limit.clamp(1, 100);

    let data = match params.action.as_str() {
        "most-viewed" => to_value(pool.most_viewed(limit).await?),
        "view-sources" => to_value(pool.view_sources(days).await?),
        "view-trend" => to_value(pool.view_trend(days).await?),
        "view-by-city" => to_value(pool.view_by_city(days).await?),
        "view-by-ip" => to_value(pool.view_by_ip(days).await?),
        "article-stats" => {
            let id = params
                .id
                .ok_or_else(|| Error::validation("article-stats 需要 id 参数"))?;
            to_value(pool.article_stats(id, days).await?)
        }
        other => return Err(Error::validation(format!("未知的统计类型: {other}"))),
    }
    .map_err(|e| Error::Internal(e.to_string()))?;

    Ok(Success::new(data))
}
