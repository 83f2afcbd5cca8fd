use axum::{Router, extract::State, routing::get};
use serde::Serialize;

use super::Success;
use crate::{
    error::Result,
    service::{ArchiveMonth, PassageService},
    state::AppState,
    storage::{DBPool, PassageStore, Tag, TagStore},
};

/// 配置公开的聚合查询路由。
///
/// - `GET /tags`：启用的标签
/// - `GET /categories`：文章中出现过的分类
/// - `GET /archive`：按月归档
pub fn setup_route() -> Router<AppState> {
    Router::new()
        .route("/tags", get(tag_list))
        .route("/categories", get(category_list))
        .route("/archive", get(archive))
}

/// 文章分类，`id` 为列表中的序号。
#[derive(Debug, Serialize)]
pub struct CategoryItem {
    id: usize,
    name: String,
}

/// 获取所有启用的标签，按排序值和名称排列。
async fn tag_list(State(pool): State<DBPool>) -> Result<Success<Vec<Tag>>> {
    pool.list_enabled_tags().await.map(Success::new)
}

/// 获取文章使用过的分类，不含默认分类。
async fn category_list(State(pool): State<DBPool>) -> Result<Success<Vec<CategoryItem>>> {
    let names = pool.passage_categories().await?;
    Ok(Success::new(
        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| CategoryItem { id: i + 1, name })
            .collect(),
    ))
}

async fn archive(State(passages): State<PassageService>) -> Result<Success<Vec<ArchiveMonth>>> {
    passages.archive().await.map(Success::new)
}
