use axum::{Router, extract::State, routing::get};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiPath, ApiQuery, Caller, Client, Success};
use crate::{
    content::{PassageStatus, Visibility},
    error::Result,
    render::read_time,
    service::{Page, PassageDetail, PassageService, ViewRecorder},
    state::AppState,
    storage::PassageListItem,
};

/// 配置公开的文章路由。
///
/// - `GET /passages`：已发布且公开的文章列表
/// - `GET /passages/{id}`：按 id 读取
/// - `GET /passages/by-path/{*path}`：按 `YYYY/MM/DD/<标题>` 读取
pub fn setup_route() -> Router<AppState> {
    Router::new()
        .route("/passages", get(passage_list))
        .route("/passages/{id}", get(passage))
        .route("/passages/by-path/{*path}", get(passage_by_path))
}

/// 读者看到的文章
#[derive(Debug, Serialize)]
pub struct PassageView {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub category: String,
    pub author: String,
    pub status: PassageStatus,
    pub visibility: Visibility,
    pub show_title: bool,
    pub read_time: usize,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PassageDetail> for PassageView {
    fn from(PassageDetail { passage, tags }: PassageDetail) -> Self {
        Self {
            read_time: read_time(&passage.original_content),
            created_at: local_date(passage.created_at),
            updated_at: local_date(passage.updated_at),
            id: passage.id,
            title: passage.title,
            content: passage.content,
            summary: passage.summary,
            tags,
            category: passage.category,
            author: passage.author,
            status: passage.status,
            visibility: passage.visibility,
            show_title: passage.show_title,
        }
    }
}

pub(super) fn local_date(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

/// 查询参数，用于文章列表分页和筛选。
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ListParams {
    page: i64,
    limit: i64,
    category: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            category: None,
        }
    }
}

async fn passage_list(
    ApiQuery(params): ApiQuery<ListParams>,
    State(passages): State<PassageService>,
) -> Result<Success<Page<PassageListItem>>> {
    let category = params.category.as_deref().filter(|c| !c.is_empty());
    passages
        .list_public(params.page, params.limit, category)
        .await
        .map(Success::new)
}

/// 按 id 读取文章。
///
/// 通过访问判定后异步记录一次访问；被拒绝时返回 423 及拒绝原因。
async fn passage(
    ApiPath(id): ApiPath<i64>,
    caller: Caller,
    Client(client): Client,
    State(passages): State<PassageService>,
    State(views): State<ViewRecorder>,
) -> Result<Success<PassageView>> {
    let detail = passages.read(id, caller.role()).await?;
    views.record(id, client);
    Ok(Success::new(detail.into()))
}

async fn passage_by_path(
    ApiPath(path): ApiPath<String>,
    caller: Caller,
    Client(client): Client,
    State(passages): State<PassageService>,
    State(views): State<ViewRecorder>,
) -> Result<Success<PassageView>> {
    let detail = passages.read_by_path(&path, caller.role()).await?;
    views.record(detail.passage.id, client);
    Ok(Success::new(detail.into()))
}
