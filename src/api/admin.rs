use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{AdminCaller, ApiJson, ApiPath, ApiQuery, Success, done};
use crate::{
    auth::hash_password,
    content::{Passage, PassageStatus, User, Visibility},
    error::{Error, Result},
    service::{
        DeleteMode, Page, PassageDetail, PassageInput, PassagePatch, PassageService, SyncReport,
    },
    state::AppState,
    storage::{
        Category, CategoryChanges, CategoryStore, DBPool, PassageListItem, PassageTagStore, Tag,
        TagChanges, TagStore, UserChanges, UserStore, page_window,
    },
};

/// 配置管理路由，所有接口都要求管理员身份。
///
/// - `/admin/passages`：文章的列表、创建、更新、部分更新和删除，目标由 `?id=` 指定
/// - `/admin/passages/{id}`：完整文章
/// - `/admin/categories`、`/admin/tags`、`/admin/users`
/// - `POST /admin/sync`：以 markdown 目录为准同步数据库
pub fn setup_route() -> Router<AppState> {
    Router::new()
        .route(
            "/admin/passages",
            get(passage_list)
                .post(passage_create)
                .put(passage_update)
                .patch(passage_patch)
                .delete(passage_delete),
        )
        .route("/admin/passages/{id}", get(passage_full))
        .route("/admin/categories", get(category_list).post(category_create))
        .route(
            "/admin/categories/{id}",
            put(category_update).delete(category_delete),
        )
        .route("/admin/tags", get(tag_list).post(tag_create))
        .route(
            "/admin/tags/{id}",
            put(tag_update).patch(tag_adjust).delete(tag_delete),
        )
        .route("/admin/users", get(user_list))
        .route(
            "/admin/users/{id}",
            patch(user_update).delete(user_delete),
        )
        .route("/admin/sync", post(sync))
}

/// 目标文章
#[derive(Debug, Deserialize)]
struct Target {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    id: i64,
    #[serde(default)]
    recycle: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AdminListParams {
    page: i64,
    limit: i64,
    status: Option<PassageStatus>,
    category: Option<String>,
}

impl Default for AdminListParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            status: None,
            category: None,
        }
    }
}

/// 写入后返回的摘要
#[derive(Debug, Serialize)]
struct PassageSummary {
    id: i64,
    title: String,
    status: PassageStatus,
    visibility: Visibility,
    file_path: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Passage> for PassageSummary {
    fn from(p: Passage) -> Self {
        Self {
            id: p.id,
            title: p.title,
            status: p.status,
            visibility: p.visibility,
            file_path: p.file_path,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// 管理端看到的完整文章
#[derive(Debug, Serialize)]
struct PassageFull {
    id: i64,
    title: String,
    content: String,
    original_content: String,
    summary: String,
    author: String,
    category: String,
    tags: Vec<String>,
    status: PassageStatus,
    visibility: Visibility,
    show_title: bool,
    is_scheduled: bool,
    published_at: Option<DateTime<Utc>>,
    file_path: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PassageDetail> for PassageFull {
    fn from(PassageDetail { passage: p, tags }: PassageDetail) -> Self {
        Self {
            id: p.id,
            title: p.title,
            content: p.content,
            original_content: p.original_content,
            summary: p.summary,
            author: p.author,
            category: p.category,
            tags,
            status: p.status,
            visibility: p.visibility,
            show_title: p.show_title,
            is_scheduled: p.is_scheduled,
            published_at: p.published_at,
            file_path: p.file_path,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

async fn passage_list(
    _: AdminCaller,
    ApiQuery(params): ApiQuery<AdminListParams>,
    State(passages): State<PassageService>,
) -> Result<Success<Page<PassageListItem>>> {
    let category = params.category.as_deref().filter(|c| !c.is_empty());
    passages
        .list_admin(params.page, params.limit, params.status, category)
        .await
        .map(Success::new)
}

async fn passage_full(
    _: AdminCaller,
    ApiPath(id): ApiPath<i64>,
    State(passages): State<PassageService>,
) -> Result<Success<PassageFull>> {
    let detail = passages.get(id).await?;
    Ok(Success::new(detail.into()))
}

async fn passage_create(
    _: AdminCaller,
    State(passages): State<PassageService>,
    ApiJson(input): ApiJson<PassageInput>,
) -> Result<Response> {
    let passage = passages.create(input).await?;
    Ok((
        StatusCode::CREATED,
        Success::new(PassageSummary::from(passage)),
    )
        .into_response())
}

async fn passage_update(
    _: AdminCaller,
    ApiQuery(Target { id }): ApiQuery<Target>,
    State(passages): State<PassageService>,
    ApiJson(input): ApiJson<PassageInput>,
) -> Result<Success<PassageSummary>> {
    let passage = passages.update(id, input).await?;
    Ok(Success::new(passage.into()))
}

async fn passage_patch(
    _: AdminCaller,
    ApiQuery(Target { id }): ApiQuery<Target>,
    State(passages): State<PassageService>,
    ApiJson(fields): ApiJson<Map<String, Value>>,
) -> Result<Success<PassageSummary>> {
    let patch = PassagePatch::from_map(fields)?;
    let passage = passages.patch(id, patch).await?;
    Ok(Success::new(passage.into()))
}

/// 删除文章。
///
/// `recycle=true` 时移入回收站，否则彻底删除。
async fn passage_delete(
    _: AdminCaller,
    ApiQuery(params): ApiQuery<DeleteParams>,
    State(passages): State<PassageService>,
) -> Result<impl IntoResponse> {
    let mode = if params.recycle {
        DeleteMode::Soft
    } else {
        DeleteMode::Hard
    };
    passages.delete(params.id, mode).await?;
    Ok(done(match mode {
        DeleteMode::Soft => "已移入回收站",
        DeleteMode::Hard => "已删除",
    }))
}

async fn sync(
    _: AdminCaller,
    State(passages): State<PassageService>,
) -> Result<Success<SyncReport>> {
    passages.sync_all().await.map(Success::new)
}

// ---- 分类 ----

#[derive(Debug, Deserialize)]
struct NewCategory {
    name: String,
    #[serde(flatten)]
    changes: CategoryChanges,
}

async fn category_list(
    _: AdminCaller,
    State(pool): State<DBPool>,
) -> Result<Success<Vec<Category>>> {
    pool.list_categories().await.map(Success::new)
}

async fn category_create(
    _: AdminCaller,
    State(pool): State<DBPool>,
    ApiJson(req): ApiJson<NewCategory>,
) -> Result<Response> {
    let name = required_name(&req.name, "分类名称不能为空")?;
    if pool.get_category_by_name(&name).await?.is_some() {
        return Err(Error::Conflict("分类已存在"));
    }
    let id = pool.create_category(&name, &req.changes).await?;
    let category = pool.get_category(id).await?.ok_or(Error::NotFound("分类"))?;
    Ok((StatusCode::CREATED, Success::new(category)).into_response())
}

async fn category_update(
    _: AdminCaller,
    ApiPath(id): ApiPath<i64>,
    State(pool): State<DBPool>,
    ApiJson(changes): ApiJson<CategoryChanges>,
) -> Result<Success<Category>> {
    if let Some(name) = &changes.name {
        let name = required_name(name, "分类名称不能为空")?;
        if let Some(other) = pool.get_category_by_name(&name).await? {
            if other.id != id {
                return Err(Error::Conflict("分类已存在"));
            }
        }
    }
    if !pool.update_category(id, &changes).await? {
        return Err(Error::NotFound("分类"));
    }
    let category = pool.get_category(id).await?.ok_or(Error::NotFound("分类"))?;
    Ok(Success::new(category))
}

/// 删除分类行，引用该分类名的文章不受影响。
async fn category_delete(
    _: AdminCaller,
    ApiPath(id): ApiPath<i64>,
    State(pool): State<DBPool>,
) -> Result<impl IntoResponse> {
    if !pool.delete_category(id).await? {
        return Err(Error::NotFound("分类"));
    }
    Ok(done("已删除"))
}

// ---- 标签 ----

#[derive(Debug, Deserialize)]
struct NewTag {
    name: String,
    #[serde(flatten)]
    changes: TagChanges,
}

#[derive(Debug, Deserialize)]
struct TagAdjust {
    sort_order: Option<i64>,
    is_enabled: Option<bool>,
}

async fn tag_list(_: AdminCaller, State(pool): State<DBPool>) -> Result<Success<Vec<Tag>>> {
    pool.list_tags().await.map(Success::new)
}

async fn tag_create(
    _: AdminCaller,
    State(pool): State<DBPool>,
    ApiJson(mut req): ApiJson<NewTag>,
) -> Result<Response> {
    let name = required_name(&req.name, "标签名称不能为空")?;
    if pool.get_tag_by_name(&name).await?.is_some() {
        return Err(Error::Conflict("标签已存在"));
    }
    let id = pool.create_tag(&name).await?;
    req.changes.name = None;
    pool.update_tag(id, &req.changes).await?;
    let tag = pool.get_tag(id).await?.ok_or(Error::NotFound("标签"))?;
    Ok((StatusCode::CREATED, Success::new(tag)).into_response())
}

async fn tag_update(
    _: AdminCaller,
    ApiPath(id): ApiPath<i64>,
    State(pool): State<DBPool>,
    ApiJson(changes): ApiJson<TagChanges>,
) -> Result<Success<Tag>> {
    if let Some(name) = &changes.name {
        let name = required_name(name, "标签名称不能为空")?;
        if let Some(other) = pool.get_tag_by_name(&name).await? {
            if other.id != id {
                return Err(Error::Conflict("标签已存在"));
            }
        }
    }
    if !pool.update_tag(id, &changes).await? {
        return Err(Error::NotFound("标签"));
    }
    let tag = pool.get_tag(id).await?.ok_or(Error::NotFound("标签"))?;
    Ok(Success::new(tag))
}

/// 只调整排序和启用状态。
async fn tag_adjust(
    _: AdminCaller,
    ApiPath(id): ApiPath<i64>,
    State(pool): State<DBPool>,
    ApiJson(req): ApiJson<TagAdjust>,
) -> Result<Success<Tag>> {
    if req.sort_order.is_none() && req.is_enabled.is_none() {
        return Err(Error::validation("没有提供有效的更新字段"));
    }
    let mut found = true;
    if let Some(sort_order) = req.sort_order {
        found &= pool.update_tag_sort_order(id, sort_order).await?;
    }
    if let Some(enabled) = req.is_enabled {
        found &= pool.update_tag_enabled(id, enabled).await?;
    }
    if !found {
        return Err(Error::NotFound("标签"));
    }
    let tag = pool.get_tag(id).await?.ok_or(Error::NotFound("标签"))?;
    Ok(Success::new(tag))
}

/// 删除标签及其全部关联。
async fn tag_delete(
    _: AdminCaller,
    ApiPath(id): ApiPath<i64>,
    State(pool): State<DBPool>,
) -> Result<impl IntoResponse> {
    let detached = pool.delete_passage_tags_by_tag(id).await?;
    if !pool.delete_tag(id).await? {
        return Err(Error::NotFound("标签"));
    }
    tracing::info!(tag_id = id, detached, "tag deleted");
    Ok(done("已删除"))
}

// ---- 用户 ----

#[derive(Debug, Deserialize)]
#[serde(default)]
struct UserListParams {
    page: i64,
    limit: i64,
}

impl Default for UserListParams {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

async fn user_list(
    _: AdminCaller,
    ApiQuery(params): ApiQuery<UserListParams>,
    State(pool): State<DBPool>,
) -> Result<Success<Page<User>>> {
    let (limit, offset) = page_window(params.page, params.limit);
    Ok(Success::new(Page {
        items: pool.list_users(limit, offset).await?,
        total: pool.count_users().await?,
        page: params.page.max(1),
        limit,
    }))
}

/// 部分更新用户。
///
/// 只接受 `username`、`password`、`email`、`role`、`status`，密码在写入前哈希。
/// 受保护的 `admin` 用户不能改名，也不能降级或封禁。
async fn user_update(
    _: AdminCaller,
    ApiPath(id): ApiPath<i64>,
    State(pool): State<DBPool>,
    ApiJson(mut changes): ApiJson<UserChanges>,
) -> Result<Success<User>> {
    let user = pool.get_user(id).await?.ok_or(Error::NotFound("用户"))?;
    if changes.is_empty() {
        return Err(Error::validation("没有提供有效的更新字段"));
    }
    if user.is_protected()
        && (changes.username.as_deref().is_some_and(|u| u != user.username)
            || changes.role.is_some_and(|r| r != user.role)
            || changes.status.is_some_and(|s| s != user.status))
    {
        return Err(Error::Forbidden("该用户不可修改用户名、角色或状态"));
    }
    if let Some(username) = &changes.username {
        if let Some(other) = pool.get_user_by_username(username).await? {
            if other.id != id {
                return Err(Error::Conflict("用户名已存在"));
            }
        }
    }
    if let Some(email) = &changes.email {
        if let Some(other) = pool.get_user_by_email(email).await? {
            if other.id != id {
                return Err(Error::Conflict("邮箱已被注册"));
            }
        }
    }
    if let Some(password) = changes.password.take() {
        if password.chars().count() < 6 {
            return Err(Error::validation("密码至少 6 个字符"));
        }
        changes.password = Some(hash_password(&password).await?);
    }

    pool.update_user_partial(id, &changes).await?;
    let user = pool.get_user(id).await?.ok_or(Error::NotFound("用户"))?;
    Ok(Success::new(user))
}

async fn user_delete(
    _: AdminCaller,
    ApiPath(id): ApiPath<i64>,
    State(pool): State<DBPool>,
) -> Result<impl IntoResponse> {
    let user = pool.get_user(id).await?.ok_or(Error::NotFound("用户"))?;
    if user.is_protected() {
        return Err(Error::Forbidden("该用户不可删除"));
    }
    pool.delete_user(id).await?;
    Ok(done("已删除"))
}

fn required_name(name: &str, msg: &'static str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation(msg));
    }
    Ok(name.to_string())
}
