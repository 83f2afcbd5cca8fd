use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};

use super::{
    TagAssociator,
    events::{EventSink, PassageEvent, publish_detached},
    tags::detach_all,
};
use crate::{
    content::{
        Access, DEFAULT_AUTHOR, DEFAULT_CATEGORY, DenyReason, Passage, PassageStatus, Role,
        TagInput, Visibility, evaluate,
    },
    error::{Error, Result},
    mirror::{self, MarkdownMirror},
    render::{Renderer, summary_of},
    storage::{
        CategoryChanges, CategoryStore, DBPool, PassageListItem, PassageStore, PassageTagStore,
        deadline, page_window, tx,
    },
};

/// 新建或整体更新文章时提交的字段
///
/// 更新时未出现的字段保持原值，`created_at` 只在新建时生效。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PassageInput {
    pub title: Option<String>,
    #[serde(alias = "original_content")]
    pub content: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub status: Option<PassageStatus>,
    pub visibility: Option<Visibility>,
    pub show_title: Option<bool>,
    pub is_scheduled: Option<bool>,
    #[serde(deserialize_with = "optional_time")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "optional_time")]
    pub created_at: Option<DateTime<Utc>>,
    pub tags: Option<TagInput>,
}

/// 部分更新
///
/// 只识别 [`PATCH_FIELDS`] 中的字段，其余字段被忽略。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassagePatch {
    pub visibility: Option<Visibility>,
    pub is_scheduled: Option<bool>,
    /// `Some(None)` 表示清空
    pub published_at: Option<Option<DateTime<Utc>>>,
    pub status: Option<PassageStatus>,
    pub category: Option<String>,
    pub summary: Option<String>,
    pub show_title: Option<bool>,
    /// `Some(vec![])` 表示清空所有标签
    pub tags: Option<Vec<String>>,
}

pub const PATCH_FIELDS: [&str; 8] = [
    "visibility",
    "is_scheduled",
    "published_at",
    "status",
    "category",
    "summary",
    "show_title",
    "tags",
];

impl PassagePatch {
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        let mut patch = Self::default();
        let mut touched = false;

        for (key, value) in map {
            match key.as_str() {
                "visibility" => patch.visibility = Some(typed(&key, value)?),
                "is_scheduled" => patch.is_scheduled = Some(flag(&key, value)?),
                "published_at" => patch.published_at = Some(time_value(&key, value)?),
                "status" => patch.status = Some(typed(&key, value)?),
                "category" => patch.category = Some(typed(&key, value)?),
                "summary" => patch.summary = Some(typed(&key, value)?),
                "show_title" => patch.show_title = Some(flag(&key, value)?),
                "tags" => {
                    let names = match value {
                        Value::Null => Vec::new(),
                        other => typed::<TagInput>(&key, other)?.names(),
                    };
                    patch.tags = Some(names);
                }
                _ => continue,
            }
            touched = true;
        }

        if !touched {
            return Err(Error::validation("没有提供有效的更新字段"));
        }
        Ok(patch)
    }
}

/// 删除方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// 移入回收站，保留行、关联和文件
    Soft,
    /// 删除行、关联和文件
    Hard,
}

/// 文章与其标签名
#[derive(Debug, Clone)]
pub struct PassageDetail {
    pub passage: Passage,
    pub tags: Vec<String>,
}

/// 分页结果
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveItem {
    pub id: i64,
    pub title: String,
    pub date: String,
}

/// 按 `YYYY-MM` 分组的归档
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveMonth {
    pub month: String,
    pub count: usize,
    pub passages: Vec<ArchiveItem>,
}

/// 文章服务
///
/// 文章的创建、更新、删除都经过这里，保证数据库行、markdown 文件、
/// 渲染后的 HTML 和标签关联同步变化。部分失败时撤销已完成的一侧。
#[derive(Clone)]
pub struct PassageService {
    pub(super) pool: DBPool,
    pub(super) renderer: Arc<dyn Renderer>,
    pub(super) mirror: MarkdownMirror,
    pub(super) tags: TagAssociator,
    events: Arc<dyn EventSink>,
}

impl PassageService {
    pub fn new(
        pool: DBPool,
        renderer: Arc<dyn Renderer>,
        mirror: MarkdownMirror,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            tags: TagAssociator::new(pool.clone()),
            pool,
            renderer,
            mirror,
            events,
        }
    }

    pub fn mirror(&self) -> &MarkdownMirror {
        &self.mirror
    }

    /// 新建文章
    ///
    /// 顺序为渲染、确定路径、插入行、写文件、关联标签、补建分类。
    /// 写文件失败时删除已插入的行；标签和分类失败只记录警告。
    pub async fn create(&self, input: PassageInput) -> Result<Passage> {
        let title = title_of(input.title)?;
        let original = required(input.content, "内容不能为空")?;
        let show_title = input.show_title.unwrap_or(true);
        let content = self.renderer.render_with_option(&original, show_title)?;

        let now = Utc::now();
        let created_at = input.created_at.unwrap_or(now);
        let base = mirror::path_for(&title, created_at.with_timezone(&Local));
        let file_path = self.free_path(&base, Local::now()).await?;

        let mut passage = Passage {
            id: 0,
            summary: non_blank(input.summary).unwrap_or_else(|| summary_of(&content)),
            author: non_blank(input.author).unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            category: non_blank(input.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            status: input.status.unwrap_or_default(),
            visibility: input.visibility.unwrap_or_default(),
            show_title,
            is_scheduled: input.is_scheduled.unwrap_or(false),
            published_at: input.published_at,
            title,
            content,
            original_content: original,
            file_path,
            created_at,
            updated_at: now,
        };
        validate_schedule(&passage)?;

        passage.id = self.pool.create_passage(&passage).await?;

        if let Err(e) = self
            .mirror
            .write(&passage.file_path, &passage.title, &passage.original_content)
            .await
        {
            tracing::warn!(%e, id = passage.id, "markdown write failed, removing row");
            if let Err(e) = self.pool.delete_passage(passage.id).await {
                tracing::warn!(%e, id = passage.id, "failed to remove row after write failure");
            }
            return Err(e.into());
        }

        if let Some(tags) = input.tags {
            self.associate_tags(passage.id, &tags.names()).await;
        }
        self.ensure_category(&passage.category).await;

        tracing::info!(id = passage.id, file_path = %passage.file_path, "passage created");
        self.emit(PassageEvent::Created {
            id: passage.id,
            title: passage.title.clone(),
        });
        Ok(passage)
    }

    /// 整体更新
    ///
    /// 标题变化时重命名文件，目录保持不变。数据库更新失败时恢复原文件。
    pub async fn update(&self, id: i64, input: PassageInput) -> Result<Passage> {
        let existing = self.load(id).await?;
        let mut next = existing.clone();

        let PassageInput {
            title,
            content,
            summary,
            author,
            category,
            status,
            visibility,
            show_title,
            is_scheduled,
            published_at,
            created_at: _,
            tags,
        } = input;

        if let Some(title) = title {
            next.title = title_of(Some(title))?;
        }
        if let Some(content) = content {
            next.original_content = content;
        }
        if let Some(summary) = summary {
            next.summary = summary;
        }
        if let Some(author) = non_blank(author) {
            next.author = author;
        }
        if let Some(category) = non_blank(category) {
            next.category = category;
        }
        if let Some(status) = status {
            next.status = status;
        }
        if let Some(visibility) = visibility {
            next.visibility = visibility;
        }
        if let Some(show_title) = show_title {
            next.show_title = show_title;
        }
        if let Some(is_scheduled) = is_scheduled {
            next.is_scheduled = is_scheduled;
        }
        if published_at.is_some() {
            next.published_at = published_at;
        }
        validate_schedule(&next)?;

        next.content = self
            .renderer
            .render_with_option(&next.original_content, next.show_title)?;
        if next.summary.trim().is_empty() {
            next.summary = summary_of(&next.content);
        }
        next.updated_at = Utc::now();

        let moved = if next.title != existing.title {
            let relocation = self.relocate(&existing, &next.title).await?;
            next.file_path = relocation.path;
            relocation.moved
        } else {
            false
        };

        if let Err(e) = self
            .mirror
            .write(&next.file_path, &next.title, &next.original_content)
            .await
        {
            self.restore_file(&existing, &next.file_path, moved).await;
            return Err(e.into());
        }

        match self.pool.update_passage(&next).await {
            Ok(true) => (),
            Ok(false) => {
                self.restore_file(&existing, &next.file_path, moved).await;
                return Err(Error::NotFound("文章"));
            }
            Err(e) => {
                self.restore_file(&existing, &next.file_path, moved).await;
                return Err(e);
            }
        }
        if !moved && next.file_path != existing.file_path {
            self.discard_stale(&existing).await;
        }

        if let Some(tags) = tags {
            self.associate_tags(id, &tags.names()).await;
        }
        if next.category != existing.category {
            self.ensure_category(&next.category).await;
        }

        tracing::info!(id, file_path = %next.file_path, "passage updated");
        self.emit(PassageEvent::Updated {
            id,
            title: next.title.clone(),
        });
        Ok(next)
    }

    /// 部分更新，不涉及标题和正文，因此不改动文件
    pub async fn patch(&self, id: i64, patch: PassagePatch) -> Result<Passage> {
        let existing = self.load(id).await?;
        let mut next = existing.clone();

        if let Some(visibility) = patch.visibility {
            next.visibility = visibility;
        }
        if let Some(is_scheduled) = patch.is_scheduled {
            next.is_scheduled = is_scheduled;
        }
        if let Some(published_at) = patch.published_at {
            next.published_at = published_at;
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(category) = patch.category {
            next.category = non_blank(Some(category)).unwrap_or_else(|| DEFAULT_CATEGORY.into());
        }
        if let Some(summary) = patch.summary {
            next.summary = summary;
        }
        if let Some(show_title) = patch.show_title {
            next.show_title = show_title;
        }
        validate_schedule(&next)?;

        if next.show_title != existing.show_title {
            next.content = self
                .renderer
                .render_with_option(&next.original_content, next.show_title)?;
        }
        next.updated_at = Utc::now();

        if !self.pool.update_passage(&next).await? {
            return Err(Error::NotFound("文章"));
        }
        if let Some(tags) = &patch.tags {
            self.associate_tags(id, tags).await;
        }
        if next.category != existing.category {
            self.ensure_category(&next.category).await;
        }

        self.emit(PassageEvent::Updated {
            id,
            title: next.title.clone(),
        });
        Ok(next)
    }

    /// 删除文章
    ///
    /// 彻底删除时在一个事务中删除行和关联，之后再删文件。
    /// 文件删除失败只记录警告，留给同步清理。
    pub async fn delete(&self, id: i64, mode: DeleteMode) -> Result<()> {
        let existing = self.load(id).await?;

        match mode {
            DeleteMode::Soft => {
                self.pool
                    .update_passage_status(id, PassageStatus::Deleted)
                    .await?;
                tracing::info!(id, "passage moved to recycle bin");
            }
            DeleteMode::Hard => {
                let mut conn = deadline(self.pool.begin()).await?;
                if !tx::delete_passage(&mut conn, id).await? {
                    return Err(Error::NotFound("文章"));
                }
                detach_all(&mut conn, id).await?;
                deadline(conn.commit()).await?;

                match self.mirror.delete(&existing.file_path).await {
                    Ok(true) => (),
                    Ok(false) => {
                        tracing::warn!(id, file_path = %existing.file_path, "markdown file already missing")
                    }
                    Err(e) => {
                        tracing::warn!(%e, id, file_path = %existing.file_path, "failed to delete markdown file")
                    }
                }
                tracing::info!(id, "passage deleted");
            }
        }

        self.emit(PassageEvent::Deleted {
            id,
            permanent: mode == DeleteMode::Hard,
        });
        Ok(())
    }

    /// 按读者角色读取文章
    ///
    /// 被拒绝时返回 [`Error::AccessDenied`]，回收站中的文章对非管理员表现为不存在。
    pub async fn read(&self, id: i64, role: Option<Role>) -> Result<PassageDetail> {
        let passage = self.load(id).await?;
        self.checked(passage, role).await
    }

    /// 按 `YYYY/MM/DD/<标题>` 读取文章
    pub async fn read_by_path(&self, segment: &str, role: Option<Role>) -> Result<PassageDetail> {
        let file_path = self
            .mirror
            .resolve_by_url(segment)
            .await?
            .ok_or(Error::NotFound("文章"))?;
        let passage = self
            .pool
            .get_passage_by_file_path(&file_path)
            .await?
            .ok_or(Error::NotFound("文章"))?;
        self.checked(passage, role).await
    }

    /// 不做访问判定的完整读取
    pub async fn get(&self, id: i64) -> Result<PassageDetail> {
        let passage = self.load(id).await?;
        let tags = self.pool.tag_names_of_passage(id).await?;
        Ok(PassageDetail { passage, tags })
    }

    /// 已发布且公开的文章
    pub async fn list_public(
        &self,
        page: i64,
        limit: i64,
        category: Option<&str>,
    ) -> Result<Page<PassageListItem>> {
        let (limit, offset) = page_window(page, limit);
        Ok(Page {
            items: self
                .pool
                .list_visible_passages(category, limit, offset)
                .await?,
            total: self.pool.count_visible_passages(category).await?,
            page: page.max(1),
            limit,
        })
    }

    /// 管理端列表，可按状态或分类过滤
    pub async fn list_admin(
        &self,
        page: i64,
        limit: i64,
        status: Option<PassageStatus>,
        category: Option<&str>,
    ) -> Result<Page<PassageListItem>> {
        let (limit, offset) = page_window(page, limit);
        let (items, total) = match (status, category) {
            (Some(status), _) => (
                self.pool
                    .list_passages_by_status(status, limit, offset)
                    .await?,
                self.pool.count_passages_by_status(status).await?,
            ),
            (None, Some(category)) => (
                self.pool
                    .list_passages_by_category(category, limit, offset)
                    .await?,
                self.pool.count_passages_by_category(category).await?,
            ),
            (None, None) => (
                self.pool.list_passages(limit, offset).await?,
                self.pool.count_passages().await?,
            ),
        };
        Ok(Page {
            items,
            total,
            page: page.max(1),
            limit,
        })
    }

    /// 按月分组的归档，新的在前
    pub async fn archive(&self) -> Result<Vec<ArchiveMonth>> {
        let mut months: Vec<ArchiveMonth> = Vec::new();
        for entry in self.pool.archive_entries().await? {
            let local = entry.created_at.with_timezone(&Local);
            let month = local.format("%Y-%m").to_string();
            let item = ArchiveItem {
                id: entry.id,
                title: entry.title,
                date: local.format("%Y-%m-%d").to_string(),
            };
            match months.last_mut() {
                Some(last) if last.month == month => last.passages.push(item),
                _ => months.push(ArchiveMonth {
                    month,
                    count: 0,
                    passages: vec![item],
                }),
            }
        }
        for month in &mut months {
            month.count = month.passages.len();
        }
        Ok(months)
    }

    async fn load(&self, id: i64) -> Result<Passage> {
        self.pool
            .get_passage(id)
            .await?
            .ok_or(Error::NotFound("文章"))
    }

    async fn checked(&self, passage: Passage, role: Option<Role>) -> Result<PassageDetail> {
        match evaluate(&passage, role) {
            Access::Allowed => {
                let tags = self.pool.tag_names_of_passage(passage.id).await?;
                Ok(PassageDetail { passage, tags })
            }
            Access::Denied(denial) if denial.reason == DenyReason::NotFound => {
                Err(Error::NotFound("文章"))
            }
            Access::Denied(denial) => Err(Error::AccessDenied(denial)),
        }
    }

    /// 标题变化后的新路径，尽量重命名原文件
    ///
    /// 原文件缺失或重命名失败时返回一个未占用的新路径，由随后的写入创建文件。
    async fn relocate(&self, existing: &Passage, title: &str) -> Result<Relocation> {
        let dir = existing
            .file_path
            .rsplit_once('/')
            .map(|(dir, _)| dir.to_string())
            .unwrap_or_else(|| mirror::date_dir(existing.created_local()));
        let base = format!("{dir}/{}", mirror::sanitize_title(title));
        if base == existing.file_path {
            return Ok(Relocation {
                path: base,
                moved: false,
            });
        }

        let now = Local::now();
        let target = self.free_path(&base, now).await?;
        if !self.mirror.exists(&existing.file_path) {
            tracing::warn!(id = existing.id, file_path = %existing.file_path, "markdown file missing before rename");
            return Ok(Relocation {
                path: target,
                moved: false,
            });
        }
        match self.mirror.rename(&existing.file_path, &target, now).await {
            Ok(path) => Ok(Relocation { path, moved: true }),
            Err(e) => {
                tracing::warn!(%e, id = existing.id, "rename failed, writing a new file");
                Ok(Relocation {
                    path: target,
                    moved: false,
                })
            }
        }
    }

    /// 文件和数据库中都未被占用的路径
    async fn free_path(&self, base: &str, now: DateTime<Local>) -> Result<String> {
        let rows: HashSet<String> = self
            .pool
            .file_paths_with_prefix(base)
            .await?
            .into_iter()
            .collect();
        Ok(self
            .mirror
            .unique_path_by(base, now, |path| rows.contains(path)))
    }

    /// 更新失败后恢复原文件
    ///
    /// 文件已被移动时先移回原路径。原路径上的文件就绪后才删除新文件，
    /// 任何一步失败都保留现有文件。
    async fn restore_file(&self, existing: &Passage, current: &str, moved: bool) {
        if moved {
            match self.mirror.rename(current, &existing.file_path, Local::now()).await {
                Ok(path) if path == existing.file_path => (),
                Ok(path) => {
                    tracing::warn!(id = existing.id, file_path = %path, "original path taken, file left in place");
                    return;
                }
                Err(e) => {
                    tracing::warn!(%e, id = existing.id, file_path = current, "failed to move markdown file back");
                    return;
                }
            }
        }

        if let Err(e) = self
            .mirror
            .write(&existing.file_path, &existing.title, &existing.original_content)
            .await
        {
            tracing::warn!(%e, id = existing.id, "failed to restore markdown file");
            return;
        }
        if !moved && current != existing.file_path {
            if let Err(e) = self.mirror.delete(current).await {
                tracing::warn!(%e, id = existing.id, file_path = current, "failed to remove new markdown file");
            }
        }
    }

    /// 重命名失败时新文件另行写出，更新成功后删除旧文件
    async fn discard_stale(&self, existing: &Passage) {
        if let Err(e) = self.mirror.delete(&existing.file_path).await {
            tracing::warn!(%e, id = existing.id, file_path = %existing.file_path, "failed to remove old markdown file");
        }
    }

    async fn associate_tags(&self, id: i64, names: &[String]) {
        match self.tags.reconcile(id, names).await {
            Ok(report) if !report.failed.is_empty() => {
                tracing::warn!(id, failed = ?report.failed, "some tags were skipped")
            }
            Ok(_) => (),
            Err(e) => tracing::warn!(%e, id, "failed to associate tags"),
        }
    }

    /// 分类不存在时补建
    pub(super) async fn ensure_category(&self, name: &str) {
        if name == DEFAULT_CATEGORY {
            return;
        }
        let result = match self.pool.get_category_by_name(name).await {
            Ok(Some(_)) => return,
            Ok(None) => self
                .pool
                .create_category(name, &CategoryChanges::default())
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(%e, category = name, "failed to create category");
        }
    }

    fn emit(&self, event: PassageEvent) {
        publish_detached(self.events.clone(), event);
    }
}

/// 重命名的结果，`moved` 表示原文件已被移到 `path`
struct Relocation {
    path: String,
    moved: bool,
}

fn required(value: Option<String>, msg: &'static str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::validation(msg))
}

/// 标题同时是文件名和文件首行，不能包含换行等控制字符
fn title_of(value: Option<String>) -> Result<String> {
    let title = required(value, "标题不能为空")?;
    if title.chars().any(char::is_control) {
        return Err(Error::validation("标题不能包含换行或控制字符"));
    }
    Ok(title)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_schedule(passage: &Passage) -> Result<()> {
    if passage.is_scheduled && passage.published_at.is_none() {
        return Err(Error::validation("定时发布需要设置发布时间"));
    }
    Ok(())
}

/// 解析时间
///
/// 接受 RFC 3339，以及按本地时间解释的 `YYYY-MM-DD HH:MM:SS` 和 `YYYY-MM-DDTHH:MM`。
pub fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|at| at.with_timezone(&Utc))
}

fn optional_time<'de, D>(deserializer: D) -> core::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_time(&s)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("无效的时间: {s}"))),
    }
}

fn typed<T: de::DeserializeOwned>(key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::validation(format!("字段 {key} 无效: {e}")))
}

/// 布尔字段也接受 0/1
fn flag(key: &str, value: Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        Value::Number(n) if n.as_i64() == Some(0) => Ok(false),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(true),
        _ => Err(Error::validation(format!("字段 {key} 应为布尔值"))),
    }
}

fn time_value(key: &str, value: Value) -> Result<Option<DateTime<Utc>>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => parse_time(&s)
            .map(Some)
            .ok_or_else(|| Error::validation(format!("字段 {key} 不是有效的时间"))),
        _ => Err(Error::validation(format!("字段 {key} 不是有效的时间"))),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        render::MarkdownRenderer,
        service::events::testing::RecordingSink,
        storage::{TagStore, testing::temp_pool},
    };

    struct Fixture {
        _db: TempDir,
        files: TempDir,
        pool: DBPool,
        service: PassageService,
    }

    async fn fixture() -> Fixture {
        let (db, pool) = temp_pool().await;
        let files = tempfile::tempdir().expect("创建临时目录失败");
        let service = PassageService::new(
            pool.clone(),
            Arc::new(MarkdownRenderer),
            MarkdownMirror::new(files.path()),
            Arc::new(RecordingSink::default()),
        );
        Fixture {
            _db: db,
            files,
            pool,
            service,
        }
    }

    fn input(value: Value) -> PassageInput {
        serde_json::from_value(value).expect("解析失败")
    }

    fn read_file(f: &Fixture, file_path: &str) -> String {
        fs::read_to_string(f.files.path().join(format!("{file_path}.md"))).expect("读取文件失败")
    }

    #[tokio::test]
    async fn test_create_writes_row_file_and_tags() {
        let f = fixture().await;
        let p = f
            .service
            .create(input(json!({
                "title": "Hello",
                "content": "# Hello\n\nworld",
                "status": "published",
                "tags": "go,systems",
                "category": "技术",
            })))
            .await
            .expect("创建失败");

        assert!(p.content.contains("<p>world</p>"));
        assert!(p.file_path.ends_with("/Hello"));
        assert_eq!(read_file(&f, &p.file_path), "# Hello\n\n# Hello\n\nworld");
        assert_eq!(p.summary, "Hello world");
        assert_eq!(p.author, DEFAULT_AUTHOR);

        let tags = f.pool.tag_names_of_passage(p.id).await.expect("查询失败");
        assert_eq!(tags, vec!["go", "systems"]);
        assert!(
            f.pool
                .get_category_by_name("技术")
                .await
                .expect("查询失败")
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_create_requires_title_and_content() {
        let f = fixture().await;
        let err = f
            .service
            .create(input(json!({"title": "  ", "content": "x"})))
            .await
            .expect_err("应失败");
        assert!(matches!(err, Error::Validation(_)));

        let err = f
            .service
            .create(input(json!({"title": "t"})))
            .await
            .expect_err("应失败");
        assert!(matches!(err, Error::Validation(_)));

        let err = f
            .service
            .create(input(json!({"title": "t", "content": "x", "is_scheduled": true})))
            .await
            .expect_err("定时发布需要时间");
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_collision_gets_suffix() {
        let f = fixture().await;
        let a = f
            .service
            .create(input(json!({"title": "Same", "content": "a"})))
            .await
            .expect("创建失败");
        let b = f
            .service
            .create(input(json!({"title": "Same", "content": "b"})))
            .await
            .expect("创建失败");
        assert_ne!(a.file_path, b.file_path);
        assert!(b.file_path.starts_with(&format!("{}-", a.file_path)));
        assert_eq!(read_file(&f, &b.file_path), "# Same\n\nb");
    }

    #[tokio::test]
    async fn test_create_rolls_back_row_when_file_write_fails() {
        let (_db, pool) = temp_pool().await;
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").expect("写入失败");

        let service = PassageService::new(
            pool.clone(),
            Arc::new(MarkdownRenderer),
            MarkdownMirror::new(&blocker),
            Arc::new(RecordingSink::default()),
        );
        let err = service
            .create(input(json!({"title": "t", "content": "x"})))
            .await
            .expect_err("应失败");
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(pool.count_passages().await.expect("计数失败"), 0);
    }

    #[tokio::test]
    async fn test_update_retitle_moves_file() {
        let f = fixture().await;
        let p = f
            .service
            .create(input(json!({"title": "Hello", "content": "# Hello\n\nworld", "status": "published"})))
            .await
            .expect("创建失败");

        let updated = f
            .service
            .update(p.id, input(json!({"title": "Hi", "content": "# Hi\n\nworld"})))
            .await
            .expect("更新失败");

        let dir = p.file_path.rsplit_once('/').expect("目录").0;
        assert_eq!(updated.file_path, format!("{dir}/Hi"));
        assert_eq!(updated.status, PassageStatus::Published);
        assert_eq!(updated.created_at, p.created_at);
        assert!(!f.service.mirror().exists(&p.file_path));
        assert_eq!(read_file(&f, &updated.file_path), "# Hi\n\n# Hi\n\nworld");

        let row = f.pool.get_passage(p.id).await.expect("查询失败").expect("应存在");
        assert_eq!(row.title, "Hi");
        assert_eq!(row.file_path, updated.file_path);
    }

    #[tokio::test]
    async fn test_update_retitle_collision() {
        let f = fixture().await;
        let p = f
            .service
            .create(input(json!({"title": "Hello", "content": "a"})))
            .await
            .expect("创建失败");
        let dir = p.file_path.rsplit_once('/').expect("目录").0.to_string();
        f.service
            .mirror()
            .write(&format!("{dir}/Hi"), "Hi", "other")
            .await
            .expect("写入失败");

        let updated = f
            .service
            .update(p.id, input(json!({"title": "Hi"})))
            .await
            .expect("更新失败");
        assert!(updated.file_path.starts_with(&format!("{dir}/Hi-")));
        assert!(!f.service.mirror().exists(&p.file_path));
        assert_eq!(read_file(&f, &format!("{dir}/Hi")), "# Hi\n\nother");
        assert_eq!(read_file(&f, &updated.file_path), "# Hi\n\na");
    }

    #[tokio::test]
    async fn test_title_with_control_chars_rejected() {
        let f = fixture().await;
        let err = f
            .service
            .create(input(json!({"title": "Line1\nLine2", "content": "body"})))
            .await
            .expect_err("应失败");
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(f.pool.count_passages().await.expect("计数失败"), 0);

        let p = f
            .service
            .create(input(json!({"title": "Line1", "content": "body"})))
            .await
            .expect("创建失败");
        let err = f
            .service
            .update(p.id, input(json!({"title": "a\r\tb"})))
            .await
            .expect_err("应失败");
        assert!(matches!(err, Error::Validation(_)));

        let doc = f.service.mirror().parse(&p.file_path).await.expect("解析失败");
        assert_eq!(doc.title, p.title);
        let row = f.pool.get_passage(p.id).await.expect("查询失败").expect("应存在");
        assert_eq!(row.title, "Line1");
        assert_eq!(row.file_path, p.file_path);
    }

    #[tokio::test]
    async fn test_create_skips_path_held_by_row() {
        let f = fixture().await;
        let a = f
            .service
            .create(input(json!({"title": "Same", "content": "a"})))
            .await
            .expect("创建失败");
        f.service.mirror().delete(&a.file_path).await.expect("删除失败");

        let b = f
            .service
            .create(input(json!({"title": "Same", "content": "b"})))
            .await
            .expect("文件缺失的行仍占用路径");
        assert!(b.file_path.starts_with(&format!("{}-", a.file_path)));
    }

    #[tokio::test]
    async fn test_restore_moves_file_back() {
        let f = fixture().await;
        let p = f
            .service
            .create(input(json!({"title": "Hello", "content": "world"})))
            .await
            .expect("创建失败");
        let dir = p.file_path.rsplit_once('/').expect("目录").0;
        let moved_to = f
            .service
            .mirror()
            .rename(&p.file_path, &format!("{dir}/Hi"), Local::now())
            .await
            .expect("重命名失败");

        f.service.restore_file(&p, &moved_to, true).await;
        assert!(!f.service.mirror().exists(&moved_to));
        assert_eq!(read_file(&f, &p.file_path), "# Hello\n\nworld");
    }

    #[tokio::test]
    async fn test_restore_keeps_new_file_when_old_path_unwritable() {
        let f = fixture().await;
        let p = f
            .service
            .create(input(json!({"title": "Hello", "content": "world"})))
            .await
            .expect("创建失败");
        let dir = p.file_path.rsplit_once('/').expect("目录").0;
        let current = format!("{dir}/Hi");
        f.service
            .mirror()
            .write(&current, "Hi", "world")
            .await
            .expect("写入失败");

        // 原路径被目录占据，恢复写入必然失败
        let old = f.service.mirror().file_of(&p.file_path);
        fs::remove_file(&old).expect("删除失败");
        fs::create_dir_all(&old).expect("创建目录失败");

        f.service.restore_file(&p, &current, false).await;
        assert!(f.service.mirror().exists(&current), "唯一的文件不能被删除");
    }

    #[tokio::test]
    async fn test_discard_stale_removes_old_file() {
        let f = fixture().await;
        let p = f
            .service
            .create(input(json!({"title": "Hello", "content": "world"})))
            .await
            .expect("创建失败");

        f.service.discard_stale(&p).await;
        assert!(!f.service.mirror().exists(&p.file_path));
        // 文件已不存在时不报错
        f.service.discard_stale(&p).await;
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let f = fixture().await;
        let err = f
            .service
            .update(42, PassageInput::default())
            .await
            .expect_err("应失败");
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_patch_whitelist_and_show_title() {
        let f = fixture().await;
        let p = f
            .service
            .create(input(json!({"title": "T", "content": "# T\n\nbody", "tags": "a,b"})))
            .await
            .expect("创建失败");
        assert!(p.content.contains("<h1>T</h1>"));

        let patch = PassagePatch::from_map(
            json!({"show_title": false, "title": "ignored", "tags": "", "status": "published"})
                .as_object()
                .cloned()
                .expect("对象"),
        )
        .expect("解析失败");
        let patched = f.service.patch(p.id, patch.clone()).await.expect("更新失败");
        assert_eq!(patched.title, "T");
        assert!(!patched.content.contains("<h1>"));
        assert_eq!(patched.status, PassageStatus::Published);
        assert!(f.pool.tag_names_of_passage(p.id).await.expect("查询失败").is_empty());

        let again = f.service.patch(p.id, patch).await.expect("更新失败");
        assert_eq!(again.content, patched.content);
        assert_eq!(again.status, patched.status);
    }

    #[test]
    fn test_patch_parsing() {
        let map = |v: Value| v.as_object().cloned().expect("对象");

        let err = PassagePatch::from_map(map(json!({"title": "x", "id": 3}))).expect_err("应失败");
        assert!(matches!(err, Error::Validation(_)));

        let err = PassagePatch::from_map(map(json!({"visibility": "secret"}))).expect_err("应失败");
        assert!(matches!(err, Error::Validation(_)));

        let patch = PassagePatch::from_map(map(json!({
            "is_scheduled": 1,
            "published_at": "2099-01-01T00:00:00Z",
            "tags": ["x", " y ", "x"],
        })))
        .expect("解析失败");
        assert_eq!(patch.is_scheduled, Some(true));
        assert_eq!(
            patch.published_at,
            Some(Some(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()))
        );
        assert_eq!(patch.tags, Some(vec!["x".to_string(), "y".to_string()]));

        let patch = PassagePatch::from_map(map(json!({"published_at": ""}))).expect("解析失败");
        assert_eq!(patch.published_at, Some(None));
    }

    #[tokio::test]
    async fn test_soft_then_hard_delete() {
        let f = fixture().await;
        let p = f
            .service
            .create(input(json!({"title": "Gone", "content": "x", "status": "published", "tags": "t"})))
            .await
            .expect("创建失败");

        f.service.delete(p.id, DeleteMode::Soft).await.expect("删除失败");
        let row = f.pool.get_passage(p.id).await.expect("查询失败").expect("应存在");
        assert_eq!(row.status, PassageStatus::Deleted);
        assert!(f.service.mirror().exists(&p.file_path));
        assert!(matches!(
            f.service.read(p.id, None).await,
            Err(Error::NotFound(_))
        ));
        assert!(f.service.read(p.id, Some(Role::Admin)).await.is_ok());

        f.service.delete(p.id, DeleteMode::Hard).await.expect("删除失败");
        assert!(f.pool.get_passage(p.id).await.expect("查询失败").is_none());
        assert!(!f.service.mirror().exists(&p.file_path));
        assert!(f.pool.tag_names_of_passage(p.id).await.expect("查询失败").is_empty());
        let tag = f.pool.get_tag_by_name("t").await.expect("查询失败").expect("应存在");
        assert_eq!(tag.usage_count, 0);

        assert!(matches!(
            f.service.delete(p.id, DeleteMode::Hard).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_hard_delete_then_recreate_reuses_path() {
        let f = fixture().await;
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let body = json!({"title": "Again", "content": "x", "created_at": at.to_rfc3339()});

        let first = f.service.create(input(body.clone())).await.expect("创建失败");
        f.service.delete(first.id, DeleteMode::Hard).await.expect("删除失败");
        let second = f.service.create(input(body)).await.expect("创建失败");

        assert_ne!(first.id, second.id);
        assert_eq!(first.file_path, second.file_path);
    }

    #[tokio::test]
    async fn test_read_denials() {
        let f = fixture().await;
        let draft = f
            .service
            .create(input(json!({
                "title": "Soon",
                "content": "secret body",
                "is_scheduled": true,
                "published_at": "2099-01-01T00:00:00Z",
            })))
            .await
            .expect("创建失败");

        match f.service.read(draft.id, None).await {
            Err(Error::AccessDenied(denial)) => {
                assert_eq!(denial.reason, DenyReason::NotPublished);
                assert!(denial.is_scheduled);
            }
            other => panic!("应被拒绝: {other:?}"),
        }
        assert!(f.service.read(draft.id, Some(Role::Editor)).await.is_err());
        assert!(f.service.read(draft.id, Some(Role::Admin)).await.is_ok());

        let by_path = f
            .service
            .read_by_path(&draft.file_path, Some(Role::Admin))
            .await
            .expect("读取失败");
        assert_eq!(by_path.passage.id, draft.id);
    }

    #[tokio::test]
    async fn test_lists_and_archive() {
        let f = fixture().await;
        for (title, status) in [("a", "published"), ("b", "draft"), ("c", "published")] {
            f.service
                .create(input(json!({"title": title, "content": "x", "status": status})))
                .await
                .expect("创建失败");
        }

        let public = f.service.list_public(1, 10, None).await.expect("查询失败");
        assert_eq!(public.total, 2);
        assert_eq!(public.items.len(), 2);

        let drafts = f
            .service
            .list_admin(1, 10, Some(PassageStatus::Draft), None)
            .await
            .expect("查询失败");
        assert_eq!(drafts.total, 1);
        assert_eq!(drafts.items[0].title, "b");

        let all = f.service.list_admin(1, 2, None, None).await.expect("查询失败");
        assert_eq!(all.total, 3);
        assert_eq!(all.items.len(), 2);

        let archive = f.service.archive().await.expect("查询失败");
        assert_eq!(archive.len(), 1);
        assert_eq!(archive[0].count, 2);
        assert_eq!(archive[0].month, Local::now().format("%Y-%m").to_string());
    }

    #[test]
    fn test_parse_time_forms() {
        let utc = Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_time("2099-01-01T00:00:00Z"), Some(utc));
        assert_eq!(parse_time("2099-01-01T08:00:00+08:00"), Some(utc));
        assert!(parse_time("2099-01-01 00:00:00").is_some());
        assert!(parse_time("2099-01-01T00:00").is_some());
        assert_eq!(parse_time("tomorrow"), None);
    }
}
