use chrono::Utc;

use super::{ArchiveEntry, DBPool, PassageListItem, deadline};
use crate::{
    content::{DEFAULT_CATEGORY, Passage, PassageStatus},
    error::Result,
};

macro_rules! passage_columns {
    () => {
        "id, title, content, original_content, summary, author, category, status, visibility, \
         show_title, is_scheduled, published_at, file_path, created_at, updated_at"
    };
}

macro_rules! list_columns {
    () => {
        "p.id, p.title, p.summary, p.author, p.category, p.status, p.visibility, \
         p.is_scheduled, p.published_at, p.file_path, p.created_at, p.updated_at, \
         (SELECT json_group_array(t.name) FROM passage_tags pt \
            JOIN tags t ON t.id = pt.tag_id WHERE pt.passage_id = p.id) AS tags"
    };
}

/// 文章的持久化接口
///
/// 查询缺失的行返回 `None`，不视为错误。
pub trait PassageStore {
    /// 插入文章，忽略 `passage.id`，返回新 id
    fn create_passage(&self, passage: &Passage) -> impl Future<Output = Result<i64>> + Send;

    fn get_passage(&self, id: i64) -> impl Future<Output = Result<Option<Passage>>> + Send;

    fn get_passage_by_file_path(
        &self,
        file_path: &str,
    ) -> impl Future<Output = Result<Option<Passage>>> + Send;

    /// 以 `prefix` 开头的全部 `file_path`
    fn file_paths_with_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// 全部文章，按创建时间倒序
    fn list_passages(
        &self,
        limit: i64,
        offset: i64,
    ) -> impl Future<Output = Result<Vec<PassageListItem>>> + Send;

    fn list_passages_by_status(
        &self,
        status: PassageStatus,
        limit: i64,
        offset: i64,
    ) -> impl Future<Output = Result<Vec<PassageListItem>>> + Send;

    /// 按分类名精确匹配
    fn list_passages_by_category(
        &self,
        category: &str,
        limit: i64,
        offset: i64,
    ) -> impl Future<Output = Result<Vec<PassageListItem>>> + Send;

    /// 已发布且公开的文章，可按分类过滤
    fn list_visible_passages(
        &self,
        category: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> impl Future<Output = Result<Vec<PassageListItem>>> + Send;

    /// 文章中出现过的分类名，去重并排除默认分类
    fn passage_categories(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// 已发布且公开的文章，按创建时间倒序，用于归档
    fn archive_entries(&self) -> impl Future<Output = Result<Vec<ArchiveEntry>>> + Send;

    /// 按 id 整行更新，返回是否命中
    fn update_passage(&self, passage: &Passage) -> impl Future<Output = Result<bool>> + Send;

    fn update_passage_status(
        &self,
        id: i64,
        status: PassageStatus,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn delete_passage(&self, id: i64) -> impl Future<Output = Result<bool>> + Send;

    fn count_passages(&self) -> impl Future<Output = Result<i64>> + Send;

    fn count_passages_by_status(
        &self,
        status: PassageStatus,
    ) -> impl Future<Output = Result<i64>> + Send;

    fn count_passages_by_category(&self, category: &str) -> impl Future<Output = Result<i64>> + Send;

    fn count_visible_passages(
        &self,
        category: Option<&str>,
    ) -> impl Future<Output = Result<i64>> + Send;
}

impl PassageStore for DBPool {
    async fn create_passage(&self, passage: &Passage) -> Result<i64> {
        let result = deadline(
            sqlx::query(
                "
                INSERT INTO passages
                    (title, content, original_content, summary, author, category, status,
                     visibility, show_title, is_scheduled, published_at, file_path,
                     created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&passage.title)
            .bind(&passage.content)
            .bind(&passage.original_content)
            .bind(&passage.summary)
            .bind(&passage.author)
            .bind(&passage.category)
            .bind(passage.status)
            .bind(passage.visibility)
            .bind(passage.show_title)
            .bind(passage.is_scheduled)
            .bind(passage.published_at)
            .bind(&passage.file_path)
            .bind(passage.created_at)
            .bind(passage.updated_at)
            .execute(self),
        )
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn get_passage(&self, id: i64) -> Result<Option<Passage>> {
        deadline(
            sqlx::query_as::<_, Passage>(concat!(
                "SELECT ",
                passage_columns!(),
                " FROM passages WHERE id = ?"
            ))
            .bind(id)
            .fetch_optional(self),
        )
        .await
    }

    async fn get_passage_by_file_path(&self, file_path: &str) -> Result<Option<Passage>> {
        deadline(
            sqlx::query_as::<_, Passage>(concat!(
                "SELECT ",
                passage_columns!(),
                " FROM passages WHERE file_path = ?"
            ))
            .bind(file_path)
            .fetch_optional(self),
        )
        .await
    }

    async fn file_paths_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        deadline(
            sqlx::query_scalar(
                "SELECT file_path FROM passages WHERE substr(file_path, 1, ?) = ? ORDER BY file_path",
            )
            .bind(prefix.chars().count() as i64)
            .bind(prefix)
            .fetch_all(self),
        )
        .await
    }

    async fn list_passages(&self, limit: i64, offset: i64) -> Result<Vec<PassageListItem>> {
        deadline(
            sqlx::query_as::<_, PassageListItem>(concat!(
                "SELECT ",
                list_columns!(),
                " FROM passages p ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?"
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(self),
        )
        .await
    }

    async fn list_passages_by_status(
        &self,
        status: PassageStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PassageListItem>> {
        deadline(
            sqlx::query_as::<_, PassageListItem>(concat!(
                "SELECT ",
                list_columns!(),
                " FROM passages p WHERE p.status = ?",
                " ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?"
            ))
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(self),
        )
        .await
    }

    async fn list_passages_by_category(
        &self,
        category: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PassageListItem>> {
        deadline(
            sqlx::query_as::<_, PassageListItem>(concat!(
                "SELECT ",
                list_columns!(),
                " FROM passages p WHERE p.category = ?",
                " ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?"
            ))
            .bind(category)
            .bind(limit)
            .bind(offset)
            .fetch_all(self),
        )
        .await
    }

    async fn list_visible_passages(
        &self,
        category: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PassageListItem>> {
        deadline(
            sqlx::query_as::<_, PassageListItem>(concat!(
                "SELECT ",
                list_columns!(),
                " FROM passages p",
                " WHERE p.status = 'published' AND p.visibility = 'public'",
                " AND (?1 IS NULL OR p.category = ?1)",
                " ORDER BY p.created_at DESC, p.id DESC LIMIT ?2 OFFSET ?3"
            ))
            .bind(category)
            .bind(limit)
            .bind(offset)
            .fetch_all(self),
        )
        .await
    }

    async fn passage_categories(&self) -> Result<Vec<String>> {
        deadline(
            sqlx::query_scalar(
                "
                SELECT DISTINCT category FROM passages
                WHERE category != '' AND category != ?
                ORDER BY category
                ",
            )
            .bind(DEFAULT_CATEGORY)
            .fetch_all(self),
        )
        .await
    }

    async fn archive_entries(&self) -> Result<Vec<ArchiveEntry>> {
        deadline(
            sqlx::query_as::<_, ArchiveEntry>(
                "
                SELECT id, title, created_at FROM passages
                WHERE status = 'published' AND visibility = 'public'
                ORDER BY created_at DESC, id DESC
                ",
            )
            .fetch_all(self),
        )
        .await
    }

    async fn update_passage(&self, passage: &Passage) -> Result<bool> {
        let result = deadline(
            sqlx::query(
                "
                UPDATE passages SET
                    title = ?, content = ?, original_content = ?, summary = ?, author = ?,
                    category = ?, status = ?, visibility = ?, show_title = ?,
                    is_scheduled = ?, published_at = ?, file_path = ?, updated_at = ?
                WHERE id = ?
                ",
            )
            .bind(&passage.title)
            .bind(&passage.content)
            .bind(&passage.original_content)
            .bind(&passage.summary)
            .bind(&passage.author)
            .bind(&passage.category)
            .bind(passage.status)
            .bind(passage.visibility)
            .bind(passage.show_title)
            .bind(passage.is_scheduled)
            .bind(passage.published_at)
            .bind(&passage.file_path)
            .bind(passage.updated_at)
            .bind(passage.id)
            .execute(self),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_passage_status(&self, id: i64, status: PassageStatus) -> Result<bool> {
        let result = deadline(
            sqlx::query("UPDATE passages SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status)
                .bind(Utc::now())
                .bind(id)
                .execute(self),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_passage(&self, id: i64) -> Result<bool> {
        let result = deadline(
            sqlx::query("DELETE FROM passages WHERE id = ?")
                .bind(id)
                .execute(self),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_passages(&self) -> Result<i64> {
        deadline(sqlx::query_scalar("SELECT COUNT(*) FROM passages").fetch_one(self)).await
    }

    async fn count_passages_by_status(&self, status: PassageStatus) -> Result<i64> {
        deadline(
            sqlx::query_scalar("SELECT COUNT(*) FROM passages WHERE status = ?")
                .bind(status)
                .fetch_one(self),
        )
        .await
    }

    async fn count_passages_by_category(&self, category: &str) -> Result<i64> {
        deadline(
            sqlx::query_scalar("SELECT COUNT(*) FROM passages WHERE category = ?")
                .bind(category)
                .fetch_one(self),
        )
        .await
    }

    async fn count_visible_passages(&self, category: Option<&str>) -> Result<i64> {
        deadline(
            sqlx::query_scalar(
                "
                SELECT COUNT(*) FROM passages
                WHERE status = 'published' AND visibility = 'public'
                AND (?1 IS NULL OR category = ?1)
                ",
            )
            .bind(category)
            .fetch_one(self),
        )
        .await
    }
}

/// 事务内的文章操作
pub mod tx {
    use sqlx::SqliteConnection;

    use crate::{error::Result, storage::deadline};

    /// 删除文章行，返回是否命中
    pub async fn delete_passage(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
        let result = deadline(
            sqlx::query("DELETE FROM passages WHERE id = ?")
                .bind(id)
                .execute(conn),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
