use chrono::Utc;

use super::{DBPool, Tag, TagChanges, deadline};
use crate::error::Result;

macro_rules! tag_columns {
    () => {
        "id, name, description, color, category_id, sort_order, usage_count, is_enabled, \
         created_at, updated_at"
    };
}

/// 标签的持久化接口
///
/// 展示顺序为 `sort_order` 再 `name`。
pub trait TagStore {
    /// 以默认属性创建启用的标签，返回新 id
    fn create_tag(&self, name: &str) -> impl Future<Output = Result<i64>> + Send;

    fn get_tag(&self, id: i64) -> impl Future<Output = Result<Option<Tag>>> + Send;

    /// 按名称精确查找，区分大小写
    fn get_tag_by_name(&self, name: &str) -> impl Future<Output = Result<Option<Tag>>> + Send;

    fn list_tags(&self) -> impl Future<Output = Result<Vec<Tag>>> + Send;

    fn list_enabled_tags(&self) -> impl Future<Output = Result<Vec<Tag>>> + Send;

    fn list_tags_by_category(&self, category_id: i64)
    -> impl Future<Output = Result<Vec<Tag>>> + Send;

    /// 按 `changes` 中出现的字段更新，返回是否命中
    fn update_tag(&self, id: i64, changes: &TagChanges)
    -> impl Future<Output = Result<bool>> + Send;

    fn update_tag_sort_order(
        &self,
        id: i64,
        sort_order: i64,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn update_tag_enabled(&self, id: i64, enabled: bool)
    -> impl Future<Output = Result<bool>> + Send;

    fn delete_tag(&self, id: i64) -> impl Future<Output = Result<bool>> + Send;

    fn increment_tag_usage(&self, id: i64) -> impl Future<Output = Result<()>> + Send;

    fn decrement_tag_usage(&self, id: i64) -> impl Future<Output = Result<()>> + Send;
}

impl TagStore for DBPool {
    async fn create_tag(&self, name: &str) -> Result<i64> {
        let mut conn = deadline(self.acquire()).await?;
        tx::create_tag(&mut conn, name).await
    }

    async fn get_tag(&self, id: i64) -> Result<Option<Tag>> {
        deadline(
            sqlx::query_as::<_, Tag>(concat!("SELECT ", tag_columns!(), " FROM tags WHERE id = ?"))
                .bind(id)
                .fetch_optional(self),
        )
        .await
    }

    async fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let mut conn = deadline(self.acquire()).await?;
        tx::get_tag_by_name(&mut conn, name).await
    }

    async fn list_tags(&self) -> Result<Vec<Tag>> {
        deadline(
            sqlx::query_as::<_, Tag>(concat!(
                "SELECT ",
                tag_columns!(),
                " FROM tags ORDER BY sort_order, name"
            ))
            .fetch_all(self),
        )
        .await
    }

    async fn list_enabled_tags(&self) -> Result<Vec<Tag>> {
        deadline(
            sqlx::query_as::<_, Tag>(concat!(
                "SELECT ",
                tag_columns!(),
                " FROM tags WHERE is_enabled = 1 ORDER BY sort_order, name"
            ))
            .fetch_all(self),
        )
        .await
    }

    async fn list_tags_by_category(&self, category_id: i64) -> Result<Vec<Tag>> {
        deadline(
            sqlx::query_as::<_, Tag>(concat!(
                "SELECT ",
                tag_columns!(),
                " FROM tags WHERE category_id = ? ORDER BY sort_order, name"
            ))
            .bind(category_id)
            .fetch_all(self),
        )
        .await
    }

    async fn update_tag(&self, id: i64, changes: &TagChanges) -> Result<bool> {
        let result = deadline(
            sqlx::query(
                "
                UPDATE tags SET
                    name = COALESCE(?, name),
                    description = COALESCE(?, description),
                    color = COALESCE(?, color),
                    category_id = COALESCE(?, category_id),
                    sort_order = COALESCE(?, sort_order),
                    is_enabled = COALESCE(?, is_enabled),
                    updated_at = ?
                WHERE id = ?
                ",
            )
            .bind(changes.name.as_deref())
            .bind(changes.description.as_deref())
            .bind(changes.color.as_deref())
            .bind(changes.category_id)
            .bind(changes.sort_order)
            .bind(changes.is_enabled)
            .bind(Utc::now())
            .bind(id)
            .execute(self),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_tag_sort_order(&self, id: i64, sort_order: i64) -> Result<bool> {
        let result = deadline(
            sqlx::query("UPDATE tags SET sort_order = ?, updated_at = ? WHERE id = ?")
                .bind(sort_order)
                .bind(Utc::now())
                .bind(id)
                .execute(self),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_tag_enabled(&self, id: i64, enabled: bool) -> Result<bool> {
        let result = deadline(
            sqlx::query("UPDATE tags SET is_enabled = ?, updated_at = ? WHERE id = ?")
                .bind(enabled)
                .bind(Utc::now())
                .bind(id)
                .execute(self),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_tag(&self, id: i64) -> Result<bool> {
        let result = deadline(sqlx::query("DELETE FROM tags WHERE id = ?").bind(id).execute(self))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_tag_usage(&self, id: i64) -> Result<()> {
        let mut conn = deadline(self.acquire()).await?;
        tx::increment_tag_usage(&mut conn, id).await
    }

    async fn decrement_tag_usage(&self, id: i64) -> Result<()> {
        let mut conn = deadline(self.acquire()).await?;
        tx::decrement_tag_usage(&mut conn, id).await
    }
}

/// 事务内的标签操作
///
/// 计数器的三个操作都有事务版本，关联调整时与关联行在同一事务中提交。
pub mod tx {
    use chrono::Utc;
    use sqlx::SqliteConnection;

    use crate::{
        error::Result,
        storage::{Tag, deadline},
    };

    pub async fn create_tag(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
        let now = Utc::now();
        let result = deadline(
            sqlx::query(
                "INSERT INTO tags (name, is_enabled, created_at, updated_at) VALUES (?, 1, ?, ?)",
            )
            .bind(name)
            .bind(now)
            .bind(now)
            .execute(conn),
        )
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_tag_by_name(conn: &mut SqliteConnection, name: &str) -> Result<Option<Tag>> {
        deadline(
            sqlx::query_as::<_, Tag>(concat!(
                "SELECT ",
                tag_columns!(),
                " FROM tags WHERE name = ?"
            ))
            .bind(name)
            .fetch_optional(conn),
        )
        .await
    }

    pub async fn increment_tag_usage(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        deadline(
            sqlx::query("UPDATE tags SET usage_count = usage_count + 1 WHERE id = ?")
                .bind(id)
                .execute(conn),
        )
        .await?;
        Ok(())
    }

    /// 计数不会低于 0
    pub async fn decrement_tag_usage(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        deadline(
            sqlx::query(
                "UPDATE tags SET usage_count = MAX(usage_count - 1, 0) WHERE id = ?",
            )
            .bind(id)
            .execute(conn),
        )
        .await?;
        Ok(())
    }

    /// 直接设置计数，用于按关联行重新校准
    pub async fn set_tag_usage(conn: &mut SqliteConnection, id: i64, count: i64) -> Result<()> {
        deadline(
            sqlx::query("UPDATE tags SET usage_count = ? WHERE id = ?")
                .bind(count.max(0))
                .bind(id)
                .execute(conn),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::temp_pool;

    #[tokio::test]
    async fn test_create_and_lookup_case_sensitive() {
        let (_dir, pool) = temp_pool().await;

        let id = pool.create_tag("Rust").await.expect("创建失败");
        let tag = pool.get_tag(id).await.expect("查询失败").expect("应存在");
        assert_eq!(tag.name, "Rust");
        assert!(tag.is_enabled);
        assert_eq!(tag.color, "#007bff");
        assert_eq!(tag.usage_count, 0);

        assert!(pool.get_tag_by_name("rust").await.expect("查询失败").is_none());
        assert!(pool.create_tag("Rust").await.is_err(), "名称唯一");
    }

    #[tokio::test]
    async fn test_ordering_and_enabled_filter() {
        let (_dir, pool) = temp_pool().await;

        let b = pool.create_tag("b").await.expect("创建失败");
        let a = pool.create_tag("a").await.expect("创建失败");
        let c = pool.create_tag("c").await.expect("创建失败");

        pool.update_tag_sort_order(c, -1).await.expect("更新失败");
        pool.update_tag_enabled(b, false).await.expect("更新失败");

        let all: Vec<_> = pool
            .list_tags()
            .await
            .expect("查询失败")
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(all, vec!["c", "a", "b"]);

        let enabled: Vec<_> = pool
            .list_enabled_tags()
            .await
            .expect("查询失败")
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(enabled, vec![c, a]);
    }

    #[tokio::test]
    async fn test_partial_update_and_category() {
        let (_dir, pool) = temp_pool().await;
        let id = pool.create_tag("web").await.expect("创建失败");

        let changes = TagChanges {
            color: Some("#ff0000".into()),
            category_id: Some(3),
            ..Default::default()
        };
        assert!(pool.update_tag(id, &changes).await.expect("更新失败"));

        let tag = pool.get_tag(id).await.expect("查询失败").expect("应存在");
        assert_eq!(tag.name, "web");
        assert_eq!(tag.color, "#ff0000");
        assert_eq!(pool.list_tags_by_category(3).await.expect("查询失败").len(), 1);
        assert!(pool.list_tags_by_category(0).await.expect("查询失败").is_empty());
    }

    #[tokio::test]
    async fn test_usage_counter_never_negative() {
        let (_dir, pool) = temp_pool().await;
        let id = pool.create_tag("x").await.expect("创建失败");

        pool.increment_tag_usage(id).await.expect("计数失败");
        pool.decrement_tag_usage(id).await.expect("计数失败");
        pool.decrement_tag_usage(id).await.expect("计数失败");

        let tag = pool.get_tag(id).await.expect("查询失败").expect("应存在");
        assert_eq!(tag.usage_count, 0);

        assert!(pool.delete_tag(id).await.expect("删除失败"));
        assert!(pool.get_tag(id).await.expect("查询失败").is_none());
    }
}
