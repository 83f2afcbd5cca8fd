use chrono::Utc;

use super::{Category, CategoryChanges, DBPool, deadline};
use crate::error::Result;

macro_rules! category_columns {
    () => {
        "id, name, description, icon, sort_order, is_enabled, created_at, updated_at"
    };
}

/// 分类的持久化接口
///
/// 文章按名称引用分类，分类行可以没有任何文章引用。
pub trait CategoryStore {
    /// 创建分类，`changes.name` 被忽略，返回新 id
    fn create_category(
        &self,
        name: &str,
        changes: &CategoryChanges,
    ) -> impl Future<Output = Result<i64>> + Send;

    fn get_category(&self, id: i64) -> impl Future<Output = Result<Option<Category>>> + Send;

    fn get_category_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Category>>> + Send;

    /// 按 `sort_order` 再 `name` 排序
    fn list_categories(&self) -> impl Future<Output = Result<Vec<Category>>> + Send;

    fn update_category(
        &self,
        id: i64,
        changes: &CategoryChanges,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn delete_category(&self, id: i64) -> impl Future<Output = Result<bool>> + Send;
}

impl CategoryStore for DBPool {
    async fn create_category(&self, name: &str, changes: &CategoryChanges) -> Result<i64> {
        let now = Utc::now();
        let result = deadline(
            sqlx::query(
                "
                INSERT INTO categories
                    (name, description, icon, sort_order, is_enabled, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(name)
            .bind(changes.description.as_deref().unwrap_or_default())
            .bind(changes.icon.as_deref().unwrap_or_default())
            .bind(changes.sort_order.unwrap_or_default())
            .bind(changes.is_enabled.unwrap_or(true))
            .bind(now)
            .bind(now)
            .execute(self),
        )
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn get_category(&self, id: i64) -> Result<Option<Category>> {
        deadline(
            sqlx::query_as::<_, Category>(concat!(
                "SELECT ",
                category_columns!(),
                " FROM categories WHERE id = ?"
            ))
            .bind(id)
            .fetch_optional(self),
        )
        .await
    }

    async fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        deadline(
            sqlx::query_as::<_, Category>(concat!(
                "SELECT ",
                category_columns!(),
                " FROM categories WHERE name = ?"
            ))
            .bind(name)
            .fetch_optional(self),
        )
        .await
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        deadline(
            sqlx::query_as::<_, Category>(concat!(
                "SELECT ",
                category_columns!(),
                " FROM categories ORDER BY sort_order, name"
            ))
            .fetch_all(self),
        )
        .await
    }

    async fn update_category(&self, id: i64, changes: &CategoryChanges) -> Result<bool> {
        let result = deadline(
            sqlx::query(
                "
                UPDATE categories SET
                    name = COALESCE(?, name),
                    description = COALESCE(?, description),
                    icon = COALESCE(?, icon),
                    sort_order = COALESCE(?, sort_order),
                    is_enabled = COALESCE(?, is_enabled),
                    updated_at = ?
                WHERE id = ?
                ",
            )
            .bind(changes.name.as_deref())
            .bind(changes.description.as_deref())
            .bind(changes.icon.as_deref())
            .bind(changes.sort_order)
            .bind(changes.is_enabled)
            .bind(Utc::now())
            .bind(id)
            .execute(self),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_category(&self, id: i64) -> Result<bool> {
        let result = deadline(
            sqlx::query("DELETE FROM categories WHERE id = ?")
                .bind(id)
                .execute(self),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
