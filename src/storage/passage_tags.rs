use super::{DBPool, deadline};
use crate::error::Result;

/// 文章与标签的关联
pub trait PassageTagStore {
    /// 插入关联，已存在时忽略，返回是否新插入
    fn create_passage_tag(
        &self,
        passage_id: i64,
        tag_id: i64,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn delete_passage_tags_by_passage(
        &self,
        passage_id: i64,
    ) -> impl Future<Output = Result<u64>> + Send;

    fn delete_passage_tags_by_tag(&self, tag_id: i64) -> impl Future<Output = Result<u64>> + Send;

    fn tag_ids_of_passage(&self, passage_id: i64) -> impl Future<Output = Result<Vec<i64>>> + Send;

    fn passage_ids_of_tag(&self, tag_id: i64) -> impl Future<Output = Result<Vec<i64>>> + Send;

    fn count_passages_of_tag(&self, tag_id: i64) -> impl Future<Output = Result<i64>> + Send;

    /// 文章关联的标签名，按标签展示顺序
    fn tag_names_of_passage(
        &self,
        passage_id: i64,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;
}

impl PassageTagStore for DBPool {
    async fn create_passage_tag(&self, passage_id: i64, tag_id: i64) -> Result<bool> {
        let mut conn = deadline(self.acquire()).await?;
        tx::create_passage_tag(&mut conn, passage_id, tag_id).await
    }

    async fn delete_passage_tags_by_passage(&self, passage_id: i64) -> Result<u64> {
        let mut conn = deadline(self.acquire()).await?;
        tx::delete_passage_tags_by_passage(&mut conn, passage_id).await
    }

    async fn delete_passage_tags_by_tag(&self, tag_id: i64) -> Result<u64> {
        let result = deadline(
            sqlx::query("DELETE FROM passage_tags WHERE tag_id = ?")
                .bind(tag_id)
                .execute(self),
        )
        .await?;
        Ok(result.rows_affected())
    }

    async fn tag_ids_of_passage(&self, passage_id: i64) -> Result<Vec<i64>> {
        let mut conn = deadline(self.acquire()).await?;
        tx::tag_ids_of_passage(&mut conn, passage_id).await
    }

    async fn passage_ids_of_tag(&self, tag_id: i64) -> Result<Vec<i64>> {
        deadline(
            sqlx::query_scalar(
                "SELECT passage_id FROM passage_tags WHERE tag_id = ? ORDER BY passage_id",
            )
            .bind(tag_id)
            .fetch_all(self),
        )
        .await
    }

    async fn count_passages_of_tag(&self, tag_id: i64) -> Result<i64> {
        let mut conn = deadline(self.acquire()).await?;
        tx::count_passages_of_tag(&mut conn, tag_id).await
    }

    async fn tag_names_of_passage(&self, passage_id: i64) -> Result<Vec<String>> {
        deadline(
            sqlx::query_scalar(
                "
                SELECT t.name FROM passage_tags pt
                JOIN tags t ON t.id = pt.tag_id
                WHERE pt.passage_id = ?
                ORDER BY t.sort_order, t.name
                ",
            )
            .bind(passage_id)
            .fetch_all(self),
        )
        .await
    }
}

/// 事务内的关联操作
pub mod tx {
    use chrono::Utc;
    use sqlx::SqliteConnection;

    use crate::{error::Result, storage::deadline};

    pub async fn create_passage_tag(
        conn: &mut SqliteConnection,
        passage_id: i64,
        tag_id: i64,
    ) -> Result<bool> {
        let result = deadline(
            sqlx::query(
                "
                INSERT INTO passage_tags (passage_id, tag_id, created_at) VALUES (?, ?, ?)
                ON CONFLICT (passage_id, tag_id) DO NOTHING
                ",
            )
            .bind(passage_id)
            .bind(tag_id)
            .bind(Utc::now())
            .execute(conn),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_passage_tag(
        conn: &mut SqliteConnection,
        passage_id: i64,
        tag_id: i64,
    ) -> Result<bool> {
        let result = deadline(
            sqlx::query("DELETE FROM passage_tags WHERE passage_id = ? AND tag_id = ?")
                .bind(passage_id)
                .bind(tag_id)
                .execute(conn),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_passage_tags_by_passage(
        conn: &mut SqliteConnection,
        passage_id: i64,
    ) -> Result<u64> {
        let result = deadline(
            sqlx::query("DELETE FROM passage_tags WHERE passage_id = ?")
                .bind(passage_id)
                .execute(conn),
        )
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn tag_ids_of_passage(
        conn: &mut SqliteConnection,
        passage_id: i64,
    ) -> Result<Vec<i64>> {
        deadline(
            sqlx::query_scalar(
                "SELECT tag_id FROM passage_tags WHERE passage_id = ? ORDER BY tag_id",
            )
            .bind(passage_id)
            .fetch_all(conn),
        )
        .await
    }

    pub async fn count_passages_of_tag(conn: &mut SqliteConnection, tag_id: i64) -> Result<i64> {
        deadline(
            sqlx::query_scalar("SELECT COUNT(*) FROM passage_tags WHERE tag_id = ?")
                .bind(tag_id)
                .fetch_one(conn),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{TagStore, testing::temp_pool};

    #[tokio::test]
    async fn test_edges() {
        let (_dir, pool) = temp_pool().await;
        let go = pool.create_tag("go").await.expect("创建失败");
        let rust = pool.create_tag("rust").await.expect("创建失败");

        assert!(pool.create_passage_tag(1, go).await.expect("插入失败"));
        assert!(!pool.create_passage_tag(1, go).await.expect("插入失败"), "重复关联被忽略");
        pool.create_passage_tag(1, rust).await.expect("插入失败");
        pool.create_passage_tag(2, rust).await.expect("插入失败");

        assert_eq!(pool.tag_ids_of_passage(1).await.expect("查询失败"), vec![go, rust]);
        assert_eq!(pool.passage_ids_of_tag(rust).await.expect("查询失败"), vec![1, 2]);
        assert_eq!(pool.count_passages_of_tag(rust).await.expect("计数失败"), 2);
        assert_eq!(
            pool.tag_names_of_passage(1).await.expect("查询失败"),
            vec!["go", "rust"]
        );

        assert_eq!(pool.delete_passage_tags_by_tag(rust).await.expect("删除失败"), 2);
        assert_eq!(pool.delete_passage_tags_by_passage(1).await.expect("删除失败"), 1);
        assert!(pool.tag_ids_of_passage(1).await.expect("查询失败").is_empty());
    }
}
