use sqlx::SqliteConnection;

use crate::{
    error::Result,
    storage::{DBPool, TagStore, deadline, tx},
};

/// 一次关联调整的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagReport {
    pub added: Vec<i64>,
    pub removed: Vec<i64>,
    /// 新建的标签名
    pub created: Vec<String>,
    /// 处理失败并被跳过的标签名
    pub failed: Vec<String>,
}

/// 维护文章与标签的关联
///
/// 在一个事务中对比现有关联和目标标签，只增删差异部分，同时调整 `usage_count`。
#[derive(Debug, Clone)]
pub struct TagAssociator {
    pool: DBPool,
}

impl TagAssociator {
    pub fn new(pool: DBPool) -> Self {
        Self { pool }
    }

    /// 使文章恰好关联 `names` 中的每个标签
    ///
    /// `names` 应已去空白、去空、去重。缺失的标签自动创建；
    /// 单个标签失败只记录警告，不影响其他标签。
    pub async fn reconcile(&self, passage_id: i64, names: &[String]) -> Result<TagReport> {
        let mut tx = deadline(self.pool.begin()).await?;
        let current = tx::tag_ids_of_passage(&mut tx, passage_id).await?;

        let mut report = TagReport::default();
        let mut wanted = Vec::with_capacity(names.len());
        for name in names {
            match resolve_tag(&mut tx, name).await {
                Ok((id, created)) => {
                    if created {
                        report.created.push(name.clone());
                    }
                    if !wanted.contains(&id) {
                        wanted.push(id);
                    }
                }
                Err(e) => {
                    tracing::warn!(%e, passage_id, tag = %name, "failed to resolve tag");
                    report.failed.push(name.clone());
                }
            }
        }

        for &id in current.iter().filter(|id| !wanted.contains(id)) {
            if tx::delete_passage_tag(&mut tx, passage_id, id).await? {
                tx::decrement_tag_usage(&mut tx, id).await?;
                report.removed.push(id);
            }
        }
        for &id in wanted.iter().filter(|id| !current.contains(id)) {
            if tx::create_passage_tag(&mut tx, passage_id, id).await? {
                tx::increment_tag_usage(&mut tx, id).await?;
                report.added.push(id);
            }
        }

        deadline(tx.commit()).await?;
        Ok(report)
    }

    /// 按关联行重新计算所有标签的 `usage_count`
    pub async fn recount(&self) -> Result<()> {
        let tags = self.pool.list_tags().await?;
        let mut tx = deadline(self.pool.begin()).await?;
        for tag in tags {
            let count = tx::count_passages_of_tag(&mut tx, tag.id).await?;
            if count != tag.usage_count {
                tx::set_tag_usage(&mut tx, tag.id, count).await?;
            }
        }
        deadline(tx.commit()).await?;
        Ok(())
    }
}

/// 删除文章的全部关联并调整计数，返回原先关联的标签 id
///
/// 在调用方的事务中执行。
pub async fn detach_all(conn: &mut SqliteConnection, passage_id: i64) -> Result<Vec<i64>> {
    let ids = tx::tag_ids_of_passage(conn, passage_id).await?;
    tx::delete_passage_tags_by_passage(conn, passage_id).await?;
    for &id in &ids {
        tx::decrement_tag_usage(conn, id).await?;
    }
    Ok(ids)
}

/// 按名称查找标签，不存在时创建，返回 `(id, 是否新建)`
async fn resolve_tag(conn: &mut SqliteConnection, name: &str) -> Result<(i64, bool)> {
    if let Some(tag) = tx::get_tag_by_name(conn, name).await? {
        return Ok((tag.id, false));
    }
    Ok((tx::create_tag(conn, name).await?, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{PassageTagStore, testing::temp_pool};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn usage(pool: &DBPool, name: &str) -> i64 {
        pool.get_tag_by_name(name)
            .await
            .expect("查询失败")
            .expect("应存在")
            .usage_count
    }

    #[tokio::test]
    async fn test_reconcile_creates_and_links() {
        let (_dir, pool) = temp_pool().await;
        let assoc = TagAssociator::new(pool.clone());

        let report = assoc.reconcile(1, &names(&["go", "systems"])).await.expect("关联失败");
        assert_eq!(report.created, names(&["go", "systems"]));
        assert_eq!(report.added.len(), 2);
        assert!(report.failed.is_empty());

        assert_eq!(
            pool.tag_names_of_passage(1).await.expect("查询失败"),
            names(&["go", "systems"])
        );
        assert_eq!(usage(&pool, "go").await, 1);
    }

    #[tokio::test]
    async fn test_reconcile_applies_only_differences() {
        let (_dir, pool) = temp_pool().await;
        let assoc = TagAssociator::new(pool.clone());

        assoc.reconcile(1, &names(&["a", "b"])).await.expect("关联失败");
        assoc.reconcile(2, &names(&["b"])).await.expect("关联失败");

        let report = assoc.reconcile(1, &names(&["b", "c"])).await.expect("关联失败");
        assert_eq!(report.created, names(&["c"]));
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.removed.len(), 1);

        assert_eq!(
            pool.tag_names_of_passage(1).await.expect("查询失败"),
            names(&["b", "c"])
        );
        assert_eq!(usage(&pool, "a").await, 0);
        assert_eq!(usage(&pool, "b").await, 2);
        assert_eq!(usage(&pool, "c").await, 1);
    }

    #[tokio::test]
    async fn test_reconcile_empty_clears() {
        let (_dir, pool) = temp_pool().await;
        let assoc = TagAssociator::new(pool.clone());

        assoc.reconcile(1, &names(&["a", "b"])).await.expect("关联失败");
        let report = assoc.reconcile(1, &[]).await.expect("关联失败");
        assert_eq!(report.removed.len(), 2);
        assert!(pool.tag_names_of_passage(1).await.expect("查询失败").is_empty());
        assert_eq!(usage(&pool, "a").await, 0);
    }

    #[tokio::test]
    async fn test_detach_all_and_recount() {
        let (_dir, pool) = temp_pool().await;
        let assoc = TagAssociator::new(pool.clone());
        assoc.reconcile(1, &names(&["a", "b"])).await.expect("关联失败");

        let mut conn = pool.acquire().await.expect("获取连接失败");
        let detached = detach_all(&mut conn, 1).await.expect("删除失败");
        drop(conn);
        assert_eq!(detached.len(), 2);
        assert_eq!(usage(&pool, "a").await, 0);

        // 人为制造计数偏差后重新校准
        pool.increment_tag_usage(
            pool.get_tag_by_name("b").await.expect("查询失败").expect("应存在").id,
        )
        .await
        .expect("计数失败");
        assoc.recount().await.expect("校准失败");
        assert_eq!(usage(&pool, "b").await, 0);
    }
}
