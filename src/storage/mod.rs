//! 持久化层
//!
//! 所有 SQL 都收敛在这里，调用方只使用各实体的 Store trait。
//! 每个查询都在 [`QUERY_TIMEOUT`] 内完成，超时返回 [`Error::Timeout`]。

mod categories;
mod models;
mod passage_tags;
mod passages;
mod sqlite;
mod tags;
mod users;
mod views;

use std::time::Duration;

use crate::error::{Error, Result};

pub use self::{
    categories::CategoryStore,
    models::{
        ArchiveEntry, ArticleStats, Category, CategoryChanges, CityCount, DailyCount, IpCount,
        MostViewed, NameCount, NewView, PassageListItem, Tag, TagChanges, UserChanges, View,
    },
    passage_tags::PassageTagStore,
    passages::PassageStore,
    sqlite::{DBPool, init_db, migrate, open},
    tags::TagStore,
    users::UserStore,
    views::ViewStore,
};

/// 事务内使用的操作，参数为事务连接
pub mod tx {
    pub use super::passage_tags::tx::*;
    pub use super::passages::tx::*;
    pub use super::tags::tx::*;
}

/// 单次查询的时限
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// 在 [`QUERY_TIMEOUT`] 内执行查询
pub(crate) async fn deadline<T>(
    fut: impl Future<Output = core::result::Result<T, sqlx::Error>>,
) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::Timeout),
    }
}

/// 分页参数换算为 `(limit, offset)`，过大的页码按最大偏移处理
pub fn page_window(page: i64, limit: i64) -> (i64, i64) {
    let limit = limit.clamp(1, 100);
    let offset = (page.max(1) - 1).saturating_mul(limit);
    (limit, offset)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(1, 10), (10, 0));
        assert_eq!(page_window(3, 10), (10, 20));
        assert_eq!(page_window(0, 0), (1, 0));
        assert_eq!(page_window(2, 1000), (100, 100));
        assert_eq!(page_window(i64::MAX, 100), (100, i64::MAX));
        assert_eq!(page_window(i64::MIN, 10), (10, 0));
    }

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let ok = deadline(async { Ok::<_, sqlx::Error>(7) }).await;
        assert_eq!(ok.expect("应成功"), 7);

        let err = deadline(async { Err::<(), _>(sqlx::Error::RowNotFound) }).await;
        assert!(matches!(err, Err(Error::Sqlx(sqlx::Error::RowNotFound))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_times_out() {
        let slow = deadline(async {
            tokio::time::sleep(QUERY_TIMEOUT * 2).await;
            Ok::<_, sqlx::Error>(())
        })
        .await;
        assert!(matches!(slow, Err(Error::Timeout)));
    }
}
