use chrono::{Duration, Local};

use super::{
    ArticleStats, CityCount, DBPool, DailyCount, IpCount, MostViewed, NameCount, NewView, View,
    deadline,
};
use crate::error::Result;

/// 统计窗口的起始日期，`YYYY-MM-DD`
///
/// 窗口为包含今天在内往前 `days` 天，`days` 至少为 1。
pub fn window_start(days: i64) -> String {
    let days = days.max(1);
    (Local::now().date_naive() - Duration::days(days - 1))
        .format("%Y-%m-%d")
        .to_string()
}

/// 访问记录的写入与聚合查询
///
/// 访问日志只追加，不更新也不删除。聚合查询都按 [`window_start`] 过滤。
pub trait ViewStore {
    fn record_view(&self, view: &NewView) -> impl Future<Output = Result<i64>> + Send;

    /// 单篇文章最近的访问记录
    fn article_views(
        &self,
        passage_id: i64,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<View>>> + Send;

    fn article_stats(
        &self,
        passage_id: i64,
        days: i64,
    ) -> impl Future<Output = Result<ArticleStats>> + Send;

    /// 已发布文章按访问量排序
    fn most_viewed(&self, limit: i64) -> impl Future<Output = Result<Vec<MostViewed>>> + Send;

    /// 按国家统计，前 10
    fn view_sources(&self, days: i64) -> impl Future<Output = Result<Vec<NameCount>>> + Send;

    /// 按日期统计
    fn view_trend(&self, days: i64) -> impl Future<Output = Result<Vec<DailyCount>>> + Send;

    /// 按城市统计，前 20
    fn view_by_city(&self, days: i64) -> impl Future<Output = Result<Vec<CityCount>>> + Send;

    /// 按 IP 统计，前 20
    fn view_by_ip(&self, days: i64) -> impl Future<Output = Result<Vec<IpCount>>> + Send;
}

impl ViewStore for DBPool {
    async fn record_view(&self, view: &NewView) -> Result<i64> {
        let result = deadline(
            sqlx::query(
                "
                INSERT INTO article_views
                    (passage_id, ip, user_agent, country, city, region, view_date, view_time)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(view.passage_id)
            .bind(&view.ip)
            .bind(&view.user_agent)
            .bind(&view.country)
            .bind(&view.city)
            .bind(&view.region)
            .bind(&view.view_date)
            .bind(view.view_time)
            .execute(self),
        )
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn article_views(&self, passage_id: i64, limit: i64) -> Result<Vec<View>> {
        deadline(
            sqlx::query_as::<_, View>(
                "
                SELECT id, passage_id, ip, user_agent, country, city, region, view_date, view_time
                FROM article_views
                WHERE passage_id = ?
                ORDER BY view_time DESC, id DESC
                LIMIT ?
                ",
            )
            .bind(passage_id)
            .bind(limit)
            .fetch_all(self),
        )
        .await
    }

    async fn article_stats(&self, passage_id: i64, days: i64) -> Result<ArticleStats> {
        let start = window_start(days);

        let total_views: i64 = deadline(
            sqlx::query_scalar("SELECT COUNT(*) FROM article_views WHERE passage_id = ?")
                .bind(passage_id)
                .fetch_one(self),
        )
        .await?;

        let (window_views, unique_visitors): (i64, i64) = deadline(
            sqlx::query_as(
                "
                SELECT COUNT(*), COUNT(DISTINCT ip) FROM article_views
                WHERE passage_id = ? AND view_date >= ?
                ",
            )
            .bind(passage_id)
            .bind(&start)
            .fetch_one(self),
        )
        .await?;

        let top_countries = deadline(
            sqlx::query_as::<_, NameCount>(
                "
                SELECT country AS name, COUNT(*) AS count FROM article_views
                WHERE passage_id = ? AND view_date >= ? AND country != ''
                GROUP BY country
                ORDER BY count DESC, name
                LIMIT 5
                ",
            )
            .bind(passage_id)
            .bind(&start)
            .fetch_all(self),
        )
        .await?;

        let top_cities = deadline(
            sqlx::query_as::<_, CityCount>(
                "
                SELECT country, city, region, COUNT(*) AS count FROM article_views
                WHERE passage_id = ? AND view_date >= ? AND city != ''
                GROUP BY country, city, region
                ORDER BY count DESC, city
                LIMIT 5
                ",
            )
            .bind(passage_id)
            .bind(&start)
            .fetch_all(self),
        )
        .await?;

        let trend = deadline(
            sqlx::query_as::<_, DailyCount>(
                "
                SELECT view_date AS date, COUNT(*) AS count FROM article_views
                WHERE passage_id = ? AND view_date >= ?
                GROUP BY view_date
                ORDER BY view_date
                ",
            )
            .bind(passage_id)
            .bind(&start)
            .fetch_all(self),
        )
        .await?;

        Ok(ArticleStats {
            passage_id,
            days,
            total_views,
            window_views,
            unique_visitors,
            top_countries,
            top_cities,
            trend,
        })
    }

    async fn most_viewed(&self, limit: i64) -> Result<Vec<MostViewed>> {
        deadline(
            sqlx::query_as::<_, MostViewed>(
                "
                SELECT p.id, p.title, p.author, COUNT(v.id) AS view_count
                FROM passages p
                LEFT JOIN article_views v ON v.passage_id = p.id
                WHERE p.status = 'published'
                GROUP BY p.id
                ORDER BY view_count DESC, p.id DESC
                LIMIT ?
                ",
            )
            .bind(limit)
            .fetch_all(self),
        )
        .await
    }

    async fn view_sources(&self, days: i64) -> Result<Vec<NameCount>> {
        deadline(
            sqlx::query_as::<_, NameCount>(
                "
                SELECT country AS name, COUNT(*) AS count FROM article_views
                WHERE view_date >= ? AND country != ''
                GROUP BY country
                ORDER BY count DESC, name
                LIMIT 10
                ",
            )
            .bind(window_start(days))
            .fetch_all(self),
        )
        .await
    }

    async fn view_trend(&self, days: i64) -> Result<Vec<DailyCount>> {
        deadline(
            sqlx::query_as::<_, DailyCount>(
                "
                SELECT view_date AS date, COUNT(*) AS count FROM article_views
                WHERE view_date >= ?
                GROUP BY view_date
                ORDER BY view_date
                ",
            )
            .bind(window_start(days))
            .fetch_all(self),
        )
        .await
    }

    async fn view_by_city(&self, days: i64) -> Result<Vec<CityCount>> {
        deadline(
            sqlx::query_as::<_, CityCount>(
                "
                SELECT country, city, region, COUNT(*) AS count FROM article_views
                WHERE view_date >= ? AND city != ''
                GROUP BY country, city, region
                ORDER BY count DESC, city
                LIMIT 20
                ",
            )
            .bind(window_start(days))
            .fetch_all(self),
        )
        .await
    }

    async fn view_by_ip(&self, days: i64) -> Result<Vec<IpCount>> {
        deadline(
            sqlx::query_as::<_, IpCount>(
                "
                SELECT ip, country, city, region, COUNT(*) AS count,
                       MIN(view_date) AS first_visit, MAX(view_date) AS last_visit
                FROM article_views
                WHERE view_date >= ?
                GROUP BY ip, country, city, region
                ORDER BY count DESC, ip
                LIMIT 20
                ",
            )
            .bind(window_start(days))
            .fetch_all(self),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        content::{PassageStatus, Visibility},
        storage::{PassageStore, testing::temp_pool},
    };

    fn view(passage_id: i64, ip: &str, country: &str, city: &str, date: &str) -> NewView {
        NewView {
            passage_id,
            ip: ip.to_string(),
            user_agent: "test".to_string(),
            country: country.to_string(),
            city: city.to_string(),
            region: String::new(),
            view_date: date.to_string(),
            view_time: Utc::now(),
        }
    }

    #[test]
    fn test_window_start() {
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        assert_eq!(window_start(1), today);
        assert_eq!(window_start(0), today);
        assert!(window_start(30) < today);
    }

    #[tokio::test]
    async fn test_aggregates() {
        let (_dir, pool) = temp_pool().await;
        let today = window_start(1);

        for v in [
            view(1, "203.0.113.1", "美国", "纽约", &today),
            view(1, "203.0.113.1", "美国", "纽约", &today),
            view(1, "198.51.100.2", "日本", "东京", &today),
            view(2, "198.51.100.3", "", "", &today),
            view(1, "198.51.100.9", "美国", "纽约", "2000-01-01"),
        ] {
            pool.record_view(&v).await.expect("写入失败");
        }

        let sources = pool.view_sources(30).await.expect("查询失败");
        assert_eq!(sources[0].name, "美国");
        assert_eq!(sources[0].count, 2);
        assert_eq!(sources.len(), 2, "空国家不计入");

        let trend = pool.view_trend(30).await.expect("查询失败");
        assert_eq!(trend.len(), 1);
        assert_eq!(trend[0].count, 4);

        let cities = pool.view_by_city(30).await.expect("查询失败");
        assert_eq!(cities[0].city, "纽约");

        let ips = pool.view_by_ip(30).await.expect("查询失败");
        assert_eq!(ips[0].ip, "203.0.113.1");
        assert_eq!(ips[0].count, 2);
        assert_eq!(ips[0].first_visit, today);

        let stats = pool.article_stats(1, 7).await.expect("查询失败");
        assert_eq!(stats.total_views, 4);
        assert_eq!(stats.window_views, 3);
        assert_eq!(stats.unique_visitors, 2);
        assert_eq!(stats.top_countries.len(), 2);

        assert_eq!(pool.article_views(1, 2).await.expect("查询失败").len(), 2);
    }

    #[tokio::test]
    async fn test_most_viewed_only_published() {
        let (_dir, pool) = temp_pool().await;
        let now = Utc::now();

        let mut ids = Vec::new();
        for (title, status) in [("a", PassageStatus::Published), ("b", PassageStatus::Draft)] {
            let p = crate::content::Passage {
                id: 0,
                title: title.into(),
                content: String::new(),
                original_content: String::new(),
                summary: String::new(),
                author: "管理员".into(),
                category: "未分类".into(),
                status,
                visibility: Visibility::Public,
                show_title: true,
                is_scheduled: false,
                published_at: None,
                file_path: format!("2025/01/01/{title}"),
                created_at: now,
                updated_at: now,
            };
            ids.push(pool.create_passage(&p).await.expect("插入失败"));
        }

        let today = window_start(1);
        for id in &ids {
            pool.record_view(&view(*id, "203.0.113.5", "", "", &today))
                .await
                .expect("写入失败");
        }

        let top = pool.most_viewed(10).await.expect("查询失败");
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].title, "a");
        assert_eq!(top[0].view_count, 1);
    }
}
