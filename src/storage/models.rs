use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::content::{PassageStatus, Role, UserStatus, Visibility};

/// 文章列表项
///
/// 不包含正文，`tags` 为该文章关联的标签名。
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PassageListItem {
    pub id: i64,
    pub title: String,
    pub summary: String,
    pub author: String,
    pub category: String,
    pub status: PassageStatus,
    pub visibility: Visibility,
    pub is_scheduled: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub file_path: String,
    pub tags: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 归档条目
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArchiveEntry {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// 标签
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub color: String,
    /// 仅作为元数据保存，不参与关联维护
    pub category_id: i64,
    pub sort_order: i64,
    pub usage_count: i64,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 标签的可修改字段，`None` 表示保持原值
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub category_id: Option<i64>,
    pub sort_order: Option<i64>,
    pub is_enabled: Option<bool>,
}

/// 分类
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub sort_order: i64,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub sort_order: Option<i64>,
    pub is_enabled: Option<bool>,
}

/// 用户部分更新
///
/// 只识别 `username`、`password`、`email`、`role`、`status`，其余字段在反序列化时被忽略。
/// `password` 必须已经是哈希串。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserChanges {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.password.is_none()
            && self.email.is_none()
            && self.role.is_none()
            && self.status.is_none()
    }
}

/// 待写入的访问记录
#[derive(Debug, Clone)]
pub struct NewView {
    pub passage_id: i64,
    pub ip: String,
    pub user_agent: String,
    pub country: String,
    pub city: String,
    pub region: String,
    /// 本地日期 `YYYY-MM-DD`
    pub view_date: String,
    pub view_time: DateTime<Utc>,
}

/// 访问记录
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct View {
    pub id: i64,
    pub passage_id: i64,
    pub ip: String,
    pub user_agent: String,
    pub country: String,
    pub city: String,
    pub region: String,
    pub view_date: String,
    pub view_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NameCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CityCount {
    pub country: String,
    pub city: String,
    pub region: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct IpCount {
    pub ip: String,
    pub country: String,
    pub city: String,
    pub region: String,
    pub count: i64,
    pub first_visit: String,
    pub last_visit: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MostViewed {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub view_count: i64,
}

/// 单篇文章在时间窗口内的统计
#[derive(Debug, Clone, Serialize)]
pub struct ArticleStats {
    pub passage_id: i64,
    pub days: i64,
    pub total_views: i64,
    pub window_views: i64,
    pub unique_visitors: i64,
    pub top_countries: Vec<NameCount>,
    pub top_cities: Vec<CityCount>,
    pub trend: Vec<DailyCount>,
}
