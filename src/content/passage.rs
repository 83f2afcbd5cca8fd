use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// 未指定作者时的默认值
pub const DEFAULT_AUTHOR: &str = "管理员";

/// 未指定分类时的默认值，不出现在公开分类列表中
pub const DEFAULT_CATEGORY: &str = "未分类";

/// 文章状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PassageStatus {
    #[default]
    Draft,
    Published,
    Pending,
    /// 回收站
    Deleted,
}

/// 文章可见范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// 文章
///
/// `original_content` 是正文的唯一来源，`content` 总是由
/// `(original_content, show_title)` 渲染得到。
/// `file_path` 为 markdown 目录下不带扩展名的相对路径，形如 `2025/01/15/Hello`。
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Passage {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub original_content: String,
    pub summary: String,
    pub author: String,
    pub category: String,
    pub status: PassageStatus,
    pub visibility: Visibility,
    pub show_title: bool,
    pub is_scheduled: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Passage {
    /// 是否对匿名读者完全公开
    pub fn is_public(&self) -> bool {
        self.status == PassageStatus::Published && self.visibility == Visibility::Public
    }

    /// 创建时间对应的本地日期
    pub fn created_local(&self) -> DateTime<Local> {
        self.created_at.with_timezone(&Local)
    }
}
