use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户角色，按声明顺序递增：`user < editor < admin`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Editor,
    Admin,
}

impl Role {
    /// 角色等级，`user=1`、`editor=2`、`admin=3`
    pub fn level(self) -> u8 {
        match self {
            Role::User => 1,
            Role::Editor => 2,
            Role::Admin => 3,
        }
    }

    /// 是否具备 `required` 所要求的权限
    pub fn at_least(self, required: Role) -> bool {
        self.level() >= required.level()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Restricted,
    Banned,
}

/// 用户
///
/// `password` 保存 argon2id 哈希串，序列化时跳过。
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 约定名为 `admin` 的用户不可删除
pub const PROTECTED_USERNAME: &str = "admin";

impl User {
    pub fn is_protected(&self) -> bool {
        self.username == PROTECTED_USERNAME
    }
}
