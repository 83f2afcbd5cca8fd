use chrono::Utc;
use sqlx::QueryBuilder;

use super::{DBPool, UserChanges, deadline};
use crate::{
    content::{Role, User, UserStatus},
    error::Result,
};

macro_rules! user_columns {
    () => {
        "id, username, email, password, role, status, created_at, updated_at"
    };
}

/// 用户的持久化接口
pub trait UserStore {
    /// `password` 为哈希串
    fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> impl Future<Output = Result<i64>> + Send;

    fn get_user(&self, id: i64) -> impl Future<Output = Result<Option<User>>> + Send;

    fn get_user_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<User>>> + Send;

    fn get_user_by_email(&self, email: &str) -> impl Future<Output = Result<Option<User>>> + Send;

    fn list_users(&self, limit: i64, offset: i64) -> impl Future<Output = Result<Vec<User>>> + Send;

    fn count_users(&self) -> impl Future<Output = Result<i64>> + Send;

    /// 只更新 [`UserChanges`] 中出现的字段，没有字段时不执行任何语句
    fn update_user_partial(
        &self,
        id: i64,
        changes: &UserChanges,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn delete_user(&self, id: i64) -> impl Future<Output = Result<bool>> + Send;
}

impl UserStore for DBPool {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<i64> {
        let now = Utc::now();
        let result = deadline(
            sqlx::query(
                "
                INSERT INTO users (username, email, password, role, status, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(username)
            .bind(email)
            .bind(password)
            .bind(role)
            .bind(UserStatus::Active)
            .bind(now)
            .bind(now)
            .execute(self),
        )
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        deadline(
            sqlx::query_as::<_, User>(concat!(
                "SELECT ",
                user_columns!(),
                " FROM users WHERE id = ?"
            ))
            .bind(id)
            .fetch_optional(self),
        )
        .await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        deadline(
            sqlx::query_as::<_, User>(concat!(
                "SELECT ",
                user_columns!(),
                " FROM users WHERE username = ?"
            ))
            .bind(username)
            .fetch_optional(self),
        )
        .await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        deadline(
            sqlx::query_as::<_, User>(concat!(
                "SELECT ",
                user_columns!(),
                " FROM users WHERE email = ?"
            ))
            .bind(email)
            .fetch_optional(self),
        )
        .await
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
        deadline(
            sqlx::query_as::<_, User>(concat!(
                "SELECT ",
                user_columns!(),
                " FROM users ORDER BY id LIMIT ? OFFSET ?"
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(self),
        )
        .await
    }

    async fn count_users(&self) -> Result<i64> {
        deadline(sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(self)).await
    }

    async fn update_user_partial(&self, id: i64, changes: &UserChanges) -> Result<bool> {
        if changes.is_empty() {
            return Ok(false);
        }

        let mut builder = QueryBuilder::<sqlx::Sqlite>::new("UPDATE users SET updated_at = ");
        builder.push_bind(Utc::now());
        if let Some(username) = &changes.username {
            builder.push(", username = ").push_bind(username.clone());
        }
        if let Some(password) = &changes.password {
            builder.push(", password = ").push_bind(password.clone());
        }
        if let Some(email) = &changes.email {
            builder.push(", email = ").push_bind(email.clone());
        }
        if let Some(role) = changes.role {
            builder.push(", role = ").push_bind(role);
        }
        if let Some(status) = changes.status {
            builder.push(", status = ").push_bind(status);
        }
        builder.push(" WHERE id = ").push_bind(id);

        let result = deadline(builder.build().execute(self)).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: i64) -> Result<bool> {
        let result = deadline(sqlx::query("DELETE FROM users WHERE id = ?").bind(id).execute(self))
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
