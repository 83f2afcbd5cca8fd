use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};

use crate::content::Denial;

pub type Result<T> = core::result::Result<T, Error>;

/// 全局错误类型
///
/// 每个变体对应一个错误码和 HTTP 状态码，参见 [`Error::code`] 与 [`Error::status`]。
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 必填字段缺失或格式错误
    #[error("{0}")]
    Validation(String),

    #[error("{0}不存在")]
    NotFound(&'static str),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    /// 访问判定拒绝，携带状态、可见性和定时发布信息
    #[error("{}", .0.message())]
    AccessDenied(Denial),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("markdown 转换失败: {0}")]
    Markdown(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    /// 查询超过 5 秒
    #[error("数据库查询超时")]
    Timeout,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("会话无效: {0}")]
    Session(&'static str),

    #[error(transparent)]
    Config(#[from] toml::de::Error),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// 错误码
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::AccessDenied(_) => "ACCESS_DENIED",
            Error::Conflict(_) => "CONFLICT",
            Error::Markdown(_) => "MARKDOWN_ERROR",
            Error::Sqlx(_) | Error::Timeout => "DB_ERROR",
            Error::Io(_) => "FS_ERROR",
            Error::Session(_) => "SESSION_ERROR",
            Error::Config(_) | Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthorized(_) | Error::Session(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::AccessDenied(_) => StatusCode::LOCKED,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Markdown(_)
            | Error::Sqlx(_)
            | Error::Timeout
            | Error::Io(_)
            | Error::Config(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 面向客户端的消息，服务端错误不暴露内部原因
    fn public_message(&self) -> String {
        match self {
            Error::Sqlx(_) | Error::Timeout => "数据库操作失败".to_string(),
            Error::Io(_) => "文件操作失败".to_string(),
            Error::Config(_) | Error::Internal(_) => "服务器内部错误".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            Error::Sqlx(e) => tracing::error!(%e, "sqlx error"),
            Error::Timeout => tracing::error!("query deadline exceeded"),
            Error::Io(e) => tracing::error!(%e, "file io error"),
            Error::Markdown(e) => tracing::error!(%e, "markdown error"),
            Error::Config(e) => tracing::error!(%e, "config error"),
            Error::Internal(e) => tracing::error!(%e, "internal error"),
            _ => (),
        }

        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(false));
        body.insert("code".into(), json!(self.code()));
        body.insert("message".into(), json!(self.public_message()));

        // 423 的判定信息平铺在顶层
        if let Error::AccessDenied(denial) = &self {
            body.extend(denial.payload());
        }

        (status, Json(Value::Object(body))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_of(e: Error) -> (StatusCode, Value) {
        let resp = e.into_response();
        let status = resp.status();
        let data = to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("读取数据失败");
        (status, serde_json::from_slice(&data).expect("反序列化失败"))
    }

    #[tokio::test]
    async fn test_validation_error_body() {
        let (status, body) = body_of(Error::validation("标题不能为空")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["message"], "标题不能为空");
    }

    #[tokio::test]
    async fn test_db_error_hides_cause() {
        let (status, body) = body_of(Error::Sqlx(sqlx::Error::RowNotFound)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "DB_ERROR");
        assert_eq!(body["message"], "数据库操作失败");

        let (_, body) = body_of(Error::Timeout).await;
        assert_eq!(body["code"], "DB_ERROR");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::NotFound("文章").status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::Session("过期").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::Conflict("用户名已存在").status(), StatusCode::CONFLICT);
        assert_eq!(Error::Markdown("x".into()).code(), "MARKDOWN_ERROR");
    }
}
