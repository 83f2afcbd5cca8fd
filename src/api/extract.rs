use std::{convert::Infallible, net::SocketAddr};

use axum::{
    extract::{
        ConnectInfo, FromRef, FromRequest, FromRequestParts,
        rejection::{JsonRejection, PathRejection},
    },
    http::{header, request::Parts},
};
use axum_extra::extract::{CookieJar, QueryRejection};

use crate::{
    auth::{AuthService, Claims},
    content::Role,
    error::Error,
    service::ClientInfo,
};

/// 保存令牌的 cookie 名
pub const AUTH_COOKIE: &str = "auth_token";

/// JSON 请求体，解析失败时返回 400
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::validation(rejection.body_text())
    }
}

/// 路径参数，解析失败时返回 400
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(Error))]
pub struct ApiPath<T>(pub T);

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Error::validation(rejection.body_text())
    }
}

/// 查询参数，解析失败时返回 400
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum_extra::extract::Query), rejection(Error))]
pub struct ApiQuery<T>(pub T);

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::validation(rejection.body_text())
    }
}

/// 当前调用者，未登录或令牌无效时为匿名
#[derive(Debug, Clone)]
pub struct Caller(pub Option<Claims>);

impl Caller {
    pub fn role(&self) -> Option<Role> {
        self.0.as_ref().map(|c| c.role)
    }
}

impl<S> FromRequestParts<S> for Caller
where
    AuthService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthService::from_ref(state);
        let claims = token_of(parts).and_then(|token| auth.verify(&token).ok());
        Ok(Caller(claims))
    }
}

/// 已登录的调用者
#[derive(Debug, Clone)]
pub struct SignedIn(pub Claims);

impl<S> FromRequestParts<S> for SignedIn
where
    AuthService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = token_of(parts).ok_or(Error::Unauthorized("请先登录"))?;
        AuthService::from_ref(state).verify(&token).map(SignedIn)
    }
}

/// 管理员，未登录返回 401，权限不足返回 403
#[derive(Debug, Clone)]
pub struct AdminCaller(pub Claims);

impl<S> FromRequestParts<S> for AdminCaller
where
    AuthService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let SignedIn(claims) = SignedIn::from_request_parts(parts, state).await?;
        if !claims.role.at_least(Role::Admin) {
            return Err(Error::Forbidden("需要管理员权限"));
        }
        Ok(AdminCaller(claims))
    }
}

/// 客户端地址和 User-Agent
#[derive(Debug, Clone)]
pub struct Client(pub ClientInfo);

impl<S> FromRequestParts<S> for Client
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Client(ClientInfo::from_headers(&parts.headers, remote)))
    }
}

/// 先取 `Authorization: Bearer`，再取 cookie
fn token_of(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(&parts.headers)
        .get(AUTH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}
