use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use cookie::time::Duration;
use serde::Serialize;
use serde_json::Value;

use super::{AUTH_COOKIE, ApiJson, Success, done, extract::SignedIn};
use crate::{
    auth::{AuthService, Authenticated, Claims, LoginRequest, RegisterRequest, SessionHandle},
    content::User,
    error::Result,
    state::AppState,
};

/// cookie 有效期，天
const COOKIE_MAX_AGE_DAYS: i64 = 7;

/// 配置认证路由。
///
/// - `POST /login`、`POST /register`、`POST /logout`
/// - `GET /me`：当前令牌中的身份
/// - `POST /crypto/session`：申请密码加密会话
pub fn setup_route() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/crypto/session", post(crypto_session))
}

#[derive(Debug, Serialize)]
struct TokenBody {
    token: String,
    user: User,
}

fn auth_cookie(value: String, max_age: Duration) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

/// 令牌同时写入响应体和 cookie
fn with_cookie(
    jar: CookieJar,
    status: StatusCode,
    auth: Authenticated,
) -> (StatusCode, CookieJar, Success<TokenBody>) {
    let cookie = auth_cookie(auth.token.clone(), Duration::days(COOKIE_MAX_AGE_DAYS));
    (
        status,
        jar.add(cookie),
        Success::new(TokenBody {
            token: auth.token,
            user: auth.user,
        }),
    )
}

async fn login(
    jar: CookieJar,
    State(auth): State<AuthService>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<(StatusCode, CookieJar, Success<TokenBody>)> {
    let authenticated = auth.login(req).await?;
    Ok(with_cookie(jar, StatusCode::OK, authenticated))
}

async fn register(
    jar: CookieJar,
    State(auth): State<AuthService>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Success<TokenBody>)> {
    let authenticated = auth.register(req).await?;
    Ok(with_cookie(jar, StatusCode::CREATED, authenticated))
}

async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    let cleared = auth_cookie(String::new(), Duration::ZERO);
    (jar.add(cleared), done("已退出登录"))
}

async fn me(SignedIn(claims): SignedIn) -> Success<Claims> {
    Success::new(claims)
}

async fn crypto_session(State(auth): State<AuthService>) -> Result<Success<SessionHandle>> {
    auth.sessions().create().await.map(Success::new)
}
