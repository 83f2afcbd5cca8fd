//! 登录、注册与令牌

mod password;
mod session;
mod token;

use std::sync::Arc;

use serde::Deserialize;

pub use self::{
    password::{hash_password, verify_password},
    session::{SessionHandle, SessionStore},
    token::{Claims, ISSUER, TokenKeys},
};
use crate::{
    content::{PROTECTED_USERNAME, Role, User, UserStatus},
    error::{Error, Result},
    storage::{DBPool, UserStore},
};

#[cfg(test)]
pub(crate) use self::session::testing::encrypt_for;

/// 密码可以明文提交，也可以经会话加密后提交
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PasswordField {
    pub password: Option<String>,
    pub encrypted_password: Option<String>,
    pub session_id: Option<String>,
    pub client_public_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    #[serde(flatten)]
    pub password: PasswordField,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    #[serde(flatten)]
    pub password: PasswordField,
}

/// 登录或注册成功的结果
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub token: String,
    pub user: User,
}

/// 认证服务
#[derive(Clone)]
pub struct AuthService {
    pool: DBPool,
    keys: TokenKeys,
    sessions: Arc<SessionStore>,
}

impl AuthService {
    pub fn new(pool: DBPool, keys: TokenKeys, sessions: Arc<SessionStore>) -> Self {
        Self {
            pool,
            keys,
            sessions,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        self.keys.verify(token)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<Authenticated> {
        let username = req.username.trim();
        if username.is_empty() {
            return Err(Error::validation("用户名不能为空"));
        }
        let password = self.password_of(req.password).await?;

        let Some(user) = self.pool.get_user_by_username(username).await? else {
            return Err(Error::Unauthorized("用户名或密码错误"));
        };
        if !verify_password(&password, &user.password).await? {
            tracing::info!(username, "login rejected");
            return Err(Error::Unauthorized("用户名或密码错误"));
        }
        if user.status != UserStatus::Active {
            return Err(Error::Forbidden("账号已被限制或封禁"));
        }

        tracing::info!(user_id = user.id, "login succeeded");
        Ok(Authenticated {
            token: self.keys.issue(&user)?,
            user,
        })
    }

    /// 注册普通用户
    pub async fn register(&self, req: RegisterRequest) -> Result<Authenticated> {
        let username = req.username.trim().to_string();
        let email = req.email.trim().to_string();
        validate_username(&username)?;
        validate_email(&email)?;
        let password = self.password_of(req.password).await?;
        validate_password(&password)?;

        if self.pool.get_user_by_username(&username).await?.is_some() {
            return Err(Error::Conflict("用户名已存在"));
        }
        if self.pool.get_user_by_email(&email).await?.is_some() {
            return Err(Error::Conflict("邮箱已被注册"));
        }

        let hash = hash_password(&password).await?;
        let id = self
            .pool
            .create_user(&username, &email, &hash, Role::User)
            .await?;
        let user = self
            .pool
            .get_user(id)
            .await?
            .ok_or(Error::NotFound("用户"))?;

        tracing::info!(user_id = id, "user registered");
        Ok(Authenticated {
            token: self.keys.issue(&user)?,
            user,
        })
    }

    /// 不存在 `admin` 用户时用给定密码创建，返回是否创建
    pub async fn ensure_admin(&self, password: &str) -> Result<bool> {
        if self
            .pool
            .get_user_by_username(PROTECTED_USERNAME)
            .await?
            .is_some()
        {
            return Ok(false);
        }
        validate_password(password)?;
        let hash = hash_password(password).await?;
        self.pool
            .create_user(PROTECTED_USERNAME, "admin@localhost", &hash, Role::Admin)
            .await?;
        tracing::info!("bootstrap admin created");
        Ok(true)
    }

    /// 取明文密码，提交了完整的加密字段时走会话解密
    async fn password_of(&self, field: PasswordField) -> Result<String> {
        match field {
            PasswordField {
                encrypted_password: Some(payload),
                session_id: Some(session_id),
                client_public_key: Some(client_key),
                ..
            } => {
                self.sessions
                    .decrypt(&session_id, &client_key, &payload)
                    .await
            }
            PasswordField {
                password: Some(password),
                ..
            } if !password.is_empty() => Ok(password),
            _ => Err(Error::validation("密码不能为空")),
        }
    }
}

fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(3..=20).contains(&len) {
        return Err(Error::validation("用户名长度应为 3 到 20 个字符"));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::validation("用户名只能包含字母、数字和下划线"));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::validation("邮箱格式不正确"))
    }
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < 6 {
        return Err(Error::validation("密码至少 6 个字符"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::storage::{UserChanges, testing::temp_pool};

    async fn service() -> (tempfile::TempDir, AuthService) {
        let (dir, pool) = temp_pool().await;
        let auth = AuthService::new(
            pool,
            TokenKeys::new(b"test", 24),
            Arc::new(SessionStore::new(Duration::from_secs(60))),
        );
        (dir, auth)
    }

    fn plain(password: &str) -> PasswordField {
        PasswordField {
            password: Some(password.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_validators() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username("abc_123").is_ok());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(21)).is_err());

        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("@b.co").is_err());
        assert!(validate_email("a b@c.d").is_err());

        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let (_dir, auth) = service().await;
        let registered = auth
            .register(RegisterRequest {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: plain("secret1"),
            })
            .await
            .expect("注册失败");
        assert_eq!(registered.user.role, Role::User);

        let dup = auth
            .register(RegisterRequest {
                username: "alice".into(),
                email: "other@example.com".into(),
                password: plain("secret1"),
            })
            .await
            .expect_err("应冲突");
        assert!(matches!(dup, Error::Conflict(_)));

        let login = auth
            .login(LoginRequest {
                username: "alice".into(),
                password: plain("secret1"),
            })
            .await
            .expect("登录失败");
        let claims = auth.verify(&login.token).expect("令牌无效");
        assert_eq!(claims.username, "alice");

        let wrong = auth
            .login(LoginRequest {
                username: "alice".into(),
                password: plain("nope123"),
            })
            .await
            .expect_err("应失败");
        assert!(matches!(wrong, Error::Unauthorized(_)));

        let missing = auth
            .login(LoginRequest {
                username: "bob".into(),
                password: plain("secret1"),
            })
            .await
            .expect_err("应失败");
        assert!(matches!(missing, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_encrypted_login_and_banned_user() {
        let (_dir, auth) = service().await;
        assert!(auth.ensure_admin("admin-pass").await.expect("创建失败"));
        assert!(!auth.ensure_admin("admin-pass").await.expect("创建失败"));

        let handle = auth.sessions().create().await.expect("会话创建失败");
        let (client_key, payload) = encrypt_for(&handle.public_key, "admin-pass");
        let login = auth
            .login(LoginRequest {
                username: PROTECTED_USERNAME.into(),
                password: PasswordField {
                    encrypted_password: Some(payload),
                    session_id: Some(handle.session_id),
                    client_public_key: Some(client_key),
                    ..Default::default()
                },
            })
            .await
            .expect("登录失败");
        assert_eq!(login.user.role, Role::Admin);

        auth.pool
            .update_user_partial(
                login.user.id,
                &UserChanges {
                    status: Some(UserStatus::Banned),
                    ..Default::default()
                },
            )
            .await
            .expect("更新失败");
        let banned = auth
            .login(LoginRequest {
                username: PROTECTED_USERNAME.into(),
                password: plain("admin-pass"),
            })
            .await
            .expect_err("应失败");
        assert!(matches!(banned, Error::Forbidden(_)));
    }
}
