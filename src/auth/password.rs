use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use rand::rngs::OsRng;

use crate::error::{Error, Result};

/// argon2id 哈希，随机盐，在阻塞线程中执行
pub async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_string();
    blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::Internal(format!("密码哈希失败: {e}")))
    })
    .await
}

/// 校验密码，哈希串无法解析时视为不匹配
pub async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    blocking(move || {
        let Ok(parsed) = PasswordHash::new(&hash) else {
            tracing::warn!("stored password hash is malformed");
            return Ok(false);
        };
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
}

async fn blocking<T: Send + 'static>(f: impl FnOnce() -> Result<T> + Send + 'static) -> Result<T> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hash = hash_password("secret1").await.expect("哈希失败");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("secret1", &hash).await.expect("校验失败"));
        assert!(!verify_password("secret2", &hash).await.expect("校验失败"));
    }

    #[tokio::test]
    async fn test_salt_is_random() {
        let a = hash_password("same").await.expect("哈希失败");
        let b = hash_password("same").await.expect("哈希失败");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_malformed_hash_does_not_match() {
        assert!(!verify_password("x", "plain-text").await.expect("校验失败"));
    }
}
