//! 登录密码的会话加密
//!
//! 客户端先申请一个会话拿到服务端 P-256 公钥，再用自己的临时密钥做 ECDH，
//! 以共享密钥的 X 坐标作为 AES-256-GCM 密钥加密密码。
//! 载荷为 `base64(nonce(12) ‖ 密文)`。

use std::{collections::HashMap, fmt::Write, sync::Arc, time::Duration};

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use p256::{
    PublicKey, SecretKey,
    ecdh::diffie_hellman,
    pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding},
};
use rand::{RngCore, rngs::OsRng};
use serde::Serialize;
use tokio::{sync::RwLock, task::JoinHandle};

use crate::error::{Error, Result};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// 返回给客户端的会话信息
#[derive(Debug, Clone, Serialize)]
pub struct SessionHandle {
    pub session_id: String,
    /// SPKI PEM
    pub public_key: String,
    pub expires_at: DateTime<Utc>,
}

struct Session {
    secret: SecretKey,
    expires_at: DateTime<Utc>,
}

/// 进程内的会话表，按过期时间淘汰
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: chrono::Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(1)),
        }
    }

    pub async fn create(&self) -> Result<SessionHandle> {
        let secret = SecretKey::random(&mut OsRng);
        let public_key = secret
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::Internal(format!("公钥编码失败: {e}")))?;
        let session_id = random_id();
        let expires_at = Utc::now() + self.ttl;

        self.sessions
            .write()
            .await
            .insert(session_id.clone(), Session { secret, expires_at });

        Ok(SessionHandle {
            session_id,
            public_key,
            expires_at,
        })
    }

    /// 解密客户端提交的密文
    pub async fn decrypt(
        &self,
        session_id: &str,
        client_public_key: &str,
        payload: &str,
    ) -> Result<String> {
        let secret = {
            let sessions = self.sessions.read().await;
            let session = sessions
                .get(session_id)
                .ok_or(Error::Session("会话不存在"))?;
            if session.expires_at <= Utc::now() {
                return Err(Error::Session("会话已过期"));
            }
            session.secret.clone()
        };

        let client = PublicKey::from_public_key_pem(client_public_key.trim())
            .map_err(|_| Error::Session("客户端公钥无效"))?;
        let shared = diffie_hellman(secret.to_nonzero_scalar(), client.as_affine());
        let cipher = Aes256Gcm::new_from_slice(shared.raw_secret_bytes().as_slice())
            .map_err(|_| Error::Session("密钥长度无效"))?;

        let data = STANDARD
            .decode(payload.trim())
            .map_err(|_| Error::Session("密文不是有效的 base64"))?;
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::Session("密文过短"));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plain = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Session("解密失败"))?;
        String::from_utf8(plain).map_err(|_| Error::Session("明文不是有效的 UTF-8"))
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// 淘汰过期会话，返回淘汰数量
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }

    /// 定期淘汰过期会话
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = self.sweep().await;
                if evicted > 0 {
                    tracing::debug!(evicted, "expired sessions evicted");
                }
            }
        })
    }
}

fn random_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(32), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}
