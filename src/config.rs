use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use rand::{Rng, distributions::Alphanumeric};
use serde::Deserialize;

use crate::error::Result;

/// 指定 TOML 配置文件路径的环境变量
pub const CONFIG_ENV: &str = "PASSAGE_CONFIG";

/// 运行配置
///
/// 先取默认值，再叠加 [`CONFIG_ENV`] 指向的 TOML 文件，最后由环境变量覆盖。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: String,
    pub database_url: String,
    /// 数据根目录，markdown 文件位于 `<data_root>/markdown`
    pub data_root: PathBuf,
    pub geoip_db: Option<PathBuf>,
    pub jwt_secret: Option<String>,
    pub token_ttl_hours: i64,
    pub session_ttl_secs: u64,
    pub session_sweep_secs: u64,
    pub admin_password: Option<String>,
    pub sync_on_start: bool,
    pub db_max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            database_url: "sqlite://data/blog.db".to_string(),
            data_root: PathBuf::from("."),
            geoip_db: None,
            jwt_secret: None,
            token_ttl_hours: 24,
            session_ttl_secs: 3600,
            session_sweep_secs: 300,
            admin_password: None,
            sync_on_start: false,
            db_max_connections: 10,
        }
    }
}

impl Config {
    /// 从配置文件和环境变量加载
    pub fn load() -> Result<Self> {
        let mut config = match env::var(CONFIG_ENV) {
            Ok(path) => Self::from_toml_str(&fs::read_to_string(path)?)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// 用环境变量覆盖配置项
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PASSAGE_LISTEN") {
            self.listen = v;
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("PASSAGE_DATA_ROOT") {
            self.data_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("PASSAGE_GEOIP_DB") {
            self.geoip_db = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("JWT_SECRET").filter(|v| !v.is_empty()) {
            self.jwt_secret = Some(v);
        }
        if let Some(v) = lookup("ADMIN_PASSWORD").filter(|v| !v.is_empty()) {
            self.admin_password = Some(v);
        }
        if let Some(v) = lookup("PASSAGE_SYNC_ON_START") {
            self.sync_on_start = matches!(v.as_str(), "1" | "true" | "yes");
        }
    }

    pub fn markdown_root(&self) -> PathBuf {
        self.data_root.join("markdown")
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_secs.max(1))
    }

    /// 查找 GeoLite2 城市库
    ///
    /// 未配置时依次尝试 `<data_root>/data/GeoLite2-City.mmdb` 与 `<data_root>/GeoLite2-City.mmdb`。
    pub fn geoip_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.geoip_db {
            return Some(path.clone());
        }
        [
            self.data_root.join("data").join("GeoLite2-City.mmdb"),
            self.data_root.join("GeoLite2-City.mmdb"),
        ]
        .into_iter()
        .find(|p| p.exists())
    }

    /// JWT 签名密钥
    ///
    /// 未配置时读取 `<data_root>/data/jwt-secret`，文件不存在则随机生成并写入。
    pub fn resolve_jwt_secret(&self) -> Result<String> {
        if let Some(secret) = &self.jwt_secret {
            return Ok(secret.clone());
        }
        load_or_create_secret(&self.data_root.join("data").join("jwt-secret"))
    }
}

fn load_or_create_secret(path: &Path) -> Result<String> {
    if let Ok(secret) = fs::read_to_string(path) {
        let secret = secret.trim();
        if !secret.is_empty() {
            return Ok(secret.to_string());
        }
    }

    let secret: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, &secret)?;
    tracing::info!(path = %path.display(), "generated jwt secret");
    Ok(secret)
}
