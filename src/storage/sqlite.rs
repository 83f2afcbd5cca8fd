use std::{path::Path, str::FromStr, time::Duration};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::config::Config;

/// 数据库连接池类型
pub type DBPool = sqlx::SqlitePool;

/// 内置建表语句
const SCHEMA: &str = include_str!("schema.sql");

/// 按配置初始化数据库连接池并建表
pub async fn init_db(config: &Config) -> Result<DBPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?;
    if let Some(dir) = options.get_filename().parent() {
        std::fs::create_dir_all(dir)?;
    }
    let pool = new_db_pool(options, config.db_max_connections).await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// 打开指定路径的数据库文件，不存在时创建
pub async fn open(path: impl AsRef<Path>) -> Result<DBPool, sqlx::Error> {
    let options = SqliteConnectOptions::new().filename(path.as_ref());
    new_db_pool(options, 4).await
}

/// 根据连接选项创建新的数据库连接池
///
/// 连接池配置：
///
/// - 最大空闲时间 60 秒
/// - 最大生存时间 1500 秒（约 25 分钟）
/// - 获取连接超时 2 秒
/// - 获取前测试连接
/// - 写锁等待 5 秒
async fn new_db_pool(
    options: SqliteConnectOptions,
    max_connections: u32,
) -> Result<DBPool, sqlx::Error> {
    let options = options
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .idle_timeout(Duration::from_secs(60))
        .max_lifetime(Duration::from_secs(1500))
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(2))
        .test_before_acquire(true)
        .connect_with(options)
        .await
}

/// 执行内置的建表语句
///
/// 按 `;` 分割，每条 SQL 单独执行，语句均为 `IF NOT EXISTS`，可重复调用。
pub async fn migrate(db: &DBPool) -> Result<(), sqlx::Error> {
    for sql in SCHEMA.split(';') {
        if sql.trim().is_empty() {
            continue;
        }
        sqlx::query(sql).execute(db).await?;
    }
    Ok(())
}
