//! 访问记录
//!
//! 读取文章成功后在独立任务中记录访问：取客户端 IP，过滤本地地址，
//! 查询地理位置，写入访问日志。任何一步失败都只记录日志。

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::http::HeaderMap;
use chrono::{Local, Utc};

use super::GeoLocator;
use crate::{
    error::{Error, Result},
    storage::{DBPool, NewView, ViewStore},
};

/// 记录一次访问所需的请求信息
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<IpAddr>,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap, remote: Option<SocketAddr>) -> Self {
        Self {
            ip: client_ip(headers, remote),
            user_agent: headers
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// 客户端 IP
///
/// 依次取 `X-Forwarded-For` 的第一项、`X-Real-IP`、连接的对端地址，
/// 取第一个能解析的值。
pub fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> Option<IpAddr> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .and_then(parse_ip)
        .or_else(|| header("x-real-ip").and_then(parse_ip))
        .or_else(|| remote.map(|addr| addr.ip()))
}

/// 解析可能带端口或方括号的地址
fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
        .or_else(|| {
            raw.strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .and_then(|s| s.parse().ok())
        })
}

/// 回环、私有和链路本地地址
pub fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_local_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_local_v4(v4),
            None => is_local_v6(v6),
        },
    }
}

fn is_local_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

fn is_local_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7
        || (first & 0xfe00) == 0xfc00
        // fe80::/10
        || (first & 0xffc0) == 0xfe80
}

/// 访问记录器
#[derive(Clone)]
pub struct ViewRecorder {
    pool: DBPool,
    geo: Arc<GeoLocator>,
}

impl ViewRecorder {
    pub fn new(pool: DBPool, geo: Arc<GeoLocator>) -> Self {
        Self { pool, geo }
    }

    /// 在独立任务中记录，立即返回
    pub fn record(&self, passage_id: i64, client: ClientInfo) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.record_now(passage_id, client).await {
                tracing::warn!(%e, passage_id, "failed to record view");
            }
        });
    }

    /// 记录一次访问，返回是否写入
    ///
    /// 没有 IP 或 IP 为本地地址时不写入。
    pub async fn record_now(&self, passage_id: i64, client: ClientInfo) -> Result<bool> {
        let Some(ip) = client.ip else {
            return Ok(false);
        };
        if is_local_ip(ip) {
            tracing::debug!(%ip, passage_id, "skip local view");
            return Ok(false);
        }

        let geo = self.geo.clone();
        let location = tokio::task::spawn_blocking(move || geo.lookup(ip))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        self.pool
            .record_view(&NewView {
                passage_id,
                ip: ip.to_string(),
                user_agent: client.user_agent,
                country: location.country,
                city: location.city,
                region: location.region,
                view_date: Local::now().format("%Y-%m-%d").to_string(),
                view_time: Utc::now(),
            })
            .await?;
        Ok(true)
    }
}
