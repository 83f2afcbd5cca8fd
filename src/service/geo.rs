use std::{collections::BTreeMap, net::IpAddr, path::Path};

use maxminddb::{Reader, geoip2};

/// IP 对应的地理位置，未知时为空串
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub country: String,
    pub city: String,
    pub region: String,
}

/// 基于本地 GeoLite2 City 数据库的地理位置查询
///
/// 数据库不可用时所有查询返回空的 [`Location`]。
#[derive(Default)]
pub struct GeoLocator {
    reader: Option<Reader<Vec<u8>>>,
}

impl GeoLocator {
    /// 打开数据库，失败时记录警告并退化为空查询
    pub fn open(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            tracing::warn!("geoip database not configured, locations will be empty");
            return Self::disabled();
        };
        match Reader::open_readfile(path) {
            Ok(reader) => {
                tracing::info!(path = %path.display(), "geoip database loaded");
                Self {
                    reader: Some(reader),
                }
            }
            Err(e) => {
                tracing::warn!(%e, path = %path.display(), "failed to open geoip database");
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { reader: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.reader.is_some()
    }

    /// 查询 IP 的国家、城市和一级行政区，优先使用中文名
    pub fn lookup(&self, ip: IpAddr) -> Location {
        let Some(reader) = &self.reader else {
            return Location::default();
        };

        let city: geoip2::City = match reader.lookup(ip) {
            Ok(city) => city,
            Err(e) => {
                tracing::debug!(%e, %ip, "geoip lookup missed");
                return Location::default();
            }
        };

        Location {
            country: city
                .country
                .and_then(|c| c.names)
                .map(|n| pick_name(&n))
                .unwrap_or_default(),
            city: city
                .city
                .and_then(|c| c.names)
                .map(|n| pick_name(&n))
                .unwrap_or_default(),
            region: city
                .subdivisions
                .and_then(|s| s.into_iter().next())
                .and_then(|s| s.names)
                .map(|n| pick_name(&n))
                .unwrap_or_default(),
        }
    }
}

fn pick_name(names: &BTreeMap<&str, &str>) -> String {
    names
        .get("zh-CN")
        .or_else(|| names.get("en"))
        .map(|s| s.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_returns_empty() {
        let geo = GeoLocator::open(None);
        assert!(!geo.is_enabled());
        assert_eq!(geo.lookup("8.8.8.8".parse().expect("ip")), Location::default());
    }

    #[test]
    fn test_missing_file_degrades() {
        let geo = GeoLocator::open(Some(Path::new("/nonexistent/GeoLite2-City.mmdb")));
        assert!(!geo.is_enabled());
    }

    #[test]
    fn test_pick_name_prefers_chinese() {
        let names = BTreeMap::from([("en", "Tokyo"), ("zh-CN", "东京")]);
        assert_eq!(pick_name(&names), "东京");
        let names = BTreeMap::from([("en", "Paris"), ("fr", "Paris")]);
        assert_eq!(pick_name(&names), "Paris");
        assert_eq!(pick_name(&BTreeMap::new()), "");
    }
}
