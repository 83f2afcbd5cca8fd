use chrono::{DateTime, Local, NaiveDate};

use crate::render::UNTITLED;

/// 文件名中不允许出现的字符
const RESERVED: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// 将标题转换为文件名
///
/// 保留字符替换为 `_` 后去掉首尾空白，结果为空时使用 [`UNTITLED`]。
pub fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| if RESERVED.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// 按创建日期生成相对路径 `YYYY/MM/DD/<文件名>`，不带扩展名
pub fn path_for(title: &str, created_at: DateTime<Local>) -> String {
    format!("{}/{}", date_dir(created_at), sanitize_title(title))
}

pub fn date_dir(at: DateTime<Local>) -> String {
    at.format("%Y/%m/%d").to_string()
}

/// 冲突时追加的后缀 `-YYYYMMDD-HHMMSS`
pub fn collision_suffix(now: DateTime<Local>) -> String {
    now.format("-%Y%m%d-%H%M%S").to_string()
}

/// 宽松比较用的标题形式：小写并去掉所有非字母数字字符
pub fn loose_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// 从相对路径的日期目录解析日期，如 `2025/01/15/Hello` 得到 2025-01-15
pub fn date_of_path(file_path: &str) -> Option<NaiveDate> {
    let mut parts = file_path.split('/');
    let y: i32 = parts.next()?.parse().ok()?;
    let m: u32 = parts.next()?.parse().ok()?;
    let d: u32 = parts.next()?.parse().ok()?;
    parts.next()?;
    NaiveDate::from_ymd_opt(y, m, d)
}

/// 相对路径是否安全：非空、不含 `..`、不是绝对路径
pub fn is_safe_relative(file_path: &str) -> bool {
    !file_path.is_empty()
        && !file_path.starts_with('/')
        && !file_path.contains('\\')
        && file_path.split('/').all(|p| !p.is_empty() && p != "." && p != "..")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_sanitize_reserved_chars() {
        assert_eq!(sanitize_title(r#"a/b\c:d*e?f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_title("  Hello  "), "Hello");
        assert_eq!(sanitize_title("   "), UNTITLED);
        assert_eq!(sanitize_title(""), UNTITLED);
    }

    #[test]
    fn test_path_for_uses_local_date() {
        let at = Local.with_ymd_and_hms(2026, 1, 15, 10, 30, 12).unwrap();
        assert_eq!(path_for("Hi", at), "2026/01/15/Hi");
        assert_eq!(collision_suffix(at), "-20260115-103012");
    }

    #[test]
    fn test_loose_title() {
        assert_eq!(loose_title("Hello, World!"), "helloworld");
        assert_eq!(loose_title("Rust 入门_2"), "rust入门2");
    }

    #[test]
    fn test_date_of_path() {
        assert_eq!(
            date_of_path("2025/01/15/Hello"),
            NaiveDate::from_ymd_opt(2025, 1, 15)
        );
        assert_eq!(date_of_path("2025/13/15/Hello"), None);
        assert_eq!(date_of_path("notes/Hello"), None);
        assert_eq!(date_of_path("2025/01/15"), None);
    }

    #[test]
    fn test_safe_relative() {
        assert!(is_safe_relative("2025/01/15/Hello"));
        assert!(!is_safe_relative("../etc/passwd"));
        assert!(!is_safe_relative("/abs"));
        assert!(!is_safe_relative("a//b"));
        assert!(!is_safe_relative(""));
    }
}
