use serde::Deserialize;

/// 客户端提交的标签列表
///
/// 可以是逗号分隔的字符串、JSON 数组字符串，也可以直接是 JSON 数组。
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagInput {
    Text(String),
    List(Vec<String>),
}

impl TagInput {
    /// 规范化后的标签名：去空白、去空、去重，保持首次出现的顺序
    pub fn names(&self) -> Vec<String> {
        match self {
            TagInput::Text(s) => parse_tag_names(s),
            TagInput::List(list) => normalize(list.iter().map(String::as_str)),
        }
    }
}

impl Default for TagInput {
    fn default() -> Self {
        TagInput::Text(String::new())
    }
}

/// 解析标签字符串
///
/// 以 `[` 开头时先尝试按 JSON 数组解码，失败则退回逗号分隔。
pub fn parse_tag_names(input: &str) -> Vec<String> {
    let trimmed = input.trim();
    if trimmed.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
            return normalize(list.iter().map(String::as_str));
        }
    }
    normalize(trimmed.split(','))
}

fn normalize<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names.map(str::trim).filter(|n| !n.is_empty()) {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comma_separated() {
        assert_eq!(parse_tag_names("go, systems,,go , "), vec!["go", "systems"]);
    }

    #[test]
    fn test_json_array_string() {
        assert_eq!(
            parse_tag_names(r#"["rust", " web ", "rust", ""]"#),
            vec!["rust", "web"]
        );
    }

    #[test]
    fn test_broken_json_falls_back_to_comma() {
        assert_eq!(parse_tag_names("[a, b"), vec!["[a", "b"]);
    }

    #[test]
    fn test_empty_means_no_tags() {
        assert!(parse_tag_names("").is_empty());
        assert!(parse_tag_names("  ,  ").is_empty());
    }

    #[test]
    fn test_tag_input_variants() {
        let text: TagInput = serde_json::from_str(r#""a,b""#).expect("解析失败");
        assert_eq!(text.names(), vec!["a", "b"]);

        let list: TagInput = serde_json::from_str(r#"["b", "a", "b"]"#).expect("解析失败");
        assert_eq!(list.names(), vec!["b", "a"]);
    }

    #[test]
    fn test_case_sensitive() {
        assert_eq!(parse_tag_names("Rust,rust"), vec!["Rust", "rust"]);
    }
}
