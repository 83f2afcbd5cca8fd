/// 没有标题时使用的名称
pub const UNTITLED: &str = "未命名文档";

const SUMMARY_CHARS: usize = 200;
const CHARS_PER_MINUTE: usize = 200;

/// 取第一行以 `# ` 开头的内容作为标题
pub fn extract_title(markdown: &str) -> String {
    markdown
        .lines()
        .find_map(|line| line.trim().strip_prefix("# "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED)
        .to_string()
}

/// 从 HTML 生成纯文本摘要
///
/// 去掉标签并合并空白，超过 200 个字符时截断并追加 `...`。
pub fn summary_of(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => (),
        }
    }

    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() > SUMMARY_CHARS {
        let mut cut: String = text.chars().take(SUMMARY_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        text
    }
}

/// 预计阅读分钟数，每分钟 200 字，至少 1 分钟
pub fn read_time(text: &str) -> usize {
    (text.chars().count() / CHARS_PER_MINUTE).max(1)
}
