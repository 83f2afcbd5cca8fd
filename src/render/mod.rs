//! Markdown 渲染
//!
//! [`Renderer`] 是渲染入口，[`MarkdownRenderer`] 为默认实现。

mod highlight;
mod markdown;
mod text;

pub use self::{
    markdown::MarkdownRenderer,
    text::{UNTITLED, extract_title, read_time, summary_of},
};

use crate::error::Result;

/// 将 markdown 转换为 HTML
pub trait Renderer: Send + Sync {
    fn render(&self, markdown: &str) -> Result<String>;

    /// 按 `show_title` 渲染
    ///
    /// 为 `false` 时检查第一行，以 `#` 开头则去掉该行后再转换。
    fn render_with_option(&self, markdown: &str, show_title: bool) -> Result<String> {
        if show_title {
            self.render(markdown)
        } else {
            self.render(strip_first_heading(markdown))
        }
    }
}

fn strip_first_heading(markdown: &str) -> &str {
    let (first, rest) = markdown.split_once('\n').unwrap_or((markdown, ""));
    if first.trim_start().starts_with('#') {
        rest
    } else {
        markdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 模拟 Renderer：只包裹一层 <rendered> 标签
    struct FakeRenderer;

    impl Renderer for FakeRenderer {
        fn render(&self, markdown: &str) -> Result<String> {
            Ok(format!("<rendered>{markdown}</rendered>"))
        }
    }

    #[test]
    fn test_show_title_false_drops_first_heading() {
        let html = FakeRenderer
            .render_with_option("# Hello\n\nworld", false)
            .expect("渲染失败");
        assert_eq!(html, "<rendered>\nworld</rendered>");
    }

    #[test]
    fn test_first_line_not_heading_is_kept() {
        let html = FakeRenderer
            .render_with_option("intro\n# Hello", false)
            .expect("渲染失败");
        assert_eq!(html, "<rendered>intro\n# Hello</rendered>");

        let html = FakeRenderer.render_with_option("# only", false).expect("渲染失败");
        assert_eq!(html, "<rendered></rendered>");
    }

    #[test]
    fn test_show_title_true_keeps_everything() {
        let html = FakeRenderer
            .render_with_option("# Hello\n\nworld", true)
            .expect("渲染失败");
        assert_eq!(html, "<rendered># Hello\n\nworld</rendered>");
    }
}
