use std::sync::LazyLock;

use syntect::{highlighting::ThemeSet, html::highlighted_html_for_string, parsing::SyntaxSet};

use crate::error::{Error, Result};

const THEME: &str = "InspiredGitHub";

static SYNTAXES: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEMES: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

/// 以 GitHub 风格高亮代码块，输出内联样式的 `<pre>`
///
/// 未知语言按纯文本处理。
pub fn highlight(code: &str, lang: &str) -> Result<String> {
    let syntax = SYNTAXES
        .find_syntax_by_token(lang)
        .unwrap_or_else(|| SYNTAXES.find_syntax_plain_text());
    let theme = THEMES
        .themes
        .get(THEME)
        .ok_or_else(|| Error::Markdown(format!("missing theme {THEME}")))?;

    highlighted_html_for_string(code, &SYNTAXES, syntax, theme)
        .map_err(|e| Error::Markdown(e.to_string()))
}
