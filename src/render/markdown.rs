use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, html};

use super::{Renderer, highlight::highlight};
use crate::error::Result;

/// 本地 markdown 渲染器
///
/// - CommonMark 加 GFM 扩展（表格、删除线、任务列表、脚注）
/// - 软换行输出为 `<br />`
/// - 原样保留 HTML
/// - 代码块语法高亮
/// - `video:/` 链接转换为 `<video>` 元素
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn render(&self, markdown: &str) -> Result<String> {
        to_html(markdown)
    }
}

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_GFM
}

/// 正在收集的代码块或视频链接
enum Pending {
    Code { lang: String, code: String },
    Video { src: String },
}

fn to_html(markdown: &str) -> Result<String> {
    let mut events: Vec<Event<'_>> = Vec::new();
    let mut pending: Option<Pending> = None;

    for event in Parser::new_ext(markdown, options()) {
        pending = match (pending.take(), event) {
            (None, Event::Start(Tag::CodeBlock(kind))) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => fence_lang(&info).to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                Some(Pending::Code {
                    lang,
                    code: String::new(),
                })
            }
            (Some(Pending::Code { lang, mut code }), Event::Text(text)) => {
                code.push_str(&text);
                Some(Pending::Code { lang, code })
            }
            (Some(Pending::Code { lang, code }), Event::End(TagEnd::CodeBlock)) => {
                events.push(Event::Html(CowStr::from(highlight(&code, &lang)?)));
                None
            }
            (None, Event::Start(Tag::Link { dest_url, .. })) if is_video(&dest_url) => {
                Some(Pending::Video {
                    src: video_src(&dest_url),
                })
            }
            (Some(Pending::Video { src }), Event::End(TagEnd::Link)) => {
                events.push(Event::InlineHtml(CowStr::from(video_html(&src))));
                None
            }
            // 视频链接的文字被丢弃
            (Some(p), _) => Some(p),
            (None, Event::SoftBreak) => {
                events.push(Event::HardBreak);
                None
            }
            (None, other) => {
                events.push(other);
                None
            }
        };
    }

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());
    Ok(out)
}

/// 代码块信息串中的语言名，如 ```` ```rust,ignore ```` 取 `rust`
fn fence_lang(info: &str) -> &str {
    info.split(|c: char| c.is_whitespace() || c == ',' || c == '{')
        .next()
        .unwrap_or_default()
}

fn is_video(url: &str) -> bool {
    url.starts_with("video:/")
}

/// 去掉 `video:` 前缀，并保证以单个 `/` 开头
fn video_src(url: &str) -> String {
    let rest = url.trim_start_matches("video:").trim_start_matches('/');
    format!("/{rest}")
}

fn video_mime(src: &str) -> &'static str {
    let lower = src.to_ascii_lowercase();
    if lower.ends_with(".webm") {
        "video/webm"
    } else if lower.ends_with(".ogg") {
        "video/ogg"
    } else {
        "video/mp4"
    }
}

fn video_html(src: &str) -> String {
    format!(
        r#"<video controls style="max-width: 100%; border-radius: 8px; box-shadow: 0 4px 12px rgba(0,0,0,0.1);"><source src="{}" type="{}">您的浏览器不支持视频播放。</video>"#,
        escape_attr(src),
        video_mime(src)
    )
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
