//! markdown 文件镜像
//!
//! 文件位于 `<root>/YYYY/MM/DD/<文件名>.md`，内容为 `# <标题>\n\n<正文>`。
//! 镜像本身不保存状态，所有路径参数都是不带扩展名的相对路径。

mod path;

use std::{
    fs, io,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Local, Utc};
use walkdir::WalkDir;

use crate::render::extract_title;

pub use self::path::{
    collision_suffix, date_dir, date_of_path, is_safe_relative, loose_title, path_for,
    sanitize_title,
};

const EXT: &str = "md";

/// 解析后的 markdown 文件
#[derive(Debug, Clone)]
pub struct MarkdownDoc {
    pub title: String,
    /// 文件全文
    pub body: String,
    pub modified: DateTime<Utc>,
}

impl MarkdownDoc {
    /// 去掉写入时追加的 `# <标题>\n\n` 后的正文
    pub fn content(&self) -> &str {
        let header = format!("# {}\n\n", self.title);
        self.body.strip_prefix(&header).unwrap_or(&self.body)
    }
}

/// markdown 目录
#[derive(Debug, Clone)]
pub struct MarkdownMirror {
    root: Arc<Path>,
}

impl MarkdownMirror {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: Arc::from(root.as_ref()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 相对路径对应的文件
    pub fn file_of(&self, file_path: &str) -> PathBuf {
        self.root.join(format!("{file_path}.{EXT}"))
    }

    pub fn exists(&self, file_path: &str) -> bool {
        self.file_of(file_path).is_file()
    }

    /// 在 `base` 已被占用时追加时间后缀，直到得到未被占用的路径
    ///
    /// 同一秒内多次冲突时再追加序号。
    pub fn unique_path(&self, base: &str, now: DateTime<Local>) -> String {
        self.unique_path_by(base, now, |_| false)
    }

    /// 同 [`MarkdownMirror::unique_path`]，`taken` 返回 `true` 的路径也视为占用
    pub fn unique_path_by(
        &self,
        base: &str,
        now: DateTime<Local>,
        taken: impl Fn(&str) -> bool,
    ) -> String {
        let occupied = |path: &str| self.exists(path) || taken(path);
        if !occupied(base) {
            return base.to_string();
        }
        let stamped = format!("{base}{}", collision_suffix(now));
        if !occupied(&stamped) {
            return stamped;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{stamped}-{n}");
            if !occupied(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// 按 URL 中的路径段查找文件，返回相对路径
    ///
    /// 先直接匹配，不存在时列出当天目录，按 [`loose_title`] 比较文件名。
    pub async fn resolve_by_url(&self, segment: &str) -> io::Result<Option<String>> {
        let segment = segment.trim_matches('/');
        let segment = segment.strip_suffix(".md").unwrap_or(segment);
        if !is_safe_relative(segment) {
            return Ok(None);
        }

        let this = self.clone();
        let segment = segment.to_string();
        blocking(move || this.resolve_sync(&segment)).await
    }

    fn resolve_sync(&self, segment: &str) -> io::Result<Option<String>> {
        if self.exists(segment) {
            return Ok(Some(segment.to_string()));
        }

        let Some((dir, title)) = segment.rsplit_once('/') else {
            return Ok(None);
        };
        let wanted = loose_title(title);
        let entries = match fs::read_dir(self.root.join(dir)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut matched = None;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if loose_title(stem) == wanted {
                matched = Some(format!("{dir}/{stem}"));
                break;
            }
        }
        Ok(matched)
    }

    /// 写入 `# <title>\n\n<body>`
    ///
    /// 先写入同目录的临时文件再替换目标文件，目录不存在时创建。
    pub async fn write(&self, file_path: &str, title: &str, body: &str) -> io::Result<()> {
        let target = self.file_of(file_path);
        let content = format!("# {title}\n\n{body}");
        blocking(move || write_atomic(&target, content.as_bytes())).await
    }

    /// 重命名文件，返回实际使用的相对路径
    ///
    /// `to` 已被占用时按 [`MarkdownMirror::unique_path`] 追加后缀。
    /// 重命名失败时先写出新文件再删除旧文件，旧文件删除失败只记录警告。
    pub async fn rename(&self, from: &str, to: &str, now: DateTime<Local>) -> io::Result<String> {
        let this = self.clone();
        let from = from.to_string();
        let to = to.to_string();
        blocking(move || this.rename_sync(&from, &to, now)).await
    }

    fn rename_sync(&self, from: &str, to: &str, now: DateTime<Local>) -> io::Result<String> {
        let target = self.unique_path(to, now);
        let (src, dst) = (self.file_of(from), self.file_of(&target));
        if let Some(dir) = dst.parent() {
            fs::create_dir_all(dir)?;
        }

        if let Err(e) = fs::rename(&src, &dst) {
            tracing::warn!(%e, from, to = %target, "rename failed, falling back to copy");
            copy_then_remove(&src, &dst)?;
        }
        Ok(target)
    }

    /// 删除文件，文件不存在时返回 `false`
    pub async fn delete(&self, file_path: &str) -> io::Result<bool> {
        let target = self.file_of(file_path);
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 读取并解析文件
    pub async fn parse(&self, file_path: &str) -> io::Result<MarkdownDoc> {
        let target = self.file_of(file_path);
        let body = tokio::fs::read_to_string(&target).await?;
        let modified = tokio::fs::metadata(&target).await?.modified()?;
        Ok(MarkdownDoc {
            title: extract_title(&body),
            body,
            modified: DateTime::<Utc>::from(modified),
        })
    }

    /// 列出目录下所有 markdown 文件的相对路径，按路径排序
    pub async fn list(&self) -> io::Result<Vec<String>> {
        let root = self.root.clone();
        blocking(move || {
            if !root.exists() {
                return Ok(Vec::new());
            }
            let mut paths = Vec::new();
            for entry in WalkDir::new(&root).sort_by_file_name() {
                let entry = entry.map_err(io::Error::other)?;
                let path = entry.path();
                if !entry.file_type().is_file()
                    || path.extension().and_then(|e| e.to_str()) != Some(EXT)
                {
                    continue;
                }
                let Ok(rel) = path.with_extension("").strip_prefix(&root).map(Path::to_path_buf)
                else {
                    continue;
                };
                let rel = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                paths.push(rel);
            }
            Ok(paths)
        })
        .await
    }
}

/// 先完整写出 `dst` 再删除 `src`，`src` 删除失败只记录警告
fn copy_then_remove(src: &Path, dst: &Path) -> io::Result<()> {
    let data = fs::read(src)?;
    write_atomic(dst, &data)?;
    if let Err(e) = fs::remove_file(src) {
        tracing::warn!(%e, from = %src.display(), "failed to remove old file after copy");
    }
    Ok(())
}

fn write_atomic(target: &Path, data: &[u8]) -> io::Result<()> {
    let dir = target
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "file has no parent"))?;
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(io::Error::other)?
}
