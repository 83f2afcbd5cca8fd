use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Serialize;

use super::PassageService;
use crate::{
    content::{DEFAULT_AUTHOR, DEFAULT_CATEGORY, Passage, PassageStatus, Visibility},
    error::Result,
    mirror::date_of_path,
    render::summary_of,
    storage::PassageStore,
};

/// 一次同步的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

enum Outcome {
    Created,
    Updated,
    Unchanged,
}

impl PassageService {
    /// 以 markdown 目录为准补齐数据库
    ///
    /// 没有对应行的文件以草稿插入；标题或正文不一致的行按文件更新。
    /// 单个文件失败不影响其他文件。结束后重新校准标签计数。
    pub async fn sync_all(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for file_path in self.mirror.list().await? {
            match self.sync_file(&file_path).await {
                Ok(Outcome::Created) => report.created += 1,
                Ok(Outcome::Updated) => report.updated += 1,
                Ok(Outcome::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    tracing::warn!(%e, %file_path, "failed to sync markdown file");
                    report.failed += 1;
                }
            }
        }

        if let Err(e) = self.tags.recount().await {
            tracing::warn!(%e, "failed to recount tag usage");
        }

        tracing::info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            "markdown sync finished"
        );
        Ok(report)
    }

    async fn sync_file(&self, file_path: &str) -> Result<Outcome> {
        let doc = self.mirror.parse(file_path).await?;
        let body = doc.content().to_string();

        if let Some(mut row) = self.pool.get_passage_by_file_path(file_path).await? {
            if row.title == doc.title && row.original_content == body {
                return Ok(Outcome::Unchanged);
            }
            row.content = self.renderer.render_with_option(&body, row.show_title)?;
            row.title = doc.title;
            row.original_content = body;
            row.updated_at = Utc::now();
            self.pool.update_passage(&row).await?;
            return Ok(Outcome::Updated);
        }

        let content = self.renderer.render_with_option(&body, true)?;
        let created_at = created_at_of(file_path).unwrap_or(doc.modified);
        let passage = Passage {
            id: 0,
            title: doc.title,
            summary: summary_of(&content),
            content,
            original_content: body,
            author: DEFAULT_AUTHOR.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            status: PassageStatus::Draft,
            visibility: Visibility::Public,
            show_title: true,
            is_scheduled: false,
            published_at: None,
            file_path: file_path.to_string(),
            created_at,
            updated_at: doc.modified,
        };
        self.pool.create_passage(&passage).await?;
        Ok(Outcome::Created)
    }
}

/// 日期目录对应的本地零点
fn created_at_of(file_path: &str) -> Option<DateTime<Utc>> {
    let date = date_of_path(file_path)?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
}
