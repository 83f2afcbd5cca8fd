//! 文章访问判定
//!
//! 纯函数，不做任何 I/O。定时发布信息只展示给被拒绝的读者，不会改变文章状态。

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use super::{Passage, PassageStatus, Role, Visibility};

/// 拒绝原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Private,
    NotPublished,
    NotFound,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::Private => "private",
            DenyReason::NotPublished => "not_published",
            DenyReason::NotFound => "not_found",
        }
    }
}

/// 被拒绝时返回给读者的信息
#[derive(Debug, Clone, PartialEq)]
pub struct Denial {
    pub reason: DenyReason,
    pub status: PassageStatus,
    pub visibility: Visibility,
    pub is_scheduled: bool,
    pub published_at: Option<DateTime<Utc>>,
}

/// 访问判定结果
#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    Allowed,
    Denied(Denial),
}

impl Access {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Access::Allowed)
    }
}

/// 根据文章状态、可见性和读者角色判定是否允许访问
///
/// `role` 为 `None` 表示匿名读者。只有 `admin` 能越过状态和可见性限制。
pub fn evaluate(passage: &Passage, role: Option<Role>) -> Access {
    let is_admin = role == Some(Role::Admin);
    if is_admin {
        return Access::Allowed;
    }

    let reason = match (passage.status, passage.visibility) {
        (PassageStatus::Published, Visibility::Public) => return Access::Allowed,
        (PassageStatus::Published, Visibility::Private) => DenyReason::Private,
        (PassageStatus::Draft | PassageStatus::Pending, _) => DenyReason::NotPublished,
        (PassageStatus::Deleted, _) => DenyReason::NotFound,
    };

    Access::Denied(Denial {
        reason,
        status: passage.status,
        visibility: passage.visibility,
        is_scheduled: passage.is_scheduled,
        published_at: passage.published_at,
    })
}

impl Denial {
    pub fn message(&self) -> &'static str {
        match self.reason {
            DenyReason::Private => "该文章为私密文章",
            DenyReason::NotPublished if self.scheduled_for().is_some() => "该文章尚未到发布时间",
            DenyReason::NotPublished => "该文章尚未发布",
            DenyReason::NotFound => "文章不存在",
        }
    }

    /// 定时发布时间，仅在 `is_scheduled` 时有意义
    pub fn scheduled_for(&self) -> Option<DateTime<Utc>> {
        self.is_scheduled.then_some(self.published_at).flatten()
    }

    /// 423 响应体中的判定字段
    pub fn payload(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("reason".into(), json!(self.reason.as_str()));

        match self.reason {
            DenyReason::Private => {
                map.insert("visibility".into(), json!(self.visibility));
            }
            DenyReason::NotPublished => {
                map.insert("status".into(), json!(self.status));
                map.insert("is_scheduled".into(), json!(self.is_scheduled));
                if let Some(at) = self.scheduled_for() {
                    map.insert(
                        "published_at".into(),
                        json!(at.format("%Y-%m-%d %H:%M:%S").to_string()),
                    );
                }
            }
            DenyReason::NotFound => (),
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn passage(status: PassageStatus, visibility: Visibility) -> Passage {
        let now = Utc::now();
        Passage {
            id: 1,
            title: "t".into(),
            content: String::new(),
            original_content: String::new(),
            summary: String::new(),
            author: String::new(),
            category: String::new(),
            status,
            visibility,
            show_title: true,
            is_scheduled: false,
            published_at: None,
            file_path: "2025/01/01/t".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn reason(access: Access) -> Option<DenyReason> {
        match access {
            Access::Allowed => None,
            Access::Denied(d) => Some(d.reason),
        }
    }

    #[test]
    fn test_published_public_allowed_for_everyone() {
        let p = passage(PassageStatus::Published, Visibility::Public);
        for role in [None, Some(Role::User), Some(Role::Editor), Some(Role::Admin)] {
            assert!(evaluate(&p, role).is_allowed());
        }
    }

    #[test]
    fn test_published_private() {
        let p = passage(PassageStatus::Published, Visibility::Private);
        assert_eq!(reason(evaluate(&p, None)), Some(DenyReason::Private));
        assert_eq!(reason(evaluate(&p, Some(Role::User))), Some(DenyReason::Private));
        assert_eq!(reason(evaluate(&p, Some(Role::Editor))), Some(DenyReason::Private));
        assert!(evaluate(&p, Some(Role::Admin)).is_allowed());
    }

    #[test]
    fn test_unpublished_status_checked_before_visibility() {
        for status in [PassageStatus::Draft, PassageStatus::Pending] {
            for vis in [Visibility::Public, Visibility::Private] {
                let p = passage(status, vis);
                assert_eq!(reason(evaluate(&p, None)), Some(DenyReason::NotPublished));
                assert!(evaluate(&p, Some(Role::Admin)).is_allowed());
            }
        }
    }

    #[test]
    fn test_deleted_is_not_found_except_admin() {
        let p = passage(PassageStatus::Deleted, Visibility::Public);
        assert_eq!(reason(evaluate(&p, Some(Role::User))), Some(DenyReason::NotFound));
        assert!(evaluate(&p, Some(Role::Admin)).is_allowed());
    }

    #[test]
    fn test_scheduled_payload() {
        let mut p = passage(PassageStatus::Draft, Visibility::Public);
        p.is_scheduled = true;
        p.published_at = Some(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap());

        let Access::Denied(denial) = evaluate(&p, None) else {
            panic!("草稿应被拒绝");
        };
        let payload = denial.payload();
        assert_eq!(payload["reason"], "not_published");
        assert_eq!(payload["is_scheduled"], true);
        assert_eq!(payload["published_at"], "2099-01-01 00:00:00");
        assert_eq!(payload["status"], "draft");
    }

    #[test]
    fn test_published_at_ignored_when_not_scheduled() {
        let mut p = passage(PassageStatus::Pending, Visibility::Public);
        p.published_at = Some(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap());

        let Access::Denied(denial) = evaluate(&p, None) else {
            panic!("待审核文章应被拒绝");
        };
        assert_eq!(denial.scheduled_for(), None);
        assert!(!denial.payload().contains_key("published_at"));
    }
}
