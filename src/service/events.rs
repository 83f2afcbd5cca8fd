use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;

/// 文章生命周期事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum PassageEvent {
    #[serde(rename = "passage.created")]
    Created { id: i64, title: String },
    #[serde(rename = "passage.updated")]
    Updated { id: i64, title: String },
    #[serde(rename = "passage.deleted")]
    Deleted { id: i64, permanent: bool },
}

impl PassageEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PassageEvent::Created { .. } => "passage.created",
            PassageEvent::Updated { .. } => "passage.updated",
            PassageEvent::Deleted { .. } => "passage.deleted",
        }
    }
}

/// 事件的去向
///
/// 发布失败不影响触发事件的操作。
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &PassageEvent) -> Result<()>;
}

/// 只写日志的事件去向
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: &PassageEvent) -> Result<()> {
        let payload = serde_json::to_string(event).unwrap_or_default();
        tracing::info!(kind = event.kind(), %payload, "passage event");
        Ok(())
    }
}

/// 在独立任务中发布事件，不等待结果
pub fn publish_detached(sink: Arc<dyn EventSink>, event: PassageEvent) {
    tokio::spawn(async move {
        if let Err(e) = sink.publish(&event) {
            tracing::warn!(%e, kind = event.kind(), "failed to publish event");
        }
    });
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(PassageEvent::Deleted {
            id: 3,
            permanent: true,
        })
        .expect("序列化失败");
        assert_eq!(json["type"], "passage.deleted");
        assert_eq!(json["id"], 3);
        assert_eq!(json["permanent"], true);
    }

    #[tokio::test]
    async fn test_publish_detached_reaches_sink() {
        let sink = Arc::new(testing::RecordingSink::default());
        publish_detached(
            sink.clone(),
            PassageEvent::Created {
                id: 1,
                title: "a".into(),
            },
        );

        for _ in 0..50 {
            if !sink.events.lock().expect("锁中毒").is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(sink.events.lock().expect("锁中毒").len(), 1);
    }
}
