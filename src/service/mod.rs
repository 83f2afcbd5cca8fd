//! 业务编排
//!
//! [`PassageService`] 负责文章的写入和读取，[`TagAssociator`] 维护标签关联，
//! [`ViewRecorder`] 记录访问。

mod events;
mod geo;
mod passages;
mod sync;
mod tags;
mod views;

pub use self::{
    events::{EventSink, LogSink, PassageEvent, publish_detached},
    geo::{GeoLocator, Location},
    passages::{
        ArchiveItem, ArchiveMonth, DeleteMode, PATCH_FIELDS, Page, PassageDetail, PassageInput,
        PassagePatch, PassageService, parse_time,
    },
    sync::SyncReport,
    tags::{TagAssociator, TagReport, detach_all},
    views::{ClientInfo, ViewRecorder, client_ip, is_local_ip},
};
