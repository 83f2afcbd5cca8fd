mod access;
mod passage;
mod tags;
mod user;

pub use self::{
    access::{Access, Denial, DenyReason, evaluate},
    passage::{DEFAULT_AUTHOR, DEFAULT_CATEGORY, Passage, PassageStatus, Visibility},
    tags::{TagInput, parse_tag_names},
    user::{PROTECTED_USERNAME, Role, User, UserStatus},
};
