pub use vidlink_core::platforms::Platform;

pub mod shared;
pub mod traits;

pub mod bilibili;
pub mod douyin;
pub mod kuaishou;
pub mod pipixia;
pub mod weibo;
pub mod xhs;
pub mod xigua;
