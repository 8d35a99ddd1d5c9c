//! 块设备抽象
//!
//! 缓存与底层设备之间的唯一接口是 [`BlockDevice`] trait：缓存未命中时
//! 通过它把块内容读进缓冲区，显式提交时通过它把缓冲区内容写回设备。
//! 驱动本身（virtio、文件镜像、内存盘……）不属于本 crate。

mod device;

pub use device::{BlockDevice, DeviceId};
