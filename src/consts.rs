//! 块缓存常量定义
//!
//! 缓冲池容量和桶数都是编译期常量，不支持运行时配置：
//! 池大小属于容量规划问题，调用方若在运行期发现池不够用
//! （[`crate::ErrorKind::ResourceExhausted`]），正确的做法是调整这里的
//! 常量重新构建，而不是动态扩容。

//=============================================================================
// 缓冲池布局
//=============================================================================

/// 缓冲池容量（缓存槽位总数）
pub const NBUF: usize = 30;

/// 哈希桶数量
///
/// 取素数以便块号取模后分布均匀。
pub const NBUCKET: usize = 13;

/// 逻辑块大小（字节）
pub const BLOCK_SIZE: usize = 4096;

/// 块号到桶下标的映射
#[inline]
pub(crate) fn bucket_of(blockno: u64) -> usize {
    (blockno % NBUCKET as u64) as usize
}
