//! bcache_core: 并发块缓冲区缓存
//!
//! 固定容量的内存缓冲池，缓存定长磁盘块，为并发调用者提供按
//! `(设备, 块号)` 去重的访问，并充当多线程读写同一个块时的同步点。
//!
//! 核心特征：
//! - **分片查找**：`NBUCKET` 个哈希桶各带一把锁，已缓存块的并发
//!   访问互不竞争
//! - **全局驱逐**：未命中时在唯一的池锁下做近似 LRU 扫描和再归位
//! - **固定锁全序**：池锁 → 桶锁（下标升序）→ 排他睡眠锁，死锁
//!   在规则层面排除
//! - **RAII 句柄**：获取/释放、钉住/解钉都由守卫析构完成
//!
//! # 示例
//!
//! ```rust,ignore
//! use bcache_core::{BlockCache, BlockDevice, DeviceId, Result, BLOCK_SIZE};
//!
//! struct MyDisk {
//!     // ...
//! }
//!
//! impl BlockDevice for MyDisk {
//!     fn block_size(&self) -> usize { BLOCK_SIZE }
//!     fn read_block(&self, dev: DeviceId, blockno: u64, buf: &mut [u8]) -> Result<()> {
//!         // ...
//!         Ok(())
//!     }
//!     fn write_block(&self, dev: DeviceId, blockno: u64, buf: &[u8]) -> Result<()> {
//!         // ...
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let cache = BlockCache::new(MyDisk { /* ... */ })?;
//!
//!     let mut block = cache.read(0, 42)?;
//!     block[0] = 0xEF;
//!     block.mark_dirty();
//!     block.write()?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`consts`] - 池容量、桶数、块大小常量
//! - [`block`] - 块设备抽象
//! - [`lock`] - 睡眠锁原语
//! - [`cache`] - 块缓存本体

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// 块设备抽象
pub mod block;

/// 睡眠锁
pub mod lock;

/// 块缓存
pub mod cache;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 常量
pub use consts::{BLOCK_SIZE, NBUCKET, NBUF};

// 块设备
pub use block::{BlockDevice, DeviceId};

// 睡眠锁
pub use lock::{SleepLock, SleepLockGuard};

// 缓存
pub use cache::{BlockCache, BlockGuard, BufFlags, CacheStats, PinnedBlock};
