//! 块缓存模块
//!
//! 固定容量、按 `(设备, 块号)` 去重的并发块缓存。
//!
//! # 主要组件
//!
//! - [`BlockCache`] - 缓存本体：分片哈希桶 + 全局驱逐协调器
//! - [`BlockGuard`] - 获取句柄，持有排他锁，析构即释放
//! - [`PinnedBlock`] - 钉住句柄，维持缓存驻留而不独占内容
//! - [`BufFlags`] - 缓冲区状态标志
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 设计要点
//!
//! 1. **两级加锁**：命中只碰一把桶锁，未命中才升级到全局池锁；
//!    访问不同已缓存块的线程之间没有共享锁竞争，只有并发未命中
//!    会短暂地在池锁上相遇。
//! 2. **固定锁全序**：池锁先于桶锁，桶锁按下标升序，排他睡眠锁
//!    永远最后获取——死锁在规则层面排除。
//! 3. **RAII 引用计数**：获取/释放、钉住/解钉都是守卫析构语义，
//!    不存在"忘了释放"或"释放两次"。
//! 4. **近似 LRU**：时间戳只在获取时刷新，驱逐是全池线性扫描，
//!    换取最小的锁临界区。
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use bcache_core::{BlockCache, Result};
//!
//! fn bump(cache: &BlockCache<MyDisk>) -> Result<()> {
//!     let mut block = cache.read(0, 42)?;
//!     block[0] = block[0].wrapping_add(1);
//!     block.mark_dirty();
//!     block.write()?;
//!     Ok(())
//! } // block 在此析构：释放排他锁、递减引用计数
//! ```

mod block_cache;
mod buffer;
mod handle;

pub use block_cache::{BlockCache, CacheStats};
pub use buffer::BufFlags;
pub use handle::{BlockGuard, PinnedBlock};
