//! 缓冲区守卫
//!
//! 引用计数的增减不暴露给调用方，全部收拢进两个 RAII 句柄：
//!
//! - [`BlockGuard`] —— 一次"获取"，存活期间持有缓冲区的排他睡眠锁，
//!   析构时释放锁并递减引用计数。任何退出路径（包括错误路径）都不会
//!   漏释放，也不可能重复释放。
//! - [`PinnedBlock`] —— 一次"钉住"，只维持引用计数不触碰排他锁，
//!   让缓冲区在更长的时间跨度内免于驱逐。
//!
//! 守卫析构自动释放意味着"释放时必须持有锁"这条契约在安全代码里
//! 无法违反；锁原语内部仍然保留非持有者释放即 panic 的兜底检查。

use core::ops::{Deref, DerefMut};
use core::sync::atomic::Ordering;

use crate::block::{BlockDevice, DeviceId};
use crate::cache::block_cache::BlockCache;
use crate::cache::buffer::{BlockData, BufFlags};
use crate::error::Result;
use crate::lock::SleepLockGuard;

/// 已获取的缓冲区句柄
///
/// 由 [`BlockCache::read`] 返回，存活期间当前线程独占该块的内容；
/// 解引用到 `[u8]`（恰好一个块）。同一个逻辑块的其他获取者会阻塞到
/// 本守卫析构为止。
pub struct BlockGuard<'a, D> {
    cache: &'a BlockCache<D>,
    idx: usize,
    /// 排他锁守卫；守卫存活期间恒为 `Some`，析构时先行释放
    data: Option<SleepLockGuard<'a, BlockData>>,
}

impl<D> core::fmt::Debug for BlockGuard<'_, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockGuard")
            .field("idx", &self.idx)
            .finish_non_exhaustive()
    }
}

impl<'a, D> BlockGuard<'a, D> {
    pub(crate) fn new(
        cache: &'a BlockCache<D>,
        idx: usize,
        data: SleepLockGuard<'a, BlockData>,
    ) -> Self {
        Self {
            cache,
            idx,
            data: Some(data),
        }
    }

    /// 所属设备
    pub fn dev(&self) -> DeviceId {
        self.cache.slot(self.idx).dev.load(Ordering::Acquire)
    }

    /// 设备上的块号
    pub fn blockno(&self) -> u64 {
        self.cache.slot(self.idx).blockno.load(Ordering::Acquire)
    }

    /// 标记内容已修改、尚未提交
    ///
    /// 带着未提交修改析构守卫不会写盘，只会留下一条警告日志；
    /// 写回永远只由 [`BlockGuard::write`] 显式触发。
    pub fn mark_dirty(&mut self) {
        self.cache.slot(self.idx).insert_flags(BufFlags::DIRTY);
    }

    /// 是否有未提交的修改
    pub fn is_dirty(&self) -> bool {
        self.cache.slot(self.idx).is_dirty()
    }

    /// 钉住该缓冲区
    ///
    /// 返回的句柄与本守卫生命周期无关：守卫析构后缓冲区仍保持
    /// 缓存驻留（不会被选为驱逐受害者），直到钉住句柄也析构。
    pub fn pin(&self) -> PinnedBlock<'a, D> {
        self.cache.pin_slot(self.idx);
        PinnedBlock {
            cache: self.cache,
            idx: self.idx,
        }
    }
}

impl<D: BlockDevice> BlockGuard<'_, D> {
    /// 把当前内容同步写入设备
    ///
    /// 对应显式提交：设备写完成后清除脏标记。调用方持有排他锁由
    /// 守卫本身保证，内部仍保留一次契约断言。
    pub fn write(&mut self) -> Result<()> {
        let slot = self.cache.slot(self.idx);
        assert!(
            slot.data.holding(),
            "commit without holding the buffer lock"
        );

        let dev = self.dev();
        let blockno = self.blockno();
        log::trace!("[BCACHE] write dev={} blockno={} to device", dev, blockno);
        self.cache.device().write_block(dev, blockno, &self[..])?;
        slot.remove_flags(BufFlags::DIRTY);
        self.cache.record_writeback();
        Ok(())
    }
}

impl<D> Deref for BlockGuard<'_, D> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data.as_ref().unwrap()[..]
    }
}

impl<D> DerefMut for BlockGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data.as_mut().unwrap()[..]
    }
}

impl<D> Drop for BlockGuard<'_, D> {
    fn drop(&mut self) {
        // 先放排他锁（唤醒等待者），再在桶锁下递减引用计数
        self.data.take();
        self.cache.release_slot(self.idx);
    }
}

/// 钉住的缓冲区句柄
///
/// 存活期间该缓冲区的引用计数保持为正，驱逐协调器不会选它作受害者；
/// 不持有排他锁，内容访问仍需另行 [`BlockCache::read`]。
pub struct PinnedBlock<'a, D> {
    cache: &'a BlockCache<D>,
    idx: usize,
}

impl<D> PinnedBlock<'_, D> {
    /// 所属设备
    pub fn dev(&self) -> DeviceId {
        self.cache.slot(self.idx).dev.load(Ordering::Acquire)
    }

    /// 设备上的块号
    pub fn blockno(&self) -> u64 {
        self.cache.slot(self.idx).blockno.load(Ordering::Acquire)
    }
}

impl<D> Drop for PinnedBlock<'_, D> {
    fn drop(&mut self) {
        self.cache.unpin_slot(self.idx);
    }
}
