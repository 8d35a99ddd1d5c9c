//! 块缓存核心
//!
//! 固定容量的缓冲池，为上层提供按 `(设备, 块号)` 去重的块访问，并充当
//! 多线程读写同一个块时的同步点。
//!
//! # 两级加锁
//!
//! 查找走分片的哈希桶：`NBUCKET` 个桶各自持有一把短临界区锁，命中时
//! 只碰一把桶锁，访问不同桶里已缓存块的线程之间零锁竞争。未命中才升级
//! 到唯一的全局池锁，在池锁下扫描全池挑选 LRU 受害者并把它从旧桶搬到
//! 新桶（再归位）。
//!
//! # 锁的全序
//!
//! 死锁由一条显式的固定全序排除，而不是依赖代码顺序：
//!
//! 1. 池锁严格先于任何桶锁（持有桶锁时禁止去拿池锁，查找未命中必须
//!    先放掉桶锁再升级）；
//! 2. 桶锁之间按下标从小到大加锁（见 `lock_bucket_pair`）；
//! 3. 短临界区锁（池锁、桶锁）绝不跨越阻塞操作持有；缓冲区自身的
//!    排他睡眠锁总是在放掉全部短锁之后才去获取。
//!
//! # LRU 是近似的
//!
//! 新近度只在获取时打一次时钟节拍，释放不更新；驱逐扫描在当前
//! `refcnt == 0` 的槽位中取节拍最小者，平局取池下标靠前者。这保持
//! 驱逐 O(池大小)、锁临界区最小，不保证严格 LRU。

use core::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::block::{BlockDevice, DeviceId};
use crate::cache::buffer::{BufFlags, BufferSlot};
use crate::cache::handle::BlockGuard;
use crate::consts::{bucket_of, BLOCK_SIZE, NBUCKET, NBUF};
use crate::error::{Error, ErrorKind, Result};

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// 桶内查找命中次数
    pub hits: u64,
    /// 未命中（触发驱逐协调器）次数
    pub misses: u64,
    /// 受害者驱逐/再归位次数
    pub evictions: u64,
    /// 显式提交写回次数
    pub writebacks: u64,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    writebacks: AtomicU64,
}

/// 块缓存
///
/// 进程生命周期的单例：构造时一次性分配 [`NBUF`] 个槽位，之后既不
/// 增长也不收缩。所有操作都通过 `&self` 进行，多线程共享时包一层
/// `Arc` 即可。
///
/// # 使用示例
///
/// ```rust,ignore
/// use bcache_core::BlockCache;
///
/// let cache = BlockCache::new(device)?;
///
/// // 获取（必要时从设备装载）块内容，守卫独占访问权
/// let mut block = cache.read(0, 42)?;
/// block[0] = 0xEF;
/// block.mark_dirty();
/// block.write()?;     // 显式同步写回
/// drop(block);        // 释放排他锁并递减引用计数
/// ```
///
/// 同一线程重复获取同一个块会在排他锁上自我阻塞，调用方负责避免。
pub struct BlockCache<D> {
    /// 底层设备集合的访问接口
    device: D,
    /// 单调时钟节拍，每次获取递增，LRU 依据
    ticks: AtomicU64,
    /// 池锁：驱逐协调器（全池扫描 + 再归位）的全局锁
    pool: Mutex<()>,
    /// 哈希桶，各存当前映射到本桶的槽位下标，新插入在头部
    buckets: [Mutex<Vec<usize>>; NBUCKET],
    /// 缓冲池本体
    slots: Box<[BufferSlot]>,
    counters: Counters,
}

impl<D: BlockDevice> BlockCache<D> {
    /// 创建块缓存
    ///
    /// # 参数
    ///
    /// * `device` - 块设备接口，缓存接管其所有权
    ///
    /// # 返回
    ///
    /// 设备块大小与 [`BLOCK_SIZE`] 不符时返回
    /// [`ErrorKind::InvalidInput`]。
    pub fn new(device: D) -> Result<Self> {
        if device.block_size() != BLOCK_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "device block size does not match BLOCK_SIZE",
            ));
        }

        let slots: Box<[BufferSlot]> = (0..NBUF).map(|_| BufferSlot::new()).collect();
        Ok(Self {
            device,
            ticks: AtomicU64::new(0),
            pool: Mutex::new(()),
            buckets: core::array::from_fn(|_| Mutex::new(Vec::new())),
            slots,
            counters: Counters::default(),
        })
    }

    /// 获取一个块并装载其内容
    ///
    /// 命中时直接返回缓存内容；未命中时驱逐一个 LRU 受害者、把它
    /// 再归位到目标桶，然后从设备读入内容。返回的守卫持有该缓冲区
    /// 的排他锁，同一块的其他获取者会阻塞到守卫释放为止。
    ///
    /// # 参数
    ///
    /// * `dev` - 设备标识
    /// * `blockno` - 设备上的块号
    ///
    /// # 返回
    ///
    /// 全池都被引用、无法驱逐时返回 [`ErrorKind::ResourceExhausted`]，
    /// 这是容量规划失败，调用方应视为致命错误，缓存不重试。
    pub fn read(&self, dev: DeviceId, blockno: u64) -> Result<BlockGuard<'_, D>> {
        let idx = self.acquire(dev, blockno)?;
        let data = self.slots[idx].data.lock();
        let mut handle = BlockGuard::new(self, idx, data);

        if !self.slots[idx].is_valid() {
            log::debug!("[BCACHE] fill dev={} blockno={} from device", dev, blockno);
            self.device.read_block(dev, blockno, &mut handle[..])?;
            self.slots[idx].insert_flags(BufFlags::VALID);
        }
        Ok(handle)
    }

    /// 查找或驱逐，返回引用计数已递增的槽位下标
    ///
    /// 返回时不持有任何锁；调用方随后去拿槽位的排他睡眠锁。
    fn acquire(&self, dev: DeviceId, blockno: u64) -> Result<usize> {
        let target = bucket_of(blockno);

        // 快路径：只碰目标桶一把锁
        if let Some(idx) = self.lookup(target, dev, blockno) {
            log::trace!("[BCACHE] get dev={} blockno={} HIT slot={}", dev, blockno, idx);
            return Ok(idx);
        }

        // 未命中：升级到驱逐协调器。此刻手里没有任何锁——持着桶锁
        // 去拿池锁违反锁全序。
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        log::debug!("[BCACHE] get dev={} blockno={} MISS", dev, blockno);
        self.evict_and_rehome(dev, blockno, target)
    }

    /// 桶内查找
    ///
    /// 命中时在桶锁下递增 `refcnt` 并刷新时间戳。桶锁在返回前释放。
    fn lookup(&self, bucket_idx: usize, dev: DeviceId, blockno: u64) -> Option<usize> {
        let bucket = self.buckets[bucket_idx].lock();
        for &idx in bucket.iter() {
            let slot = &self.slots[idx];
            if slot.dev.load(Ordering::Acquire) == dev
                && slot.blockno.load(Ordering::Acquire) == blockno
            {
                slot.refcnt.fetch_add(1, Ordering::AcqRel);
                slot.timestamp.store(self.next_tick(), Ordering::Release);
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(idx);
            }
        }
        None
    }

    /// 驱逐协调器：挑选 LRU 受害者并再归位到目标桶
    fn evict_and_rehome(&self, dev: DeviceId, blockno: u64, target: usize) -> Result<usize> {
        let _pool = self.pool.lock();

        // 池锁到手后重查目标桶：插入只会发生在池锁之下，而升级前的
        // 无锁窗口里，竞争的未命中可能已经把这个块装了进来。漏掉这一步
        // 会让同一个块绑到两个槽位上。
        if let Some(idx) = self.lookup(target, dev, blockno) {
            log::trace!(
                "[BCACHE] get dev={} blockno={} HIT slot={} on recheck",
                dev,
                blockno,
                idx
            );
            return Ok(idx);
        }

        loop {
            // 全池扫描：refcnt == 0 中时间戳最小者，平局取池下标靠前者
            let mut victim: Option<(usize, u64)> = None;
            for (idx, slot) in self.slots.iter().enumerate() {
                if slot.refcnt.load(Ordering::Acquire) != 0 {
                    continue;
                }
                let ts = slot.timestamp.load(Ordering::Acquire);
                match victim {
                    Some((_, best)) if ts >= best => {}
                    _ => victim = Some((idx, ts)),
                }
            }

            let Some((idx, _)) = victim else {
                log::error!("[BCACHE] pool exhausted: all {} buffers referenced", NBUF);
                return Err(Error::new(
                    ErrorKind::ResourceExhausted,
                    "no unreferenced buffer to evict",
                ));
            };

            let slot = &self.slots[idx];
            let old_dev = slot.dev.load(Ordering::Acquire);
            let old_blockno = slot.blockno.load(Ordering::Acquire);
            let old = bucket_of(old_blockno);

            let (mut tgt_bucket, mut old_bucket) = self.lock_bucket_pair(target, old);

            // 桶锁到手后复核：扫描和加锁之间，旧身份上的命中可能已经
            // 抢先递增了引用计数，这样的槽位不能动，重新扫描。
            if slot.refcnt.load(Ordering::Acquire) != 0 {
                continue;
            }

            // 从旧桶摘除（从未用过的槽位不在任何桶里，retain 无事发生）
            match old_bucket.as_mut() {
                Some(bucket) => bucket.retain(|&i| i != idx),
                None => tgt_bucket.retain(|&i| i != idx),
            }

            // 改写身份并同步置 refcnt = 1，不留下其他线程错绑旧身份的窗口
            slot.dev.store(dev, Ordering::Release);
            slot.blockno.store(blockno, Ordering::Release);
            slot.flags.store(0, Ordering::Release);
            slot.refcnt.store(1, Ordering::Release);
            slot.timestamp.store(self.next_tick(), Ordering::Release);
            tgt_bucket.insert(0, idx);

            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "[BCACHE] evict slot={}: dev={} blockno={} -> dev={} blockno={}",
                idx,
                old_dev,
                old_blockno,
                dev,
                blockno
            );
            return Ok(idx);
        }
    }

    /// 按固定全序同时锁住目标桶和旧桶
    ///
    /// 桶锁之间的全序是下标从小到大：两个方向相反的再归位并发执行时
    /// 仍按同一顺序加锁，不会彼此死锁。目标桶与旧桶相同时只锁一次。
    fn lock_bucket_pair(
        &self,
        target: usize,
        old: usize,
    ) -> (
        MutexGuard<'_, Vec<usize>>,
        Option<MutexGuard<'_, Vec<usize>>>,
    ) {
        if target == old {
            (self.buckets[target].lock(), None)
        } else if target < old {
            let t = self.buckets[target].lock();
            let o = self.buckets[old].lock();
            (t, Some(o))
        } else {
            let o = self.buckets[old].lock();
            let t = self.buckets[target].lock();
            (t, Some(o))
        }
    }

    fn next_tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            writebacks: self.counters.writebacks.load(Ordering::Relaxed),
        }
    }
}

// 守卫的释放/pin 路径不需要设备能力，放在无约束的 impl 里
impl<D> BlockCache<D> {
    pub(crate) fn slot(&self, idx: usize) -> &BufferSlot {
        &self.slots[idx]
    }

    pub(crate) fn device(&self) -> &D {
        &self.device
    }

    pub(crate) fn record_writeback(&self) {
        self.counters.writebacks.fetch_add(1, Ordering::Relaxed);
    }

    /// 释放一次持有：桶锁下递减引用计数
    ///
    /// 不做任何桶内排序调整，新近度只由获取时的时间戳决定。
    /// 引用计数归零的缓冲区留在桶里继续缓存，直到被选为受害者。
    pub(crate) fn release_slot(&self, idx: usize) {
        let slot = &self.slots[idx];
        if slot.is_dirty() {
            log::warn!(
                "[BCACHE] release dev={} blockno={} with uncommitted modifications",
                slot.dev.load(Ordering::Acquire),
                slot.blockno.load(Ordering::Acquire)
            );
        }
        // refcnt > 0 保证身份字段稳定，可以据此定位所属桶
        let bucket_idx = bucket_of(slot.blockno.load(Ordering::Acquire));
        let _bucket = self.buckets[bucket_idx].lock();
        let prev = slot.refcnt.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "buffer refcnt underflow");
    }

    /// 钉住：桶锁下递增引用计数，不触碰排他锁
    pub(crate) fn pin_slot(&self, idx: usize) {
        let slot = &self.slots[idx];
        let bucket_idx = bucket_of(slot.blockno.load(Ordering::Acquire));
        let _bucket = self.buckets[bucket_idx].lock();
        slot.refcnt.fetch_add(1, Ordering::AcqRel);
    }

    /// 解除钉住
    pub(crate) fn unpin_slot(&self, idx: usize) {
        let slot = &self.slots[idx];
        let bucket_idx = bucket_of(slot.blockno.load(Ordering::Acquire));
        let _bucket = self.buckets[bucket_idx].lock();
        let prev = slot.refcnt.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "buffer refcnt underflow");
    }
}

impl<D> core::fmt::Debug for BlockCache<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockCache")
            .field("nbuf", &NBUF)
            .field("nbucket", &NBUCKET)
            .field("block_size", &BLOCK_SIZE)
            .field("ticks", &self.ticks.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
