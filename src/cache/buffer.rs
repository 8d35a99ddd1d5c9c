//! 缓存槽位结构

use crate::consts::BLOCK_SIZE;
use crate::lock::SleepLock;
use bitflags::bitflags;
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

bitflags! {
    /// 缓冲区状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufFlags: u8 {
        /// 内容已从设备成功装载
        const VALID = 0x01;
        /// 内容被修改后尚未提交到设备
        const DIRTY = 0x02;
    }
}

/// 块内容区域（恰好一个块大小）
pub(crate) type BlockData = Box<[u8; BLOCK_SIZE]>;

/// 缓存槽位
///
/// 槽位在缓存构造时一次性分配，进程存续期间不再销毁；身份字段
/// `(dev, blockno)` 随驱逐被反复改写，内容区域循环复用。
///
/// 字段的保护规则：
///
/// - `dev` / `blockno` / `refcnt` / `timestamp` / `flags` 是元数据，
///   只在所属桶锁（再归位时还有池锁）的临界区内改写；做成原子类型
///   是因为池扫描要在不持有桶锁的情况下读取它们。
/// - `data` 由排他睡眠锁独占保护，可跨设备 I/O 持有。
///
/// 桶成员关系不记录在槽位里：槽位下标存放在所属桶的列表中，
/// 归属由列表唯一决定。
pub(crate) struct BufferSlot {
    /// 设备标识
    pub(crate) dev: AtomicU32,
    /// 设备上的块号
    pub(crate) blockno: AtomicU64,
    /// 状态标志（[`BufFlags`] 位）
    pub(crate) flags: AtomicU8,
    /// 未释放的持有者数量（获取者 + 显式 pin）
    pub(crate) refcnt: AtomicU32,
    /// 最近一次获取时的时钟节拍，LRU 依据
    pub(crate) timestamp: AtomicU64,
    /// 内容区域
    pub(crate) data: SleepLock<BlockData>,
}

impl BufferSlot {
    pub(crate) fn new() -> Self {
        Self {
            dev: AtomicU32::new(0),
            blockno: AtomicU64::new(0),
            flags: AtomicU8::new(0),
            refcnt: AtomicU32::new(0),
            timestamp: AtomicU64::new(0),
            data: SleepLock::new(Box::new([0u8; BLOCK_SIZE])),
        }
    }

    pub(crate) fn flags(&self) -> BufFlags {
        BufFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub(crate) fn insert_flags(&self, f: BufFlags) {
        self.flags.fetch_or(f.bits(), Ordering::AcqRel);
    }

    pub(crate) fn remove_flags(&self, f: BufFlags) {
        self.flags.fetch_and(!f.bits(), Ordering::AcqRel);
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.flags().contains(BufFlags::VALID)
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.flags().contains(BufFlags::DIRTY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_initial_state() {
        let slot = BufferSlot::new();
        assert_eq!(slot.dev.load(Ordering::Acquire), 0);
        assert_eq!(slot.blockno.load(Ordering::Acquire), 0);
        assert_eq!(slot.refcnt.load(Ordering::Acquire), 0);
        assert_eq!(slot.timestamp.load(Ordering::Acquire), 0);
        assert_eq!(slot.flags(), BufFlags::empty());
        assert!(!slot.is_valid());
        assert_eq!(slot.data.lock().len(), BLOCK_SIZE);
    }

    #[test]
    fn test_flag_operations() {
        let slot = BufferSlot::new();

        slot.insert_flags(BufFlags::VALID);
        assert!(slot.is_valid());
        assert!(!slot.is_dirty());

        slot.insert_flags(BufFlags::DIRTY);
        assert!(slot.is_valid());
        assert!(slot.is_dirty());

        slot.remove_flags(BufFlags::DIRTY);
        assert!(slot.is_valid());
        assert!(!slot.is_dirty());

        slot.flags.store(0, Ordering::Release);
        assert_eq!(slot.flags(), BufFlags::empty());
    }
}
