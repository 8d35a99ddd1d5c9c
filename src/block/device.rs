//! 块设备核心类型

use crate::error::Result;

/// 设备标识
///
/// 同一个缓存可以同时服务多个块设备，缓冲区身份是
/// `(设备, 块号)` 二元组而不是裸块号。
pub type DeviceId = u32;

/// 块设备接口
///
/// 实现此 trait 以提供底层块设备访问。
///
/// 两个方法都是同步的，允许阻塞调用线程；调用发生在缓冲区排他锁
/// 之下、任何桶锁/池锁之外，因此不同缓冲区的 I/O 可以并行，
/// 实现必须接受来自多个线程的并发调用（`&self`），内部状态自行加锁。
///
/// 设备错误通过 [`crate::ErrorKind::Io`] 上报，缓存不做重试，
/// 由更高层决定如何处置。
///
/// # 示例
///
/// ```rust,ignore
/// use bcache_core::{BlockDevice, DeviceId, Result, BLOCK_SIZE};
///
/// struct MyDisk {
///     // ...
/// }
///
/// impl BlockDevice for MyDisk {
///     fn block_size(&self) -> usize {
///         BLOCK_SIZE
///     }
///
///     fn read_block(&self, dev: DeviceId, blockno: u64, buf: &mut [u8]) -> Result<()> {
///         // 从设备读取一个完整的块
///         Ok(())
///     }
///
///     fn write_block(&self, dev: DeviceId, blockno: u64, buf: &[u8]) -> Result<()> {
///         // 把一个完整的块写入设备
///         Ok(())
///     }
/// }
/// ```
pub trait BlockDevice: Send + Sync {
    /// 逻辑块大小（字节）
    ///
    /// 与缓存配合使用时必须等于 [`crate::consts::BLOCK_SIZE`]，
    /// 缓存构造时校验。
    fn block_size(&self) -> usize;

    /// 读取一个块
    ///
    /// # 参数
    ///
    /// * `dev` - 设备标识
    /// * `blockno` - 设备上的块号
    /// * `buf` - 目标缓冲区，长度恰为一个块
    fn read_block(&self, dev: DeviceId, blockno: u64, buf: &mut [u8]) -> Result<()>;

    /// 写入一个块
    ///
    /// # 参数
    ///
    /// * `dev` - 设备标识
    /// * `blockno` - 设备上的块号
    /// * `buf` - 源缓冲区，长度恰为一个块
    fn write_block(&self, dev: DeviceId, blockno: u64, buf: &[u8]) -> Result<()>;
}
