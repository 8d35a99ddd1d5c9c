//! 睡眠锁
//!
//! 阻塞式互斥原语，保护单个缓冲区的内容区域。与短临界区的
//! `parking_lot::Mutex` 不同，睡眠锁可以跨设备 I/O 长期持有：
//! 等待者挂起线程而不是自旋。
//!
//! 锁会记录当前持有者的线程 ID，并提供 [`SleepLock::holding`] 查询，
//! 用于实施"未持有锁不得释放/提交"的调用契约——非持有者释放直接
//! panic，而不是悄悄破坏状态。
//!
//! 守卫 [`SleepLockGuard`] 故意不实现 `Send`：锁必须由加锁线程本身
//! 释放，持有者记录才有意义。

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};

struct LockState {
    locked: bool,
    holder: Option<ThreadId>,
}

/// 睡眠锁，拥有被保护的值 `T`
pub struct SleepLock<T> {
    state: Mutex<LockState>,
    cond: Condvar,
    value: UnsafeCell<T>,
}

// Safety: `value` 只能通过持有锁的守卫访问，跨线程移交由
// state 互斥锁同步。
unsafe impl<T: Send> Send for SleepLock<T> {}
unsafe impl<T: Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    /// 创建未上锁的睡眠锁
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(LockState {
                locked: false,
                holder: None,
            }),
            cond: Condvar::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// 加锁，必要时挂起当前线程直到锁可用
    ///
    /// # 返回
    ///
    /// 解引用到 `T` 的守卫，析构时释放锁并唤醒一个等待者。
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        let mut state = self.state.lock();
        while state.locked {
            self.cond.wait(&mut state);
        }
        state.locked = true;
        state.holder = Some(thread::current().id());
        drop(state);
        SleepLockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// 当前线程是否持有该锁
    pub fn holding(&self) -> bool {
        let state = self.state.lock();
        state.locked && state.holder == Some(thread::current().id())
    }

    fn unlock(&self) {
        let mut state = self.state.lock();
        if !state.locked || state.holder != Some(thread::current().id()) {
            panic!("sleep lock released by a thread that does not hold it");
        }
        state.locked = false;
        state.holder = None;
        drop(state);
        self.cond.notify_one();
    }
}

/// 睡眠锁守卫
///
/// 存活期间当前线程独占 `T` 的访问权。
pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
    // 锁必须由加锁线程释放，守卫不得跨线程移动
    _not_send: PhantomData<*const ()>,
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: 守卫存在即当前线程持有锁，不存在其他访问者。
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: 同上，且 &mut self 保证无其他守卫借用。
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_lock_and_access() {
        let lock = SleepLock::new(41u32);
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert_eq!(*guard, 42);
            assert!(lock.holding());
        }
        assert!(!lock.holding());
    }

    #[test]
    fn test_holding_is_per_thread() {
        let lock = Arc::new(SleepLock::new(()));
        let guard = lock.lock();

        let lock2 = lock.clone();
        let seen = std::thread::spawn(move || lock2.holding()).join().unwrap();
        assert!(!seen);
        assert!(lock.holding());
        drop(guard);
    }

    #[test]
    fn test_waiter_blocks_until_release() {
        let lock = Arc::new(SleepLock::new(0u32));
        let released = Arc::new(AtomicBool::new(false));

        let guard = lock.lock();

        let lock2 = lock.clone();
        let released2 = released.clone();
        let waiter = std::thread::spawn(move || {
            let guard = lock2.lock();
            // 只有第一个持有者释放之后才能走到这里
            assert!(released2.load(Ordering::SeqCst));
            *guard
        });

        std::thread::sleep(Duration::from_millis(50));
        released.store(true, Ordering::SeqCst);
        drop(guard);

        assert_eq!(waiter.join().unwrap(), 0);
    }

    #[test]
    fn test_mutual_exclusion() {
        let lock = Arc::new(SleepLock::new(0u64));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let lock = lock.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    let mut guard = lock.lock();
                    *guard += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*lock.lock(), 8 * 1000);
    }
}
