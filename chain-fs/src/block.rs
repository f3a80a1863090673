//! # 块缓冲
//!
//! 块是存储与传输的最小单位。[`DataBlock`] 是内存中的一整块，
//! 可以把块内某个偏移处的字节按磁盘数据结构解释（见 [`DataBlock::map`]）。
//!
//! 本文件系统不做块级缓存：每次读写都直达块设备，
//! 每个打开的文件只持有自己的一块缓冲。

use core::fmt;
use core::mem;
use core::ops::{Deref, DerefMut};

use block_dev::BlockDevice;
use derive_more::{Display, From, Into};

use crate::BLOCK_SIZE;

/// 块地址
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// 可以由任意字节解释出来的类型：没有填充、没有非法位模式。
///
/// # Safety
///
/// 实现者必须保证上述两点，且对齐不超过 [`DataBlock`] 的对齐。
pub unsafe trait Plain: Sized {}

unsafe impl Plain for u8 {}
unsafe impl Plain for u32 {}
unsafe impl<T: Plain, const N: usize> Plain for [T; N] {}

/// 内存中的一整块
#[derive(Clone, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct DataBlock([u8; BLOCK_SIZE]);

impl DataBlock {
    pub const fn zeroed() -> Self {
        Self([0; BLOCK_SIZE])
    }

    pub fn read(dev: &dyn BlockDevice, id: BlockId) -> Self {
        let mut block = Self::zeroed();
        block.read_from(dev, id);
        block
    }

    #[inline]
    pub fn read_from(&mut self, dev: &dyn BlockDevice, id: BlockId) {
        dev.read_block(id.index(), &mut self.0);
    }

    #[inline]
    pub fn write_to(&self, dev: &dyn BlockDevice, id: BlockId) {
        dev.write_block(id.index(), &self.0);
    }

    pub fn get<T: Plain>(&self, offset: usize) -> &T {
        Self::check::<T>(offset);
        unsafe { &*self.0.as_ptr().add(offset).cast() }
    }

    pub fn get_mut<T: Plain>(&mut self, offset: usize) -> &mut T {
        Self::check::<T>(offset);
        unsafe { &mut *self.0.as_mut_ptr().add(offset).cast() }
    }

    #[inline]
    pub fn map<T: Plain, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    #[inline]
    pub fn map_mut<T: Plain, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }

    fn check<T: Plain>(offset: usize) {
        assert!(offset + mem::size_of::<T>() <= BLOCK_SIZE);
        assert!(mem::align_of::<T>() <= mem::align_of::<Self>());
        assert_eq!(0, offset % mem::align_of::<T>());
    }
}

impl Default for DataBlock {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl Deref for DataBlock {
    type Target = [u8; BLOCK_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DataBlock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl fmt::Debug for DataBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBlock").finish_non_exhaustive()
    }
}
