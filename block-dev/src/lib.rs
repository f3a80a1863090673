//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 越界的块号与长度不符的缓冲区属于调用者的错误，驱动直接 panic。

#![no_std]

extern crate alloc;

mod ram_disk;

use core::any::Any;

pub use self::ram_disk::RamDisk;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 读出一整块，`buf`的长度必须等于[`BlockDevice::block_size`]
    fn read_block(&self, block_id: usize, buf: &mut [u8]);

    /// 写入一整块，`buf`的长度必须等于[`BlockDevice::block_size`]
    fn write_block(&self, block_id: usize, buf: &[u8]);

    fn block_size(&self) -> usize;

    fn block_count(&self) -> usize;
}
