//! 内存盘：以一段连续内存模拟块设备，供测试与工具使用。

use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::BlockDevice;

#[derive(Debug)]
pub struct RamDisk {
    block_size: usize,
    data: Mutex<Vec<u8>>,
}

impl RamDisk {
    pub fn new(block_size: usize, block_count: usize) -> Self {
        assert!(block_size > 0, "block size must not be zero");

        Self {
            block_size,
            data: Mutex::new(vec![0; block_size * block_count]),
        }
    }

    /// 由现成的镜像构建内存盘，末尾不足一块的部分补零
    pub fn from_image(block_size: usize, mut image: Vec<u8>) -> Self {
        assert!(block_size > 0, "block size must not be zero");

        let len = image.len().div_ceil(block_size) * block_size;
        image.resize(len, 0);

        Self {
            block_size,
            data: Mutex::new(image),
        }
    }

    /// 整个镜像的拷贝
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    fn range(&self, block_id: usize, len: usize) -> core::ops::Range<usize> {
        assert_eq!(len, self.block_size, "not a complete block!");
        assert!(
            block_id < self.block_count(),
            "block {block_id} out of range"
        );
        let start = block_id * self.block_size;
        start..start + self.block_size
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let range = self.range(block_id, buf.len());
        buf.copy_from_slice(&self.data.lock()[range]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let range = self.range(block_id, buf.len());
        self.data.lock()[range].copy_from_slice(buf);
    }

    #[inline]
    fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    fn block_count(&self) -> usize {
        self.data.lock().len() / self.block_size
    }
}
