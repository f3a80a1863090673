use core::ops::Range;

use crate::block::Plain;
use crate::layout::{DirEntry, FatEntry};
use crate::{BLOCK_SIZE, MAGIC};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位分配表与目录两块连续区域
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    /// 文件系统占据块数
    pub total_blocks: u32,
    pub fat_blocks: u32,
    pub dir_blocks: u32,
}

unsafe impl Plain for SuperBlock {}

impl SuperBlock {
    #[inline]
    pub fn init(&mut self, total_blocks: u32, dir_blocks: u32) {
        *self = Self {
            magic: MAGIC,
            total_blocks,
            fat_blocks: (total_blocks as usize).div_ceil(FatEntry::PER_BLOCK) as u32,
            dir_blocks,
        };
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
            && self.fat_blocks as usize == (self.total_blocks as usize).div_ceil(FatEntry::PER_BLOCK)
            && self.dir_blocks > 0
            && self.data_start() < self.total_blocks as usize
    }

    /// 分配表所占的块
    pub fn fat_area(&self) -> Range<usize> {
        1..1 + self.fat_blocks as usize
    }

    /// 目录所占的块
    pub fn dir_area(&self) -> Range<usize> {
        let start = self.fat_area().end;
        start..start + self.dir_blocks as usize
    }

    /// 第一个可分配的块，之前的块全部保留
    #[inline]
    pub fn data_start(&self) -> usize {
        self.dir_area().end
    }

    pub fn dir_slots(&self) -> usize {
        self.dir_blocks as usize * DirEntry::PER_BLOCK
    }

    pub fn data_bytes(&self) -> usize {
        (self.total_blocks as usize - self.data_start()) * BLOCK_SIZE
    }
}
