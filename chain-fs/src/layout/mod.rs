//! # 磁盘数据结构层
//!
//! chain-fs 的磁盘布局：
//! 超级块 | 分配表 | 目录 | 空闲区（元数据块与数据块）

mod super_block;
pub use super_block::SuperBlock;

/// 分配表项
mod fat_entry;
pub use fat_entry::FatEntry;

mod inode;
pub use inode::DiskInode;

mod dir_entry;
pub use dir_entry::DirEntry;
