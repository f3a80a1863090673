#![no_std]

extern crate alloc;

/* chain-fs 的整体架构，自上而下 */

// 文件句柄层：打开、读写、定位、关闭
mod file;

// 卷层：持有分配表与目录，负责格式化、挂载与删除
mod fs;

// 目录层：文件名到元数据块的扁平映射
mod dir;

// 分配表层：块的空闲/占用记录与链表
mod fat;

// 磁盘数据结构层
mod layout;

// 块缓冲：内存中的一整块
mod block;

mod error;

use self::block::DataBlock;

pub use self::{
    block::BlockId,
    dir::Directory,
    error::{FsError, Result},
    fat::{AllocationTable, Statistics},
    file::{FileHandle, OpenMode},
    fs::{ChainFs, FormatOptions},
    layout::FatEntry,
};
pub use block_dev::BlockDevice;

pub const MAGIC: u32 = 0x5346_4701;
pub const BLOCK_SIZE: usize = 128;
/// 文件名的最大字节数
pub const NAME_MAX_LEN: usize = 27;
/// 默认的目录块数，每块容纳4个目录项
pub const DEFAULT_DIR_BLOCKS: usize = 4;
