use derive_more::Display;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// 没有空闲块，或批量写入的大小不小于剩余空间
    #[display(fmt = "no free block left on the volume")]
    DiskFull,
    #[display(fmt = "no such file")]
    NotFound,
    /// 定位超出`[0, length - 1]`
    #[display(fmt = "position out of range")]
    OutOfRange,
    /// 句柄的模式不允许该操作
    #[display(fmt = "operation not permitted in this open mode")]
    InvalidMode,
    /// 分配表或元数据不自洽，属于缺陷信号而非可恢复的状况
    #[display(fmt = "corrupted allocation chain or metadata")]
    Corrupt,
    #[display(fmt = "file name is empty or too long")]
    NameTooLong,
    #[display(fmt = "no free directory slot")]
    DirectoryFull,
    /// 格式化或挂载的前提条件不满足
    #[display(fmt = "device does not hold a usable volume")]
    InvalidVolume,
}

impl core::error::Error for FsError {}

pub type Result<T> = core::result::Result<T, FsError>;
