//! # 文件句柄层
//!
//! [`FileHandle`] 是一个打开的文件，独占一块缓冲：
//! - 读模式下缓冲存放指针所在的块；
//! - 写模式下缓冲存放正在拼装的块，填满一块才落盘；
//! - 追加模式下缓冲预先载入残缺的尾块，补齐落盘后转为写模式。
//!
//! 每落盘一块都重写元数据，所以磁盘上的元数据始终与链表一致。

use crate::fs::InodeRecord;
use crate::layout::{DirEntry, DiskInode, FatEntry};
use crate::{BLOCK_SIZE, BlockId, ChainFs, DataBlock, FsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    /// 过渡状态：残缺的尾块补齐落盘后即转为 [`OpenMode::Write`]
    Append,
}

impl OpenMode {
    #[inline]
    pub fn is_writable(self) -> bool {
        matches!(self, Self::Write | Self::Append)
    }
}

#[derive(Debug)]
#[must_use = "a file handle must be closed to persist its tail"]
pub struct FileHandle {
    /// 元数据块
    inode: BlockId,
    mode: OpenMode,
    /// 读写指针
    cursor: usize,
    length: usize,
    first: Option<BlockId>,
    last: Option<BlockId>,
    buffer: DataBlock,
    /// 读模式下缓冲中的块，也是沿链查找的起点
    cached: Option<ChainCursor>,
}

/// 链上第`index`块位于`block`
#[derive(Debug, Clone, Copy)]
struct ChainCursor {
    index: usize,
    block: BlockId,
}

impl FileHandle {
    pub(crate) fn open_read(fs: &ChainFs, name: &str) -> Result<Self> {
        let inode = fs.directory().lookup(name)?;
        let record = fs.load_inode(inode)?;

        Ok(Self::new(inode, OpenMode::Read, 0, record))
    }

    pub(crate) fn open_write(fs: &mut ChainFs, name: &str) -> Result<Self> {
        DirEntry::check_name(name)?;

        let inode = fs.table_mut().allocate()?;
        fs.write_inode(inode, DiskInode::empty());
        fs.table_mut().set(inode, FatEntry::Metadata);

        let previous = match fs.directory_mut().bind(name, inode) {
            Ok(previous) => previous,
            Err(e) => {
                fs.table_mut().free(inode);
                return Err(e);
            }
        };
        if let Some(previous) = previous {
            log::debug!("{name:?} replaced, reclaim inode {previous}");
            fs.remove(previous)?;
        }

        let record = InodeRecord {
            length: 0,
            first: None,
            last: None,
        };
        Ok(Self::new(inode, OpenMode::Write, 0, record))
    }

    pub(crate) fn open_append(fs: &ChainFs, name: &str) -> Result<Self> {
        let inode = fs.directory().lookup(name)?;
        let record = fs.load_inode(inode)?;

        let mut file = Self::new(inode, OpenMode::Append, record.length, record);
        match record.last {
            // 载入残缺的尾块
            Some(last) if record.length % BLOCK_SIZE != 0 => {
                log::debug!("append to {name:?}: reload tail block {last}");
                fs.read_block(last, &mut file.buffer);
            }
            _ => file.finish_append(),
        }

        Ok(file)
    }

    fn new(inode: BlockId, mode: OpenMode, cursor: usize, record: InodeRecord) -> Self {
        Self {
            inode,
            mode,
            cursor,
            length: record.length,
            first: record.first,
            last: record.last,
            buffer: DataBlock::zeroed(),
            cached: None,
        }
    }

    /// 读出一个字节，`Ok(None)`表示已到文件末尾
    pub fn get_char(&mut self, fs: &ChainFs) -> Result<Option<u8>> {
        self.expect_mode(OpenMode::Read)?;

        if self.cursor >= self.length {
            return Ok(None);
        }

        self.load(self.cursor / BLOCK_SIZE, fs)?;
        let byte = self.buffer[self.cursor % BLOCK_SIZE];
        self.cursor += 1;

        Ok(Some(byte))
    }

    /// 尽量读满`buf`，返回读出的字节数，0表示已到文件末尾
    pub fn read(&mut self, buf: &mut [u8], fs: &ChainFs) -> Result<usize> {
        self.expect_mode(OpenMode::Read)?;

        let mut read_size = 0;
        while read_size < buf.len() && self.cursor < self.length {
            let offset = self.cursor % BLOCK_SIZE;
            self.load(self.cursor / BLOCK_SIZE, fs)?;

            let chunk = (BLOCK_SIZE - offset)
                .min(buf.len() - read_size)
                .min(self.length - self.cursor);
            buf[read_size..read_size + chunk]
                .copy_from_slice(&self.buffer[offset..offset + chunk]);
            read_size += chunk;
            self.cursor += chunk;
        }

        Ok(read_size)
    }

    /// 移动读指针到`pos`，`pos`须在`[0, length - 1]`内。
    ///
    /// 落在块首时不载入，留给下一次读取。
    pub fn seek(&mut self, pos: usize, fs: &ChainFs) -> Result<()> {
        self.expect_mode(OpenMode::Read)?;

        if pos >= self.length {
            return Err(FsError::OutOfRange);
        }
        if pos % BLOCK_SIZE != 0 {
            self.load(pos / BLOCK_SIZE, fs)?;
        }
        log::debug!("seek {} -> {pos}", self.cursor);
        self.cursor = pos;

        Ok(())
    }

    /// 写入一个字节，缓冲填满时落盘
    pub fn put_char(&mut self, byte: u8, fs: &mut ChainFs) -> Result<()> {
        self.expect_writable()?;

        self.buffer[self.cursor % BLOCK_SIZE] = byte;
        self.advance(1, fs)
    }

    /// 逐字节写入字符串，仅限写模式
    pub fn put_str(&mut self, s: &str, fs: &mut ChainFs) -> Result<()> {
        self.expect_mode(OpenMode::Write)?;

        s.bytes().try_for_each(|byte| self.put_char(byte, fs))
    }

    /// 批量写入，返回写入的字节数。
    ///
    /// 预先按剩余空块估算空间：`data`的长度须小于剩余空块的总字节数，
    /// 否则直接报[`FsError::DiskFull`]，不写入任何内容。
    pub fn write(&mut self, data: &[u8], fs: &mut ChainFs) -> Result<usize> {
        self.expect_writable()?;

        if data.is_empty() {
            return Ok(0);
        }
        if data.len() >= fs.free_block_count() * BLOCK_SIZE {
            log::debug!(
                "write {} bytes rejected, {} blocks free",
                data.len(),
                fs.free_block_count()
            );
            return Err(FsError::DiskFull);
        }

        let mut wrote_size = 0;
        while wrote_size < data.len() {
            let offset = self.cursor % BLOCK_SIZE;
            let chunk = (BLOCK_SIZE - offset).min(data.len() - wrote_size);
            self.buffer[offset..offset + chunk]
                .copy_from_slice(&data[wrote_size..wrote_size + chunk]);
            self.advance(chunk, fs)?;
            wrote_size += chunk;
        }

        Ok(wrote_size)
    }

    /// 关闭文件，残缺的尾块在此落盘
    pub fn close(mut self, fs: &mut ChainFs) -> Result<()> {
        if self.mode.is_writable() && self.cursor % BLOCK_SIZE != 0 {
            self.append_block(fs)?;
        }
        Ok(())
    }

    #[inline]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[inline]
    pub fn inode(&self) -> BlockId {
        self.inode
    }
}

impl FileHandle {
    fn expect_mode(&self, mode: OpenMode) -> Result<()> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(FsError::InvalidMode)
        }
    }

    fn expect_writable(&self) -> Result<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(FsError::InvalidMode)
        }
    }

    /// 追加模式 -> 写模式：此后的块都重新分配
    fn finish_append(&mut self) {
        debug_assert_eq!(OpenMode::Append, self.mode);
        self.mode = OpenMode::Write;
    }

    /// 指针前进`n`字节，缓冲恰好填满时落盘；落盘失败则退回指针
    fn advance(&mut self, n: usize, fs: &mut ChainFs) -> Result<()> {
        self.cursor += n;
        if self.cursor % BLOCK_SIZE == 0 {
            if let Err(e) = self.append_block(fs) {
                self.cursor -= n;
                return Err(e);
            }
        }
        Ok(())
    }

    /// 把缓冲接到文件末尾并重写元数据。
    ///
    /// 写模式分配新块挂在链尾；追加模式覆写原有的尾块，随后转为写模式。
    fn append_block(&mut self, fs: &mut ChainFs) -> Result<()> {
        match self.mode {
            OpenMode::Write => {
                let block = fs.table_mut().allocate()?;
                fs.write_block(block, &self.buffer);
                match self.last {
                    Some(last) => fs.table_mut().link(last, block),
                    None => self.first = Some(block),
                }
                self.last = Some(block);
                log::debug!("inode {}: block {block} appended", self.inode);
            }
            OpenMode::Append => {
                let last = self.last.ok_or(FsError::Corrupt)?;
                fs.write_block(last, &self.buffer);
                log::debug!("inode {}: tail block {last} rewritten", self.inode);
                self.finish_append();
            }
            OpenMode::Read => return Err(FsError::InvalidMode),
        }

        self.buffer.fill(0);
        self.length = self.cursor;
        fs.write_inode(
            self.inode,
            DiskInode::new(self.length as u32, self.first, self.last),
        );

        Ok(())
    }

    /// 确保缓冲存放链上第`index`块
    fn load(&mut self, index: usize, fs: &ChainFs) -> Result<()> {
        if self.cached.is_some_and(|cached| cached.index == index) {
            return Ok(());
        }

        let block = self.locate(index, fs)?;
        fs.read_block(block, &mut self.buffer);
        self.cached = Some(ChainCursor { index, block });

        Ok(())
    }

    /// 沿链找到第`index`块。
    /// 目标不在已缓存的块之前时从缓存处继续走，否则从首块走起。
    fn locate(&self, index: usize, fs: &ChainFs) -> Result<BlockId> {
        if index >= self.length.div_ceil(BLOCK_SIZE) {
            return Err(FsError::Corrupt);
        }

        let (mut at, mut block) = match self.cached {
            Some(cached) if cached.index <= index => (cached.index, cached.block),
            _ => (0, self.first.ok_or(FsError::Corrupt)?),
        };
        while at < index {
            block = fs.table().chain_next(block)?.ok_or_else(|| {
                log::warn!("inode {}: chain ends before block #{index}", self.inode);
                FsError::Corrupt
            })?;
            at += 1;
        }

        Ok(block)
    }
}
