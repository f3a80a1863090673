use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use block_dev::BlockDevice;
use chain_fs::BLOCK_SIZE;
use send_wrapper::SendWrapper;

/// 以宿主机上的镜像文件作为块设备
#[derive(Debug)]
pub struct BlockFile {
    inner: SendWrapper<RefCell<File>>,
    blocks: usize,
}

impl BlockFile {
    /// 镜像长度须为块大小的整数倍
    pub fn new(fd: File) -> io::Result<Self> {
        let len = fd.metadata()?.len() as usize;
        if len % BLOCK_SIZE != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("image size {len} is not a multiple of {BLOCK_SIZE}"),
            ));
        }

        Ok(Self {
            inner: SendWrapper::new(RefCell::new(fd)),
            blocks: len / BLOCK_SIZE,
        })
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        assert!(block_id < self.blocks, "block {block_id} out of range");
        assert_eq!(buf.len(), BLOCK_SIZE, "not a complete block!");

        let mut file = self.inner.borrow_mut();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("reading error");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        assert!(block_id < self.blocks, "block {block_id} out of range");
        assert_eq!(buf.len(), BLOCK_SIZE, "not a complete block!");

        let mut file = self.inner.borrow_mut();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("writing error");
    }

    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    fn block_count(&self) -> usize {
        self.blocks
    }
}
