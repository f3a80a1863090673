use std::sync::Arc;

use block_dev::{BlockDevice, RamDisk};
use chain_fs::{BLOCK_SIZE, ChainFs, FatEntry, FormatOptions, FsError, OpenMode};

fn remount(dev: &RamDisk) -> (Arc<RamDisk>, ChainFs) {
    let dev = Arc::new(RamDisk::from_image(BLOCK_SIZE, dev.snapshot()));
    let fs = ChainFs::mount(dev.clone()).unwrap();
    (dev, fs)
}

#[test]
fn survives_remount() {
    let dev = Arc::new(RamDisk::new(BLOCK_SIZE, 200));
    let mut fs = ChainFs::format(dev.clone(), FormatOptions::default()).unwrap();

    let mut file = fs.open("a", OpenMode::Write).unwrap();
    file.put_str("hello, chain", &mut fs).unwrap();
    file.close(&mut fs).unwrap();
    let mut file = fs.open("b", OpenMode::Write).unwrap();
    file.write(&[9; 3 * BLOCK_SIZE + 5], &mut fs).unwrap();
    file.close(&mut fs).unwrap();
    let stat = fs.statistics();

    let (_, mut fs) = remount(&dev);
    assert_eq!(stat, fs.statistics());
    assert_eq!(
        vec![("a", 12), ("b", 3 * BLOCK_SIZE + 5)],
        fs.files()
            .map(|(name, _)| (name, fs.file_len(name).unwrap()))
            .collect::<Vec<_>>()
    );

    let mut file = fs.open("a", OpenMode::Append).unwrap();
    file.put_char(b'!', &mut fs).unwrap();
    file.close(&mut fs).unwrap();

    let mut file = fs.open("a", OpenMode::Read).unwrap();
    let mut buf = [0; 32];
    let n = file.read(&mut buf, &fs).unwrap();
    assert_eq!(b"hello, chain!", &buf[..n]);
    file.close(&mut fs).unwrap();
}

#[test]
fn metadata_follows_every_full_block() {
    let dev = Arc::new(RamDisk::new(BLOCK_SIZE, 200));
    let mut fs = ChainFs::format(dev.clone(), FormatOptions::default()).unwrap();

    let mut file = fs.open("f", OpenMode::Write).unwrap();
    file.write(&[3; 2 * BLOCK_SIZE + 10], &mut fs).unwrap();

    // 未关闭：磁盘上已有两整块，残缺尾块尚在缓冲中
    let (_, on_disk) = remount(&dev);
    assert_eq!(Ok(2 * BLOCK_SIZE), on_disk.file_len("f"));

    file.close(&mut fs).unwrap();
    let (_, on_disk) = remount(&dev);
    assert_eq!(Ok(2 * BLOCK_SIZE + 10), on_disk.file_len("f"));
}

#[test]
fn block_map_tags() {
    let dev = Arc::new(RamDisk::new(BLOCK_SIZE, 64));
    let mut fs = ChainFs::format(dev, FormatOptions::default()).unwrap();
    let mut file = fs.open("f", OpenMode::Write).unwrap();
    file.write(&[0; BLOCK_SIZE + 1], &mut fs).unwrap();
    file.close(&mut fs).unwrap();

    let map: Vec<_> = fs.block_map().map(|(_, entry)| entry).collect();
    assert_eq!(64, map.len());
    assert!(map[..7].iter().all(|&entry| entry == FatEntry::Reserved));
    assert_eq!(FatEntry::Metadata, map[7]);
    assert_eq!(FatEntry::Next(9.into()), map[8]);
    assert_eq!(FatEntry::EndOfChain, map[9]);
    assert!(map[10..].iter().all(|&entry| entry == FatEntry::Free));
}

#[test]
fn corrupted_table_is_rejected() {
    let dev = Arc::new(RamDisk::new(BLOCK_SIZE, 64));
    let mut fs = ChainFs::format(dev.clone(), FormatOptions::default()).unwrap();
    let mut file = fs.open("f", OpenMode::Write).unwrap();
    file.write(&[0; 2 * BLOCK_SIZE], &mut fs).unwrap();
    file.close(&mut fs).unwrap();

    // 把8号块的记录改成指向保留区
    let mut table = [0; BLOCK_SIZE];
    dev.read_block(1, &mut table);
    table[8 * 4..9 * 4].copy_from_slice(&2u32.to_ne_bytes());
    dev.write_block(1, &table);

    assert!(matches!(ChainFs::mount(dev), Err(FsError::Corrupt)));
}
