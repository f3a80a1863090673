mod cli;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use block_dev::BlockDevice;
use chain_fs::{BLOCK_SIZE, ChainFs, FatEntry, FormatOptions, FsError, OpenMode};
use chain_fs_fuse::BlockFile;
use clap::Parser;
use typed_bytesize::ByteSizeIec;

use self::cli::{Cli, Command, VolumeCommand};

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Format { size, dir_blocks } => format(&cli.image, size, dir_blocks),
        Command::Volume(command) => {
            let mut fs = mount(&cli.image)?;
            run(command, &mut fs)
        }
    }
}

fn format(image: &Path, size: u64, dir_blocks: usize) -> io::Result<()> {
    let disk_size = ByteSizeIec::kib(size).0;
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(image)?;
    fd.set_len(disk_size - disk_size % BLOCK_SIZE as u64)?;

    let dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd)?);
    let fs = ChainFs::format(dev, FormatOptions { dir_blocks }).map_err(fs_error)?;
    println!(
        "{image:?}: {} blocks, {} free",
        fs.total_blocks(),
        ByteSizeIec(fs.capacity() as u64)
    );

    Ok(())
}

fn mount(image: &Path) -> io::Result<ChainFs> {
    let fd = OpenOptions::new().read(true).write(true).open(image)?;
    let dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd)?);
    ChainFs::mount(dev).map_err(fs_error)
}

fn run(command: VolumeCommand, fs: &mut ChainFs) -> io::Result<()> {
    match command {
        VolumeCommand::Ls => {
            for (name, inode) in fs.files() {
                let len = fs.file_len(name).map_err(fs_error)?;
                println!("{inode:>6} {len:>10} {name}");
            }
        }
        VolumeCommand::Stat => {
            let stat = fs.statistics();
            println!("reserved     {}", stat.reserved_blocks);
            println!("metadata     {}", stat.metadata_blocks);
            println!("end of chain {}", stat.end_of_chain_blocks);
            println!("data         {}", stat.data_blocks);
            println!("free         {}", stat.free_blocks);
            println!("free bytes   {}", ByteSizeIec(stat.free_bytes as u64));
        }
        VolumeCommand::Map => {
            let tags: Vec<char> = fs.block_map().map(|(_, entry)| tag(entry)).collect();
            for (row, tags) in tags.chunks(64).enumerate() {
                println!("{:>6} {}", row * 64, tags.iter().collect::<String>());
            }
        }
        VolumeCommand::Put { source, name } => {
            let name = match name {
                Some(name) => name,
                None => source
                    .file_name()
                    .and_then(|name| name.to_str())
                    .ok_or_else(|| io::Error::other("source has no usable file name"))?
                    .to_owned(),
            };
            let data = fs::read(&source)?;
            log::info!("put {source:?} as {name:?}, {} bytes", data.len());

            let mut file = fs.open(&name, OpenMode::Write).map_err(fs_error)?;
            let wrote = file.write(&data, fs);
            file.close(fs).map_err(fs_error)?;
            wrote.map_err(fs_error)?;
        }
        VolumeCommand::Append { name, text } => {
            let mut file = fs.open(&name, OpenMode::Append).map_err(fs_error)?;
            let wrote = file.write(text.as_bytes(), fs);
            file.close(fs).map_err(fs_error)?;
            wrote.map_err(fs_error)?;
        }
        VolumeCommand::Cat { name, offset } => {
            let mut file = fs.open(&name, OpenMode::Read).map_err(fs_error)?;
            if let Some(offset) = offset {
                file.seek(offset, fs).map_err(fs_error)?;
            }

            let mut stdout = io::stdout().lock();
            let mut buf = [0; 4 * BLOCK_SIZE];
            loop {
                let n = file.read(&mut buf, fs).map_err(fs_error)?;
                if n == 0 {
                    break;
                }
                stdout.write_all(&buf[..n])?;
            }
            file.close(fs).map_err(fs_error)?;
        }
        VolumeCommand::Rm { name } => fs.remove_file(&name).map_err(fs_error)?,
    }

    Ok(())
}

fn tag(entry: FatEntry) -> char {
    match entry {
        FatEntry::Free => '.',
        FatEntry::Reserved => 'R',
        FatEntry::Metadata => 'M',
        FatEntry::EndOfChain => 'E',
        FatEntry::Next(_) => 'D',
    }
}

fn fs_error(e: FsError) -> io::Error {
    let kind = match e {
        FsError::NotFound => io::ErrorKind::NotFound,
        FsError::DiskFull | FsError::DirectoryFull => io::ErrorKind::StorageFull,
        FsError::OutOfRange | FsError::NameTooLong => io::ErrorKind::InvalidInput,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, e)
}
