mod cli;

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::sync::Arc;
use std::sync::Mutex;

use clap::Parser;
use cli::Cli;
use sector_fs::FileSystem;
use sector_fs::{NUM_SECTORS, SECTOR_SIZE};
use sector_fs_fuse::BlockFile;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let device = Arc::new(BlockFile(Mutex::new({
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&cli.image)?;
        fd.set_len((NUM_SECTORS * SECTOR_SIZE) as u64)?;

        fd
    })));

    let mut sfs = FileSystem::format(device);

    if let Some(source) = &cli.source {
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            let name = entry
                .file_name()
                .into_string()
                .expect("source file name is not UTF-8");

            let mut data = Vec::new();
            File::open(entry.path())?.read_to_end(&mut data)?;

            let path = format!("/{name}");
            sfs.create(&path, data.len() as u32, false)
                .unwrap_or_else(|e| panic!("creating {path:?}: {e}"));
            let file = sfs.open(&path).unwrap();
            assert_eq!(file.write_at(0, &data), data.len());

            println!("packed {name} ({} bytes)", data.len());
        }
    }

    if cli.print {
        print!("{}", sfs.dump());
    }

    Ok(())
}
