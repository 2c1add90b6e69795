//! Filesystem helpers shared by the WAL, segment store and manifest.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Fsync a directory so created, renamed or removed entries are durable
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Fill `buf` from `offset` without moving a shared cursor
///
/// Concurrent callers on the same handle do not serialize.
#[cfg(unix)]
pub(crate) fn read_exact_at(file: &File, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
    use std::os::unix::fs::FileExt;

    while !buf.is_empty() {
        let read = file.read_at(buf, offset)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read_at reached EOF",
            ));
        }
        buf = &mut buf[read..];
        offset += read as u64;
    }
    Ok(())
}

#[cfg(windows)]
pub(crate) fn read_exact_at(file: &File, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        let read = file.seek_read(buf, offset)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "seek_read reached EOF",
            ));
        }
        buf = &mut buf[read..];
        offset += read as u64;
    }
    Ok(())
}

/// `{dir}/{id:020}.{ext}`
pub(crate) fn numbered_path(dir: &Path, id: u64, ext: &str) -> PathBuf {
    dir.join(format!("{:020}.{}", id, ext))
}

/// Parse the id out of a numbered file name with the given extension
/// "00000000000000000042.seg" → Some(42)
pub(crate) fn parse_numbered(path: &Path, ext: &str) -> Option<u64> {
    if path.extension()?.to_str()? != ext {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Ids of all numbered files in `dir` with the given extension, ascending
pub(crate) fn list_numbered(dir: &Path, ext: &str) -> Result<Vec<u64>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            if let Some(id) = parse_numbered(&path, ext) {
                ids.push(id);
            }
        }
    }
    ids.sort_unstable();
    Ok(ids)
}
