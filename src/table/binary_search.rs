//! Sorted text tables searched in place on disk.
//!
//! Every line has the same width: `key:value`, right padded with spaces and
//! terminated by `\n`. The value is either a move sequence (the distance is
//! its length) or a bare decimal cost. Lines are sorted by key, so a lookup is
//! a binary search over line numbers with one positional read per step.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::debug;
use rustc_hash::FxHashMap;

use super::Entry;
use crate::error::{Error, Result};
use crate::moves::parse_moves;

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => return Err(std::io::ErrorKind::UnexpectedEof.into()),
            n => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

pub struct BinarySearchTable {
    path: PathBuf,
    file: File,
    /// Bytes per line, newline included.
    width: u64,
    key_width: usize,
    linecount: u64,
}

impl BinarySearchTable {
    /// Opens a table and checks its geometry against `key_width`.
    pub fn open(path: &Path, key_width: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let filesize = file.metadata().map_err(|e| Error::io(path, e))?.len();
        if filesize == 0 {
            return Err(Error::corrupt(path, "empty table"));
        }

        // the first line fixes the width of every line
        let mut head = vec![0u8; filesize.min(4096) as usize];
        read_at(&file, &mut head, 0).map_err(|e| Error::io(path, e))?;
        let width = head
            .iter()
            .position(|&b| b == b'\n')
            .map(|newline| newline as u64 + 1)
            .ok_or_else(|| Error::corrupt(path, "first line is not terminated"))?;
        if filesize % width != 0 {
            return Err(Error::corrupt(
                path,
                format!("size {filesize} is not a multiple of the line width {width}"),
            ));
        }
        if head.get(key_width) != Some(&b':') {
            return Err(Error::corrupt(
                path,
                format!("expected {key_width}-character keys"),
            ));
        }

        let linecount = filesize / width;
        debug!("opened {} ({linecount} lines of {width} bytes)", path.display());
        Ok(BinarySearchTable {
            path: path.to_path_buf(),
            file,
            width,
            key_width,
            linecount,
        })
    }

    #[inline]
    pub fn linecount(&self) -> u64 {
        self.linecount
    }

    #[inline]
    pub fn filesize(&self) -> u64 {
        self.linecount * self.width
    }

    fn read_line(&self, line: u64, buf: &mut Vec<u8>) -> Result<()> {
        buf.resize(self.width as usize, 0);
        read_at(&self.file, buf, line * self.width).map_err(|e| Error::io(&self.path, e))
    }

    fn parse_value(&self, line: &[u8]) -> Result<Entry> {
        let value = std::str::from_utf8(&line[self.key_width + 1..])
            .map_err(|_| Error::corrupt(&self.path, "line is not UTF-8"))?
            .trim();
        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
            let distance = value
                .parse()
                .map_err(|_| Error::corrupt(&self.path, format!("bad cost {value:?}")))?;
            return Ok(Entry {
                distance,
                steps: None,
            });
        }
        let steps = parse_moves(value).map_err(|e| Error::corrupt(&self.path, e.to_string()))?;
        Ok(Entry {
            distance: steps.len() as u8,
            steps: Some(steps),
        })
    }

    /// Binary search for `key` within lines `lo..hi`.
    ///
    /// Returns the matching line, or the insertion point when the key is absent.
    fn seek(&self, key: &[u8], mut lo: u64, mut hi: u64, buf: &mut Vec<u8>) -> Result<(u64, Option<Entry>)> {
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            self.read_line(mid, buf)?;
            match key.cmp(&buf[..self.key_width]) {
                std::cmp::Ordering::Equal => return Ok((mid, Some(self.parse_value(buf)?))),
                std::cmp::Ordering::Less => hi = mid,
                std::cmp::Ordering::Greater => lo = mid + 1,
            }
        }
        Ok((lo, None))
    }

    pub fn lookup_one(&self, key: &str) -> Result<Option<Entry>> {
        if key.len() != self.key_width {
            return Ok(None);
        }
        let mut buf = Vec::new();
        let (_, entry) = self.seek(key.as_bytes(), 0, self.linecount, &mut buf)?;
        Ok(entry)
    }

    /// Looks up many keys in one pass.
    ///
    /// Keys are sorted and searched alternately from the smallest and the
    /// largest end; each search narrows the line range left for the keys in
    /// between. Absent keys are missing from the returned map.
    pub fn lookup_many(&self, keys: &[String]) -> Result<FxHashMap<String, Entry>> {
        let mut sorted: Vec<&str> = keys
            .iter()
            .map(String::as_str)
            .filter(|key| key.len() == self.key_width)
            .collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut found = FxHashMap::default();
        let mut buf = Vec::new();
        let (mut left, mut right) = (0u64, self.linecount);
        let (mut first, mut last) = (0usize, sorted.len());

        while first < last && left < right {
            let key = sorted[first];
            let (line, entry) = self.seek(key.as_bytes(), left, right, &mut buf)?;
            left = if entry.is_some() { line + 1 } else { line };
            if let Some(entry) = entry {
                found.insert(key.to_string(), entry);
            }
            first += 1;

            if first < last {
                let key = sorted[last - 1];
                let (line, entry) = self.seek(key.as_bytes(), left, right, &mut buf)?;
                right = line;
                if let Some(entry) = entry {
                    found.insert(key.to_string(), entry);
                }
                last -= 1;
            }
        }
        Ok(found)
    }
}
