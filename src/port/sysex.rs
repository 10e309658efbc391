//! SysEx file player and recorder
//!
//! Both stream raw bytes through a [`FileHandle`]. The recorder only keeps
//! system exclusive messages; everything else written to it is absorbed.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::midi::{SYSEX_START, SYSEX_STOP};
use crate::tracker::Tracked;

/// Byte-level file access
pub trait FileHandle {
    /// Bytes left to read
    fn available(&self) -> usize;
    fn read(&mut self) -> Option<u8>;
    fn write(&mut self, byte: u8) -> io::Result<()>;
    /// True once every byte has been read
    fn eof(&self) -> bool {
        self.available() == 0
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// File held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    bytes: Vec<u8>,
    cursor: usize,
}

impl MemoryFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            cursor: 0,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl FileHandle for MemoryFile {
    fn available(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    fn read(&mut self) -> Option<u8> {
        let byte = self.bytes.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(byte)
    }

    fn write(&mut self, byte: u8) -> io::Result<()> {
        self.bytes.push(byte);
        Ok(())
    }
}

/// File on disk, opened either for playback or for recording
pub enum FsFile {
    Reader { path: PathBuf, file: MemoryFile },
    Writer { path: PathBuf, out: BufWriter<File> },
}

impl FsFile {
    /// Load a file for playback
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read SysEx file: {}", path.display()))?;
        debug!("Loaded {} bytes from {}", bytes.len(), path.display());
        Ok(FsFile::Reader {
            path: path.to_path_buf(),
            file: MemoryFile::from_bytes(bytes),
        })
    }

    /// Create (or truncate) a file for recording
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create SysEx file: {}", path.display()))?;
        Ok(FsFile::Writer {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        match self {
            FsFile::Reader { path, .. } | FsFile::Writer { path, .. } => path,
        }
    }
}

impl FileHandle for FsFile {
    fn available(&self) -> usize {
        match self {
            FsFile::Reader { file, .. } => file.available(),
            FsFile::Writer { .. } => 0,
        }
    }

    fn read(&mut self) -> Option<u8> {
        match self {
            FsFile::Reader { file, .. } => file.read(),
            FsFile::Writer { .. } => None,
        }
    }

    fn write(&mut self, byte: u8) -> io::Result<()> {
        match self {
            FsFile::Writer { out, .. } => out.write_all(&[byte]),
            FsFile::Reader { .. } => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "file was opened for playback",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FsFile::Writer { out, .. } => out.flush(),
            FsFile::Reader { .. } => Ok(()),
        }
    }
}

/// Input streaming a file
#[derive(Default)]
pub struct SysExPlayer {
    file: Option<Box<dyn FileHandle>>,
}

impl SysExPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, file: Box<dyn FileHandle>) {
        self.file = Some(file);
    }

    pub fn detach(&mut self) -> Option<Box<dyn FileHandle>> {
        self.file.take()
    }

    pub fn is_attached(&self) -> bool {
        self.file.is_some()
    }

    pub fn available(&self) -> usize {
        self.file.as_ref().map_or(0, |f| f.available())
    }

    pub fn read(&mut self) -> Option<u8> {
        self.file.as_mut()?.read()
    }

    /// True when no file is attached or it has been played completely
    pub fn eof(&self) -> bool {
        self.file.as_ref().map_or(true, |f| f.eof())
    }
}

/// Output writing system exclusive messages to a file
#[derive(Default)]
pub struct SysExRecorder {
    file: Option<Box<dyn FileHandle>>,
    in_sysex: bool,
    recorded: u64,
}

impl SysExRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, file: Box<dyn FileHandle>) {
        self.file = Some(file);
        self.in_sysex = false;
    }

    /// Detach the file, flushing it first
    pub fn detach(&mut self) -> Option<Box<dyn FileHandle>> {
        let mut file = self.file.take()?;
        if let Err(e) = file.flush() {
            warn!("Failed to flush SysEx recording: {}", e);
        }
        Some(file)
    }

    pub fn is_attached(&self) -> bool {
        self.file.is_some()
    }

    /// Bytes written to files so far
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    pub(crate) fn write(&mut self, byte: u8, tracked: Tracked) {
        let keep = match tracked {
            Tracked::Status if byte == SYSEX_START => {
                self.in_sysex = true;
                true
            }
            Tracked::Status if byte == SYSEX_STOP => std::mem::replace(&mut self.in_sysex, false),
            Tracked::Status => {
                self.in_sysex = false;
                false
            }
            Tracked::Data { .. } => self.in_sysex,
            Tracked::Realtime | Tracked::Discarded => false,
        };
        if !keep {
            return;
        }

        let Some(file) = self.file.as_mut() else {
            return;
        };
        match file.write(byte) {
            Ok(()) => {
                self.recorded += 1;
                if byte == SYSEX_STOP {
                    if let Err(e) = file.flush() {
                        warn!("Failed to flush SysEx recording: {}", e);
                    }
                }
            }
            Err(e) => {
                warn!("SysEx recording failed, detaching file: {}", e);
                self.file = None;
                self.in_sysex = false;
            }
        }
    }
}
