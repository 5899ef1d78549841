//! File target implementation
//!
//! Opens a source or destination file (or block device) with the requested
//! open flags and keeps it open for the life of the run.
//!
//! - Source: read only, plus O_DIRECT / O_LARGEFILE
//! - Destination: write only, plus O_DIRECT / O_SYNC / O_TRUNC / O_CREAT / O_LARGEFILE
//!
//! A destination that did not exist before this run opened it with O_CREAT is
//! remembered as created, so a failed run can remove it again.

use crate::config::OpenFlags;
use crate::Result;
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

/// Which end of the transfer a file is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Destination,
}

/// An open file taking part in a run
#[derive(Debug)]
pub struct FileTarget {
    path: PathBuf,
    role: Role,
    file: Option<File>,
    size: u64,
    created: bool,
}

impl FileTarget {
    /// Open `path` for `role`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its size read.
    pub fn open(path: &Path, role: Role, flags: &OpenFlags) -> Result<Self> {
        let existed = path.symlink_metadata().is_ok();

        let mut options = OpenOptions::new();
        let mut custom_flags = 0;

        match role {
            Role::Source => {
                options.read(true);
            }
            Role::Destination => {
                options.write(true);
                if flags.creat {
                    options.create(true).mode(0o666);
                }
                if flags.trunc {
                    options.truncate(true);
                }
                if flags.sync {
                    custom_flags |= libc::O_SYNC;
                }
            }
        }

        if flags.direct {
            custom_flags |= libc::O_DIRECT;
        }
        if flags.largefile {
            custom_flags |= largefile_flag();
        }
        if custom_flags != 0 {
            options.custom_flags(custom_flags);
        }

        let mut file = options
            .open(path)
            .with_context(|| format!("Failed to open {:?} file: {}", role, path.display()))?;

        let size = Self::detect_size(&mut file)
            .with_context(|| format!("Failed to get size of {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            role,
            file: Some(file),
            size,
            created: role == Role::Destination && flags.creat && !existed,
        })
    }

    /// Regular files report their length; block devices their capacity
    fn detect_size(file: &mut File) -> std::io::Result<u64> {
        let metadata = file.metadata()?;
        if metadata.file_type().is_block_device() {
            let size = file.seek(SeekFrom::End(0))?;
            file.seek(SeekFrom::Start(0))?;
            Ok(size)
        } else {
            Ok(metadata.len())
        }
    }

    /// Descriptor for IO operations, None once closed
    pub fn fd(&self) -> Option<RawFd> {
        self.file.as_ref().map(|f| f.as_raw_fd())
    }

    /// Size in bytes at open time
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether this run brought the file into existence
    pub fn was_created(&self) -> bool {
        self.created
    }

    /// Close the file
    pub fn close(&mut self) {
        self.file = None;
    }

    /// Close the file and remove it if this run created it
    ///
    /// Used when a copy fails part way: a freshly created destination would
    /// only hold a partial copy.
    pub fn discard(&mut self) -> Result<()> {
        self.close();
        if self.created {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
            self.created = false;
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn largefile_flag() -> i32 {
    libc::O_LARGEFILE
}

#[cfg(not(target_os = "linux"))]
fn largefile_flag() -> i32 {
    0
}
