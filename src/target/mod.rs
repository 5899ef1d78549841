//! Transfer endpoints
//!
//! Opens whichever of the source and destination the transfer mode needs and
//! works out how many bytes to move.
//!
//! # Example
//!
//! ```no_run
//! use aiopipe::config::{PipelineConfig, TransferMode};
//! use aiopipe::target::Endpoints;
//!
//! let config = PipelineConfig {
//!     mode: TransferMode::ReadOnly,
//!     source: Some("/tmp/in.dat".into()),
//!     ..PipelineConfig::default()
//! };
//! let endpoints = Endpoints::open(&config)?;
//! let length = endpoints.transfer_length(&config)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod file;

use crate::config::{PipelineConfig, TransferMode};
use crate::Result;
use file::{FileTarget, Role};
use std::os::unix::io::RawFd;

/// The open files of one run
#[derive(Debug, Default)]
pub struct Endpoints {
    pub source: Option<FileTarget>,
    pub destination: Option<FileTarget>,
}

impl Endpoints {
    /// Open the files `config.mode` needs
    ///
    /// # Errors
    ///
    /// Returns an error if a needed path is missing or cannot be opened.
    pub fn open(config: &PipelineConfig) -> Result<Self> {
        let mut endpoints = Endpoints::default();

        if config.mode.needs_source() {
            let path = config
                .source
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("{} mode needs a source file", config.mode))?;
            endpoints.source = Some(FileTarget::open(path, Role::Source, &config.open_flags)?);
        }

        if config.mode.needs_destination() {
            let path = config
                .destination
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("{} mode needs a destination file", config.mode))?;
            endpoints.destination = Some(FileTarget::open(path, Role::Destination, &config.open_flags)?);
        }

        Ok(endpoints)
    }

    /// Bytes to transfer
    ///
    /// An explicit size wins. Otherwise copies and reads take the source
    /// length and zero fills take the destination length.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolved length is 0.
    pub fn transfer_length(&self, config: &PipelineConfig) -> Result<u64> {
        let length = match config.size {
            Some(size) => size,
            None => {
                let target = match config.mode {
                    TransferMode::Copy | TransferMode::ReadOnly => self.source.as_ref(),
                    TransferMode::ZeroFill => self.destination.as_ref(),
                };
                target.map(|t| t.size()).unwrap_or(0)
            }
        };

        if length == 0 {
            anyhow::bail!("nothing to transfer: length is 0 (use --size for empty files or devices)");
        }
        Ok(length)
    }

    pub fn source_fd(&self) -> Option<RawFd> {
        self.source.as_ref().and_then(|t| t.fd())
    }

    pub fn destination_fd(&self) -> Option<RawFd> {
        self.destination.as_ref().and_then(|t| t.fd())
    }

    /// Close both files
    pub fn close(&mut self) {
        if let Some(source) = self.source.as_mut() {
            source.close();
        }
        if let Some(destination) = self.destination.as_mut() {
            destination.close();
        }
    }

    /// Close both files after a failure, removing a destination this run created
    pub fn abandon(&mut self) -> Result<()> {
        if let Some(source) = self.source.as_mut() {
            source.close();
        }
        if let Some(destination) = self.destination.as_mut() {
            destination.discard()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenFlags;
    use tempfile::TempDir;

    fn config(mode: TransferMode, dir: &TempDir) -> PipelineConfig {
        PipelineConfig {
            mode,
            source: Some(dir.path().join("src.dat")),
            destination: Some(dir.path().join("dst.dat")),
            open_flags: OpenFlags {
                creat: true,
                ..OpenFlags::default()
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_copy_uses_source_length() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("src.dat"), vec![0u8; 3000]).unwrap();

        let cfg = config(TransferMode::Copy, &dir);
        let endpoints = Endpoints::open(&cfg).unwrap();
        assert!(endpoints.source_fd().is_some());
        assert!(endpoints.destination_fd().is_some());
        assert_eq!(endpoints.transfer_length(&cfg).unwrap(), 3000);
    }

    #[test]
    fn test_zero_fill_uses_destination_length() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("dst.dat"), vec![1u8; 777]).unwrap();

        let cfg = config(TransferMode::ZeroFill, &dir);
        let endpoints = Endpoints::open(&cfg).unwrap();
        assert!(endpoints.source.is_none());
        assert_eq!(endpoints.transfer_length(&cfg).unwrap(), 777);
    }

    #[test]
    fn test_explicit_size_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("src.dat"), vec![0u8; 3000]).unwrap();

        let mut cfg = config(TransferMode::ReadOnly, &dir);
        cfg.size = Some(1024);
        let endpoints = Endpoints::open(&cfg).unwrap();
        assert!(endpoints.destination.is_none());
        assert_eq!(endpoints.transfer_length(&cfg).unwrap(), 1024);
    }

    #[test]
    fn test_empty_source_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("src.dat"), b"").unwrap();

        let cfg = config(TransferMode::ReadOnly, &dir);
        let endpoints = Endpoints::open(&cfg).unwrap();
        assert!(endpoints.transfer_length(&cfg).is_err());
    }

    #[test]
    fn test_abandon_removes_created_destination() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("src.dat"), vec![0u8; 100]).unwrap();

        let cfg = config(TransferMode::Copy, &dir);
        let mut endpoints = Endpoints::open(&cfg).unwrap();
        assert!(dir.path().join("dst.dat").exists());

        endpoints.abandon().unwrap();
        assert!(!dir.path().join("dst.dat").exists());
        assert!(dir.path().join("src.dat").exists());
    }
}
