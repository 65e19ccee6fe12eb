//! # Call Audio Archive
//!
//! Best-effort per-direction recording of raw call audio for audit and QA.
//! Each direction of a call gets its own WAV file: mu-law frames appended in
//! arrival order, header sizes patched when the archive closes. Nothing here
//! is allowed to end a call: every failure is reported to the caller to log
//! and move on.
//!
//! Each handle has exactly one owner (inbound: the receive loop, outbound:
//! the relay task), so no locking is needed, and `close()` guarantees exactly
//! one physical close however many times it is invoked.

use crate::audio::codec::MediaFrame;
use crate::error::{AppError, AppResult};
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// WAVE format tag for G.711 mu-law
const WAVE_FORMAT_MULAW: u16 = 0x0007;

/// Size of the fixed RIFF/fmt/data preamble written on create
const HEADER_BYTES: u32 = 44;

/// Which leg of the call a handle records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Streaming WAV writer for one direction of one call.
pub struct CallArchive {
    path: PathBuf,
    file: Option<File>,
    data_bytes: u32,
    sample_rate: u32,
    channels: u16,
}

impl CallArchive {
    /// Open the archive file and write a placeholder header. Called before
    /// the first frame of the direction arrives.
    pub fn create(
        dir: &Path,
        call_id: &str,
        direction: Direction,
        sample_rate: u32,
        channels: u16,
    ) -> AppResult<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| AppError::Archive(format!("create {}: {}", dir.display(), e)))?;

        let path = dir.join(format!("{}_{}.wav", direction.as_str(), call_id));
        let mut file = File::create(&path)
            .map_err(|e| AppError::Archive(format!("create {}: {}", path.display(), e)))?;

        write_header(&mut file, sample_rate, channels, 0)
            .map_err(|e| AppError::Archive(format!("write header {}: {}", path.display(), e)))?;

        Ok(Self {
            path,
            file: Some(file),
            data_bytes: 0,
            sample_rate,
            channels,
        })
    }

    /// Append one frame. Best-effort: the caller logs failures and keeps the
    /// call going.
    pub fn write_frame(&mut self, frame: &MediaFrame) -> AppResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| AppError::Archive("archive already closed".to_string()))?;

        file.write_all(frame.as_bytes())
            .map_err(|e| AppError::Archive(format!("write {}: {}", self.path.display(), e)))?;
        self.data_bytes += frame.len() as u32;
        Ok(())
    }

    /// Patch the header sizes and close the file. Idempotent: only the first
    /// invocation performs a physical close, later ones are no-ops.
    pub fn close(&mut self) -> AppResult<()> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => return Ok(()),
        };

        let patch = |file: &mut File, data_bytes: u32| -> std::io::Result<()> {
            file.seek(SeekFrom::Start(4))?;
            file.write_u32::<LittleEndian>(HEADER_BYTES - 8 + data_bytes)?;
            file.seek(SeekFrom::Start(40))?;
            file.write_u32::<LittleEndian>(data_bytes)?;
            file.flush()
        };

        patch(&mut file, self.data_bytes)
            .map_err(|e| AppError::Archive(format!("finalize {}: {}", self.path.display(), e)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data_bytes(&self) -> u32 {
        self.data_bytes
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

/// Close on drop covers exit paths that never reach an explicit close.
impl Drop for CallArchive {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Write the 44-byte RIFF preamble: mu-law, 8-bit samples. The two size
/// fields are placeholders until `close` patches them.
fn write_header(
    file: &mut File,
    sample_rate: u32,
    channels: u16,
    data_bytes: u32,
) -> std::io::Result<()> {
    let bits_per_sample = 8u16;
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate * block_align as u32;

    file.write_all(b"RIFF")?;
    file.write_u32::<LittleEndian>(HEADER_BYTES - 8 + data_bytes)?;
    file.write_all(b"WAVE")?;

    file.write_all(b"fmt ")?;
    file.write_u32::<LittleEndian>(16)?;
    file.write_u16::<LittleEndian>(WAVE_FORMAT_MULAW)?;
    file.write_u16::<LittleEndian>(channels)?;
    file.write_u32::<LittleEndian>(sample_rate)?;
    file.write_u32::<LittleEndian>(byte_rate)?;
    file.write_u16::<LittleEndian>(block_align)?;
    file.write_u16::<LittleEndian>(bits_per_sample)?;

    file.write_all(b"data")?;
    file.write_u32::<LittleEndian>(data_bytes)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn temp_archive_dir() -> PathBuf {
        env::temp_dir().join(format!("call-archive-test-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_write_and_finalize() {
        let dir = temp_archive_dir();
        let mut archive =
            CallArchive::create(&dir, "CA100", Direction::Inbound, 8000, 1).unwrap();

        archive.write_frame(&MediaFrame::new(vec![0x7f; 160])).unwrap();
        archive.write_frame(&MediaFrame::new(vec![0x00; 160])).unwrap();
        archive.close().unwrap();

        let bytes = fs::read(dir.join("inbound_CA100.wav")).unwrap();
        assert_eq!(bytes.len(), 44 + 320);

        // RIFF size and data size patched on close
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 36 + 320);
        assert_eq!(u32::from_le_bytes(bytes[40..44].try_into().unwrap()), 320);
        // mu-law format tag, mono, 8kHz
        assert_eq!(u16::from_le_bytes(bytes[20..22].try_into().unwrap()), 7);
        assert_eq!(u16::from_le_bytes(bytes[22..24].try_into().unwrap()), 1);
        assert_eq!(u32::from_le_bytes(bytes[24..28].try_into().unwrap()), 8000);

        fs::remove_dir_all(&dir).unwrap();
    }

    /// Invoking close twice yields exactly one physical close, no error.
    #[test]
    fn test_close_is_idempotent() {
        let dir = temp_archive_dir();
        let mut archive =
            CallArchive::create(&dir, "CA101", Direction::Outbound, 8000, 1).unwrap();

        archive.write_frame(&MediaFrame::new(vec![1, 2, 3])).unwrap();
        assert!(archive.close().is_ok());
        assert!(archive.close().is_ok());

        let bytes = fs::read(dir.join("outbound_CA101.wav")).unwrap();
        assert_eq!(u32::from_le_bytes(bytes[40..44].try_into().unwrap()), 3);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_after_close_fails() {
        let dir = temp_archive_dir();
        let mut archive =
            CallArchive::create(&dir, "CA102", Direction::Inbound, 8000, 1).unwrap();

        archive.close().unwrap();
        assert!(matches!(
            archive.write_frame(&MediaFrame::new(vec![0])),
            Err(AppError::Archive(_))
        ));

        fs::remove_dir_all(&dir).unwrap();
    }
}
