//! Raw G.711 file source
//!
//! Reads a headerless companded byte stream (as captured from a camera's
//! voice channel) and slices it into fixed-size frames.

use super::{frame_period, EncodedAudioSource, Pacer};
use crate::audio::types::EncodedFrame;
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub struct FileSource<R = BufReader<File>> {
    reader: R,
    path: Option<PathBuf>,
    frame_bytes: usize,
    sample_rate: u32,
    sequence: u64,
    pacer: Option<Pacer>,
}

impl FileSource {
    /// Open `path`, emitting `frame_bytes`-byte frames paced at real time
    pub fn open(path: impl AsRef<Path>, frame_bytes: usize, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::Source(format!("Cannot open {}: {}", path.display(), e))
        })?;
        debug!("Opened G.711 file {}", path.display());

        let mut source = Self::from_reader(BufReader::new(file), frame_bytes, sample_rate);
        source.path = Some(path.to_path_buf());
        Ok(source)
    }
}

impl<R: Read + Send> FileSource<R> {
    pub fn from_reader(reader: R, frame_bytes: usize, sample_rate: u32) -> Self {
        let frame_bytes = frame_bytes.max(1);
        Self {
            reader,
            path: None,
            frame_bytes,
            sample_rate,
            sequence: 0,
            pacer: Some(Pacer::new(frame_period(frame_bytes, sample_rate))),
        }
    }

    /// Pace frames `interval` apart instead of one frame's duration
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.pacer = Some(Pacer::new(interval));
        self
    }

    /// Emit frames as fast as they are read
    pub fn unpaced(mut self) -> Self {
        self.pacer = None;
        self
    }

    /// Fill `buf` as far as the reader allows; returns bytes read
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

impl<R: Read + Send> EncodedAudioSource for FileSource<R> {
    fn next_frame(&mut self) -> Result<Option<EncodedFrame>> {
        let mut payload = vec![0u8; self.frame_bytes];
        let n = self.read_frame(&mut payload)?;
        if n == 0 {
            return Ok(None);
        }
        payload.truncate(n);

        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait();
        }

        let frame = EncodedFrame::new(payload, self.sequence, self.sample_rate);
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("file {}", path.display()),
            None => "reader".to_string(),
        }
    }
}
