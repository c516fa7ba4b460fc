//! Word-addressed buffers over the d3plot segment stream.
//!
//! A d3plot result is a sequence of 32-bit little-endian words, physically
//! split into segments: either plain files on disk (`d3plot`, `d3plot01`,
//! `d3plot02`, ...) or, for the compressed variant, consecutive
//! size-prefixed zlib chunks inside a single file. All word indices are
//! relative to word 0 of the segment currently loaded.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use log::trace;

use super::error::{D3plotError, Result};

/// Bytes per word in a single-precision d3plot.
pub const WORD_SIZE: usize = 4;

/// A word-indexed view over the currently loaded segment.
///
/// Segment lifecycle: geometry and part buffers are loaded once each and
/// freed when decoding moves on; state segments are walked front to back,
/// one resident at a time. `rewind_state_segments` restarts the walk so
/// additional variables can be read in a second pass.
pub trait WordBuffer {
    /// Read the word at `word` as a two's-complement integer.
    fn read_i32(&self, word: usize) -> Result<i32>;

    /// Read the word at `word` as an IEEE-754 float.
    fn read_f32(&self, word: usize) -> Result<f32>;

    /// Read `out.len()` consecutive float words starting at `word`.
    fn read_f32_range(&self, word: usize, out: &mut [f32]) -> Result<()>;

    /// Read `n_words` words as ASCII (4 chars per word), right-trimmed.
    fn read_str(&self, word: usize, n_words: usize) -> Result<String>;

    /// Make the geometry segment current.
    fn load_geometry(&mut self) -> Result<()>;

    /// Release the geometry segment (a hint for back-ends that copy).
    fn free_geometry(&mut self);

    /// Make the part segment current.
    fn load_parts(&mut self) -> Result<()>;

    /// Release the part segment.
    fn free_parts(&mut self);

    /// Position the walk on the first state segment.
    fn init_first_state_segment(&mut self) -> Result<()>;

    /// Whether another state segment is available.
    fn has_next_state_segment(&self) -> bool;

    /// Load the next state segment, replacing the current one.
    fn read_next_state_segment(&mut self) -> Result<()>;

    /// Restart the state-segment walk from the first segment.
    fn rewind_state_segments(&mut self) -> Result<()>;

    /// Finish the state walk and release the in-flight segment.
    fn end_states(&mut self);
}

/// Raw bytes of one segment with bounds-checked word access.
#[derive(Default)]
struct Words(Vec<u8>);

impl Words {
    fn slice(&self, word: usize, n_bytes: usize) -> Result<&[u8]> {
        let start = word * WORD_SIZE;
        let end = start + n_bytes;
        if end > self.0.len() {
            return Err(D3plotError::Truncated { word });
        }
        Ok(&self.0[start..end])
    }

    fn read_i32(&self, word: usize) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.slice(word, WORD_SIZE)?))
    }

    fn read_f32(&self, word: usize) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.slice(word, WORD_SIZE)?))
    }

    fn read_f32_range(&self, word: usize, out: &mut [f32]) -> Result<()> {
        let bytes = self.slice(word, out.len() * WORD_SIZE)?;
        LittleEndian::read_f32_into(bytes, out);
        Ok(())
    }

    fn read_str(&self, word: usize, n_words: usize) -> Result<String> {
        let bytes = self.slice(word, n_words * WORD_SIZE)?;
        Ok(String::from_utf8_lossy(bytes).trim_end().to_string())
    }

    fn clear(&mut self) {
        self.0 = Vec::new();
    }
}

/// Plain back-end: one segment per physical file.
///
/// The root file holds header, geometry, parts and the first run of
/// states; continuation files (`<base>01`, `<base>02`, ...) hold further
/// states, each with its own 0-based word origin.
pub struct PlainBuffer {
    paths: Vec<PathBuf>,
    words: Words,
    loaded: Option<usize>,
    next_segment: usize,
}

impl PlainBuffer {
    /// Open the root file and collect its continuation files.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        // Probe for existence early so the error names the root file.
        File::open(&root)?;

        let mut paths = vec![root.clone()];
        let base = root.to_string_lossy().into_owned();
        for index in 1.. {
            let candidate = PathBuf::from(format!("{}{:02}", base, index));
            if !candidate.is_file() {
                break;
            }
            paths.push(candidate);
        }
        trace!("plain buffer: {} segment file(s)", paths.len());

        Ok(Self {
            paths,
            words: Words::default(),
            loaded: None,
            next_segment: 0,
        })
    }

    fn load_segment(&mut self, index: usize) -> Result<()> {
        if self.loaded == Some(index) {
            return Ok(());
        }
        let mut bytes = Vec::new();
        File::open(&self.paths[index])?.read_to_end(&mut bytes)?;
        trace!(
            "plain buffer: loaded segment {} ({} words)",
            index,
            bytes.len() / WORD_SIZE
        );
        self.words = Words(bytes);
        self.loaded = Some(index);
        Ok(())
    }
}

impl WordBuffer for PlainBuffer {
    fn read_i32(&self, word: usize) -> Result<i32> {
        self.words.read_i32(word)
    }

    fn read_f32(&self, word: usize) -> Result<f32> {
        self.words.read_f32(word)
    }

    fn read_f32_range(&self, word: usize, out: &mut [f32]) -> Result<()> {
        self.words.read_f32_range(word, out)
    }

    fn read_str(&self, word: usize, n_words: usize) -> Result<String> {
        self.words.read_str(word, n_words)
    }

    fn load_geometry(&mut self) -> Result<()> {
        self.load_segment(0)
    }

    // Geometry, parts and the first states share the root file, so the
    // intermediate frees are no-ops for this back-end.
    fn free_geometry(&mut self) {}

    fn load_parts(&mut self) -> Result<()> {
        self.load_segment(0)
    }

    fn free_parts(&mut self) {}

    fn init_first_state_segment(&mut self) -> Result<()> {
        self.next_segment = 0;
        Ok(())
    }

    fn has_next_state_segment(&self) -> bool {
        self.next_segment < self.paths.len()
    }

    fn read_next_state_segment(&mut self) -> Result<()> {
        let index = self.next_segment;
        self.load_segment(index)?;
        self.next_segment += 1;
        Ok(())
    }

    fn rewind_state_segments(&mut self) -> Result<()> {
        self.next_segment = 0;
        Ok(())
    }

    fn end_states(&mut self) {
        self.words.clear();
        self.loaded = None;
    }
}

/// Compressed back-end: one physical file framed as consecutive chunks,
/// each `[u32 compressed_len][u32 word_count]` followed by a zlib payload.
///
/// Chunk 0 holds header + geometry, chunk 1 the part block, every further
/// chunk one state segment. Chunks are inflated one at a time; a chunk
/// must inflate to exactly `word_count` words.
pub struct CompressedBuffer {
    file: File,
    file_len: u64,
    pos: u64,
    words: Words,
    first_state_offset: u64,
}

impl CompressedBuffer {
    /// Open a compressed d3plot container.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            file,
            file_len,
            pos: 0,
            words: Words::default(),
            first_state_offset: 0,
        })
    }

    /// Inflate the chunk at the current file position into `self.words`.
    fn read_chunk(&mut self) -> Result<()> {
        let compressed_len = self.file.read_u32::<LittleEndian>()? as usize;
        let word_count = self.file.read_u32::<LittleEndian>()? as usize;

        let mut compressed = vec![0u8; compressed_len];
        self.file.read_exact(&mut compressed)?;

        let mut bytes = Vec::with_capacity(word_count * WORD_SIZE);
        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        decoder.read_to_end(&mut bytes)?;

        if bytes.len() != word_count * WORD_SIZE {
            return Err(D3plotError::InvalidFormat(format!(
                "compressed chunk inflated to {} bytes, expected {} words",
                bytes.len(),
                word_count
            )));
        }
        self.pos += 8 + compressed_len as u64;
        trace!("compressed buffer: chunk of {} words", word_count);
        self.words = Words(bytes);
        Ok(())
    }

    fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.pos = offset;
        Ok(())
    }
}

impl WordBuffer for CompressedBuffer {
    fn read_i32(&self, word: usize) -> Result<i32> {
        self.words.read_i32(word)
    }

    fn read_f32(&self, word: usize) -> Result<f32> {
        self.words.read_f32(word)
    }

    fn read_f32_range(&self, word: usize, out: &mut [f32]) -> Result<()> {
        self.words.read_f32_range(word, out)
    }

    fn read_str(&self, word: usize, n_words: usize) -> Result<String> {
        self.words.read_str(word, n_words)
    }

    fn load_geometry(&mut self) -> Result<()> {
        self.seek_to(0)?;
        self.read_chunk()
    }

    fn free_geometry(&mut self) {
        self.words.clear();
    }

    fn load_parts(&mut self) -> Result<()> {
        // The part chunk directly follows the geometry chunk; the first
        // state chunk starts right after it.
        self.read_chunk()?;
        self.first_state_offset = self.pos;
        Ok(())
    }

    fn free_parts(&mut self) {
        self.words.clear();
    }

    fn init_first_state_segment(&mut self) -> Result<()> {
        self.seek_to(self.first_state_offset)
    }

    fn has_next_state_segment(&self) -> bool {
        self.pos < self.file_len
    }

    fn read_next_state_segment(&mut self) -> Result<()> {
        self.read_chunk()
    }

    fn rewind_state_segments(&mut self) -> Result<()> {
        self.seek_to(self.first_state_offset)
    }

    fn end_states(&mut self) {
        self.words.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_reads_are_bounds_checked() {
        let mut bytes = Vec::new();
        for v in [1i32, -2, 3] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let words = Words(bytes);
        assert_eq!(words.read_i32(0).unwrap(), 1);
        assert_eq!(words.read_i32(1).unwrap(), -2);
        assert!(matches!(
            words.read_i32(3),
            Err(D3plotError::Truncated { word: 3 })
        ));
    }

    #[test]
    fn words_decodes_trimmed_ascii() {
        let words = Words(b"unit cube    ".to_vec()[..12].to_vec());
        assert_eq!(words.read_str(0, 3).unwrap(), "unit cube");
    }

    #[test]
    fn float_range_reads_consecutive_words() {
        let mut bytes = Vec::new();
        for v in [1.0f32, 2.5, -3.75, 0.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let words = Words(bytes);
        let mut out = [0.0f32; 3];
        words.read_f32_range(1, &mut out).unwrap();
        assert_eq!(out, [2.5, -3.75, 0.0]);
    }
}
