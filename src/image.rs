//! LC-3 program images.
//!
//! An `.obj` image is a flat sequence of big-endian words: the first
//! word is the origin (the address the payload loads at), the rest are
//! the payload. The emulator keeps memory in native order, so every
//! word is byte-swapped exactly once, here, at the load/save boundary.

use crate::bits::swap16;
use crate::cpu::memory::{Memory, MemoryError};
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;

/// A parsed program image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Address the payload loads at.
    pub origin: u16,
    /// Payload words, in native byte order.
    pub words: Vec<u16>,
}

impl Image {
    /// Number of payload words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Read an image from any byte source.
pub fn read_image_from<R: Read>(mut reader: R) -> Result<Image, ImageError> {
    let origin = read_word(&mut reader)?.ok_or(ImageError::Empty)?;

    let mut words = Vec::new();
    while let Some(word) = read_word(&mut reader)? {
        words.push(word);
    }

    Ok(Image { origin, words })
}

/// Write an image to any byte sink.
pub fn write_image_to<W: Write>(mut writer: W, image: &Image) -> Result<(), ImageError> {
    write_word(&mut writer, image.origin)?;
    for &word in &image.words {
        write_word(&mut writer, word)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read an image file from disk.
pub fn read_image<P: AsRef<Path>>(path: P) -> Result<Image, ImageError> {
    let file = std::fs::File::open(path.as_ref())?;
    read_image_from(io::BufReader::new(file))
}

/// Save an image file to disk.
pub fn save_image<P: AsRef<Path>>(path: P, image: &Image) -> Result<(), ImageError> {
    let file = std::fs::File::create(path.as_ref())?;
    write_image_to(io::BufWriter::new(file), image)
}

/// Read an image file and place it in memory at its origin.
///
/// Returns the origin so the caller can point the PC at it if the image
/// is the program rather than data.
pub fn load_image<P: AsRef<Path>>(path: P, memory: &mut Memory) -> Result<u16, ImageError> {
    let image = read_image(path)?;
    memory.load_words(image.origin, &image.words)?;
    Ok(image.origin)
}

/// Read one word, swapping it from the image's big-endian order.
/// Returns `None` at a clean end of input.
fn read_word<R: Read>(reader: &mut R) -> Result<Option<u16>, ImageError> {
    let mut buf = [0u8; 2];
    let mut filled = 0;
    while filled < 2 {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                // A lone trailing byte means the image is damaged; a
                // half-word must not load silently.
                Err(ImageError::TruncatedWord)
            };
        }
        filled += n;
    }
    Ok(Some(swap16(u16::from_le_bytes(buf))))
}

fn write_word<W: Write>(writer: &mut W, word: u16) -> Result<(), ImageError> {
    writer.write_all(&swap16(word).to_le_bytes())?;
    Ok(())
}

/// Errors that can occur while reading or loading an image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("image is empty (missing origin word)")]
    Empty,

    #[error("image ends in the middle of a word (odd byte count)")]
    TruncatedWord,

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_big_endian_words() {
        let bytes = [0x30, 0x00, 0x12, 0x34, 0xAB, 0xCD];
        let image = read_image_from(Cursor::new(bytes)).unwrap();

        assert_eq!(image.origin, 0x3000);
        assert_eq!(image.words, vec![0x1234, 0xABCD]);
    }

    #[test]
    fn origin_only_image_is_valid() {
        let image = read_image_from(Cursor::new([0x40, 0x00])).unwrap();
        assert_eq!(image.origin, 0x4000);
        assert!(image.is_empty());
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = read_image_from(Cursor::new([])).unwrap_err();
        assert!(matches!(err, ImageError::Empty));
    }

    #[test]
    fn odd_byte_count_is_an_error() {
        let err = read_image_from(Cursor::new([0x30, 0x00, 0x12])).unwrap_err();
        assert!(matches!(err, ImageError::TruncatedWord));
    }

    #[test]
    fn write_read_roundtrip() {
        let image = Image {
            origin: 0x3000,
            words: vec![0xF025, 0x0041, 0xFFFF, 0x0000],
        };

        let mut bytes = Vec::new();
        write_image_to(&mut bytes, &image).unwrap();
        let reread = read_image_from(Cursor::new(bytes)).unwrap();

        assert_eq!(reread, image);
    }

    #[test]
    fn written_bytes_are_big_endian() {
        let image = Image {
            origin: 0x3000,
            words: vec![0x1234],
        };

        let mut bytes = Vec::new();
        write_image_to(&mut bytes, &image).unwrap();

        assert_eq!(bytes, [0x30, 0x00, 0x12, 0x34]);
    }

    #[test]
    fn image_loads_into_memory_at_origin() {
        let bytes = [0x30, 0x00, 0xF0, 0x25];
        let image = read_image_from(Cursor::new(bytes)).unwrap();

        let mut mem = Memory::new();
        mem.load_words(image.origin, &image.words).unwrap();

        assert_eq!(mem.peek(0x3000), 0xF025);
    }

    #[test]
    fn oversized_image_is_rejected() {
        let image = Image {
            origin: 0xFFFF,
            words: vec![0, 0],
        };

        let mut mem = Memory::new();
        let err = mem.load_words(image.origin, &image.words).unwrap_err();
        assert!(matches!(err, MemoryError::ImageTooLarge { .. }));
    }
}
