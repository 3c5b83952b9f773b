//! Delimiter-based frame decoding
//!
//! Accumulates bytes one at a time and emits a frame whenever the delimiter
//! is seen. The delimiter itself is never part of the emitted frame.

use crate::constants::{INBOUND_DELIMITER, MAX_FRAME_SIZE};
use std::io::{self, Read};
use tracing::warn;

/// Incremental byte-at-a-time frame decoder
pub struct FrameDecoder {
    buffer: Vec<u8>,
    delimiter: u8,
    /// Maximum buffer size before the partial frame is dropped
    max_size: usize,
    /// Dropping the rest of an over-long frame up to its delimiter
    discarding: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(INBOUND_DELIMITER)
    }
}

impl FrameDecoder {
    /// Create a decoder splitting on `delimiter`
    pub fn new(delimiter: u8) -> Self {
        Self {
            buffer: Vec::with_capacity(64),
            delimiter,
            max_size: MAX_FRAME_SIZE,
            discarding: false,
        }
    }

    /// Feed one byte, returning a frame when it completes one
    ///
    /// Two consecutive delimiters produce an empty frame. A frame longer than
    /// the maximum is dropped whole, through its delimiter.
    pub fn feed(&mut self, byte: u8) -> Option<String> {
        if self.discarding {
            if byte == self.delimiter {
                self.discarding = false;
            }
            return None;
        }

        if byte == self.delimiter {
            let raw = std::mem::take(&mut self.buffer);
            return Some(match String::from_utf8(raw) {
                Ok(text) => text,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            });
        }

        self.buffer.push(byte);
        if self.buffer.len() > self.max_size {
            warn!(
                "Inbound frame exceeds {} bytes without delimiter, dropping",
                self.max_size
            );
            self.buffer.clear();
            self.discarding = true;
        }
        None
    }

    /// Feed a chunk, calling `on_frame` for each completed frame
    pub fn feed_slice(&mut self, data: &[u8], mut on_frame: impl FnMut(String)) {
        for &byte in data {
            if let Some(frame) = self.feed(byte) {
                on_frame(frame);
            }
        }
    }

    /// Bytes of the frame currently being accumulated
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Lazy sequence of inbound frames read from a blocking byte source
///
/// Yields `Ok(frame)` for each `'\n'`-terminated frame. The sequence ends at
/// end-of-stream, or after yielding the first read error. A partial frame
/// left at end-of-stream is discarded.
pub struct Frames<R> {
    source: R,
    decoder: FrameDecoder,
    done: bool,
}

/// Decode inbound frames from `source`, reading one byte at a time
pub fn decode_stream<R: Read>(source: R) -> Frames<R> {
    Frames {
        source,
        decoder: FrameDecoder::default(),
        done: false,
    }
}

impl<R: Read> Iterator for Frames<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut byte = [0u8; 1];
        loop {
            match self.source.read(&mut byte) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {
                    if let Some(frame) = self.decoder.feed(byte[0]) {
                        return Some(Ok(frame));
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn collect(data: &[u8]) -> Vec<String> {
        decode_stream(Cursor::new(data.to_vec()))
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn test_decode_single_frame() {
        assert_eq!(collect(b"BL: 37\n"), vec!["BL: 37"]);
    }

    #[test]
    fn test_decode_multiple_frames_in_order() {
        assert_eq!(collect(b"one\ntwo\nthree\n"), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_decode_empty_frame() {
        assert_eq!(collect(b"a\n\nb\n"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_decode_drops_trailing_partial() {
        assert_eq!(collect(b"done\npart"), vec!["done"]);
    }

    #[test]
    fn test_decode_nul_is_ordinary_inbound_byte() {
        assert_eq!(collect(b"x\0y\n"), vec!["x\0y"]);
    }

    struct FailAfter {
        data: Cursor<Vec<u8>>,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_decode_ends_after_error() {
        let mut frames = decode_stream(FailAfter {
            data: Cursor::new(b"ok\n".to_vec()),
        });
        assert_eq!(frames.next().unwrap().unwrap(), "ok");
        let err = frames.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_feed_outbound_delimiter() {
        let mut decoder = FrameDecoder::new(0x00);
        let mut frames = Vec::new();
        decoder.feed_slice(b"F\0Hello\0", |f| frames.push(f));
        assert_eq!(frames, vec!["F", "Hello"]);
    }

    #[test]
    fn test_feed_partial_then_complete() {
        let mut decoder = FrameDecoder::default();
        let mut frames = Vec::new();
        decoder.feed_slice(b"BL: ", |f| frames.push(f));
        assert!(frames.is_empty());
        assert_eq!(decoder.pending(), 4);

        decoder.feed_slice(b"12\n", |f| frames.push(f));
        assert_eq!(frames, vec!["BL: 12"]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_overflow_drops_whole_frame() {
        let mut decoder = FrameDecoder::default();
        let junk = vec![b'x'; MAX_FRAME_SIZE + 1];
        let mut frames = Vec::new();
        decoder.feed_slice(&junk, |f| frames.push(f));
        assert_eq!(decoder.pending(), 0);

        // Tail of the over-long line goes with it
        decoder.feed_slice(b"more
", |f| frames.push(f));
        assert!(frames.is_empty());

        decoder.feed_slice(b"ok
", |f| frames.push(f));
        assert_eq!(frames, vec!["ok"]);
    }

    #[test]
    fn test_overflow_tail_never_becomes_addressed_frame() {
        let mut wire = vec![b'x'; MAX_FRAME_SIZE + 1];
        wire.extend_from_slice(b"BL: 99\n");
        assert!(collect(&wire).is_empty());

        wire.extend_from_slice(b"BL: 42\n");
        assert_eq!(collect(&wire), vec!["BL: 42"]);
    }

    proptest! {
        #[test]
        fn prop_two_frames_roundtrip(m1 in "[^\n]{0,64}", m2 in "[^\n]{0,64}") {
            let mut wire = Vec::new();
            wire.extend_from_slice(m1.as_bytes());
            wire.push(INBOUND_DELIMITER);
            wire.extend_from_slice(m2.as_bytes());
            wire.push(INBOUND_DELIMITER);

            prop_assert_eq!(collect(&wire), vec![m1, m2]);
        }
    }
}
