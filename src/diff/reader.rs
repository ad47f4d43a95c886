use std::io::{self, Read, Write};
use std::ops::Range;

/// Splits a byte stream into lines using a fixed-size read buffer.
///
/// Lines are split on `\n` before any UTF-8 decoding happens. A line whose
/// bytes straddle two reads (including a multi-byte character cut in half by
/// the buffer boundary) is carried over in the caller's line buffer until the
/// newline arrives, so decoding always sees complete sequences.
pub struct LineReader<R> {
    inner: R,
    chunk: Vec<u8>,
    start: usize,
    end: usize,
    consumed: u64,
    eof: bool,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R, buffer_size: usize) -> Self {
        Self {
            inner,
            chunk: vec![0; buffer_size.max(1)],
            start: 0,
            end: 0,
            consumed: 0,
            eof: false,
        }
    }

    /// Total bytes handed out so far
    pub fn offset(&self) -> u64 {
        self.consumed
    }

    /// Read the next line into `line` (without the trailing `\n`) and return
    /// its absolute byte range, newline included. `None` at end of input.
    pub fn next_line(&mut self, line: &mut Vec<u8>) -> io::Result<Option<Range<u64>>> {
        line.clear();
        let line_start = self.consumed;
        loop {
            if self.start < self.end {
                let window = &self.chunk[self.start..self.end];
                if let Some(i) = window.iter().position(|&b| b == b'\n') {
                    line.extend_from_slice(&window[..i]);
                    self.start += i + 1;
                    self.consumed += (i + 1) as u64;
                    return Ok(Some(line_start..self.consumed));
                }
                line.extend_from_slice(window);
                self.consumed += window.len() as u64;
                self.start = self.end;
            }

            if self.eof {
                if self.consumed == line_start {
                    return Ok(None);
                }
                // Final line without a trailing newline
                return Ok(Some(line_start..self.consumed));
            }

            match self.inner.read(&mut self.chunk) {
                Ok(0) => self.eof = true,
                Ok(n) => {
                    self.start = 0;
                    self.end = n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

/// Copies every chunk read from `inner` into `sink`
pub struct TeeReader<R, W> {
    inner: R,
    sink: W,
}

impl<R, W> TeeReader<R, W> {
    pub fn new(inner: R, sink: W) -> Self {
        Self { inner, sink }
    }
}

impl<R: Read, W: Write> Read for TeeReader<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.sink.write_all(&buf[..n])?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(input: &[u8], buffer: usize) -> Vec<(String, Range<u64>)> {
        let mut reader = LineReader::new(Cursor::new(input.to_vec()), buffer);
        let mut line = Vec::new();
        let mut out = Vec::new();
        while let Some(range) = reader.next_line(&mut line).unwrap() {
            out.push((String::from_utf8(line.clone()).unwrap(), range));
        }
        out
    }

    #[test]
    fn splits_lines_with_ranges() {
        let lines = collect(b"ab\ncd\n", 64);
        assert_eq!(lines, vec![("ab".to_string(), 0..3), ("cd".to_string(), 3..6)]);
    }

    #[test]
    fn final_line_without_newline() {
        let lines = collect(b"ab\ncd", 64);
        assert_eq!(lines[1], ("cd".to_string(), 3..5));
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(collect(b"", 8).is_empty());
    }

    #[test]
    fn empty_lines_are_kept() {
        let lines = collect(b"\n\nx\n", 2);
        let texts: Vec<&str> = lines.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(texts, vec!["", "", "x"]);
    }

    #[test]
    fn multibyte_characters_survive_every_buffer_boundary() {
        let text = "+héllo wörld ✓\n-日本語テキスト\n 🦀 crab\n";
        for buffer in 1..=9 {
            let lines = collect(text.as_bytes(), buffer);
            let texts: Vec<&str> = lines.iter().map(|(l, _)| l.as_str()).collect();
            assert_eq!(
                texts,
                vec!["+héllo wörld ✓", "-日本語テキスト", " 🦀 crab"],
                "buffer size {buffer}"
            );
            assert_eq!(lines.last().unwrap().1.end, text.len() as u64);
        }
    }

    #[test]
    fn tee_copies_everything_read() {
        let mut sink = Vec::new();
        {
            let tee = TeeReader::new(Cursor::new(b"one\ntwo\n".to_vec()), &mut sink);
            let mut reader = LineReader::new(tee, 3);
            let mut line = Vec::new();
            while reader.next_line(&mut line).unwrap().is_some() {}
        }
        assert_eq!(sink, b"one\ntwo\n");
    }
}
