use std::io::{self, BufRead};

use super::Line;

/// Lazily splits a reader into numbered lines.
///
/// Invalid UTF-8 is replaced rather than rejected; trailing `\n` and `\r\n`
/// are stripped.
pub struct LineReader<R> {
    path: String,
    reader: R,
    line_number: usize,
    buf: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(path: impl Into<String>, reader: R) -> Self {
        Self {
            path: path.into(),
            reader,
            line_number: 0,
            buf: Vec::with_capacity(256),
        }
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = io::Result<Line>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                self.line_number += 1;
                Some(Ok(Line {
                    path: self.path.clone(),
                    line_number: self.line_number,
                    content: String::from_utf8_lossy(&self.buf).into_owned(),
                }))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
