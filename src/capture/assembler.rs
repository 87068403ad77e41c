//! Line Assembler
//!
//! Reassembles raw chunks into lines split on line feed, carrying a partial
//! line across reads. Terminator bytes are kept on the [`Line`] rather than
//! discarded so the original stream can always be reconstructed.

use crate::serial::RawChunk;

/// How a line ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// `\n`
    Lf,
    /// `\r\n`, with the carriage return stripped from the content
    CrLf,
    /// Trailing partial line flushed at session end
    None,
}

impl Terminator {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Terminator::Lf => b"\n",
            Terminator::CrLf => b"\r\n",
            Terminator::None => b"",
        }
    }
}

/// One complete line of captured output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    content: Vec<u8>,
    terminator: Terminator,
}

impl Line {
    pub fn new(content: Vec<u8>, terminator: Terminator) -> Self {
        Self { content, terminator }
    }

    /// Content decoded for display; invalid UTF-8 is replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    /// Number of bytes this line accounts for, terminator included
    pub fn raw_len(&self) -> usize {
        self.content.len() + self.terminator.as_bytes().len()
    }
}

#[cfg(test)]
impl Line {
    /// Line bytes without the terminator
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn terminator(&self) -> Terminator {
        self.terminator
    }

    /// The exact bytes read from the port
    pub fn raw_bytes(&self) -> Vec<u8> {
        let mut raw = self.content.clone();
        raw.extend_from_slice(self.terminator.as_bytes());
        raw
    }
}

/// Splits a byte stream into lines
#[derive(Debug, Default)]
pub struct LineAssembler {
    partial: Vec<u8>,
    strip_cr: bool,
}

impl LineAssembler {
    pub fn new(strip_cr: bool) -> Self {
        Self {
            partial: Vec::new(),
            strip_cr,
        }
    }

    /// Feed one chunk, returning every line it completes in order
    pub fn push(&mut self, chunk: &RawChunk) -> Vec<Line> {
        let mut lines = Vec::new();
        let mut rest = chunk.bytes.as_slice();

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.partial.extend_from_slice(&rest[..pos]);
            rest = &rest[pos + 1..];

            let mut content = std::mem::take(&mut self.partial);
            let terminator = if self.strip_cr && content.last() == Some(&b'\r') {
                content.pop();
                Terminator::CrLf
            } else {
                Terminator::Lf
            };
            lines.push(Line::new(content, terminator));
        }

        self.partial.extend_from_slice(rest);
        lines
    }

    /// Bytes waiting for a terminator
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Whether the unterminated tail contains `pattern`
    ///
    /// Prompts such as `login: ` never receive a line feed.
    pub fn pending_contains(&self, pattern: &str) -> bool {
        !self.partial.is_empty() && String::from_utf8_lossy(&self.partial).contains(pattern)
    }

    /// Emit the trailing partial line, if any
    pub fn finish(&mut self) -> Option<Line> {
        if self.partial.is_empty() {
            return None;
        }
        Some(Line::new(std::mem::take(&mut self.partial), Terminator::None))
    }

    /// Drop the trailing partial line, returning how many bytes were lost
    pub fn discard(&mut self) -> usize {
        let dropped = self.partial.len();
        self.partial.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(assembler: &mut LineAssembler, chunks: &[&[u8]]) -> Vec<Line> {
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(assembler.push(&RawChunk::new(*chunk)));
        }
        lines.extend(assembler.finish());
        lines
    }

    #[test]
    fn test_lines_across_chunks() {
        let mut assembler = LineAssembler::new(true);
        let lines = feed(&mut assembler, &[b"hello\n", b"wor", b"ld\n"]);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text(), "hello");
        assert_eq!(lines[1].text(), "world");
        assert_eq!(lines[1].terminator(), Terminator::Lf);
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut assembler = LineAssembler::new(true);
        let lines = assembler.push(&RawChunk::new(&b"a\nb\n\nc"[..]));

        let texts: Vec<String> = lines.iter().map(Line::text).collect();
        assert_eq!(texts, vec!["a", "b", ""]);
        assert_eq!(assembler.pending(), 1);
    }

    #[test]
    fn test_trailing_partial_line() {
        let mut assembler = LineAssembler::new(true);
        let lines = feed(&mut assembler, &[b"partial"]);

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text(), "partial");
        assert_eq!(lines[0].terminator(), Terminator::None);
        assert!(assembler.finish().is_none());
    }

    #[test]
    fn test_carriage_return_handling() {
        let mut stripping = LineAssembler::new(true);
        let line = stripping.push(&RawChunk::new(&b"boot\r\n"[..])).remove(0);
        assert_eq!(line.content(), b"boot");
        assert_eq!(line.terminator(), Terminator::CrLf);

        let mut keeping = LineAssembler::new(false);
        let line = keeping.push(&RawChunk::new(&b"boot\r\n"[..])).remove(0);
        assert_eq!(line.content(), b"boot\r");
        assert_eq!(line.terminator(), Terminator::Lf);
    }

    #[test]
    fn test_carriage_return_split_from_line_feed() {
        let mut assembler = LineAssembler::new(true);
        let lines = feed(&mut assembler, &[b"U-Boot\r", b"\nLinux"]);
        assert_eq!(lines[0].content(), b"U-Boot");
        assert_eq!(lines[0].terminator(), Terminator::CrLf);
        assert_eq!(lines[1].content(), b"Linux");
    }

    #[test]
    fn test_no_bytes_lost() {
        let stream: &[&[u8]] = &[
            b"\r\n",
            b"Starting kernel ...\r\n\r",
            b"\n[    0.000000] Booting Linux",
            b"",
            b" on physical CPU 0x0\n\xff\xfe",
            b"\rlogin: ",
        ];

        for strip_cr in [true, false] {
            let mut assembler = LineAssembler::new(strip_cr);
            let lines = feed(&mut assembler, stream);

            let rebuilt: Vec<u8> = lines.iter().flat_map(Line::raw_bytes).collect();
            let original: Vec<u8> = stream.concat();
            assert_eq!(rebuilt, original);
            assert_eq!(lines.iter().map(Line::raw_len).sum::<usize>(), original.len());
        }
    }

    #[test]
    fn test_pending_prompt_match() {
        let mut assembler = LineAssembler::new(true);
        assembler.push(&RawChunk::new(&b"Welcome\nbuildroot log"[..]));
        assert!(!assembler.pending_contains("login:"));

        assembler.push(&RawChunk::new(&b"in: "[..]));
        assert!(assembler.pending_contains("login:"));
        assert_eq!(assembler.pending(), 17);

        assembler.push(&RawChunk::new(&b"\n"[..]));
        assert!(!assembler.pending_contains("login:"));
    }

    #[test]
    fn test_discard_partial() {
        let mut assembler = LineAssembler::new(true);
        assembler.push(&RawChunk::new(&b"done\ngarb"[..]));
        assert_eq!(assembler.discard(), 4);
        assert!(assembler.finish().is_none());
    }
}
