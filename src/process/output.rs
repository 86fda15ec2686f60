//! Captured child output.
//!
//! Chunks arrive as raw bytes from two pipes. Each stream keeps its own
//! decoder so a multi-byte UTF-8 sequence split across reads is held back
//! until its remaining bytes arrive instead of being replaced. Invalid
//! sequences become U+FFFD.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub kind: StreamKind,
    pub bytes: Vec<u8>,
}

/// Per-stream text plus the interleaved stream in arrival order.
#[derive(Debug, Default)]
pub struct Transcript {
    stdout: String,
    stderr: String,
    combined: String,
    pending_stdout: Vec<u8>,
    pending_stderr: Vec<u8>,
}

impl Transcript {
    pub fn push(&mut self, chunk: &OutputChunk) {
        let (pending, text) = match chunk.kind {
            StreamKind::Stdout => (&mut self.pending_stdout, &mut self.stdout),
            StreamKind::Stderr => (&mut self.pending_stderr, &mut self.stderr),
        };
        let decoded = decode_utf8(pending, &chunk.bytes);
        text.push_str(&decoded);
        self.combined.push_str(&decoded);
    }

    /// Flush incomplete trailing sequences once no more bytes can arrive.
    pub fn finish(&mut self) {
        for (pending, text) in [
            (&mut self.pending_stdout, &mut self.stdout),
            (&mut self.pending_stderr, &mut self.stderr),
        ] {
            if !pending.is_empty() {
                let tail = String::from_utf8_lossy(pending).into_owned();
                text.push_str(&tail);
                self.combined.push_str(&tail);
                pending.clear();
            }
        }
    }

    pub fn combined(&self) -> &str {
        &self.combined
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn into_parts(self) -> (String, String, String) {
        (self.stdout, self.stderr, self.combined)
    }
}

fn decode_utf8(pending: &mut Vec<u8>, bytes: &[u8]) -> String {
    pending.extend_from_slice(bytes);
    let mut out = String::new();

    loop {
        match std::str::from_utf8(pending) {
            Ok(valid) => {
                out.push_str(valid);
                pending.clear();
                return out;
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[..valid_up_to]));
                match e.error_len() {
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid_up_to + len);
                    }
                    None => {
                        // Incomplete sequence at the end; wait for more bytes.
                        pending.drain(..valid_up_to);
                        return out;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(kind: StreamKind, bytes: &[u8]) -> OutputChunk {
        OutputChunk {
            kind,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_combined_preserves_arrival_order() {
        let mut t = Transcript::default();
        t.push(&chunk(StreamKind::Stdout, b"one\n"));
        t.push(&chunk(StreamKind::Stderr, b"warn\n"));
        t.push(&chunk(StreamKind::Stdout, b"two\n"));
        t.finish();

        assert_eq!(t.stdout(), "one\ntwo\n");
        assert_eq!(t.stderr(), "warn\n");
        assert_eq!(t.combined(), "one\nwarn\ntwo\n");
    }

    #[test]
    fn test_split_multibyte_sequence_is_reassembled() {
        let bytes = "héllo".as_bytes();
        // Split inside the two-byte 'é'.
        let mut t = Transcript::default();
        t.push(&chunk(StreamKind::Stdout, &bytes[..2]));
        assert_eq!(t.stdout(), "h");
        t.push(&chunk(StreamKind::Stdout, &bytes[2..]));
        assert_eq!(t.stdout(), "héllo");
    }

    #[test]
    fn test_invalid_bytes_become_replacement_char() {
        let mut t = Transcript::default();
        t.push(&chunk(StreamKind::Stdout, b"ok \xff done"));
        assert_eq!(t.stdout(), "ok \u{FFFD} done");
    }

    #[test]
    fn test_finish_flushes_truncated_tail() {
        let mut t = Transcript::default();
        t.push(&chunk(StreamKind::Stderr, &[b'x', 0xE2, 0x82]));
        assert_eq!(t.stderr(), "x");
        t.finish();
        assert!(t.stderr().starts_with('x'));
        assert!(t.stderr().contains(char::REPLACEMENT_CHARACTER));
    }
}
