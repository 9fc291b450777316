// src/monitor.rs
//
// Monitor buffer: everything received from the port (and echoed
// transmissions), in arrival order. Shared between the read loop, which
// appends, and the front end, which renders and saves it.

use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::io::serial::TextEncoding;

// ============================================================================
// Types
// ============================================================================

struct MonitorInner {
    data: Vec<u8>,
    /// Maximum bytes retained (None = unbounded)
    capacity: Option<usize>,
    /// Total bytes ever appended, including any dropped by the capacity limit
    total_appended: u64,
    /// Bumped by every clear
    generation: u64,
}

/// Position of an incremental reader in the monitor stream.
/// Start from `ReadCursor::default()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadCursor {
    generation: u64,
    seen: u64,
}

impl ReadCursor {
    /// Bytes seen since the last clear
    pub fn seen(&self) -> u64 {
        self.seen
    }
}

/// Cloneable handle to a shared monitor buffer
#[derive(Clone)]
pub struct MonitorBuffer {
    inner: Arc<RwLock<MonitorInner>>,
}

impl Default for MonitorBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorBuffer {
    /// Unbounded buffer
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Buffer that keeps at most `capacity` bytes, dropping the oldest first
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MonitorInner {
                data: Vec::new(),
                capacity,
                total_appended: 0,
                generation: 0,
            })),
        }
    }

    /// Append bytes at the end of the buffer.
    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.data.extend_from_slice(bytes);
        inner.total_appended += bytes.len() as u64;
        if let Some(cap) = inner.capacity {
            if inner.data.len() > cap {
                let excess = inner.data.len() - cap;
                inner.data.drain(..excess);
            }
        }
    }

    /// Bytes currently held
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.data.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes appended since creation or the last clear
    pub fn total_appended(&self) -> u64 {
        self.inner.read().map(|i| i.total_appended).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.data.clear();
            inner.total_appended = 0;
            inner.generation += 1;
        }
    }

    /// Copy of the raw bytes
    pub fn bytes(&self) -> Vec<u8> {
        self.inner.read().map(|i| i.data.clone()).unwrap_or_default()
    }

    /// Bytes appended since `cursor`, and the cursor to pass next time.
    /// Bytes already dropped by the capacity limit are lost. After a clear
    /// the reader starts over from the new contents.
    pub fn read_since(&self, cursor: ReadCursor) -> (Vec<u8>, ReadCursor) {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(_) => return (Vec::new(), cursor),
        };
        let seen = if cursor.generation == inner.generation {
            cursor.seen.min(inner.total_appended)
        } else {
            0
        };
        let new = (inner.total_appended - seen).min(inner.data.len() as u64) as usize;
        let start = inner.data.len() - new;
        let next = ReadCursor {
            generation: inner.generation,
            seen: inner.total_appended,
        };
        (inner.data[start..].to_vec(), next)
    }

    /// Buffer decoded for display
    pub fn text(&self, encoding: TextEncoding) -> String {
        match self.inner.read() {
            Ok(inner) => encoding.decode(&inner.data),
            Err(_) => String::new(),
        }
    }

    /// Hex view, `width` bytes per row with an offset column:
    /// `00000000  48 65 6c 6c 6f  |Hello|`
    pub fn hex_dump(&self, width: usize) -> String {
        let width = width.max(1);
        let data = self.bytes();
        let mut out = String::new();
        for (row, chunk) in data.chunks(width).enumerate() {
            let hex_bytes: Vec<String> = chunk.iter().map(|b| hex::encode([*b])).collect();
            let ascii: String = chunk
                .iter()
                .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
                .collect();
            out.push_str(&format!(
                "{:08x}  {:<pad$}  |{}|\n",
                row * width,
                hex_bytes.join(" "),
                ascii,
                pad = width * 3 - 1
            ));
        }
        out
    }

    /// Write the decoded buffer to a file, replacing any existing content.
    pub fn save_to_file(&self, path: &Path, encoding: TextEncoding) -> Result<usize, String> {
        let text = self.text(encoding);
        std::fs::write(path, text.as_bytes())
            .map_err(|e| format!("Unable to write to {}: {}", path.display(), e))?;
        dlog!("SAVE_OUTPUT", "{}", path.display());
        Ok(text.len())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let monitor = MonitorBuffer::new();
        monitor.append(b"Hel");
        monitor.append(b"");
        monitor.append(b"lo\n");
        assert_eq!(monitor.bytes(), b"Hello\n".to_vec());
        assert_eq!(monitor.len(), 6);
        assert_eq!(monitor.total_appended(), 6);
    }

    #[test]
    fn test_clones_share_storage() {
        let monitor = MonitorBuffer::new();
        let writer = monitor.clone();
        writer.append(b"abc");
        assert_eq!(monitor.text(TextEncoding::Utf8), "abc");
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let monitor = MonitorBuffer::with_capacity(Some(4));
        monitor.append(b"abc");
        monitor.append(b"def");
        assert_eq!(monitor.bytes(), b"cdef".to_vec());
        assert_eq!(monitor.total_appended(), 6);
    }

    #[test]
    fn test_read_since() {
        let monitor = MonitorBuffer::with_capacity(Some(4));
        monitor.append(b"ab");
        let (bytes, cursor) = monitor.read_since(ReadCursor::default());
        assert_eq!(bytes, b"ab".to_vec());
        assert_eq!(cursor.seen(), 2);

        let (bytes, cursor) = monitor.read_since(cursor);
        assert!(bytes.is_empty());
        assert_eq!(cursor.seen(), 2);

        // More than the capacity arrived: only what is retained comes back
        monitor.append(b"cdefg");
        let (bytes, cursor) = monitor.read_since(cursor);
        assert_eq!(bytes, b"defg".to_vec());
        assert_eq!(cursor.seen(), 7);

        monitor.clear();
        monitor.append(b"z");
        let (bytes, cursor) = monitor.read_since(cursor);
        assert_eq!(bytes, b"z".to_vec());
        assert_eq!(cursor.seen(), 1);
    }

    #[test]
    fn test_read_since_after_clear_returns_all_new_data() {
        let monitor = MonitorBuffer::new();
        monitor.append(b"xy");
        let (_, cursor) = monitor.read_since(ReadCursor::default());
        assert_eq!(cursor.seen(), 2);

        // The new total passes the old position before the next read
        monitor.clear();
        monitor.append(b"fresh");
        let (bytes, cursor) = monitor.read_since(cursor);
        assert_eq!(bytes, b"fresh".to_vec());
        assert_eq!(cursor.seen(), 5);
    }

    #[test]
    fn test_clear() {
        let monitor = MonitorBuffer::new();
        monitor.append(b"data");
        monitor.clear();
        assert!(monitor.is_empty());
        assert_eq!(monitor.total_appended(), 0);
    }

    #[test]
    fn test_text_latin1_is_byte_per_char() {
        let monitor = MonitorBuffer::new();
        monitor.append(&[0x54, 0xB0, 0x43]);
        assert_eq!(monitor.text(TextEncoding::Latin1), "T\u{b0}C");
    }

    #[test]
    fn test_hex_dump() {
        let monitor = MonitorBuffer::new();
        monitor.append(b"Hi\r\n");
        let dump = monitor.hex_dump(4);
        assert_eq!(dump, "00000000  48 69 0d 0a  |Hi..|\n");

        monitor.append(b"!");
        let dump = monitor.hex_dump(4);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "00000004  21           |!|");
    }

    #[test]
    fn test_save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");

        let monitor = MonitorBuffer::new();
        monitor.append(b"line one\nline two\n");
        let written = monitor.save_to_file(&path, TextEncoding::Utf8).unwrap();

        assert_eq!(written, 18);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line one\nline two\n");
    }

    #[test]
    fn test_save_to_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("output.txt");
        let monitor = MonitorBuffer::new();
        let err = monitor.save_to_file(&path, TextEncoding::Utf8).unwrap_err();
        assert!(err.starts_with("Unable to write to"));
    }
}
