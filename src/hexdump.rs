//! Per-connection traffic dump sink.
//!
//! Every received and sent chunk is appended to `conn-<id>.txt` under the
//! configured directory: a timestamped header line followed by offset / hex
//! / ASCII rows. Write failures are swallowed; the dump is a diagnostic
//! sink and never affects the state machine.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::connection::ConnId;

/// Append one chunk to the connection's dump file. `marker` is `"<-"` for
/// received data, `"->"` for sent data.
pub(crate) fn dump(dir: Option<&Path>, id: ConnId, marker: &str, data: &[u8]) {
    let name = format!("conn-{}.txt", id.as_usize());
    let path = match dir {
        Some(dir) => dir.join(name),
        None => name.into(),
    };

    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut out = String::with_capacity(data.len() * 4 + 64);
    let _ = writeln!(out, "{} {} {} bytes", marker, epoch, data.len());

    let mut ascii = String::with_capacity(16);
    for (i, byte) in data.iter().enumerate() {
        if i % 16 == 0 {
            if i > 0 {
                let _ = writeln!(out, "  {}", ascii);
                ascii.clear();
            }
            let _ = write!(out, "{:04x} ", i);
        }
        let _ = write!(out, " {:02x}", byte);
        ascii.push(if (0x20..=0x7e).contains(byte) {
            *byte as char
        } else {
            '.'
        });
    }
    if !ascii.is_empty() {
        for _ in 0..(16 - ascii.len()) {
            out.push_str("   ");
        }
        let _ = writeln!(out, "  {}", ascii);
    }
    out.push('\n');

    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = file.write_all(out.as_bytes());
    }
}
