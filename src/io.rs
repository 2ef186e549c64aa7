// This file is part of the uutils coreutils package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! Low level read/write/seek helpers shared by the one-shot tail and the
//! follow engine.

use std::cmp;
use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};

use uucore::display::Quotable;
use uucore::error::{UResult, USimpleError};

use crate::paths::HeaderPrinter;
use crate::platform;

pub const BUFSIZ: usize = libc::BUFSIZ as usize;

/// Read everything that is currently available.
pub const COPY_TO_EOF: u64 = u64::MAX;
/// Read at most one buffer's worth, then hand control back to the caller.
pub const COPY_A_BUFFER: u64 = u64::MAX - 1;

/// `read(2)` that retries on signal interruption. `EAGAIN` is surfaced as
/// `ErrorKind::WouldBlock` so callers can treat it as "no data yet".
pub fn safe_read(file: &File, buf: &mut [u8]) -> io::Result<usize> {
    let mut reader: &File = file;
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

pub fn seek(file: &File, pos: SeekFrom) -> io::Result<u64> {
    let mut seeker: &File = file;
    seeker.seek(pos)
}

/// Seek, or fail the run with a whence-specific diagnostic.
pub fn xlseek(file: &File, pos: SeekFrom, name: &str) -> UResult<u64> {
    seek(file, pos).map_err(|e| {
        let message = match pos {
            SeekFrom::Start(offset) => {
                format!("{}: cannot seek to offset {offset}: {e}", name.maybe_quote())
            }
            SeekFrom::Current(offset) => format!(
                "{}: cannot seek to relative offset {offset}: {e}",
                name.maybe_quote()
            ),
            SeekFrom::End(offset) => format!(
                "{}: cannot seek to end-relative offset {offset}: {e}",
                name.maybe_quote()
            ),
        };
        USimpleError::new(1, message)
    })
}

/// Write all of `buf` to standard output or fail the run with a single
/// diagnostic. A broken pipe terminates with the conventional signal.
pub fn xwrite_stdout(out: &mut impl Write, buf: &[u8]) -> UResult<()> {
    out.write_all(buf).map_err(|e| {
        if e.kind() == ErrorKind::BrokenPipe {
            platform::die_pipe();
        }
        USimpleError::new(1, format!("error writing {}: {e}", "standard output".quote()))
    })
}

pub fn xflush(out: &mut impl Write) -> UResult<()> {
    out.flush().map_err(|e| {
        if e.kind() == ErrorKind::BrokenPipe {
            platform::die_pipe();
        }
        USimpleError::new(1, format!("error writing {}: {e}", "standard output".quote()))
    })
}

/// Result of a [`dump_remainder`] drain. Read errors are handed back to
/// the caller, which knows whether the target should be closed or the
/// whole run abandoned; write errors are always fatal.
pub struct Drained {
    pub bytes: u64,
    pub err: Option<io::Error>,
}

/// Copy up to `n_bytes` from the current position of `file` to `out`.
/// `COPY_TO_EOF` drains everything, `COPY_A_BUFFER` one buffer's worth.
/// The optional header is emitted lazily, just before the first byte, so
/// an empty drain stays silent.
pub fn dump_remainder(
    out: &mut impl Write,
    mut header: Option<(&mut HeaderPrinter, &str)>,
    file: &File,
    n_bytes: u64,
) -> UResult<Drained> {
    let mut buffer = [0u8; BUFSIZ];
    let mut n_written = 0u64;
    let mut n_remaining = n_bytes;

    loop {
        let n = cmp::min(n_remaining, BUFSIZ as u64) as usize;
        let bytes_read = match safe_read(file, &mut buffer[..n]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) => {
                return Ok(Drained {
                    bytes: n_written,
                    err: Some(e),
                })
            }
        };
        if let Some((printer, name)) = header.take() {
            printer.print(out, name)?;
        }
        xwrite_stdout(out, &buffer[..bytes_read])?;
        n_written += bytes_read as u64;
        if n_bytes != COPY_TO_EOF {
            n_remaining -= bytes_read as u64;
            if n_remaining == 0 || n_bytes == COPY_A_BUFFER {
                break;
            }
        }
    }

    Ok(Drained {
        bytes: n_written,
        err: None,
    })
}
