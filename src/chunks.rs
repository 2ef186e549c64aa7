// This file is part of the uutils coreutils package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! Bounded tailing for inputs that cannot seek: a ring of fixed-size
//! buffers keeps just enough of the stream to satisfy the request, no
//! matter how long the input is.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{ErrorKind, Write};

use memchr::{memchr, memchr_iter};
use uucore::display::Quotable;
use uucore::error::UResult;

use crate::io::{safe_read, xwrite_stdout, BUFSIZ};

struct Chunk {
    data: Box<[u8; BUFSIZ]>,
    bytes: usize,
    lines: usize,
}

impl Chunk {
    fn new() -> Self {
        Self {
            data: Box::new([0; BUFSIZ]),
            bytes: 0,
            lines: 0,
        }
    }

    fn reset(&mut self) {
        self.bytes = 0;
        self.lines = 0;
    }

    fn filled(&self) -> &[u8] {
        &self.data[..self.bytes]
    }
}

/// Print the last `n_lines` lines (delimited by `delimiter`) of a
/// stream that cannot be seeked, reading it to the end. Returns whether
/// the read succeeded and how many bytes were consumed.
pub fn pipe_lines(
    out: &mut impl Write,
    file: &File,
    name: &str,
    n_lines: u64,
    delimiter: u8,
) -> UResult<(bool, u64)> {
    let mut chunks: VecDeque<Chunk> = VecDeque::new();
    chunks.push_back(Chunk::new());
    let mut tmp = Chunk::new();
    let mut total_lines = 0u64;
    let mut read_pos = 0u64;

    loop {
        let n_read = match safe_read(file, &mut tmp.data[..]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) => {
                show_error!("error reading {}: {e}", name.quote());
                return Ok((false, read_pos));
            }
        };
        tmp.bytes = n_read;
        read_pos += n_read as u64;
        tmp.lines = memchr_iter(delimiter, &tmp.data[..n_read]).count();
        total_lines += tmp.lines as u64;

        let last = chunks.back_mut().unwrap();
        if tmp.bytes + last.bytes < BUFSIZ {
            // Pipe reads are often tiny; pack them into the tail buffer.
            last.data[last.bytes..last.bytes + tmp.bytes].copy_from_slice(tmp.filled());
            last.bytes += tmp.bytes;
            last.lines += tmp.lines;
            tmp.reset();
        } else {
            chunks.push_back(tmp);
            // Recycle the head buffer if dropping it still leaves enough
            // lines to satisfy the request.
            tmp = if total_lines - chunks.front().unwrap().lines as u64 > n_lines {
                let mut head = chunks.pop_front().unwrap();
                total_lines -= head.lines as u64;
                head.reset();
                head
            } else {
                Chunk::new()
            };
        }
    }

    // Nothing buffered, or nothing requested.
    if chunks.back().unwrap().bytes == 0 || n_lines == 0 {
        return Ok((true, read_pos));
    }

    // A stream that does not end with the delimiter still carries one
    // final, incomplete line.
    {
        let last = chunks.back_mut().unwrap();
        if last.data[last.bytes - 1] != delimiter {
            last.lines += 1;
            total_lines += 1;
        }
    }

    // Skip whole buffers that only hold surplus lines.
    let mut i = 0;
    while total_lines - chunks[i].lines as u64 > n_lines {
        total_lines -= chunks[i].lines as u64;
        i += 1;
    }

    // Then find the exact starting byte inside the remaining head.
    let mut beg = 0;
    if total_lines > n_lines {
        let chunk = &chunks[i];
        for _ in 0..total_lines - n_lines {
            beg += memchr(delimiter, &chunk.data[beg..chunk.bytes]).unwrap() + 1;
        }
    }

    xwrite_stdout(out, &chunks[i].filled()[beg..])?;
    for chunk in chunks.iter().skip(i + 1) {
        xwrite_stdout(out, chunk.filled())?;
    }

    Ok((true, read_pos))
}

/// Byte-mode counterpart of [`pipe_lines`].
pub fn pipe_bytes(
    out: &mut impl Write,
    file: &File,
    name: &str,
    n_bytes: u64,
) -> UResult<(bool, u64)> {
    let mut chunks: VecDeque<Chunk> = VecDeque::new();
    chunks.push_back(Chunk::new());
    let mut tmp = Chunk::new();
    let mut total_bytes = 0u64;
    let mut read_pos = 0u64;

    loop {
        let n_read = match safe_read(file, &mut tmp.data[..]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) => {
                show_error!("error reading {}: {e}", name.quote());
                return Ok((false, read_pos));
            }
        };
        tmp.bytes = n_read;
        read_pos += n_read as u64;
        total_bytes += n_read as u64;

        let last = chunks.back_mut().unwrap();
        if tmp.bytes + last.bytes < BUFSIZ {
            last.data[last.bytes..last.bytes + tmp.bytes].copy_from_slice(tmp.filled());
            last.bytes += tmp.bytes;
            tmp.reset();
        } else {
            chunks.push_back(tmp);
            tmp = if total_bytes - chunks.front().unwrap().bytes as u64 > n_bytes {
                let mut head = chunks.pop_front().unwrap();
                total_bytes -= head.bytes as u64;
                head.reset();
                head
            } else {
                Chunk::new()
            };
        }
    }

    let mut i = 0;
    while total_bytes - chunks[i].bytes as u64 > n_bytes {
        total_bytes -= chunks[i].bytes as u64;
        i += 1;
    }

    let beg = total_bytes.saturating_sub(n_bytes) as usize;
    xwrite_stdout(out, &chunks[i].filled()[beg..])?;
    for chunk in chunks.iter().skip(i + 1) {
        xwrite_stdout(out, chunk.filled())?;
    }

    Ok((true, read_pos))
}
