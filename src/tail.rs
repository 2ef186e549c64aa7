// This file is part of the uutils coreutils package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore (ToDO) fspec tailable untailable inotify

#[macro_use]
extern crate uucore;

use std::fs::{File, Metadata, OpenOptions};
use std::io::{BufWriter, SeekFrom, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};

use memchr::{memchr, memrchr};
use uucore::display::Quotable;
use uucore::error::{set_exit_code, UResult, USimpleError};

pub mod args;
mod chunks;
mod follow;
mod io;
pub mod parse;
mod paths;
mod platform;

use args::{FilterMode, FollowMode, Settings};
use follow::files::{is_regular, is_tailable, FileSpec};
use io::{dump_remainder, safe_read, xflush, xlseek, xwrite_stdout, BUFSIZ, COPY_TO_EOF};
use paths::{HeaderPrinter, Input};

#[uucore::main]
pub fn uumain(args: impl uucore::Args) -> UResult<()> {
    let settings = args::parse_args(args)?;

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let found_hyphen = settings.inputs.iter().any(Input::is_stdin);
    if found_hyphen && settings.follow == Some(FollowMode::Name) {
        return Err(USimpleError::new(
            1,
            format!("cannot follow {} by name", "-".quote()),
        ));
    }

    // The stats used to detect growth say nothing useful about a tty.
    if settings.follow.is_some() && found_hyphen {
        let blocking_stdin = settings.pids.is_empty()
            && settings.follow == Some(FollowMode::Descriptor)
            && settings.inputs.len() == 1
            && platform::fd_mode(libc::STDIN_FILENO).is_ok_and(|mode| !is_regular(mode));
        if !blocking_stdin && platform::stdin_is_tty() {
            show_warning!("following standard input indefinitely is ineffective");
        }
    }

    // Don't read anything if we'll never output anything.
    if settings.follow.is_none() {
        let signum = match &settings.mode {
            FilterMode::Lines(signum, _) | FilterMode::Bytes(signum) => signum,
        };
        if signum.is_zero() {
            return Ok(());
        }
    }

    let mut hdr = HeaderPrinter::new(settings.verbose);
    let mut files: Vec<FileSpec> = settings
        .inputs
        .iter()
        .cloned()
        .map(FileSpec::new)
        .collect();

    let mut ok = true;
    let n_files = files.len();
    for spec in &mut files {
        ok &= tail_file(spec, &settings, n_files, &mut hdr, &mut out)?;
    }
    if !ok {
        set_exit_code(1);
    }

    if settings.follow.is_some() {
        follow::follow(&mut files, &settings, ok, &mut hdr, &mut out)?;
    }

    xflush(&mut out)?;
    Ok(())
}

/// Print the initial tail of one target and, when following, leave its
/// descriptor recorded for the engine.
fn tail_file(
    spec: &mut FileSpec,
    settings: &Settings,
    n_files: usize,
    hdr: &mut HeaderPrinter,
    out: &mut impl Write,
) -> UResult<bool> {
    let forever = settings.follow.is_some();
    // Avoid blocking if we may need to process asynchronously.
    let nonblocking = forever && (!settings.pids.is_empty() || n_files > 1);

    let opened = match spec.input.path() {
        Some(path) => OpenOptions::new()
            .read(true)
            .custom_flags(if nonblocking { libc::O_NONBLOCK } else { 0 })
            .open(path),
        None => platform::dup_stdin(),
    };
    spec.tailable = !(settings.retry && opened.is_err());

    let file = match opened {
        Err(e) => {
            if forever {
                spec.file = None;
                spec.errnum = e.raw_os_error().unwrap_or(-1);
                spec.ignore = !settings.retry;
                spec.ino = 0;
                spec.dev = 0;
            }
            show_error!(
                "cannot open {} for reading: {e}",
                spec.display_name().quote()
            );
            return Ok(false);
        }
        Ok(file) => file,
    };

    hdr.print(out, spec.display_name())?;
    let (mut ok, read_pos) = tail(out, &file, spec.display_name(), settings)?;

    if forever {
        spec.errnum = if ok { 0 } else { -1 };
        match file.metadata() {
            Err(e) => {
                ok = false;
                spec.errnum = e.raw_os_error().unwrap_or(-1);
                show_error!("error reading {}: {e}", spec.display_name().quote());
            }
            Ok(md) => {
                if !is_tailable(md.mode()) {
                    ok = false;
                    spec.errnum = -1;
                    spec.tailable = false;
                    spec.ignore = !settings.retry;
                    show_error!(
                        "{}: cannot follow end of this type of file{}",
                        spec.display_name().maybe_quote(),
                        if spec.ignore {
                            "; giving up on this name"
                        } else {
                            ""
                        }
                    );
                } else if ok {
                    // The read position, not st_size, is what the engine
                    // continues from; the file may have grown meanwhile.
                    let is_stdin = spec.input.is_stdin();
                    spec.record_open_fd(file, read_pos, &md, if is_stdin { None } else { Some(true) });
                    let held = spec.file.as_ref().unwrap();
                    spec.remote = platform::fremote(held, &spec.input.display_name);
                    return Ok(true);
                }
            }
        }
        spec.ignore = !settings.retry;
        spec.file = None;
    }

    Ok(ok)
}

/// Display the last (or all but the first) N units of `file`. Returns
/// success and the stream position reached.
fn tail(
    out: &mut impl Write,
    file: &File,
    name: &str,
    settings: &Settings,
) -> UResult<(bool, u64)> {
    match &settings.mode {
        FilterMode::Lines(signum, delimiter) => {
            let (from_start, n_lines) = signum.count_and_direction();
            tail_lines(out, file, name, n_lines, from_start, *delimiter, settings)
        }
        FilterMode::Bytes(signum) => {
            let (from_start, n_bytes) = signum.count_and_direction();
            tail_bytes(out, file, name, n_bytes, from_start, settings)
        }
    }
}

enum Skipped {
    Done,
    Eof,
    Error,
}

/// Skip `n_bytes` from the head of a non-seekable stream, printing
/// whatever part of the last read lies beyond them.
fn start_bytes(
    out: &mut impl Write,
    file: &File,
    name: &str,
    mut n_bytes: u64,
    read_pos: &mut u64,
) -> UResult<Skipped> {
    let mut buffer = [0u8; BUFSIZ];
    while n_bytes > 0 {
        let bytes_read = match safe_read(file, &mut buffer) {
            Ok(0) => return Ok(Skipped::Eof),
            Ok(n) => n as u64,
            Err(e) => {
                show_error!("error reading {}: {e}", name.quote());
                return Ok(Skipped::Error);
            }
        };
        *read_pos += bytes_read;
        if bytes_read <= n_bytes {
            n_bytes -= bytes_read;
        } else {
            xwrite_stdout(out, &buffer[n_bytes as usize..bytes_read as usize])?;
            break;
        }
    }
    Ok(Skipped::Done)
}

/// Line-mode counterpart of [`start_bytes`].
fn start_lines(
    out: &mut impl Write,
    file: &File,
    name: &str,
    mut n_lines: u64,
    delimiter: u8,
    read_pos: &mut u64,
) -> UResult<Skipped> {
    if n_lines == 0 {
        return Ok(Skipped::Done);
    }
    let mut buffer = [0u8; BUFSIZ];
    loop {
        let bytes_read = match safe_read(file, &mut buffer) {
            Ok(0) => return Ok(Skipped::Eof),
            Ok(n) => n,
            Err(e) => {
                show_error!("error reading {}: {e}", name.quote());
                return Ok(Skipped::Error);
            }
        };
        *read_pos += bytes_read as u64;

        let mut p = 0;
        while let Some(idx) = memchr(delimiter, &buffer[p..bytes_read]) {
            p += idx + 1;
            n_lines -= 1;
            if n_lines == 0 {
                if p < bytes_read {
                    xwrite_stdout(out, &buffer[p..bytes_read])?;
                }
                return Ok(Skipped::Done);
            }
        }
    }
}

/// Print the last `n_lines` lines of a seekable file by scanning block
/// by block backwards from the end until enough delimiters are seen.
#[allow(clippy::too_many_arguments)]
fn file_lines(
    out: &mut impl Write,
    file: &File,
    name: &str,
    md: &Metadata,
    mut n_lines: u64,
    delimiter: u8,
    start_pos: u64,
    end_pos: u64,
) -> UResult<(bool, u64)> {
    let mut read_pos = end_pos;
    if n_lines == 0 {
        return Ok((true, read_pos));
    }

    // Files on /proc or /sys accept seeking within the file but return
    // no data when the read is not page aligned. Their sizes are page
    // multiples, so use at least a page in that case.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) }.max(1) as u64;
    let bufsize = if md.len() % page_size == 0 {
        (BUFSIZ as u64).max(page_size)
    } else {
        BUFSIZ as u64
    };
    let mut buffer = vec![0u8; bufsize as usize];

    // Read the trailing partial block first so every following read
    // lands on a block boundary.
    let mut pos = end_pos;
    let mut to_read = ((pos - start_pos) % bufsize) as usize;
    if to_read == 0 {
        to_read = bufsize as usize;
    }
    pos -= to_read as u64;
    xlseek(file, SeekFrom::Start(pos), name)?;
    let mut bytes_read = match safe_read(file, &mut buffer[..to_read]) {
        Ok(n) => n,
        Err(e) => {
            show_error!("error reading {}: {e}", name.quote());
            return Ok((false, read_pos));
        }
    };
    read_pos = pos + bytes_read as u64;

    // A file that does not end with the delimiter still carries one
    // final, incomplete line.
    if bytes_read > 0 && buffer[bytes_read - 1] != delimiter {
        n_lines -= 1;
    }

    loop {
        // Scan backwards, counting the delimiters in this block.
        let mut n = bytes_read;
        while n > 0 {
            let Some(idx) = memrchr(delimiter, &buffer[..n]) else {
                break;
            };
            n = idx;
            if n_lines == 0 {
                // The byte after this delimiter starts the output.
                xwrite_stdout(out, &buffer[idx + 1..bytes_read])?;
                let drained =
                    dump_remainder(out, None, file, end_pos - (pos + bytes_read as u64))?;
                read_pos += drained.bytes;
                if let Some(e) = drained.err {
                    show_error!("error reading {}: {e}", name.quote());
                    return Ok((false, read_pos));
                }
                return Ok((true, read_pos));
            }
            n_lines -= 1;
        }

        // Not enough delimiters in that block.
        if pos == start_pos {
            // Not enough lines in the file either; print all of it.
            xlseek(file, SeekFrom::Start(start_pos), name)?;
            let drained = dump_remainder(out, None, file, end_pos)?;
            read_pos = start_pos + drained.bytes;
            if let Some(e) = drained.err {
                show_error!("error reading {}: {e}", name.quote());
                return Ok((false, read_pos));
            }
            return Ok((true, read_pos));
        }
        pos -= bufsize;
        xlseek(file, SeekFrom::Start(pos), name)?;
        bytes_read = match safe_read(file, &mut buffer[..bufsize as usize]) {
            Ok(n) => n,
            Err(e) => {
                show_error!("error reading {}: {e}", name.quote());
                return Ok((false, read_pos));
            }
        };
        read_pos = pos + bytes_read as u64;
        if bytes_read == 0 {
            return Ok((true, read_pos));
        }
    }
}

/// Output the last `n_bytes` bytes (or skip that many with
/// `from_start`), preferring seeks over reads wherever the descriptor
/// allows it.
fn tail_bytes(
    out: &mut impl Write,
    file: &File,
    name: &str,
    n_bytes: u64,
    from_start: bool,
    settings: &Settings,
) -> UResult<(bool, u64)> {
    let md = match file.metadata() {
        Ok(md) => md,
        Err(e) => {
            show_error!("cannot fstat {}: {e}", name.quote());
            return Ok((false, 0));
        }
    };

    let mut read_pos = 0u64;
    if from_start {
        let mut seeked = false;
        if !settings.presume_input_pipe && n_bytes <= i64::MAX as u64 {
            if is_regular(md.mode()) {
                xlseek(file, SeekFrom::Current(n_bytes as i64), name)?;
                seeked = true;
            } else if io::seek(file, SeekFrom::Current(n_bytes as i64)).is_ok() {
                seeked = true;
            }
        }
        if seeked {
            read_pos += n_bytes;
        } else {
            match start_bytes(out, file, name, n_bytes, &mut read_pos)? {
                Skipped::Eof => return Ok((true, read_pos)),
                Skipped::Error => return Ok((false, read_pos)),
                Skipped::Done => {}
            }
        }
        let drained = dump_remainder(out, None, file, COPY_TO_EOF)?;
        read_pos += drained.bytes;
        if let Some(e) = drained.err {
            show_error!("error reading {}: {e}", name.quote());
            return Ok((false, read_pos));
        }
        Ok((true, read_pos))
    } else {
        let mut end_pos = 0u64;
        let mut current_pos = None;
        let mut copy_from_current_pos = false;

        if !settings.presume_input_pipe && n_bytes <= i64::MAX as u64 {
            if is_regular(md.mode()) {
                // Seek directly only if the file is clearly larger than
                // one block; a notional size (as on /proc) reads as 0.
                end_pos = md.len();
                copy_from_current_pos = md.blksize() < end_pos;
            } else if let Ok(pos) = io::seek(file, SeekFrom::End(-(n_bytes as i64))) {
                current_pos = Some(pos);
                end_pos = pos + n_bytes;
                copy_from_current_pos = true;
            }
        }
        if !copy_from_current_pos {
            return chunks::pipe_bytes(out, file, name, n_bytes);
        }

        let mut pos = match current_pos {
            Some(pos) => pos,
            None => xlseek(file, SeekFrom::Current(0), name)?,
        };
        if pos < end_pos {
            let bytes_remaining = end_pos - pos;
            if n_bytes < bytes_remaining {
                pos = end_pos - n_bytes;
                xlseek(file, SeekFrom::Start(pos), name)?;
            }
        }
        read_pos = pos;

        let drained = dump_remainder(out, None, file, n_bytes)?;
        read_pos += drained.bytes;
        if let Some(e) = drained.err {
            show_error!("error reading {}: {e}", name.quote());
            return Ok((false, read_pos));
        }
        Ok((true, read_pos))
    }
}

/// Output the last `n_lines` lines (or skip that many with
/// `from_start`). Seekable regular files go through the backward
/// scanner; everything else through the bounded ring.
fn tail_lines(
    out: &mut impl Write,
    file: &File,
    name: &str,
    n_lines: u64,
    from_start: bool,
    delimiter: u8,
    settings: &Settings,
) -> UResult<(bool, u64)> {
    let md = match file.metadata() {
        Ok(md) => md,
        Err(e) => {
            show_error!("cannot fstat {}: {e}", name.quote());
            return Ok((false, 0));
        }
    };

    if from_start {
        let mut read_pos = 0u64;
        match start_lines(out, file, name, n_lines, delimiter, &mut read_pos)? {
            Skipped::Eof => return Ok((true, read_pos)),
            Skipped::Error => return Ok((false, read_pos)),
            Skipped::Done => {}
        }
        let drained = dump_remainder(out, None, file, COPY_TO_EOF)?;
        read_pos += drained.bytes;
        if let Some(e) = drained.err {
            show_error!("error reading {}: {e}", name.quote());
            return Ok((false, read_pos));
        }
        Ok((true, read_pos))
    } else {
        let mut moved_from = None;
        if !settings.presume_input_pipe && is_regular(md.mode()) {
            if let Ok(start_pos) = io::seek(file, SeekFrom::Current(0)) {
                if let Ok(end_pos) = io::seek(file, SeekFrom::End(0)) {
                    if start_pos < end_pos {
                        return file_lines(
                            out, file, name, &md, n_lines, delimiter, start_pos, end_pos,
                        );
                    }
                    // Already at (or past) the end; put the pointer back
                    // and fall through to the generic reader.
                    moved_from = Some(start_pos);
                }
            }
        }
        if let Some(start_pos) = moved_from {
            xlseek(file, SeekFrom::Start(start_pos), name)?;
        }
        chunks::pipe_lines(out, file, name, n_lines, delimiter)
    }
}
