// This file is part of the uutils coreutils package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore (ToDO) fspec nonblocking

//! The polling back-end: a periodic stat/read pass over every target.

use std::io::Write;
use std::os::fd::AsRawFd;
use std::os::unix::fs::MetadataExt;
use std::thread;

use uucore::display::Quotable;
use uucore::error::{UResult, USimpleError};

use crate::args::{FollowMode, Settings};
use crate::follow::files::{any_live_files, is_regular, FileSpec};
use crate::follow::writers_are_dead;
use crate::io::{dump_remainder, xflush, xlseek, COPY_A_BUFFER, COPY_TO_EOF};
use crate::paths::HeaderPrinter;
use crate::platform;

/// Reconcile the descriptor's O_NONBLOCK flag with the loop's blocking
/// policy. EPERM on a regular file is the append-only attribute; leave
/// those descriptors alone.
fn reconcile_blocking(spec: &mut FileSpec, blocking: bool) -> UResult<()> {
    if spec.blocking == Some(blocking) {
        return Ok(());
    }
    let fd = spec.file.as_ref().unwrap().as_raw_fd();
    let old_flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    let new_flags = old_flags | if blocking { 0 } else { libc::O_NONBLOCK };
    let failed = old_flags < 0
        || (new_flags != old_flags && unsafe { libc::fcntl(fd, libc::F_SETFL, new_flags) } == -1);
    if failed {
        let e = std::io::Error::last_os_error();
        if is_regular(spec.mode) && e.raw_os_error() == Some(libc::EPERM) {
            return Ok(());
        }
        return Err(USimpleError::new(
            1,
            format!(
                "{}: cannot change nonblocking mode: {e}",
                spec.display_name().maybe_quote()
            ),
        ));
    }
    spec.blocking = Some(blocking);
    Ok(())
}

/// Tail every target until killed, the writers die, or no target can
/// come back.
pub fn tail_forever(
    files: &mut [FileSpec],
    settings: &Settings,
    monitor_output: bool,
    hdr: &mut HeaderPrinter,
    out: &mut impl Write,
) -> UResult<()> {
    // Blocking reads save a stat per iteration, but are only safe for a
    // single non-regular target with nothing else to watch.
    let blocking = settings.pids.is_empty()
        && settings.follow == Some(FollowMode::Descriptor)
        && files.len() == 1
        && files[0].file.is_some()
        && !is_regular(files[0].mode);

    let mut last = files.len() - 1;
    let mut writers_dead = false;

    loop {
        let mut any_input = false;

        for i in 0..files.len() {
            if files[i].ignore {
                continue;
            }
            if files[i].file.is_none() {
                files[i].recheck(settings, blocking, false)?;
                continue;
            }

            reconcile_blocking(&mut files[i], blocking)?;

            let mut read_unchanged = false;
            let mut remote_cap = None;
            if files[i].blocking == Some(false) {
                let md = match files[i].file.as_ref().unwrap().metadata() {
                    Ok(md) => md,
                    Err(e) => {
                        show_error!("{}: {e}", files[i].display_name().maybe_quote());
                        files[i].errnum = e.raw_os_error().unwrap_or(-1);
                        files[i].file = None;
                        continue;
                    }
                };

                if files[i].mode == md.mode()
                    && (!is_regular(md.mode()) || files[i].size == md.len())
                    && files[i].mtime == md.modified().ok()
                {
                    let fd_before = files[i].file.as_ref().unwrap().as_raw_fd();
                    let probe_rotation = settings.max_unchanged_stats <= files[i].unchanged_stats;
                    files[i].unchanged_stats += 1;
                    if probe_rotation && settings.follow == Some(FollowMode::Name) {
                        let spec_blocking = files[i].blocking == Some(true);
                        files[i].recheck(settings, spec_blocking, false)?;
                        files[i].unchanged_stats = 0;
                    }
                    let fd_now = files[i].file.as_ref().map(|f| f.as_raw_fd());
                    if fd_now != Some(fd_before) || is_regular(md.mode()) || files.len() > 1 {
                        continue;
                    }
                    read_unchanged = true;
                }

                // The target has changed (or is worth a speculative read).
                files[i].mtime = md.modified().ok();
                let mode_before = files[i].mode;
                files[i].mode = md.mode();
                if !read_unchanged {
                    files[i].unchanged_stats = 0;
                }

                // Can't distinguish truncate-and-regrow from growth; a
                // shrink is the only reliable truncation signal.
                if is_regular(mode_before) && md.len() < files[i].size {
                    show_error!("{}: file truncated", files[i].display_name().maybe_quote());
                    let spec = &files[i];
                    xlseek(
                        spec.file.as_ref().unwrap(),
                        std::io::SeekFrom::Start(0),
                        spec.display_name(),
                    )?;
                    files[i].size = 0;
                }

                if i != last {
                    hdr.print(out, files[i].display_name())?;
                    last = i;
                }

                // Remote st_size cannot be trusted to stay put; cap the
                // drain at what this stat promised.
                if is_regular(mode_before) && files[i].remote {
                    remote_cap = Some(md.len().saturating_sub(files[i].size));
                }
            }

            let bytes_to_read = if files[i].blocking == Some(false) {
                remote_cap.unwrap_or(COPY_TO_EOF)
            } else {
                COPY_A_BUFFER
            };

            let drained = {
                let spec = &files[i];
                dump_remainder(out, None, spec.file.as_ref().unwrap(), bytes_to_read)?
            };

            files[i].size += drained.bytes;
            if let Some(e) = drained.err {
                show_error!("error reading {}: {e}", files[i].display_name().quote());
                files[i].errnum = e.raw_os_error().unwrap_or(-1);
                files[i].file = None;
                continue;
            }

            if read_unchanged && drained.bytes > 0 {
                files[i].unchanged_stats = 0;
            }
            any_input |= drained.bytes != 0;
        }

        if !any_live_files(files, settings) {
            return Err(USimpleError::new(1, "no files remaining"));
        }

        if !any_input || blocking {
            xflush(out)?;
        }

        if monitor_output && platform::output_reader_gone() {
            platform::die_pipe();
        }

        if !any_input {
            if writers_dead {
                // The extra read pass above closed the race between the
                // writer's last write and its death.
                return Ok(());
            }
            writers_dead = writers_are_dead(&settings.pids);
            if !writers_dead {
                thread::sleep(settings.sleep_sec);
            }
        }
    }
}
