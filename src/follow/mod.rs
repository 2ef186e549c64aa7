// This file is part of the uutils coreutils package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore (ToDO) inotify fifos

//! The follow engine: keeps reading the targets after the initial tail,
//! through kernel notification where possible and periodic polling
//! everywhere else.

use std::io::Write;

use uucore::error::UResult;

#[cfg(any(target_os = "linux", target_os = "android"))]
use crate::args::FollowMode;
use crate::args::Settings;
use crate::paths::HeaderPrinter;
use crate::platform::{self, ProcessChecker};

pub mod files;
#[cfg(any(target_os = "linux", target_os = "android"))]
mod inotify;
mod poll;

#[cfg(any(target_os = "linux", target_os = "android"))]
use files::is_regular;
use files::{is_fifo, FileSpec};

/// All watched writers are known to be gone. With no watched PIDs there
/// is nothing to conclude.
pub(crate) fn writers_are_dead(pids: &[platform::Pid]) -> bool {
    !pids.is_empty() && pids.iter().all(|&pid| ProcessChecker::new(pid).is_dead())
}

/// POSIX wants `-f` ignored for a `-` operand connected to a FIFO or
/// pipe. Marks those targets ignored and returns how many stay viable.
fn ignore_fifo_and_pipe(files: &mut [FileSpec]) -> usize {
    let mut n_viable = 0;
    for spec in files.iter_mut() {
        if spec.input.is_stdin() && !spec.ignore && spec.file.is_some() && is_fifo(spec.mode) {
            spec.file = None;
            spec.errnum = -1;
            spec.ignore = true;
        } else {
            n_viable += 1;
        }
    }
    n_viable
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn tailable_stdin(files: &[FileSpec]) -> bool {
    files.iter().any(|f| !f.ignore && f.input.is_stdin())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn any_remote_file(files: &[FileSpec]) -> bool {
    files.iter().any(|f| f.file.is_some() && f.remote)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn any_non_remote_file(files: &[FileSpec]) -> bool {
    files.iter().any(|f| f.file.is_some() && !f.remote)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn any_symlinks(files: &[FileSpec]) -> bool {
    files.iter().any(|f| {
        f.input.path().is_some_and(|path| {
            std::fs::symlink_metadata(path)
                .map(|md| md.file_type().is_symlink())
                .unwrap_or(false)
        })
    })
}

/// inotify accepts watches on device files but never delivers events
/// for them; only regular files and FIFOs are worth watching.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn any_non_regular_fifo(files: &[FileSpec]) -> bool {
    files
        .iter()
        .any(|f| f.file.is_some() && !is_regular(f.mode) && !is_fifo(f.mode))
}

/// Follow the opened targets until an exit condition is reached. `ok`
/// tells whether every initial open succeeded.
pub fn follow(
    files: &mut [FileSpec],
    settings: &Settings,
    ok: bool,
    hdr: &mut HeaderPrinter,
    out: &mut impl Write,
) -> UResult<()> {
    if ignore_fifo_and_pipe(files) == 0 {
        return Ok(());
    }

    // If stdout is a pipe, monitor it so we exit when the reader goes away.
    let monitor_output = platform::stdout_is_fifo().map_err(|e| {
        uucore::error::USimpleError::new(1, format!("standard output: {e}"))
    })?;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        // Notification only works when every target is a watchable local
        // file; stdin, remote files, symlinks and device files are
        // invisible or misleading to inotify.
        let use_inotify = !settings.use_polling
            && !(tailable_stdin(files)
                || any_remote_file(files)
                || !any_non_remote_file(files)
                || any_symlinks(files)
                || any_non_regular_fifo(files)
                || (!ok && settings.follow == Some(FollowMode::Descriptor)));

        if use_inotify {
            crate::io::xflush(out)?;
            match inotify::tail_forever_inotify(files, settings, monitor_output, hdr, out)? {
                inotify::Flow::Done => return Ok(()),
                inotify::Flow::Revert(err) => match err {
                    Some(e) => {
                        show_error!("inotify cannot be used, reverting to polling: {e}");
                    }
                    None => show_error!("inotify cannot be used, reverting to polling"),
                },
            }
        }
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    let _ = ok;

    poll::tail_forever(files, settings, monitor_output, hdr, out)
}
