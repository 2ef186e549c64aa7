// This file is part of the uutils coreutils package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore (ToDO) fspec tailable untailable errnum

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::time::SystemTime;

use uucore::display::Quotable;
use uucore::error::UResult;

use crate::args::{FollowMode, Settings};
use crate::io::{dump_remainder, xflush, xlseek, COPY_TO_EOF};
use crate::paths::{HeaderPrinter, Input};
use crate::platform;

pub fn is_regular(mode: u32) -> bool {
    mode & libc::S_IFMT as u32 == libc::S_IFREG as u32
}

pub fn is_fifo(mode: u32) -> bool {
    mode & libc::S_IFMT as u32 == libc::S_IFIFO as u32
}

/// The file types tail can meaningfully watch.
pub fn is_tailable(mode: u32) -> bool {
    let fmt = mode & libc::S_IFMT as u32;
    fmt == libc::S_IFREG as u32
        || fmt == libc::S_IFIFO as u32
        || fmt == libc::S_IFSOCK as u32
        || fmt == libc::S_IFCHR as u32
}

/// Everything the engine remembers about one target.
///
/// Either the descriptor is open and `errnum` is zero, or the descriptor
/// is gone and `errnum` records why; `valid()` asserts exactly that.
pub struct FileSpec {
    pub input: Input,

    /// Attributes of the opened inode the last time we checked.
    pub size: u64,
    pub mtime: Option<SystemTime>,
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,

    /// The name referred to a directory or another type tail cannot
    /// follow. Once set, the name is never checked again.
    pub ignore: bool,

    /// See [`platform::fremote`].
    pub remote: bool,

    /// The target exists, is readable and is of a tailable type.
    pub tailable: bool,

    pub file: Option<File>,

    /// The `errno` seen last time we checked this target.
    pub errnum: i32,

    /// `Some(false)` when O_NONBLOCK is set, `None` when not known.
    pub blocking: Option<bool>,

    /// Consecutive polling iterations without an observed change.
    pub unchanged_stats: u32,
}

impl FileSpec {
    pub fn new(input: Input) -> Self {
        Self {
            input,
            size: 0,
            mtime: None,
            dev: 0,
            ino: 0,
            mode: 0,
            ignore: false,
            remote: false,
            tailable: false,
            file: None,
            errnum: 0,
            blocking: None,
            unchanged_stats: 0,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.input.display_name
    }

    fn valid(&self) -> bool {
        self.file.is_none() ^ (self.errnum == 0)
    }

    pub fn record_open_fd(&mut self, file: File, size: u64, md: &Metadata, blocking: Option<bool>) {
        self.size = size;
        self.mtime = md.modified().ok();
        self.dev = md.dev();
        self.ino = md.ino();
        self.mode = md.mode();
        self.blocking = blocking;
        self.unchanged_stats = 0;
        self.ignore = false;
        self.file = Some(file);
    }

    fn open(&self, blocking: bool) -> std::io::Result<File> {
        match self.input.path() {
            Some(path) => OpenOptions::new()
                .read(true)
                .custom_flags(if blocking { 0 } else { libc::O_NONBLOCK })
                .open(path),
            None => platform::dup_stdin(),
        }
    }

    /// Re-open the name and reconcile with the held descriptor: the
    /// rotation detector. `watching` is true while the notification
    /// back-end drives the engine.
    pub fn recheck(&mut self, settings: &Settings, blocking: bool, watching: bool) -> UResult<()> {
        let was_tailable = self.tailable;
        let prev_errnum = self.errnum;
        let mut ok = true;

        debug_assert!(self.valid());

        let opened = self.open(blocking);
        // A failed open on a retried name only means "not tailable right now".
        self.tailable = !(settings.retry && opened.is_err());

        let is_symlink = watching
            && self.input.path().is_some_and(|path| {
                fs::symlink_metadata(path)
                    .map(|md| md.file_type().is_symlink())
                    .unwrap_or(false)
            });

        let mut new_fd = None;
        let mut new_md = None;
        if is_symlink {
            // Symlinks are left to the polling back-end; watches report
            // the target, not the name.
            ok = false;
            self.errnum = -1;
            self.ignore = true;
            show_error!(
                "{} has been replaced with an untailable symbolic link",
                self.display_name().quote()
            );
        } else {
            match opened.and_then(|file| file.metadata().map(|md| (file, md))) {
                Err(e) => {
                    ok = false;
                    self.errnum = e.raw_os_error().unwrap_or(-1);
                    if !self.tailable {
                        if was_tailable {
                            show_error!(
                                "{} has become inaccessible: {e}",
                                self.display_name().quote()
                            );
                        }
                        // Otherwise say nothing; it is still not tailable.
                    } else if prev_errnum != self.errnum {
                        show_error!("{}: {e}", self.display_name().maybe_quote());
                    }
                }
                Ok((file, md)) => {
                    if !is_tailable(md.mode()) {
                        ok = false;
                        self.errnum = -1;
                        self.tailable = false;
                        self.ignore = !(settings.retry && settings.follow == Some(FollowMode::Name));
                        if was_tailable || prev_errnum != self.errnum {
                            show_error!(
                                "{} has been replaced with an untailable file{}",
                                self.display_name().quote(),
                                if self.ignore {
                                    "; giving up on this name"
                                } else {
                                    ""
                                }
                            );
                        }
                    } else {
                        self.remote = platform::fremote(&file, self.display_name());
                        if self.remote && watching {
                            ok = false;
                            self.errnum = -1;
                            self.ignore = true;
                            show_error!(
                                "{} has been replaced with an untailable remote file",
                                self.display_name().quote()
                            );
                        } else {
                            self.errnum = 0;
                        }
                    }
                    new_fd = Some(file);
                    new_md = Some(md);
                }
            }
        }

        if !ok {
            // Both the fresh descriptor and the held one get closed.
            drop(new_fd);
            self.file = None;
            return Ok(());
        }

        let (file, md) = (new_fd.unwrap(), new_md.unwrap());
        let new_file = if prev_errnum != 0 && prev_errnum != libc::ENOENT {
            debug_assert!(self.file.is_none());
            show_error!("{} has become accessible", self.display_name().quote());
            true
        } else if self.file.is_none() {
            // A new file even when the inode pair matches an old
            // observation; device and inode numbers can be reused.
            show_error!(
                "{} has appeared; following new file",
                self.display_name().quote()
            );
            true
        } else if self.ino != md.ino() || self.dev != md.dev() {
            // The name was rotated out from under the descriptor.
            show_error!(
                "{} has been replaced; following new file",
                self.display_name().quote()
            );
            self.file = None;
            true
        } else {
            false
        };

        if new_file {
            let is_stdin = self.input.is_stdin();
            if is_regular(md.mode()) {
                xlseek(&file, std::io::SeekFrom::Start(0), self.display_name())?;
            }
            self.errnum = 0;
            self.record_open_fd(file, 0, &md, if is_stdin { None } else { Some(blocking) });
        }
        // Otherwise keep the held descriptor and let the fresh one drop.

        Ok(())
    }
}

/// True while any target can still produce output: an open descriptor,
/// or a name that retry may bring back.
pub fn any_live_files(files: &[FileSpec], settings: &Settings) -> bool {
    // In follow-by-name mode with retry, ignored files may be replaced
    // by new files later, so everything counts as live.
    if settings.retry && settings.follow == Some(FollowMode::Name) {
        return true;
    }
    files
        .iter()
        .any(|f| f.file.is_some() || (!f.ignore && settings.retry))
}

/// Drain new data from target `i`, printing a header when the active
/// target changed since the last emission.
pub fn check_fspec(
    files: &mut [FileSpec],
    i: usize,
    prev: &mut usize,
    hdr: &mut HeaderPrinter,
    out: &mut impl Write,
) -> UResult<()> {
    if files[i].file.is_none() {
        return Ok(());
    }

    let md = match files[i].file.as_ref().unwrap().metadata() {
        Ok(md) => md,
        Err(e) => {
            files[i].errnum = e.raw_os_error().unwrap_or(-1);
            files[i].file = None;
            return Ok(());
        }
    };

    // Growth after a truncation in the same window cannot be told apart
    // from pure growth; assume the file restarted at zero.
    if is_regular(files[i].mode) && md.len() < files[i].size {
        show_error!("{}: file truncated", files[i].display_name().maybe_quote());
        {
            let spec = &files[i];
            xlseek(
                spec.file.as_ref().unwrap(),
                std::io::SeekFrom::Start(0),
                spec.display_name(),
            )?;
        }
        files[i].size = 0;
    } else if is_regular(files[i].mode)
        && md.len() == files[i].size
        && files[i].mtime == md.modified().ok()
    {
        return Ok(());
    }

    let want_header = i != *prev;
    let drained = {
        let spec = &files[i];
        let file = spec.file.as_ref().unwrap();
        if want_header {
            dump_remainder(out, Some((&mut *hdr, spec.display_name())), file, COPY_TO_EOF)?
        } else {
            dump_remainder(out, None, file, COPY_TO_EOF)?
        }
    };

    files[i].size += drained.bytes;
    if let Some(e) = drained.err {
        show_error!(
            "error reading {}: {e}",
            files[i].display_name().quote()
        );
        files[i].errnum = e.raw_os_error().unwrap_or(-1);
        files[i].file = None;
        return Ok(());
    }

    if drained.bytes > 0 {
        *prev = i;
        xflush(out)?;
    }

    Ok(())
}
