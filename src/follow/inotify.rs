// This file is part of the uutils coreutils package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore (ToDO) evbuf evlen fspec inotify IN_ATTRIB IN_MODIFY IN_MOVE IN_MOVED

//! The kernel-notification back-end: inotify watches on every target
//! and, when following by name, on the parent directories, so rotated
//! names can be picked up again.

use std::collections::{HashMap, VecDeque};
use std::ffi::{CString, OsStr, OsString};
use std::fs::File;
use std::io::Write;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use uucore::display::Quotable;
use uucore::error::{UResult, USimpleError};

use crate::args::{FollowMode, Settings};
use crate::follow::files::{check_fspec, FileSpec};
use crate::follow::writers_are_dead;
use crate::io::safe_read;
use crate::paths::HeaderPrinter;
use crate::platform;

/// What the caller should do after the notification loop hands control
/// back: stop following altogether, or run the polling back-end.
pub enum Flow {
    Done,
    Revert(Option<std::io::Error>),
}

/// Per-target watch bookkeeping, owned by this back-end and gone once
/// it reverts to polling.
struct Watch {
    wd: i32,
    parent_wd: i32,
    basename: OsString,
}

struct Event {
    wd: i32,
    mask: u32,
    /// Set for events on an entry of a watched directory.
    name: Option<OsString>,
}

fn add_watch(fd: RawFd, path: &Path, mask: u32) -> std::io::Result<i32> {
    let path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    let wd = unsafe { libc::inotify_add_watch(fd, path.as_ptr(), mask) };
    if wd < 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(wd)
    }
}

fn rm_watch(fd: RawFd, wd: i32) {
    unsafe {
        libc::inotify_rm_watch(fd, wd);
    }
}

fn no_inotify_resources(e: &std::io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::ENOSPC) | Some(libc::ENOMEM))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Split a raw inotify read into events. Each record is a fixed header
/// followed by `len` bytes holding a NUL-padded name.
fn decode_events(buf: &[u8], events: &mut VecDeque<Event>) {
    const HDR: usize = mem::size_of::<libc::inotify_event>();
    let mut offset = 0;
    while offset + HDR <= buf.len() {
        let ev = unsafe {
            std::ptr::read_unaligned(buf[offset..].as_ptr() as *const libc::inotify_event)
        };
        let name_len = ev.len as usize;
        let name = if name_len > 0 {
            let name = &buf[offset + HDR..(offset + HDR + name_len).min(buf.len())];
            let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
            Some(OsStr::from_bytes(&name[..end]).to_os_string())
        } else {
            None
        };
        events.push_back(Event {
            wd: ev.wd,
            mask: ev.mask,
            name,
        });
        offset += HDR + name_len;
    }
}

/// Follow every target through inotify events. Returns `Flow::Revert`
/// whenever the polling back-end has to take over; all target state is
/// preserved across that hand-off.
pub fn tail_forever_inotify(
    files: &mut [FileSpec],
    settings: &Settings,
    monitor_output: bool,
    hdr: &mut HeaderPrinter,
    out: &mut impl Write,
) -> UResult<Flow> {
    let inotify_fd = unsafe { libc::inotify_init() };
    if inotify_fd < 0 {
        return Ok(Flow::Revert(Some(std::io::Error::last_os_error())));
    }
    // Owns the inotify descriptor; dropping it frees every watch.
    let inotify = unsafe { File::from_raw_fd(inotify_fd) };

    let follow_name = settings.follow == Some(FollowMode::Name);

    let file_mask = libc::IN_MODIFY
        | if follow_name {
            libc::IN_ATTRIB | libc::IN_DELETE_SELF | libc::IN_MOVE_SELF
        } else {
            0
        };
    let dir_mask =
        libc::IN_CREATE | libc::IN_DELETE | libc::IN_MOVED_TO | libc::IN_ATTRIB | libc::IN_DELETE_SELF;

    let mut wd_to_idx: HashMap<i32, usize> = HashMap::with_capacity(files.len());
    let mut watches: Vec<Watch> = files
        .iter()
        .map(|f| Watch {
            wd: -1,
            parent_wd: -1,
            basename: f
                .input
                .path()
                .and_then(Path::file_name)
                .map(OsStr::to_os_string)
                .unwrap_or_default(),
        })
        .collect();

    let mut evlen = 0usize;
    let mut found_watchable_file = false;
    let mut tailed_but_unwatchable = false;
    let mut found_unwatchable_dir = false;
    let mut resources_exhausted = false;

    for (i, spec) in files.iter().enumerate() {
        if spec.ignore {
            continue;
        }
        let path = spec.input.path().expect("stdin is never watched");
        evlen = evlen.max(path.as_os_str().len());

        if follow_name {
            match add_watch(inotify_fd, parent_dir(path), dir_mask) {
                Ok(parent_wd) => watches[i].parent_wd = parent_wd,
                Err(e) => {
                    if no_inotify_resources(&e) {
                        show_error!("inotify resources exhausted");
                    } else {
                        show_error!(
                            "cannot watch parent directory of {}: {e}",
                            spec.display_name().quote()
                        );
                    }
                    found_unwatchable_dir = true;
                    break;
                }
            }
        }

        match add_watch(inotify_fd, path, file_mask) {
            Ok(wd) => {
                watches[i].wd = wd;
                wd_to_idx.insert(wd, i);
                found_watchable_file = true;
            }
            Err(e) => {
                if spec.file.is_some() {
                    tailed_but_unwatchable = true;
                }
                if no_inotify_resources(&e) {
                    resources_exhausted = true;
                    show_error!("inotify resources exhausted");
                    break;
                } else if e.raw_os_error() != Some(spec.errnum) {
                    show_error!("cannot watch {}: {e}", spec.display_name().quote());
                }
            }
        }
    }

    if resources_exhausted
        || found_unwatchable_dir
        || (!follow_name && tailed_but_unwatchable)
    {
        return Ok(Flow::Revert(None));
    }
    if !follow_name && !found_watchable_file {
        // Every per-file diagnostic has been printed already.
        return Err(1.into());
    }

    let mut prev = files.len() - 1;

    // Catch up: data may have arrived, or names may have been replaced,
    // between the initial read and the watch installation.
    for i in 0..files.len() {
        if files[i].ignore {
            continue;
        }
        if follow_name {
            files[i].recheck(settings, false, true)?;
        } else if files[i].file.is_some() {
            if let Some(path) = files[i].input.path() {
                use std::os::unix::fs::MetadataExt;
                if let Ok(md) = std::fs::metadata(path) {
                    if files[i].dev != md.dev() || files[i].ino != md.ino() {
                        // The watch points at the wrong inode now.
                        show_error!("{} was replaced", files[i].display_name().quote());
                        return Ok(Flow::Revert(None));
                    }
                }
            }
        }
        check_fspec(files, i, &mut prev, hdr, out)?;
    }

    evlen += mem::size_of::<libc::inotify_event>() + 1;
    let mut evbuf = vec![0u8; evlen];
    let mut events: VecDeque<Event> = VecDeque::new();
    let mut max_realloc = 3u32;
    let mut writers_dead = false;
    let stdout_fd = std::io::stdout().as_raw_fd();

    loop {
        // When following by name without retry, losing the last watch
        // means nothing can ever produce output again.
        if follow_name && !settings.retry && wd_to_idx.is_empty() {
            return Err(USimpleError::new(1, "no files remaining"));
        }

        if events.is_empty() {
            loop {
                let mut delay: libc::c_int = -1;
                if !settings.pids.is_empty() {
                    if writers_dead {
                        return Ok(Flow::Done);
                    }
                    writers_dead = writers_are_dead(&settings.pids);
                    if writers_dead || settings.sleep_sec.is_zero() {
                        delay = 0;
                    } else {
                        let ms = (settings.sleep_sec.as_secs_f64() * 1000.0).ceil();
                        delay = if ms < i32::MAX as f64 { ms as i32 } else { i32::MAX };
                    }
                }

                let mut pfd = [
                    libc::pollfd {
                        fd: inotify_fd,
                        events: libc::POLLIN,
                        revents: 0,
                    },
                    libc::pollfd {
                        fd: stdout_fd,
                        events: 0,
                        revents: 0,
                    },
                ];
                let nfds = 1 + libc::nfds_t::from(monitor_output);
                let ret = unsafe { libc::poll(pfd.as_mut_ptr(), nfds, delay) };
                if ret < 0 {
                    let e = std::io::Error::last_os_error();
                    if e.kind() == std::io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(USimpleError::new(
                        1,
                        format!("error waiting for inotify and output events: {e}"),
                    ));
                }
                if ret == 0 {
                    // Timed out; go back and look at the writers again.
                    continue;
                }
                if pfd[1].revents != 0 {
                    platform::die_pipe();
                }
                break;
            }

            loop {
                match safe_read(&inotify, &mut evbuf) {
                    Ok(0) => {
                        // Kernels predating 2.6.21 returned a zero read
                        // when the buffer was too small.
                        if max_realloc == 0 {
                            return Err(USimpleError::new(1, "error reading inotify event"));
                        }
                        max_realloc -= 1;
                        evlen *= 2;
                        evbuf.resize(evlen, 0);
                    }
                    Ok(len) => {
                        decode_events(&evbuf[..len], &mut events);
                        break;
                    }
                    Err(e) if e.raw_os_error() == Some(libc::EINVAL) && max_realloc > 0 => {
                        max_realloc -= 1;
                        evlen *= 2;
                        evbuf.resize(evlen, 0);
                    }
                    Err(e) => {
                        return Err(USimpleError::new(
                            1,
                            format!("error reading inotify event: {e}"),
                        ));
                    }
                }
            }
        }

        let Some(ev) = events.pop_front() else {
            continue;
        };

        // A watched parent directory disappearing leaves its watch dead;
        // polling is the only way to keep looking for the names.
        if ev.mask & libc::IN_DELETE_SELF != 0
            && ev.name.is_none()
            && watches.iter().any(|w| w.parent_wd == ev.wd)
        {
            show_error!("directory containing watched file was removed");
            return Ok(Flow::Revert(None));
        }

        let idx = if let Some(name) = &ev.name {
            // Event on an entry of a watched directory.
            let Some(j) = (0..files.len())
                .find(|&j| watches[j].parent_wd == ev.wd && watches[j].basename == *name)
            else {
                continue;
            };

            let deleting = ev.mask & libc::IN_DELETE != 0;
            let mut new_wd = -1;
            if !deleting {
                match add_watch(inotify_fd, files[j].input.path().unwrap(), file_mask) {
                    Ok(wd) => new_wd = wd,
                    Err(e) => {
                        if no_inotify_resources(&e) {
                            show_error!("inotify resources exhausted");
                            return Ok(Flow::Revert(None));
                        }
                        // A dangling symlink gives ENOENT here, for one.
                        show_error!("cannot watch {}: {e}", files[j].display_name().quote());
                    }
                }
            }

            let new_watch = !deleting && (watches[j].wd < 0 || new_wd != watches[j].wd);
            if new_watch {
                if watches[j].wd >= 0 {
                    rm_watch(inotify_fd, watches[j].wd);
                    wd_to_idx.remove(&watches[j].wd);
                }
                watches[j].wd = new_wd;
                if new_wd == -1 {
                    continue;
                }
                // A move inside the directory hands the source's wd to
                // the destination; detach whichever target held it.
                if let Some(victim) = wd_to_idx.remove(&new_wd) {
                    if victim != j {
                        watches[victim].wd = -1;
                        files[victim].file = None;
                        files[victim].errnum = -1;
                        if follow_name {
                            files[victim].recheck(settings, false, true)?;
                        }
                    }
                }
                wd_to_idx.insert(new_wd, j);
            }

            if follow_name {
                files[j].recheck(settings, false, true)?;
            }
            Some(j)
        } else {
            wd_to_idx.get(&ev.wd).copied()
        };

        let Some(i) = idx else {
            continue;
        };

        if ev.mask & (libc::IN_ATTRIB | libc::IN_DELETE | libc::IN_DELETE_SELF | libc::IN_MOVE_SELF)
            != 0
        {
            // For IN_MOVE_SELF with retry the watch stays: the moved-to
            // name may itself be part of the watched set.
            if ev.mask & libc::IN_DELETE_SELF != 0
                || (!settings.retry && ev.mask & libc::IN_MOVE_SELF != 0)
            {
                if watches[i].wd >= 0 {
                    rm_watch(inotify_fd, watches[i].wd);
                    wd_to_idx.remove(&watches[i].wd);
                    watches[i].wd = -1;
                }
            }
            files[i].recheck(settings, false, true)?;
            continue;
        }

        check_fspec(files, i, &mut prev, hdr, out)?;
    }
}
