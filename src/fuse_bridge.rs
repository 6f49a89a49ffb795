// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

//! The kernel FUSE bridge: a `fuser::Filesystem` implementation that
//! translates inode-based kernel callbacks into the path-based calls
//! `dispatcher` expects, and back. Grounded on `udevfs.rs`'s `InodeCache`
//! (the pack's only other FUSE server), generalized from its fixed
//! synthetic tree to an open-ended one since a mounted child's contents
//! are arbitrary.
//!
//! Passthrough data operations on an already-open handle (read, write,
//! fsync, flush) are out of the core's scope (spec.md §1) and are
//! implemented here directly against the stored descriptor, never
//! touching `PathRouter` or the scheduler.

use crate::context::AfuseContext;
use crate::dispatcher::{self, Attr};
use crate::errors::{errno_to_raw, Errno};
use crate::path_router::extract_first_component;
use crate::scheduler::SharedScheduler;
use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use nix::fcntl::OFlag;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const TTL: Duration = Duration::ZERO;
const ROOT_INO: u64 = fuser::FUSE_ROOT_ID;

/// Maps kernel inode numbers to the virtual path they were looked up at.
/// Unlike `udevfs.rs`'s fixed synthetic tree, a mounted child's proxy paths
/// are arbitrarily deep and come and go with the real filesystem, so this
/// cache holds only the path, never attributes or directory contents —
/// those are always re-fetched from the forwarded call. Entries are created
/// on `lookup` and dropped on `forget`, mirroring `fuser`'s inode lifetime
/// contract.
#[derive(Debug, Default)]
struct InodeCache {
    by_ino: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
    next_ino: u64,
}

impl InodeCache {
    fn new() -> Self {
        let mut by_ino = HashMap::new();
        by_ino.insert(ROOT_INO, "/".to_string());
        InodeCache {
            by_ino,
            by_path: HashMap::new(),
            next_ino: ROOT_INO + 1,
        }
    }

    fn path_of(&self, ino: u64) -> Option<&str> {
        self.by_ino.get(&ino).map(String::as_str)
    }

    fn ino_of(&mut self, path: String) -> u64 {
        if path == "/" {
            return ROOT_INO;
        }
        if let Some(ino) = self.by_path.get(&path) {
            return *ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.by_path.insert(path.clone(), ino);
        self.by_ino.insert(ino, path);
        ino
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Option<String> {
        let parent_path = self.path_of(parent)?;
        let name = name.to_str()?;
        if parent_path == "/" {
            Some(format!("/{name}"))
        } else {
            Some(format!("{parent_path}/{name}"))
        }
    }

    /// Drops a stale path mapping after a rename moves it elsewhere. The
    /// inode number itself is not reused (see the struct doc comment).
    fn forget_path(&mut self, path: &str) {
        if let Some(ino) = self.by_path.remove(path) {
            self.by_ino.remove(&ino);
        }
    }

    /// Resolves the inode to hand the kernel for a readdir entry named
    /// `name`, seen while listing the directory at `parent` (whose own path
    /// is `parent_path`). `.` is the directory itself; `..` is its parent;
    /// anything else is assigned/looked up the same way `lookup` would.
    fn entry_ino(&mut self, parent: u64, parent_path: &str, name: &str) -> u64 {
        match name {
            "." => parent,
            ".." => {
                let pp = parent_path_of(parent_path);
                self.ino_of(pp)
            }
            _ => match self.child_path(parent, OsStr::new(name)) {
                Some(path) => self.ino_of(path),
                None => parent,
            },
        }
    }
}

fn parent_path_of(path: &str) -> String {
    if path == "/" {
        return "/".to_string();
    }
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
        None => "/".to_string(),
    }
}

fn attr_to_fuse(ino: u64, attr: Attr) -> FileAttr {
    let mtime = UNIX_EPOCH + Duration::new(attr.mtime_secs.max(0) as u64, attr.mtime_nanos.max(0) as u32);
    FileAttr {
        ino,
        size: attr.size,
        blocks: (attr.size + 511) / 512,
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: UNIX_EPOCH,
        kind: if attr.is_dir { FileType::Directory } else { FileType::RegularFile },
        perm: (attr.mode & 0o7777) as u16,
        nlink: attr.nlink.max(1),
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

fn time_or_now_to_pair(t: TimeOrNow) -> (i64, i64) {
    let st = match t {
        TimeOrNow::SpecificTime(st) => st,
        TimeOrNow::Now => SystemTime::now(),
    };
    let dur = st.duration_since(UNIX_EPOCH).unwrap_or_default();
    (dur.as_secs() as i64, dur.subsec_nanos() as i64)
}

pub struct AfuseFilesystem {
    scheduler: Arc<SharedScheduler>,
    timer_shutdown: Arc<AtomicBool>,
    inodes: InodeCache,
    /// Held until `destroy` so the synthetic root is removed exactly once,
    /// on clean shutdown, rather than the moment this struct is dropped.
    synthetic_root: Option<tempfile::TempDir>,
}

impl AfuseFilesystem {
    pub fn new(
        scheduler: Arc<SharedScheduler>,
        timer_shutdown: Arc<AtomicBool>,
        synthetic_root: tempfile::TempDir,
    ) -> Self {
        AfuseFilesystem {
            scheduler,
            timer_shutdown,
            inodes: InodeCache::new(),
            synthetic_root: Some(synthetic_root),
        }
    }

    /// Locks the shared context, runs `f`, and wakes the timer thread if
    /// the call reprogrammed `next_timer_fire`. Replaces the original's
    /// "mask signal, run critical section, notify, unmask" sequence
    /// (spec.md §4.2) with a mutex-guarded equivalent (SPEC_FULL.md §5.1).
    fn with_ctx<R>(&self, f: impl FnOnce(&mut AfuseContext) -> R) -> R {
        let mut ctx = self.scheduler.ctx.lock();
        let prev = ctx.next_timer_fire;
        let result = f(&mut ctx);
        let changed = ctx.next_timer_fire != prev;
        drop(ctx);
        if changed {
            self.scheduler.wake.notify_one();
        }
        result
    }

    fn root_name_of(path: &str) -> Option<String> {
        let (name, _) = extract_first_component(path);
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

impl Filesystem for AfuseFilesystem {
    fn forget(&mut self, _req: &Request<'_>, ino: u64, _nlookup: u64) {
        if ino == ROOT_INO {
            return;
        }
        if let Some(path) = self.inodes.path_of(ino).map(str::to_string) {
            self.inodes.forget_path(&path);
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(path) = self.inodes.child_path(parent, name) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        let attr = self.with_ctx(|ctx| dispatcher::getattr(ctx, &path));
        match attr {
            Ok(attr) => {
                let ino = self.inodes.ino_of(path);
                reply.entry(&TTL, &attr_to_fuse(ino, attr), 0);
            }
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.inodes.path_of(ino).map(str::to_string) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        match self.with_ctx(|ctx| dispatcher::getattr(ctx, &path)) {
            Ok(attr) => reply.attr(&TTL, &attr_to_fuse(ino, attr)),
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.inodes.path_of(ino).map(str::to_string) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        let result = self.with_ctx(|ctx| -> Result<(), Errno> {
            if let Some(mode) = mode {
                dispatcher::chmod(ctx, &path, mode)?;
            }
            if uid.is_some() || gid.is_some() {
                dispatcher::chown(ctx, &path, uid, gid)?;
            }
            if let Some(size) = size {
                dispatcher::truncate(ctx, &path, size)?;
            }
            if atime.is_some() || mtime.is_some() {
                let now = time_or_now_to_pair(TimeOrNow::Now);
                let a = atime.map(time_or_now_to_pair).unwrap_or(now);
                let m = mtime.map(time_or_now_to_pair).unwrap_or(now);
                dispatcher::utime(ctx, &path, a, m)?;
            }
            Ok(())
        });
        if let Err(e) = result {
            return reply.error(errno_to_raw(e));
        }
        match self.with_ctx(|ctx| dispatcher::getattr(ctx, &path)) {
            Ok(attr) => reply.attr(&TTL, &attr_to_fuse(ino, attr)),
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let Some(path) = self.inodes.path_of(ino).map(str::to_string) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        match self.with_ctx(|ctx| dispatcher::readlink(ctx, &path)) {
            Ok(target) => reply.data(target.as_os_str().as_encoded_bytes()),
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.inodes.child_path(parent, name) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        match self.with_ctx(|ctx| dispatcher::mknod(ctx, &path)) {
            Ok(()) => reply.error(errno_to_raw(Errno::ENOTSUP)),
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.inodes.child_path(parent, name) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        let mode = mode & !umask;
        let result = self.with_ctx(|ctx| dispatcher::mkdir(ctx, &path, mode));
        if let Err(e) = result {
            return reply.error(errno_to_raw(e));
        }
        match self.with_ctx(|ctx| dispatcher::getattr(ctx, &path)) {
            Ok(attr) => {
                let ino = self.inodes.ino_of(path);
                reply.entry(&TTL, &attr_to_fuse(ino, attr), 0);
            }
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.inodes.child_path(parent, name) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        match self.with_ctx(|ctx| dispatcher::unlink_op(ctx, &path)) {
            Ok(()) => {
                self.inodes.forget_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.inodes.child_path(parent, name) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        match self.with_ctx(|ctx| dispatcher::rmdir(ctx, &path)) {
            Ok(()) => {
                self.inodes.forget_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.inodes.child_path(parent, link_name) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        let result = self.with_ctx(|ctx| dispatcher::symlink(ctx, target, &path));
        if let Err(e) = result {
            return reply.error(errno_to_raw(e));
        }
        match self.with_ctx(|ctx| dispatcher::getattr(ctx, &path)) {
            Ok(attr) => {
                let ino = self.inodes.ino_of(path);
                reply.entry(&TTL, &attr_to_fuse(ino, attr), 0);
            }
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(old), Some(new)) = (
            self.inodes.child_path(parent, name),
            self.inodes.child_path(newparent, newname),
        ) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        match self.with_ctx(|ctx| dispatcher::rename(ctx, &old, &new)) {
            Ok(()) => {
                self.inodes.forget_path(&old);
                reply.ok();
            }
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let (Some(old), Some(new)) = (
            self.inodes.path_of(ino).map(str::to_string),
            self.inodes.child_path(newparent, newname),
        ) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        let result = self.with_ctx(|ctx| dispatcher::link(ctx, &old, &new));
        if let Err(e) = result {
            return reply.error(errno_to_raw(e));
        }
        match self.with_ctx(|ctx| dispatcher::getattr(ctx, &new)) {
            Ok(attr) => reply.entry(&TTL, &attr_to_fuse(ino, attr), 0),
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.inodes.path_of(ino).map(str::to_string) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        let flags = OFlag::from_bits_truncate(flags);
        match self.with_ctx(|ctx| dispatcher::open(ctx, &path, flags)) {
            Ok(fd) => reply.opened(fd as u64, 0),
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(path) = self.inodes.child_path(parent, name) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        let mode = mode & !umask;
        let oflag = OFlag::from_bits_truncate(flags);
        let fd = match self.with_ctx(|ctx| dispatcher::create(ctx, &path, mode, oflag)) {
            Ok(fd) => fd,
            Err(e) => return reply.error(errno_to_raw(e)),
        };
        match self.with_ctx(|ctx| dispatcher::getattr(ctx, &path)) {
            Ok(attr) => {
                let ino = self.inodes.ino_of(path);
                reply.created(&TTL, &attr_to_fuse(ino, attr), 0, fd as u64, 0);
            }
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let mut buf = vec![0u8; size as usize];
        match nix::sys::uio::pread(fh as RawFd, &mut buf, offset) {
            Ok(n) => {
                buf.truncate(n);
                reply.data(&buf);
            }
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match nix::sys::uio::pwrite(fh as RawFd, data, offset) {
            Ok(n) => {
                if self.with_ctx(|ctx| ctx.options.flushwrites) {
                    let _ = nix::unistd::fsync(fh as RawFd);
                }
                reply.written(n as u32);
            }
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok()
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        let result = if datasync {
            nix::unistd::fdatasync(fh as RawFd)
        } else {
            nix::unistd::fsync(fh as RawFd)
        };
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let root_name = self.inodes.path_of(ino).and_then(Self::root_name_of);
        self.with_ctx(|ctx| dispatcher::release(ctx, root_name.as_deref(), fh as RawFd));
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.inodes.path_of(ino).map(str::to_string) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        match self.with_ctx(|ctx| dispatcher::opendir(ctx, &path)) {
            Ok(handle) => reply.opened(handle.unwrap_or(0), 0),
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let Some(path) = self.inodes.path_of(ino).map(str::to_string) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        let handle = if fh == 0 { None } else { Some(fh) };
        let entries = match self.with_ctx(|ctx| dispatcher::readdir(ctx, &path, handle)) {
            Ok(entries) => entries,
            Err(e) => return reply.error(errno_to_raw(e)),
        };
        for (i, entry) in entries.into_iter().enumerate().skip(offset as usize) {
            let kind = if entry.is_dir { FileType::Directory } else { FileType::RegularFile };
            let child_ino = self.inodes.entry_ino(ino, &path, &entry.name);
            if reply.add(child_ino, (i + 1) as i64, kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        let Some(path) = self.inodes.path_of(ino).map(str::to_string) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        let handle = if fh == 0 { None } else { Some(fh) };
        match self.with_ctx(|ctx| dispatcher::releasedir(ctx, &path, handle)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let Some(path) = self.inodes.path_of(ino).map(str::to_string) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        match self.with_ctx(|ctx| dispatcher::statfs(ctx, &path)) {
            Ok(stat) => reply.statfs(
                stat.blocks,
                stat.bfree,
                stat.bavail,
                0,
                0,
                512,
                stat.namelen,
                512,
            ),
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(path), Some(name)) = (self.inodes.path_of(ino).map(str::to_string), name.to_str()) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        match self.with_ctx(|ctx| dispatcher::setxattr(ctx, &path, name, value)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn getxattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let (Some(path), Some(name)) = (self.inodes.path_of(ino).map(str::to_string), name.to_str()) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        match self.with_ctx(|ctx| dispatcher::getxattr(ctx, &path, name)) {
            Ok(value) => {
                if size == 0 {
                    reply.size(value.len() as u32);
                } else if value.len() > size as usize {
                    reply.error(errno_to_raw(Errno::ERANGE));
                } else {
                    reply.data(&value);
                }
            }
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        let Some(path) = self.inodes.path_of(ino).map(str::to_string) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        match self.with_ctx(|ctx| dispatcher::listxattr(ctx, &path)) {
            Ok(names) => {
                let mut buf = Vec::new();
                for name in names {
                    buf.extend_from_slice(name.as_bytes());
                    buf.push(0);
                }
                if size == 0 {
                    reply.size(buf.len() as u32);
                } else if buf.len() > size as usize {
                    reply.error(errno_to_raw(Errno::ERANGE));
                } else {
                    reply.data(&buf);
                }
            }
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn removexattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let (Some(path), Some(name)) = (self.inodes.path_of(ino).map(str::to_string), name.to_str()) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        match self.with_ctx(|ctx| dispatcher::removexattr(ctx, &path, name)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let Some(path) = self.inodes.path_of(ino).map(str::to_string) else {
            return reply.error(errno_to_raw(Errno::ENOENT));
        };
        let mask = nix::unistd::AccessFlags::from_bits_truncate(mask);
        match self.with_ctx(|ctx| dispatcher::access(ctx, &path, mask)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_to_raw(e)),
        }
    }

    /// Startup's counterpart: stop the timer thread, unmount every
    /// remaining child, and remove the synthetic root. Called by `fuser`
    /// when the kernel mount goes away (`fusermount -u` or process exit),
    /// which is this crate's only shutdown hook now that there is no
    /// `main()`-level teardown sequence to run after a blocking `mount2`.
    fn destroy(&mut self) {
        self.timer_shutdown.store(true, Ordering::SeqCst);
        self.scheduler.wake.notify_all();
        self.with_ctx(|ctx| {
            let names: Vec<String> = ctx.registry.names().map(str::to_string).collect();
            for name in names {
                crate::mount_engine::do_umount(ctx, &name);
            }
        });
        if let Some(dir) = self.synthetic_root.take() {
            let _ = dir.close();
        }
    }
}
