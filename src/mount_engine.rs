// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

//! Orchestrates `do_mount`/`do_umount`: makes the backing subdirectory,
//! invokes the configured template, and registers/deregisters with the
//! `MountRegistry`. Ported from `do_mount`/`do_umount`/`make_mount_point`
//! in the original.

use crate::context::AfuseContext;
use crate::mount::Mount;
use crate::scheduler;
use crate::template::run_template;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;

/// Attempts to mount `root_name`. Returns `true` and registers a `Mount`
/// on success; on any failure the created subdirectory is removed and
/// nothing is registered.
pub fn do_mount(ctx: &mut AfuseContext, root_name: &str) -> bool {
    let mount_point = ctx.synthetic_root.join(root_name);
    if let Err(e) = fs::create_dir(&mount_point) {
        if e.kind() != ErrorKind::AlreadyExists {
            slog::warn!(
                ctx.logger,
                "failed to create mount point {:?}: {}", mount_point, e
            );
            return false;
        }
    } else if let Err(e) = fs::set_permissions(&mount_point, fs::Permissions::from_mode(0o700)) {
        slog::warn!(ctx.logger, "failed to chmod mount point {:?}: {}", mount_point, e);
    }

    let ok = run_template(
        &ctx.logger,
        &ctx.options.mount_template,
        &mount_point.to_string_lossy(),
        root_name,
    );
    if !ok {
        let _ = fs::remove_dir(&mount_point);
        return false;
    }

    ctx.registry.insert(Mount::new(root_name.to_string(), mount_point));
    scheduler::notify(ctx, Some(root_name));
    true
}

/// Unmounts and deregisters `root_name`, if registered. Deregistration
/// always happens, even when the unmount command fails, to avoid a zombie
/// registry entry (spec.md §4.3 ordering rule; §9 Open Question #2: this
/// accepts the risk that the kernel may still believe a mount exists).
pub fn do_umount(ctx: &mut AfuseContext, root_name: &str) {
    let mount_point = match ctx.registry.get(root_name) {
        Some(m) => m.mount_point.clone(),
        None => return,
    };

    let ok = run_template(
        &ctx.logger,
        &ctx.options.unmount_template,
        &mount_point.to_string_lossy(),
        root_name,
    );
    if !ok {
        slog::warn!(
            ctx.logger,
            "unmount_template failed for {:?}; deregistering anyway", root_name
        );
    }
    if let Err(e) = fs::remove_dir(&mount_point) {
        slog::warn!(ctx.logger, "failed to remove mount point {:?}: {}", mount_point, e);
    }
    ctx.registry.remove(root_name);
}

/// One remount attempt after stale detection. Any handles the superseded
/// mount had open are force-closed first (§9 Open Question #1) rather than
/// silently aliased into the new mount.
pub fn remount(ctx: &mut AfuseContext, root_name: &str) -> bool {
    ctx.invalidate_mount_handles(root_name);
    do_umount(ctx, root_name);
    do_mount(ctx, root_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::AfuseOptions;
    use tempfile::tempdir;

    fn test_ctx(root: &std::path::Path, mount_template: &str, unmount_template: &str) -> AfuseContext {
        let options = AfuseOptions {
            mount_template: mount_template.into(),
            unmount_template: unmount_template.into(),
            populate_root_command: None,
            filter_file: None,
            timeout: None,
            flushwrites: false,
            exact_getattr: false,
        };
        AfuseContext::new(options, root.to_path_buf(), 0, slog::Logger::root(slog::Discard, slog::o!()))
    }

    #[test]
    fn successful_mount_registers_and_creates_directory() {
        let root = tempdir().unwrap();
        let mut ctx = test_ctx(root.path(), "/bin/true", "/bin/true");
        assert!(do_mount(&mut ctx, "foo"));
        assert!(ctx.registry.contains("foo"));
        assert!(root.path().join("foo").is_dir());
    }

    #[test]
    fn failed_mount_template_removes_directory_and_does_not_register() {
        let root = tempdir().unwrap();
        let mut ctx = test_ctx(root.path(), "/bin/false", "/bin/true");
        assert!(!do_mount(&mut ctx, "foo"));
        assert!(!ctx.registry.contains("foo"));
        assert!(!root.path().join("foo").exists());
    }

    #[test]
    fn umount_deregisters_even_when_template_fails() {
        let root = tempdir().unwrap();
        let mut ctx = test_ctx(root.path(), "/bin/true", "/bin/false");
        assert!(do_mount(&mut ctx, "foo"));
        do_umount(&mut ctx, "foo");
        assert!(!ctx.registry.contains("foo"));
    }

    #[test]
    fn remount_invalidates_old_handles() {
        let root = tempdir().unwrap();
        let mut ctx = test_ctx(root.path(), "/bin/true", "/bin/true");
        assert!(do_mount(&mut ctx, "foo"));
        ctx.registry.get_mut("foo").unwrap().handles.insert_fd(99);
        assert!(remount(&mut ctx, "foo"));
        assert!(ctx.registry.get("foo").unwrap().handles.is_empty());
    }
}
