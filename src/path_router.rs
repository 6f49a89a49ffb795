// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

//! Classifies a virtual path relative to the synthetic root, mounting
//! on-demand and reaping stale mounts along the way. Ported from
//! `process_path` in the original.

use crate::context::AfuseContext;
use crate::mount_engine;
use crate::stale;
use std::path::PathBuf;

#[derive(Debug, PartialEq, Eq)]
pub enum Classification {
    /// Path classification failed (filtered, or a mount attempt failed).
    Failed,
    /// The synthetic root itself.
    Root,
    /// `/<name>`, where `<name>` may or may not currently be mounted.
    RootSubdir,
    /// `/<name>/...`, always forwarded to an active mount.
    Proxy,
}

pub struct Classified {
    pub classification: Classification,
    pub root_name: Option<String>,
    pub forwarded_path: Option<PathBuf>,
}

impl Classified {
    fn failed() -> Self {
        Classified {
            classification: Classification::Failed,
            root_name: None,
            forwarded_path: None,
        }
    }
}

/// `(name, hasChildSegments)`: `name` is the characters after the leading
/// `/` up to the next `/` or end of string; `hasChildSegments` is true when
/// non-empty characters follow after that next `/`.
pub fn extract_first_component(path: &str) -> (&str, bool) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    match trimmed.find('/') {
        Some(idx) => (&trimmed[..idx], !trimmed[idx + 1..].is_empty()),
        None => (trimmed, false),
    }
}

/// `attemptMount` gates whether a not-yet-mounted root subdir should be
/// mounted on demand. Metadata-only root-subdir operations (e.g. `getattr`)
/// pass `false` so that a mere directory listing doesn't mount everything;
/// data operations pass `true`.
pub fn classify(ctx: &mut AfuseContext, path: &str, attempt_mount: bool) -> Classified {
    let (name, has_child_segments) = extract_first_component(path);

    if ctx.filters.is_filtered(name) {
        return Classified::failed();
    }
    if name.is_empty() {
        return Classified {
            classification: Classification::Root,
            root_name: None,
            forwarded_path: None,
        };
    }

    if !ctx.registry.contains(name) && (has_child_segments || attempt_mount) {
        mount_engine::do_mount(ctx, name);
    }

    if !ctx.registry.contains(name) {
        return Classified {
            classification: Classification::RootSubdir,
            root_name: Some(name.to_string()),
            forwarded_path: None,
        };
    }

    let mount_point = ctx.registry.get(name).unwrap().mount_point.clone();
    let is_stale = stale::is_stale(&mount_point, ctx.synthetic_root_dev).unwrap_or(true);
    if is_stale && !mount_engine::remount(ctx, name) {
        return Classified::failed();
    }

    let forwarded_path = ctx.synthetic_root.join(path.trim_start_matches('/'));
    let classification = if has_child_segments {
        Classification::Proxy
    } else {
        Classification::RootSubdir
    };
    Classified {
        classification,
        root_name: Some(name.to_string()),
        forwarded_path: Some(forwarded_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_first_component_cases() {
        assert_eq!(extract_first_component("/"), ("", false));
        assert_eq!(extract_first_component("/foo"), ("foo", false));
        assert_eq!(extract_first_component("/foo/"), ("foo", false));
        assert_eq!(extract_first_component("/foo/bar"), ("foo", true));
        assert_eq!(extract_first_component("/foo/bar/baz"), ("foo", true));
    }

    #[test]
    fn empty_path_is_root() {
        use crate::cli::AfuseOptions;
        let options = AfuseOptions {
            mount_template: "/bin/true".into(),
            unmount_template: "/bin/true".into(),
            populate_root_command: None,
            filter_file: None,
            timeout: None,
            flushwrites: false,
            exact_getattr: false,
        };
        let mut ctx = AfuseContext::new(
            options,
            "/tmp".into(),
            0,
            slog::Logger::root(slog::Discard, slog::o!()),
        );
        let classified = classify(&mut ctx, "/", false);
        assert_eq!(classified.classification, Classification::Root);
    }

    #[test]
    fn filtered_name_fails_without_mounting() {
        use crate::cli::AfuseOptions;
        let options = AfuseOptions {
            mount_template: "/bin/true".into(),
            unmount_template: "/bin/true".into(),
            populate_root_command: None,
            filter_file: None,
            timeout: None,
            flushwrites: false,
            exact_getattr: false,
        };
        let mut ctx = AfuseContext::new(
            options,
            "/tmp".into(),
            0,
            slog::Logger::root(slog::Discard, slog::o!()),
        );
        ctx.filters = crate::filter::FilterSet::from_lines(["bad*"]).unwrap();
        let classified = classify(&mut ctx, "/badness", true);
        assert_eq!(classified.classification, Classification::Failed);
        assert!(!ctx.registry.contains("badness"));
    }

    #[test]
    fn getattr_style_call_does_not_mount() {
        use crate::cli::AfuseOptions;
        let root = tempfile::tempdir().unwrap();
        let options = AfuseOptions {
            mount_template: "/bin/true".into(),
            unmount_template: "/bin/true".into(),
            populate_root_command: None,
            filter_file: None,
            timeout: None,
            flushwrites: false,
            exact_getattr: false,
        };
        let mut ctx = AfuseContext::new(
            options,
            root.path().to_path_buf(),
            0,
            slog::Logger::root(slog::Discard, slog::o!()),
        );
        let classified = classify(&mut ctx, "/foo", false);
        assert_eq!(classified.classification, Classification::RootSubdir);
        assert!(!ctx.registry.contains("foo"));
    }

    #[test]
    fn data_operation_mounts_on_demand() {
        use crate::cli::AfuseOptions;
        let root = tempfile::tempdir().unwrap();
        let options = AfuseOptions {
            mount_template: "/bin/true".into(),
            unmount_template: "/bin/true".into(),
            populate_root_command: None,
            filter_file: None,
            timeout: None,
            flushwrites: false,
            exact_getattr: false,
        };
        let mut ctx = AfuseContext::new(
            options,
            root.path().to_path_buf(),
            0,
            slog::Logger::root(slog::Discard, slog::o!()),
        );
        let classified = classify(&mut ctx, "/foo/bar", true);
        assert_eq!(classified.classification, Classification::Proxy);
        assert!(ctx.registry.contains("foo"));
    }
}
