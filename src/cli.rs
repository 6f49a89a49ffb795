// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

//! Argument parsing and the `-o option[,option...]` channel. Kept
//! deliberately thin: spec.md places "argument parsing, usage text,
//! configuration file loading" out of scope for the core, so this module
//! only turns argv into an `AfuseOptions` value and never touches the
//! lifecycle/dispatch logic.

use anyhow::{bail, Context};
use clap::{value_parser, Arg, Command};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AfuseOptions {
    pub mount_template: String,
    pub unmount_template: String,
    pub populate_root_command: Option<String>,
    pub filter_file: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub flushwrites: bool,
    pub exact_getattr: bool,
}

pub struct Parsed {
    pub mountpoint: PathBuf,
    pub options: AfuseOptions,
    pub verbose: bool,
}

pub fn parse_args<I, T>(args: I) -> anyhow::Result<Parsed>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = Command::new("afuse")
        .about("On-demand automounter exposed as a userspace FUSE filesystem")
        .arg(
            Arg::new("mountpoint")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("directory the synthetic root is exposed at"),
        )
        .arg(
            Arg::new("option")
                .short('o')
                .action(clap::ArgAction::Append)
                .value_name("option[,option...]")
                .help("FUSE-style mount option(s); see afuse(1)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::SetTrue)
                .help("display detailed output"),
        )
        .try_get_matches_from(args)
        .context("parsing command line")?;

    let mountpoint = matches
        .get_one::<PathBuf>("mountpoint")
        .expect("required")
        .clone();
    let verbose = matches.get_flag("verbose");

    let mut mount_template = None;
    let mut unmount_template = None;
    let mut populate_root_command = None;
    let mut filter_file = None;
    let mut timeout = None;
    let mut flushwrites = false;
    let mut exact_getattr = false;

    for group in matches
        .get_many::<String>("option")
        .into_iter()
        .flatten()
    {
        for entry in group.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match entry.split_once('=') {
                Some(("mount_template", v)) => mount_template = Some(v.to_string()),
                Some(("unmount_template", v)) => unmount_template = Some(v.to_string()),
                Some(("populate_root_command", v)) => populate_root_command = Some(v.to_string()),
                Some(("filter_file", v)) => filter_file = Some(PathBuf::from(v)),
                Some(("timeout", v)) => {
                    let secs: u64 = v
                        .parse()
                        .with_context(|| format!("invalid timeout value {:?}", v))?;
                    timeout = Some(Duration::from_secs(secs));
                }
                None if entry == "flushwrites" => flushwrites = true,
                None if entry == "exact_getattr" => exact_getattr = true,
                _ => bail!("unrecognized mount option {:?}", entry),
            }
        }
    }

    let mount_template = mount_template.context("mount_template is required (-o mount_template=CMD)")?;
    let unmount_template =
        unmount_template.context("unmount_template is required (-o unmount_template=CMD)")?;

    Ok(Parsed {
        mountpoint,
        options: AfuseOptions {
            mount_template,
            unmount_template,
            populate_root_command,
            filter_file,
            timeout,
            flushwrites,
            exact_getattr,
        },
        verbose,
    })
}

impl AfuseOptions {
    pub fn filter_file_path(&self) -> Option<&Path> {
        self.filter_file.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_templates() {
        let parsed = parse_args([
            "afuse",
            "/mnt/x",
            "-o",
            "mount_template=mk %m %r,unmount_template=um %m %r",
        ])
        .unwrap();
        assert_eq!(parsed.mountpoint, PathBuf::from("/mnt/x"));
        assert_eq!(parsed.options.mount_template, "mk %m %r");
        assert_eq!(parsed.options.unmount_template, "um %m %r");
        assert!(!parsed.options.flushwrites);
    }

    #[test]
    fn parses_flags_and_timeout() {
        let parsed = parse_args([
            "afuse",
            "/mnt/x",
            "-o",
            "mount_template=a,unmount_template=b,timeout=30,flushwrites,exact_getattr",
        ])
        .unwrap();
        assert_eq!(parsed.options.timeout, Some(Duration::from_secs(30)));
        assert!(parsed.options.flushwrites);
        assert!(parsed.options.exact_getattr);
    }

    #[test]
    fn missing_required_template_is_an_error() {
        let result = parse_args(["afuse", "/mnt/x", "-o", "mount_template=a"]);
        assert!(result.is_err());
    }

    #[test]
    fn unrecognized_option_is_an_error() {
        let result = parse_args([
            "afuse",
            "/mnt/x",
            "-o",
            "mount_template=a,unmount_template=b,bogus_option",
        ]);
        assert!(result.is_err());
    }
}
