// Copyright (c) 2018-present, Facebook, Inc.
// All rights reserved.
//
// This source code is licensed under the BSD-style license found in the
// LICENSE file in the root directory of this source tree.

//! Expands `%m`/`%r`/`%%` in command templates, tokenizes the result with
//! quoting and backslash escapes, then forks and execs it — no shell is
//! ever invoked, because `rootName` is attacker-controlled (it comes
//! straight from a path lookup) and must never be interpreted by `/bin/sh`.

use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execvp, fork, ForkResult};
use slog::Logger;
use std::ffi::CString;

/// Tokenizes `template`, substituting `%m` for `mount_point`, `%r` for
/// `root_name`, and `%%` for a literal `%`. Words are separated by
/// unquoted whitespace; `"..."` preserves spaces verbatim; `\x` escapes
/// the following character literally, even inside quotes.
pub fn expand_and_tokenize(template: &str, mount_point: &str, root_name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut started = false;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    started = true;
                }
            }
            '"' => {
                in_quotes = !in_quotes;
                started = true;
            }
            '%' => {
                started = true;
                match chars.peek() {
                    Some('m') => {
                        chars.next();
                        current.push_str(mount_point);
                    }
                    Some('r') => {
                        chars.next();
                        current.push_str(root_name);
                    }
                    Some('%') => {
                        chars.next();
                        current.push('%');
                    }
                    _ => current.push('%'),
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if started {
                    words.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if started {
        words.push(current);
    }
    words
}

/// Runs `template` as a child process with no shell in between. Returns
/// `true` iff the child exited with status 0. Any other outcome (fork
/// failure, exec failure, abnormal termination, non-zero exit) is reported
/// as `false` with a log line, never as an error to propagate.
pub fn run_template(logger: &Logger, template: &str, mount_point: &str, root_name: &str) -> bool {
    let argv = expand_and_tokenize(template, mount_point, root_name);
    let argv: Vec<CString> = match argv
        .iter()
        .map(|s| CString::new(s.as_str()))
        .collect::<Result<_, _>>()
    {
        Ok(argv) => argv,
        Err(e) => {
            slog::error!(logger, "template produced an embedded NUL byte: {}", e);
            return false;
        }
    };
    if argv.is_empty() {
        slog::error!(logger, "template expanded to an empty command: {:?}", template);
        return false;
    }

    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            let _ = execvp(&argv[0], &argv);
            // execvp only returns on failure; avoid unwinding through a
            // forked child's copy of the parent's Rust state.
            nix::unistd::_exit(127);
        }
        Ok(ForkResult::Parent { child }) => match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, 0)) => true,
            Ok(WaitStatus::Exited(_, code)) => {
                slog::warn!(logger, "template {:?} exited with status {}", template, code);
                false
            }
            Ok(status) => {
                slog::warn!(logger, "template {:?} terminated abnormally: {:?}", template, status);
                false
            }
            Err(e) => {
                slog::error!(logger, "waitpid failed for template {:?}: {}", template, e);
                false
            }
        },
        Err(e) => {
            slog::error!(logger, "fork failed running template {:?}: {}", template, e);
            false
        }
    }
}

/// Runs `command` (tokenized the same way as a mount template, but with no
/// `%m`/`%r` substitution) and returns its stdout split into lines. Used
/// for `populate_root_command`, which — unlike the mount/unmount templates
/// — is expected to produce output rather than just an exit code.
pub fn run_capturing(logger: &Logger, command: &str) -> Vec<String> {
    let argv = expand_and_tokenize(command, "", "");
    let Some((program, args)) = argv.split_first() else {
        return Vec::new();
    };
    match std::process::Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect(),
        Ok(output) => {
            slog::warn!(logger, "populate_root_command {:?} exited with {}", command, output.status);
            Vec::new()
        }
        Err(e) => {
            slog::warn!(logger, "populate_root_command {:?} failed to start: {}", command, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_logger() -> Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn substitutes_mount_point_and_root_name() {
        let words = expand_and_tokenize("mk %m %r", "/tmp/root/foo", "foo");
        assert_eq!(words, vec!["mk", "/tmp/root/foo", "foo"]);
    }

    #[test]
    fn percent_percent_is_literal_percent() {
        let words = expand_and_tokenize("echo 100%% done", "/m", "r");
        assert_eq!(words, vec!["echo", "100%", "done"]);
    }

    #[test]
    fn quoted_spaces_are_preserved_as_one_argument() {
        let words = expand_and_tokenize(r#"cmd "arg with spaces" last"#, "/m", "r");
        assert_eq!(words, vec!["cmd", "arg with spaces", "last"]);
    }

    #[test]
    fn backslash_escapes_one_character() {
        let words = expand_and_tokenize(r"cmd \%m literal", "/m", "r");
        assert_eq!(words, vec!["cmd", "%m", "literal"]);
    }

    #[test]
    fn run_template_true_succeeds() {
        assert!(run_template(&test_logger(), "/bin/true", "/m", "r"));
    }

    #[test]
    fn run_template_false_fails() {
        assert!(!run_template(&test_logger(), "/bin/false", "/m", "r"));
    }

    #[test]
    fn run_capturing_splits_stdout_into_lines() {
        // Two backslashes in the template survive tokenization (which eats
        // one backslash per escape) as a single literal "\n" in argv,
        // which printf(1) then expands into an actual newline.
        let lines = run_capturing(&test_logger(), r#"printf "baz\\nfoo\\n""#);
        assert_eq!(lines, vec!["baz", "foo"]);
    }

    #[test]
    fn run_template_missing_binary_fails_without_shell() {
        // If this ever went through a shell, "; touch /tmp/pwned" would run.
        // It must not: execvp fails outright and the child exits 127.
        assert!(!run_template(
            &test_logger(),
            "/no/such/binary-xyz %r",
            "/m",
            "r"
        ));
    }
}
