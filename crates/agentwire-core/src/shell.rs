//! POSIX shell quoting and remote command construction.

use agentwire_types::RemoteCommandOptions;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::warn;

static ENV_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid env name regex"));

/// Quote a string for a POSIX shell using single quotes.
///
/// Embedded single quotes become `'\''`. The empty string becomes `''`.
pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        "''".into()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Whether `name` can be emitted unquoted as an environment variable name.
pub fn is_valid_env_name(name: &str) -> bool {
    ENV_NAME.is_match(name)
}

/// Whether `args` ask the agent to read stream-json input.
pub fn uses_stream_json_input(args: &[String]) -> bool {
    args.iter().enumerate().any(|(i, arg)| {
        arg == "--input-format=stream-json"
            || (arg == "--input-format" && args.get(i + 1).is_some_and(|next| next == "stream-json"))
    })
}

/// `KEY='value'` assignments for every valid name, in key order.
fn env_assignments(env: &BTreeMap<String, String>) -> Vec<String> {
    env.iter()
        .filter_map(|(key, value)| {
            if is_valid_env_name(key) {
                Some(format!("{}={}", key, shell_escape(value)))
            } else {
                warn!(target: "agentwire::ssh", "Skipping invalid environment variable name: {:?}", key);
                None
            }
        })
        .collect()
}

/// Build the shell command line run on the remote host:
/// `cd '<cwd>' && KEY='value' 'command' 'arg1' ...`.
///
/// When the process reads stream-json from stdin the command is `exec`ed so
/// no intermediate shell sits between ssh and the agent's stdin.
pub fn build_remote_command(opts: &RemoteCommandOptions) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(cwd) = opts.cwd.as_deref().filter(|c| !c.is_empty()) {
        parts.push(format!("cd {} &&", shell_escape(cwd)));
    }

    let assignments = env_assignments(&opts.env);
    let exec = opts.use_stdin && uses_stream_json_input(&opts.args);

    if exec {
        parts.push("exec".into());
        if !assignments.is_empty() {
            // Prefix assignments on a special builtin are not reliably exported.
            parts.push("env".into());
        }
    }
    parts.extend(assignments);

    parts.push(shell_escape(&opts.command));
    parts.extend(opts.args.iter().map(|arg| shell_escape(arg)));

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn opts(command: &str, args: &[&str]) -> RemoteCommandOptions {
        RemoteCommandOptions::new(command, args.iter().map(|a| a.to_string()).collect())
    }

    #[test]
    fn test_escape_empty() {
        assert_eq!(shell_escape(""), "''");
    }

    #[test]
    fn test_escape_single_quote() {
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_escape_metacharacters_are_inert() {
        assert_eq!(shell_escape("$(rm -rf /); `x` | y"), "'$(rm -rf /); `x` | y'");
    }

    #[test]
    fn test_env_name_validation() {
        assert!(is_valid_env_name("PATH"));
        assert!(is_valid_env_name("_private_1"));
        assert!(!is_valid_env_name("1ABC"));
        assert!(!is_valid_env_name("A;rm -rf /"));
        assert!(!is_valid_env_name(""));
    }

    #[test]
    fn test_stream_json_input_detection() {
        let split: Vec<String> = vec!["--input-format".into(), "stream-json".into()];
        assert!(uses_stream_json_input(&split));
        assert!(uses_stream_json_input(&["--input-format=stream-json".to_string()]));
        assert!(!uses_stream_json_input(&["--output-format".to_string(), "stream-json".to_string()]));
        assert!(!uses_stream_json_input(&["--input-format".to_string()]));
    }

    #[test]
    fn test_build_remote_command_full() {
        let mut o = opts("claude", &["--print", "hello world"]);
        o.cwd = Some("/home/dev/my project".into());
        o.env.insert("API_KEY".into(), "s3cr'et".into());
        o.env.insert("DEBUG".into(), "1".into());
        assert_eq!(
            build_remote_command(&o),
            "cd '/home/dev/my project' && API_KEY='s3cr'\\''et' DEBUG='1' 'claude' '--print' 'hello world'"
        );
    }

    #[test]
    fn test_build_remote_command_skips_invalid_env_names() {
        let mut o = opts("ls", &[]);
        o.env.insert("GOOD".into(), "x".into());
        o.env.insert("BAD;touch /tmp/p".into(), "y".into());
        assert_eq!(build_remote_command(&o), "GOOD='x' 'ls'");
    }

    #[test]
    fn test_build_remote_command_exec_for_stream_json_stdin() {
        let mut o = opts("claude", &["--print", "--input-format", "stream-json"]);
        o.use_stdin = true;
        assert_eq!(
            build_remote_command(&o),
            "exec 'claude' '--print' '--input-format' 'stream-json'"
        );

        o.env.insert("TERM".into(), "dumb".into());
        o.cwd = Some("/srv".into());
        assert_eq!(
            build_remote_command(&o),
            "cd '/srv' && exec env TERM='dumb' 'claude' '--print' '--input-format' 'stream-json'"
        );
    }

    #[test]
    fn test_build_remote_command_plain_stdin_no_exec() {
        let mut o = opts("codex", &["exec", "--json", "-"]);
        o.use_stdin = true;
        assert_eq!(build_remote_command(&o), "'codex' 'exec' '--json' '-'");
    }

    proptest! {
        #[test]
        fn prop_escaped_is_single_quoted(s in ".*") {
            let escaped = shell_escape(&s);
            prop_assert!(escaped.starts_with('\''));
            prop_assert!(escaped.ends_with('\''));
            // Undo the quoting the way a POSIX shell would.
            let unquoted = escaped[1..escaped.len() - 1].replace("'\\''", "'");
            prop_assert_eq!(unquoted, s);
        }
    }
}
