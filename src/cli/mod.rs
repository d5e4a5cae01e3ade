//! Command-line surface (SPEC_FULL §6), grounded on `cli/mod.rs`'s
//! `#[derive(Parser)]` struct style, reduced to bish's flat flag set (no
//! subcommands — bish has one mode of operation, interactive or scripted).

use std::path::PathBuf;

use clap::Parser;

/// `bish` invocation flags.
#[derive(Parser, Debug)]
#[command(name = "bish")]
#[command(about = "Interactive, AI-augmented POSIX-compatible shell")]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Run a single command, then exit.
    #[arg(short = 'c', value_name = "CMD")]
    pub command: Option<String>,

    /// Start as a login shell (sources `/etc/profile`, `~/.gsh_profile`).
    #[arg(short = 'l')]
    pub login: bool,

    /// Override rc-file discovery with an explicit path.
    #[arg(long)]
    pub rcfile: Option<PathBuf>,

    /// Fail fast on rc-file or config parse errors instead of tolerating them.
    #[arg(long)]
    pub strict_config: bool,

    /// Print the build version and exit. SPEC_FULL names this flag `-ver`;
    /// single-dash multi-letter flags aren't expressible in clap's derive
    /// API, so `normalize_args` rewrites a literal `-ver` token to `--ver`
    /// before parsing (see DESIGN.md Open Question decisions).
    #[arg(long = "ver")]
    pub version: bool,

    /// Script paths, executed in order. With none given and stdin is a tty,
    /// enter interactive mode; otherwise read a script from stdin.
    pub scripts: Vec<PathBuf>,
}

/// Rewrites the single historical `-ver` spelling to `--ver` so clap's
/// standard long-flag parser can recognise it; every other argument passes
/// through unchanged.
pub fn normalize_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    args.into_iter()
        .map(|arg| if arg == "-ver" { "--ver".to_string() } else { arg })
        .collect()
}

impl Cli {
    pub fn parse_normalized() -> Self {
        Self::parse_from(normalize_args(std::env::args()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_args_rewrites_single_dash_ver() {
        let args = normalize_args(vec!["bish".to_string(), "-ver".to_string()]);
        assert_eq!(args, vec!["bish".to_string(), "--ver".to_string()]);
    }

    #[test]
    fn normalize_args_leaves_other_flags_untouched() {
        let args = normalize_args(vec!["bish".to_string(), "-c".to_string(), "echo hi".to_string()]);
        assert_eq!(args[1], "-c");
    }

    #[test]
    fn parses_run_command_flag() {
        let cli = Cli::parse_from(["bish", "-c", "echo hi"]);
        assert_eq!(cli.command.as_deref(), Some("echo hi"));
        assert!(!cli.login);
    }

    #[test]
    fn parses_rcfile_and_strict_config() {
        let cli = Cli::parse_from(["bish", "--rcfile", "/tmp/myrc", "--strict-config"]);
        assert_eq!(cli.rcfile, Some(PathBuf::from("/tmp/myrc")));
        assert!(cli.strict_config);
    }

    #[test]
    fn collects_trailing_script_paths() {
        let cli = Cli::parse_from(["bish", "one.sh", "two.sh"]);
        assert_eq!(cli.scripts, vec![PathBuf::from("one.sh"), PathBuf::from("two.sh")]);
    }
}
