//! Built-in git completer: subcommand and flag suggestions for common
//! subcommands (SPEC_FULL §4.5 layer 2).

const SUBCOMMANDS: &[&str] = &[
    "add", "branch", "checkout", "clone", "commit", "diff", "fetch", "log", "merge", "pull",
    "push", "rebase", "reset", "stash", "status", "tag",
];

fn flags_for(subcommand: &str) -> &'static [&'static str] {
    match subcommand {
        "commit" => &["-m", "--message", "-a", "--all", "--amend"],
        "checkout" => &["-b", "--track", "-f", "--force"],
        "branch" => &["-d", "-D", "--delete", "-a", "--all", "-r", "--remote"],
        "push" => &["--force", "--force-with-lease", "-u", "--set-upstream", "--tags"],
        "pull" => &["--rebase", "--no-rebase", "--ff-only"],
        "log" => &["--oneline", "--graph", "--all", "-n"],
        "diff" => &["--staged", "--cached", "--stat"],
        "reset" => &["--hard", "--soft", "--mixed"],
        "stash" => &["list", "pop", "apply", "drop", "show"],
        _ => &[],
    }
}

/// `words` is the full word sequence typed so far (`["git", ...]`); `token`
/// is the partial text under the cursor.
pub fn complete(words: &[String], token: &str) -> Vec<String> {
    if words.len() <= 2 {
        return SUBCOMMANDS
            .iter()
            .filter(|s| s.starts_with(token))
            .map(|s| s.to_string())
            .collect();
    }

    let subcommand = words[1].as_str();
    flags_for(subcommand)
        .iter()
        .filter(|f| f.starts_with(token))
        .map(|f| f.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_subcommand_prefix() {
        let words = vec!["git".to_string(), "chec".to_string()];
        let result = complete(&words, "chec");
        assert_eq!(result, vec!["checkout"]);
    }

    #[test]
    fn completes_flags_for_known_subcommand() {
        let words = vec!["git".to_string(), "commit".to_string(), "-m".to_string()];
        let result = complete(&words, "-m");
        assert!(result.contains(&"-m".to_string()));
        assert!(result.contains(&"--message".to_string()));
    }

    #[test]
    fn unknown_subcommand_has_no_flags() {
        let words = vec!["git".to_string(), "blame".to_string(), "--".to_string()];
        let result = complete(&words, "--");
        assert!(result.is_empty());
    }
}
