//! Path helpers for configuration values.

/// Expands a leading `~/` prefix to the user's home directory.
///
/// When `HOME` is unset the input comes back unchanged.
///
/// # Examples
///
/// ```
/// # use hostexec::util::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/.ssh/known_hosts"), format!("{home}/.ssh/known_hosts"));
/// assert_eq!(expand_tilde("/etc/ssh/known_hosts"), "/etc/ssh/known_hosts");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/absolute/key")]
    #[case("relative/key")]
    #[case("~user/key")]
    #[case("")]
    fn leaves_non_home_paths_alone(#[case] path: &str) {
        assert_eq!(expand_tilde(path), path);
    }

    #[test]
    fn expands_home_prefix() {
        let Some(home) = std::env::var_os("HOME") else {
            return;
        };
        assert_eq!(
            expand_tilde("~/.ssh/id_ed25519"),
            format!("{}/.ssh/id_ed25519", home.to_string_lossy())
        );
    }
}
