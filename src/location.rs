//! Parsing of `[user@]host:path` transfer arguments.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};

/// A path, optionally on a named remote host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Location {
    user: Option<String>,
    host: Option<String>,
    path: Utf8PathBuf,
}

impl Location {
    /// Parses a command-line location.
    ///
    /// `host:path` and `user@host:path` name a remote path; IPv6 hosts are
    /// written in brackets (`[::1]:/tmp`). Anything without a colon, or with
    /// a `/` before the first colon, is a local path. An empty host is
    /// treated as local.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        split_remote(raw).map_or_else(
            || Self::local(raw),
            |(user, host, path)| Self {
                user: user.map(str::to_owned),
                host: Some(host.to_owned()),
                path: Utf8PathBuf::from(path),
            },
        )
    }

    /// A path on this machine.
    #[must_use]
    pub fn local(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            user: None,
            host: None,
            path: path.into(),
        }
    }

    /// User named in the location, if any.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Remote host, or `None` for a local path.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Path component.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns `true` when no remote host was named.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.host.is_none()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(host) = &self.host else {
            return write!(f, "{}", self.path);
        };
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        if host.contains(':') {
            write!(f, "[{host}]:{}", self.path)
        } else {
            write!(f, "{host}:{}", self.path)
        }
    }
}

fn split_remote(raw: &str) -> Option<(Option<&str>, &str, &str)> {
    let (user, rest) = match raw.split_once('@') {
        Some((user, rest)) if !user.is_empty() && !user.contains(['/', ':']) => {
            (Some(user), rest)
        }
        _ => (None, raw),
    };

    let (host, path) = if let Some(bracketed) = rest.strip_prefix('[') {
        let (host, tail) = bracketed.split_once(']')?;
        (host, tail.strip_prefix(':')?)
    } else {
        let (host, path) = rest.split_once(':')?;
        if host.contains('/') {
            return None;
        }
        (host, path)
    };

    (!host.is_empty()).then_some((user, host, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/tmp/file", None, None, "/tmp/file")]
    #[case("relative/dir", None, None, "relative/dir")]
    #[case("./odd:name", None, None, "./odd:name")]
    #[case("box:/srv/app", None, Some("box"), "/srv/app")]
    #[case("ops@box:/srv/app", Some("ops"), Some("box"), "/srv/app")]
    #[case("ops@[::1]:/tmp", Some("ops"), Some("::1"), "/tmp")]
    #[case("[fe80::1]:data", None, Some("fe80::1"), "data")]
    #[case(":/tmp", None, None, ":/tmp")]
    fn parses_locations(
        #[case] raw: &str,
        #[case] user: Option<&str>,
        #[case] host: Option<&str>,
        #[case] path: &str,
    ) {
        let location = Location::parse(raw);
        assert_eq!(location.user(), user);
        assert_eq!(location.host(), host);
        assert_eq!(location.path(), Utf8Path::new(path));
        assert_eq!(location.is_local(), host.is_none());
    }

    #[rstest]
    #[case("ops@box:/srv")]
    #[case("box:/srv")]
    #[case("ops@[::1]:/tmp")]
    #[case("/plain/path")]
    fn display_round_trips(#[case] raw: &str) {
        assert_eq!(Location::parse(raw).to_string(), raw);
    }
}
