//! Participant version resolution.
//!
//! Derives a stable `(version, branch)` pair from, in order: explicit
//! overrides, CI metadata, a version-control lookup, and finally the clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tracing::debug;

/// Branch used when neither an override nor CI provides one.
pub const DEFAULT_BRANCH: &str = "main";

/// Override value that means "no override".
pub const LOCAL_VERSION_PLACEHOLDER: &str = "local";

/// Joins the resolved version and the configured suffix.
pub const SUFFIX_SEPARATOR: char = '-';

/// Length of the commit identifiers used as versions.
pub const SHORT_SHA_LEN: usize = 7;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// A resolved participant identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantVersion {
    /// Participant name
    pub name: String,
    /// Version string, never empty
    pub version: String,
    /// Branch the version was built from
    pub branch: String,
    /// Version tags; always includes the branch
    pub tags: BTreeSet<String>,
}

impl ParticipantVersion {
    /// Create a version with the branch as its only tag.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        let branch = branch.into();
        Self {
            name: name.into(),
            version: version.into(),
            tags: BTreeSet::from([branch.clone()]),
            branch,
        }
    }
}

/// Values supplied explicitly by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionOverrides {
    /// Explicit version; ignored when empty or `local`
    pub version: Option<String>,
    /// Explicit branch
    pub branch: Option<String>,
    /// Appended to whatever version wins
    pub suffix: Option<String>,
    /// Extra tags
    pub tags: Vec<String>,
}

/// Identity information provided by the CI system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiContext {
    /// Short commit identifier
    pub commit_sha: Option<String>,
    /// Branch or ref name
    pub branch: Option<String>,
}

impl CiContext {
    /// Build from a variable lookup, reading the GitHub Actions variables.
    ///
    /// `GITHUB_HEAD_REF` (pull requests) wins over `GITHUB_REF_NAME` (pushes).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            commit_sha: non_empty("GITHUB_SHA")
                .map(|sha| sha.trim().chars().take(SHORT_SHA_LEN).collect()),
            branch: non_empty("GITHUB_HEAD_REF").or_else(|| non_empty("GITHUB_REF_NAME")),
        }
    }

    /// Build from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

/// Source of a short commit hash from version control.
pub trait VcsLookup: Send + Sync {
    /// Short hash of the current commit, if available.
    fn short_hash(&self) -> Option<String>;
}

/// Asks the `git` binary for the current commit.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    repo_dir: Option<PathBuf>,
}

impl GitCli {
    /// Run git inside `repo_dir` instead of the working directory.
    #[must_use]
    pub fn in_dir(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: Some(repo_dir.into()),
        }
    }
}

impl VcsLookup for GitCli {
    fn short_hash(&self) -> Option<String> {
        let short = format!("--short={SHORT_SHA_LEN}");
        let mut command = Command::new("git");
        command.args(["rev-parse", short.as_str(), "HEAD"]);
        if let Some(dir) = &self.repo_dir {
            command.current_dir(dir);
        }

        let output = command.output().ok()?;
        if !output.status.success() {
            return None;
        }
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!hash.is_empty()).then_some(hash)
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Where the resolved version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    /// Explicit override
    Override,
    /// CI commit identifier
    Ci,
    /// Version-control lookup
    Vcs,
    /// Clock fallback
    Timestamp,
}

/// Resolves participant identities with a fixed precedence.
#[derive(Clone)]
pub struct VersionResolver {
    vcs: Arc<dyn VcsLookup>,
    clock: Arc<dyn Clock>,
}

impl VersionResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(vcs: Arc<dyn VcsLookup>, clock: Arc<dyn Clock>) -> Self {
        Self { vcs, clock }
    }

    /// Resolver backed by `git` and the system clock.
    #[must_use]
    pub fn system() -> Self {
        Self::new(Arc::new(GitCli::default()), Arc::new(SystemClock))
    }

    /// Resolve the identity of `name`.
    ///
    /// Version precedence: override (unless empty or `local`), CI commit,
    /// VCS short hash, UTC timestamp. Branch precedence: override, CI branch,
    /// [`DEFAULT_BRANCH`]. The suffix is appended last.
    #[must_use]
    pub fn resolve(
        &self,
        name: &str,
        overrides: &VersionOverrides,
        ci: &CiContext,
    ) -> ParticipantVersion {
        let (base, source) = self.base_version(overrides, ci);

        let version = match overrides.suffix.as_deref().map(str::trim) {
            Some(suffix) if !suffix.is_empty() => format!("{base}{SUFFIX_SEPARATOR}{suffix}"),
            _ => base,
        };

        let branch = non_empty(overrides.branch.as_deref())
            .or_else(|| non_empty(ci.branch.as_deref()))
            .unwrap_or(DEFAULT_BRANCH)
            .to_string();

        debug!(participant = name, %version, %branch, ?source, "Resolved participant version");

        let mut resolved = ParticipantVersion::new(name, version, branch);
        resolved.tags.extend(
            overrides
                .tags
                .iter()
                .filter(|tag| !tag.trim().is_empty())
                .cloned(),
        );
        resolved
    }

    fn base_version(&self, overrides: &VersionOverrides, ci: &CiContext) -> (String, VersionSource) {
        if let Some(version) = non_empty(overrides.version.as_deref())
            .filter(|v| !v.eq_ignore_ascii_case(LOCAL_VERSION_PLACEHOLDER))
        {
            return (version.to_string(), VersionSource::Override);
        }
        if let Some(sha) = non_empty(ci.commit_sha.as_deref()) {
            return (sha.to_string(), VersionSource::Ci);
        }
        if let Some(hash) = self.vcs.short_hash().filter(|h| !h.trim().is_empty()) {
            return (hash, VersionSource::Vcs);
        }
        (
            self.clock.now().format(TIMESTAMP_FORMAT).to_string(),
            VersionSource::Timestamp,
        )
    }
}

impl std::fmt::Debug for VersionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionResolver").finish_non_exhaustive()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
