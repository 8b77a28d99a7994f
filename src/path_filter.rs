//! Include/exclude filtering of scan paths.
//!
//! Patterns take the form `/(account|*)/(space|*)/(policy|*)`; a trailing
//! `*` on a segment matches by prefix. Inclusions are checked before
//! exclusions: when no inclusions are configured, everything not excluded
//! is included.

use std::fmt;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "{0:?} is not a valid path pattern: must start with a forward slash and \
     contain three non-empty segments, e.g. /account/*/space*"
)]
pub struct PatternParseError(String);

#[derive(Debug, Clone)]
enum Segment {
    Any,
    Exact(String),
    Prefix(String),
}

impl Segment {
    fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        if raw == "*" {
            return Some(Segment::Any);
        }
        match raw.strip_suffix('*') {
            Some(prefix) => Some(Segment::Prefix(prefix.to_string())),
            None => Some(Segment::Exact(raw.to_string())),
        }
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Segment::Any => true,
            Segment::Exact(exact) => value == exact,
            Segment::Prefix(prefix) => value.starts_with(prefix.as_str()),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Any => write!(f, "*"),
            Segment::Exact(exact) => write!(f, "{exact}"),
            Segment::Prefix(prefix) => write!(f, "{prefix}*"),
        }
    }
}

/// One `/account/space/policy` pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    account: Segment,
    space: Segment,
    policy: Segment,
}

impl Pattern {
    pub fn parse(raw: &str) -> Result<Self, PatternParseError> {
        let err = || PatternParseError(raw.to_string());
        let body = raw.trim().strip_prefix('/').ok_or_else(err)?;
        let mut segments = body.split('/');
        let account = segments.next().and_then(Segment::parse).ok_or_else(err)?;
        let space = segments.next().and_then(Segment::parse).ok_or_else(err)?;
        let policy = segments.next().and_then(Segment::parse).ok_or_else(err)?;
        if segments.next().is_some() {
            return Err(err());
        }
        Ok(Self {
            account,
            space,
            policy,
        })
    }

    pub fn matches(&self, account_id: &str, space_id: &str, policy_ref: &str) -> bool {
        self.account.matches(account_id)
            && self.space.matches(space_id)
            && self.policy.matches(policy_ref)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}/{}", self.account, self.space, self.policy)
    }
}

/// Flexible inclusion and exclusion of account/space/policy combinations.
/// The default filter includes everything.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    inclusions: Vec<Pattern>,
    exclusions: Vec<Pattern>,
}

impl PathFilter {
    pub fn new(inclusions: &[String], exclusions: &[String]) -> Result<Self, PatternParseError> {
        Ok(Self {
            inclusions: Self::parse_all(inclusions)?,
            exclusions: Self::parse_all(exclusions)?,
        })
    }

    fn parse_all(raw: &[String]) -> Result<Vec<Pattern>, PatternParseError> {
        raw.iter().map(|p| Pattern::parse(p)).collect()
    }

    /// True when the path fails to match a configured inclusion, or matches
    /// an exclusion.
    pub fn is_excluded(&self, account_id: &str, space_id: &str, policy_ref: &str) -> bool {
        if !self.inclusions.is_empty()
            && !self
                .inclusions
                .iter()
                .any(|p| p.matches(account_id, space_id, policy_ref))
        {
            debug!(
                "/{}/{}/{} does not match an inclusion: skipping",
                account_id, space_id, policy_ref
            );
            return true;
        }
        if self
            .exclusions
            .iter()
            .any(|p| p.matches(account_id, space_id, policy_ref))
        {
            debug!(
                "/{}/{}/{} matches an exclusion: skipping",
                account_id, space_id, policy_ref
            );
            return true;
        }
        false
    }
}
