//! Version constraint matching for patch declarations
//!
//! Declarations use package-manager style constraints such as `^1.0`,
//! `>=1.2 <2.0` or `~1.4 || ^2.0`; they are mapped onto `semver` requirements.

use semver::{Version, VersionReq};
use std::fmt;

/// Constraint that matches every version.
pub const ANY_VERSION: &str = "*";

/// Errors during version filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// Invalid version string (e.g., "dev-main")
    InvalidVersion { value: String, source: String },
    /// Invalid version constraint (e.g., ">=bad")
    InvalidConstraint { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid version '{}': {}", value, source)
            }
            VersionError::InvalidConstraint { value, source } => {
                write!(f, "invalid version constraint '{}': {}", value, source)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Whether a constraint string accepts any version without parsing.
pub fn is_any(constraint: &str) -> bool {
    let trimmed = constraint.trim();
    trimmed.is_empty() || trimmed == ANY_VERSION
}

/// Check if a version satisfies a constraint string
///
/// # Examples
///
/// ```
/// use patchset::patch::version::satisfies;
///
/// assert!(satisfies("1.2.0", "^1.0").unwrap());
/// assert!(!satisfies("2.0.0", "^1.0").unwrap());
/// assert!(satisfies("1.2.0.0", ">=1.0 <2.0").unwrap());
/// assert!(satisfies("3.1.0", "~1.4 || ^3.0").unwrap());
///
/// // "*" means "apply to all versions", even unparsable ones
/// assert!(satisfies("dev-main", "*").unwrap());
/// ```
pub fn satisfies(version: &str, constraint: &str) -> Result<bool, VersionError> {
    if is_any(constraint) {
        return Ok(true);
    }

    let requirements = parse_constraint(constraint)?;
    let version = parse_version(version)?;

    Ok(requirements.iter().any(|req| req.matches(&version)))
}

/// Parse a constraint into its `||` alternatives.
///
/// Composer operators are translated before `semver` sees them: `~1.4` is
/// `>=1.4.0, <2.0.0`, a bare `1.2.0` is an exact match, `|` and `||` both
/// separate alternatives and `1.0 - 2.0` is an inclusive range.
pub fn parse_constraint(constraint: &str) -> Result<Vec<VersionReq>, VersionError> {
    let invalid = |source: String| VersionError::InvalidConstraint {
        value: constraint.to_string(),
        source,
    };

    let mut alternatives = Vec::new();
    for alternative in constraint.replace("||", "|").split('|') {
        let alternative = alternative.trim();
        if alternative.is_empty() {
            return Err(invalid("empty alternative".to_string()));
        }
        let translated = translate_alternative(alternative).map_err(invalid)?;
        let req = VersionReq::parse(&translated).map_err(|e| invalid(e.to_string()))?;
        alternatives.push(req);
    }

    Ok(alternatives)
}

/// Parse a package version, tolerating `v` prefixes, short and four-part forms.
pub fn parse_version(version: &str) -> Result<Version, VersionError> {
    let normalized = normalize_version(version);
    Version::parse(&normalized).map_err(|e| VersionError::InvalidVersion {
        value: version.to_string(),
        source: e.to_string(),
    })
}

fn normalize_version(version: &str) -> String {
    let version = strip_v(version.trim());

    let (core, suffix) = match version.find(['-', '+']) {
        Some(idx) => version.split_at(idx),
        None => (version, ""),
    };

    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.len() == 4 && parts[3] == "0" {
        parts.pop();
    }
    while parts.len() < 3 {
        parts.push("0");
    }

    format!("{}{}", parts.join("."), suffix)
}

/// One alternative as a comma-joined `semver` requirement string.
fn translate_alternative(alternative: &str) -> Result<String, String> {
    if let Some((low, high)) = alternative.split_once(" - ") {
        return Ok(format!(
            ">={}, {}",
            normalize_version(low),
            hyphen_upper_bound(high.trim())?
        ));
    }

    let mut comparators = Vec::new();
    let mut pending_operator = String::new();
    for token in alternative
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        // A bare operator ("> 1.0") stays glued to its operand.
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '^' | '~' | '!')) {
            pending_operator.push_str(token);
            continue;
        }
        let token = format!("{}{}", std::mem::take(&mut pending_operator), token);
        if token != ANY_VERSION {
            comparators.push(translate_comparator(&token)?);
        }
    }
    if !pending_operator.is_empty() {
        return Err(format!("operator '{pending_operator}' has no version"));
    }

    if comparators.is_empty() {
        Ok(ANY_VERSION.to_string())
    } else {
        Ok(comparators.join(", "))
    }
}

fn translate_comparator(token: &str) -> Result<String, String> {
    for op in [">=", "<=", "==", ">", "<", "="] {
        if let Some(operand) = token.strip_prefix(op) {
            let op = if op == "==" { "=" } else { op };
            return Ok(format!("{op}{}", normalize_version(operand)));
        }
    }
    if token.starts_with("!=") {
        return Err("'!=' comparisons are not supported".to_string());
    }
    if let Some(operand) = token.strip_prefix('^') {
        return Ok(format!("^{}", strip_v(operand)));
    }
    if let Some(operand) = token.strip_prefix('~') {
        return tilde_range(operand);
    }
    if token.contains('*') || token.ends_with(".x") {
        return Ok(strip_v(token).to_string());
    }

    Ok(format!("={}", normalize_version(token)))
}

/// `~1` and `~1.4` allow the last given component to float up to the next
/// major; `~1.4.2` only up to the next minor.
fn tilde_range(operand: &str) -> Result<String, String> {
    let (parts, suffix) = numeric_parts(operand)?;
    let (lower, upper) = match parts.as_slice() {
        [major] => (format!("{major}.0.0"), format!("{}.0.0", major + 1)),
        [major, minor] => (format!("{major}.{minor}.0"), format!("{}.0.0", major + 1)),
        [major, minor, patch] => (
            format!("{major}.{minor}.{patch}"),
            format!("{major}.{}.0", minor + 1),
        ),
        _ => return Err(format!("'~{operand}' has too many version components")),
    };
    Ok(format!(">={lower}{suffix}, <{upper}"))
}

/// A partial right-hand side of a hyphen range acts as a wildcard.
fn hyphen_upper_bound(high: &str) -> Result<String, String> {
    let (parts, _) = numeric_parts(high)?;
    match parts.as_slice() {
        [major] => Ok(format!("<{}.0.0", major + 1)),
        [major, minor] => Ok(format!("<{major}.{}.0", minor + 1)),
        _ => Ok(format!("<={}", normalize_version(high))),
    }
}

/// Numeric components of a version (fourth `.0` dropped) and any
/// pre-release or build suffix.
fn numeric_parts(version: &str) -> Result<(Vec<u64>, &str), String> {
    let version = strip_v(version.trim());
    let (core, suffix) = match version.find(['-', '+']) {
        Some(idx) => version.split_at(idx),
        None => (version, ""),
    };

    let mut parts = core
        .split('.')
        .map(|part| {
            part.parse::<u64>()
                .map_err(|_| format!("'{version}' is not a numeric version"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if parts.len() == 4 && parts[3] == 0 {
        parts.pop();
    }
    Ok((parts, suffix))
}

fn strip_v(version: &str) -> &str {
    version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version)
}
