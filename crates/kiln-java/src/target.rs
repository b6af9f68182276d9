/// Build target identifiers
use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Flavor appended to a library target to name its ABI jar rule
pub const CLASS_ABI_FLAVOR: &str = "class-abi";

/// A fully qualified build target, e.g. `//java/com/example:lib#class-abi`
///
/// Ordering is lexicographic over base path, short name and flavors. This is
/// the natural order used everywhere a deterministic rule order is required.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildTarget {
    /// Directory of the build file, relative to the project root
    pub base_path: String,
    /// Target name within the build file
    pub short_name: String,
    /// Flavors distinguishing derived rules of the same target
    pub flavors: BTreeSet<String>,
}

impl BuildTarget {
    /// Create an unflavored target
    pub fn new(base_path: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            short_name: short_name.into(),
            flavors: BTreeSet::new(),
        }
    }

    /// Parse `//base/path:name` with optional `#flavor,flavor` suffix
    pub fn parse(s: &str) -> BuildResult<Self> {
        let rest = s
            .strip_prefix("//")
            .ok_or_else(|| BuildError::InvalidTarget(s.to_string()))?;
        let (base_path, name_and_flavors) = rest
            .split_once(':')
            .ok_or_else(|| BuildError::InvalidTarget(s.to_string()))?;

        let (short_name, flavors) = match name_and_flavors.split_once('#') {
            Some((name, flavors)) => (
                name,
                flavors
                    .split(',')
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            None => (name_and_flavors, BTreeSet::new()),
        };

        let target = Self {
            base_path: base_path.to_string(),
            short_name: short_name.to_string(),
            flavors,
        };
        target.validate()?;
        Ok(target)
    }

    /// Add a flavor
    pub fn with_flavor(mut self, flavor: impl Into<String>) -> Self {
        self.flavors.insert(flavor.into());
        self
    }

    /// The target of the ABI jar rule derived from this one
    pub fn abi_target(&self) -> Self {
        self.clone().with_flavor(CLASS_ABI_FLAVOR)
    }

    /// Whether the target carries the given flavor
    pub fn has_flavor(&self, flavor: &str) -> bool {
        self.flavors.contains(flavor)
    }

    /// Short name followed by `#flavors` when flavored
    pub fn short_name_and_flavor_postfix(&self) -> String {
        if self.flavors.is_empty() {
            self.short_name.clone()
        } else {
            let flavors: Vec<&str> = self.flavors.iter().map(String::as_str).collect();
            format!("{}#{}", self.short_name, flavors.join(","))
        }
    }

    /// Validate the target
    pub fn validate(&self) -> BuildResult<()> {
        let valid_name = !matches!(self.short_name.as_str(), "" | "." | "..")
            && self
                .short_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "_-.=+,".contains(c));
        // Every derived output path nests the base path under buck-out, so
        // segments must stay inside it.
        let valid_base = self.base_path.is_empty()
            || self.base_path.split('/').all(|segment| {
                !matches!(segment, "" | "." | "..") && !segment.contains('\\')
            });
        let valid_flavors = self.flavors.iter().all(|flavor| {
            !flavor.is_empty()
                && flavor
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "_-.=+".contains(c))
        });
        if !valid_name || !valid_base || !valid_flavors {
            return Err(BuildError::InvalidTarget(self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "//{}:{}", self.base_path, self.short_name_and_flavor_postfix())
    }
}
