//! Shared vocabulary for a single emitted diff (spec §3 Inventory Diff).

use std::fmt;
use std::str::FromStr;

/// `low < medium < high < critical`, a genuine total order — derived `Ord`
/// follows declaration order so comparisons and `max()` fall out for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Os,
    Hardware,
    Network,
    Features,
    Other,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Os => "os",
            Category::Hardware => "hardware",
            Category::Network => "network",
            Category::Features => "features",
            Category::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "os" => Ok(Category::Os),
            "hardware" => Ok(Category::Hardware),
            "network" => Ok(Category::Network),
            "features" => Ok(Category::Features),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffType {
    Create,
    Update,
    Delete,
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiffType::Create => "create",
            DiffType::Update => "update",
            DiffType::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DiffType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(DiffType::Create),
            "update" => Ok(DiffType::Update),
            "delete" => Ok(DiffType::Delete),
            other => Err(format!("unknown diff type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_total_order() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        let mut severities = vec![Severity::High, Severity::Low, Severity::Critical, Severity::Medium];
        severities.sort();
        assert_eq!(
            severities,
            vec![Severity::Low, Severity::Medium, Severity::High, Severity::Critical]
        );
    }

    #[test]
    fn test_round_trip_display_and_parse() {
        for s in [Severity::Low, Severity::Medium, Severity::High, Severity::Critical] {
            assert_eq!(s.to_string().parse::<Severity>().unwrap(), s);
        }
        for c in [Category::Os, Category::Hardware, Category::Network, Category::Features, Category::Other] {
            assert_eq!(c.to_string().parse::<Category>().unwrap(), c);
        }
    }

    #[test]
    fn test_invalid_severity_rejected() {
        assert!("urgent".parse::<Severity>().is_err());
    }
}
