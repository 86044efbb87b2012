use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Declared training experience. Ordered from least to most experienced.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl ExperienceLevel {
    pub const ALL: [ExperienceLevel; 3] = [
        ExperienceLevel::Beginner,
        ExperienceLevel::Intermediate,
        ExperienceLevel::Advanced,
    ];

    /// Built-in hold ceiling for this level. The configured policy may
    /// lower it but never raise it.
    pub fn max_safe_hold_time(self) -> Duration {
        match self {
            ExperienceLevel::Beginner => Duration::from_secs(30),
            ExperienceLevel::Intermediate => Duration::from_secs(90),
            ExperienceLevel::Advanced => Duration::from_secs(180),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExperienceLevel::Beginner => "beginner",
            ExperienceLevel::Intermediate => "intermediate",
            ExperienceLevel::Advanced => "advanced",
        }
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperienceLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(ExperienceLevel::Beginner),
            "intermediate" => Ok(ExperienceLevel::Intermediate),
            "advanced" => Ok(ExperienceLevel::Advanced),
            other => Err(ValidationError::InvalidValue {
                field: "experience_level".into(),
                message: format!("unknown level '{other}'"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(ExperienceLevel::Beginner < ExperienceLevel::Intermediate);
        assert!(ExperienceLevel::Intermediate < ExperienceLevel::Advanced);
    }

    #[test]
    fn beginner_ceiling_is_thirty_seconds() {
        assert_eq!(
            ExperienceLevel::Beginner.max_safe_hold_time(),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(
            "Advanced".parse::<ExperienceLevel>().unwrap(),
            ExperienceLevel::Advanced
        );
        assert!("expert".parse::<ExperienceLevel>().is_err());
    }
}
