use std::fmt;

use serde::{Deserialize, Serialize};

use super::revision::{Revision, RevisionId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Upgrade,
    Downgrade,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upgrade => "upgrade",
            Self::Downgrade => "downgrade",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "upgrade" => Some(Self::Upgrade),
            "downgrade" => Some(Self::Downgrade),
            _ => None,
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            Self::Upgrade => Self::Downgrade,
            Self::Downgrade => Self::Upgrade,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a plan should leave the marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Last revision in the chain.
    Head,
    /// Nothing applied.
    Base,
    /// First revision in the chain.
    Root,
    /// Steps relative to the current marker.
    Relative(i64),
    /// Exact id or unique id prefix.
    Revision(String),
}

impl Target {
    pub fn parse(s: &str) -> Self {
        match s {
            "head" | "heads" => Self::Head,
            "base" | "none" => Self::Base,
            "root" => Self::Root,
            _ => {
                let relative = match s.strip_prefix(['+', '-']) {
                    Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
                        s.parse::<i64>().ok()
                    }
                    _ => None,
                };
                match relative {
                    Some(n) => Self::Relative(n),
                    None => Self::Revision(s.to_string()),
                }
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => f.write_str("head"),
            Self::Base => f.write_str("base"),
            Self::Root => f.write_str("root"),
            Self::Relative(n) => write!(f, "{:+}", n),
            Self::Revision(id) => f.write_str(id),
        }
    }
}

/// Ordered revisions that move the marker from `from` to `to`.
///
/// Steps of a downgrade plan are already in reverse chain order.
/// An empty plan carries `Direction::Upgrade`; its direction is never acted on.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub direction: Direction,
    pub from: Option<RevisionId>,
    pub to: Option<RevisionId>,
    pub steps: Vec<Revision>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_ids(&self) -> Vec<RevisionId> {
        self.steps.iter().map(|r| r.id.clone()).collect()
    }

    /// Refuse a plan that moves the other way than the caller asked for.
    pub fn ensure_direction(&self, requested: Direction) -> Result<(), crate::ChainError> {
        if self.is_empty() || self.direction == requested {
            Ok(())
        } else {
            Err(crate::ChainError::WrongDirection {
                requested,
                target: self
                    .to
                    .as_ref()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "base".to_string()),
            })
        }
    }
}
