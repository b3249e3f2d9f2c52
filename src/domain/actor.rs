use std::fmt;

/// Who performed a mutation, for audit attribution.
///
/// Every mutating repository call takes an `Actor` so that automated writes
/// (migrations, schedulers, CLI maintenance) are attributed to the reserved
/// `System` variant instead of an ambient lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    System,
    User(String),
}

impl Actor {
    #[must_use]
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    /// The identifier stored in `created_by`/`updated_by`/`action_by` columns.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::User(id) => id,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_actor_uses_reserved_name() {
        assert_eq!(Actor::System.as_str(), "system");
        assert_eq!(Actor::user("EMP2025A001").as_str(), "EMP2025A001");
    }
}
