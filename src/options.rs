//! Parse-time configuration.

/// How a partial's settings combine with the settings of the table it is
/// injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Partial settings only fill keys the table does not define.
    #[default]
    TableWins,
    /// Partial settings replace the table's entries for the same key.
    PartialWins,
}

impl MergePolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "table-wins" | "table" => Some(Self::TableWins),
            "partial-wins" | "partial" => Some(Self::PartialWins),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseOptions {
    pub merge_policy: MergePolicy,
    /// Treat any diagnostic as a failure in [`crate::parser::ParseOutput::into_result`].
    pub strict: bool,
}

impl ParseOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn with_merge_policy(mut self, merge_policy: MergePolicy) -> Self {
        self.merge_policy = merge_policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_policy_from_str() {
        assert_eq!(MergePolicy::from_str("table-wins"), Some(MergePolicy::TableWins));
        assert_eq!(MergePolicy::from_str("Partial_Wins"), Some(MergePolicy::PartialWins));
        assert_eq!(MergePolicy::from_str("merge"), None);
    }

    #[test]
    fn test_defaults() {
        let options = ParseOptions::default();
        assert_eq!(options.merge_policy, MergePolicy::TableWins);
        assert!(!options.strict);
        assert!(ParseOptions::strict().strict);
    }
}
