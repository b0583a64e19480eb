//! Engine configuration.

/// Configuration for an [`EntityStore`](crate::EntityStore) and the sessions built on it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether audit entries carry a structural diff.
    pub track_entity_diff: bool,

    /// Whether `set_field` type-checks values immediately.
    ///
    /// Validation always runs again when a new entity version is built.
    pub validate_on_set: bool,

    /// Maximum number of dependency-driven passes a single commit may take.
    pub max_commit_passes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            track_entity_diff: true,
            validate_on_set: true,
            max_commit_passes: 16,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether audit entries carry a diff.
    #[must_use]
    pub const fn track_entity_diff(mut self, value: bool) -> Self {
        self.track_entity_diff = value;
        self
    }

    /// Sets whether field writes are validated eagerly.
    #[must_use]
    pub const fn validate_on_set(mut self, value: bool) -> Self {
        self.validate_on_set = value;
        self
    }

    /// Sets the commit pass limit.
    #[must_use]
    pub const fn max_commit_passes(mut self, passes: usize) -> Self {
        self.max_commit_passes = passes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert!(config.track_entity_diff);
        assert!(config.validate_on_set);
        assert_eq!(config.max_commit_passes, 16);
    }

    #[test]
    fn builder_pattern() {
        let config = EngineConfig::new()
            .track_entity_diff(false)
            .validate_on_set(false)
            .max_commit_passes(2);

        assert!(!config.track_entity_diff);
        assert!(!config.validate_on_set);
        assert_eq!(config.max_commit_passes, 2);
    }
}
