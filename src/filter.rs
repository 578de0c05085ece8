use regex::Regex;

/// Decides which namespaces are left out of a scan
///
/// Built once at startup; an invalid pattern is a configuration error.
#[derive(Debug, Clone, Default)]
pub struct NamespaceFilter {
    pattern: Option<Regex>,
}

impl NamespaceFilter {
    /// Compile `pattern`, an empty pattern disables filtering
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regular expression
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        if pattern.is_empty() {
            return Ok(Self::default());
        }

        Ok(Self {
            pattern: Some(Regex::new(pattern)?),
        })
    }

    /// True if `pattern` matches anywhere in `namespace`
    #[must_use]
    pub fn should_skip(&self, namespace: &str) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(namespace))
    }

    #[must_use]
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(Regex::as_str)
    }
}
