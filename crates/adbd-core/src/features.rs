use std::collections::HashSet;

/// The negotiated feature set of a transport.
///
/// `set` replaces the whole set rather than merging into it: calling
/// `set("foo")` then `set("bar,baz")` leaves only `{bar, baz}`.
#[derive(Clone, Debug, Default)]
pub struct FeatureSet {
    features: HashSet<String>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the feature set from a comma-separated list, e.g. the
    /// `features=` value of a parsed banner. Duplicate tokens in the input
    /// collapse naturally via the underlying set.
    pub fn set(&mut self, csv: &str) {
        self.features = csv.split(',').filter(|f| !f.is_empty()).map(str::to_string).collect();
    }

    pub fn has(&self, name: &str) -> bool {
        self.features.contains(name)
    }

    pub fn as_set(&self) -> &HashSet<String> {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
