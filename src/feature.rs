use std::{cmp::Ordering, collections::BTreeSet, fmt, hash::Hash, sync::Arc};

/// A named, independently-introspectable capability of a remote object.
///
/// Features are cheap to clone and freely shareable. Two features are
/// considered equal when their ids match; the `critical` flag is not part
/// of identity. A critical feature is one whose introspection failure
/// invalidates the whole readiness engine rather than being absorbed as a
/// benign "not applicable" outcome.
#[derive(Debug, Clone)]
pub struct Feature {
    id: Arc<str>,
    critical: bool,
}

impl Feature {
    /// Create a non-critical feature with the given id.
    pub fn new<I>(id: I) -> Self
    where
        I: Into<Arc<str>>,
    {
        Self {
            id: id.into(),
            critical: false,
        }
    }

    /// Create a critical feature with the given id.
    pub fn critical<I>(id: I) -> Self
    where
        I: Into<Arc<str>>,
    {
        Self {
            id: id.into(),
            critical: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn clone_id(&self) -> Arc<str> {
        self.id.clone()
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }
}

impl PartialEq for Feature {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Feature {}

impl PartialOrd for Feature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Feature {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for Feature {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl From<&str> for Feature {
    fn from(id: &str) -> Self {
        Feature::new(id)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// An unordered, duplicate-free collection of [`Feature`]s.
///
/// Iteration is deterministic (sorted by feature id). Used both by callers
/// requesting readiness and by descriptors declaring dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    features: BTreeSet<Feature>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a feature. Returns `false` if a feature with the same id was
    /// already present.
    pub fn insert(&mut self, feature: Feature) -> bool {
        self.features.insert(feature)
    }

    pub fn contains(&self, feature: &Feature) -> bool {
        self.features.contains(feature)
    }

    /// Lookup by id without constructing a `Feature`.
    pub fn contains_id(&self, id: &str) -> bool {
        self.features.iter().any(|f| f.id() == id)
    }

    /// A new set holding every feature from `self` and `other`.
    pub fn union(&self, other: &FeatureSet) -> FeatureSet {
        let mut result = self.clone();
        result.extend(other.iter().cloned());
        result
    }

    pub fn is_subset_of(&self, other: &FeatureSet) -> bool {
        self.features.is_subset(&other.features)
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

impl Extend<Feature> for FeatureSet {
    fn extend<I: IntoIterator<Item = Feature>>(&mut self, iter: I) {
        self.features.extend(iter);
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FeatureSet {
    type Item = Feature;
    type IntoIter = std::collections::btree_set::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

impl<'a> IntoIterator for &'a FeatureSet {
    type Item = &'a Feature;
    type IntoIter = std::collections::btree_set::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

impl From<Feature> for FeatureSet {
    fn from(feature: Feature) -> Self {
        FeatureSet::from_iter([feature])
    }
}

impl<const N: usize> From<[Feature; N]> for FeatureSet {
    fn from(features: [Feature; N]) -> Self {
        FeatureSet::from_iter(features)
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, feature) in self.features.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{feature}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_critical_flag() {
        assert_eq!(Feature::new("core"), Feature::critical("core"));
        assert_ne!(Feature::new("core"), Feature::new("avatar"));
    }

    #[test]
    fn set_deduplicates_by_id() {
        let mut set = FeatureSet::new();
        assert!(set.insert(Feature::new("core")));
        assert!(!set.insert(Feature::critical("core")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn union_and_subset() {
        let small = FeatureSet::from([Feature::new("a")]);
        let big = small.union(&FeatureSet::from([Feature::new("b")]));
        assert!(small.is_subset_of(&big));
        assert!(!big.is_subset_of(&small));
        assert_eq!(big.len(), 2);
        assert!(big.contains_id("a"));
        assert!(big.contains_id("b"));
    }

    #[test]
    fn display_is_sorted_by_id() {
        let set = FeatureSet::from([Feature::new("b"), Feature::new("a")]);
        assert_eq!(set.to_string(), "{a, b}");
    }
}
