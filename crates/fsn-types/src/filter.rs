use serde::{Deserialize, Serialize};

use crate::id::ObjectId;
use crate::object::Header;

/// What a search filter inspects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterKey {
    ObjectId,
    OwnerId,
    ObjectType,
    Parent,
    SplitId,
    /// Matches user-visible objects: regular objects that are not split
    /// children, and virtual parents.
    Root,
    /// Matches objects that are physically stored.
    Physical,
    Attribute(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    StringEqual,
    StringNotEqual,
    NotPresent,
    CommonPrefix,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub key: FilterKey,
    pub op: MatchType,
    pub value: String,
}

/// Facts about a candidate that are not part of its header.
#[derive(Clone, Copy, Debug)]
pub struct Candidate<'a> {
    pub id: &'a ObjectId,
    pub header: &'a Header,
    pub physical: bool,
    pub root: bool,
}

/// Conjunction of [`SearchFilter`]s. An empty set matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters(Vec<SearchFilter>);

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, key: FilterKey, op: MatchType, value: impl Into<String>) -> Self {
        self.0.push(SearchFilter {
            key,
            op,
            value: value.into(),
        });
        self
    }

    pub fn add_root(self) -> Self {
        self.add(FilterKey::Root, MatchType::StringEqual, "")
    }

    pub fn add_physical(self) -> Self {
        self.add(FilterKey::Physical, MatchType::StringEqual, "")
    }

    pub fn add_attribute(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(
            FilterKey::Attribute(key.into()),
            MatchType::StringEqual,
            value,
        )
    }

    pub fn add_parent(self, parent: ObjectId) -> Self {
        self.add(FilterKey::Parent, MatchType::StringEqual, parent.to_hex())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchFilter> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, candidate: &Candidate<'_>) -> bool {
        self.0.iter().all(|f| f.matches(candidate))
    }
}

impl FromIterator<SearchFilter> for SearchFilters {
    fn from_iter<T: IntoIterator<Item = SearchFilter>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl SearchFilter {
    pub fn matches(&self, c: &Candidate<'_>) -> bool {
        let value = match &self.key {
            FilterKey::Root => return c.root,
            FilterKey::Physical => return c.physical,
            FilterKey::ObjectId => Some(c.id.to_hex()),
            FilterKey::OwnerId => Some(c.header.owner_id.to_hex()),
            FilterKey::ObjectType => Some(c.header.object_type.as_str().to_string()),
            FilterKey::Parent => c.header.parent().map(|p| p.to_hex()),
            FilterKey::SplitId => c.header.split_id().map(|s| s.to_string()),
            FilterKey::Attribute(key) => c.header.attribute(key).map(str::to_string),
        };
        match (self.op, value) {
            (MatchType::NotPresent, v) => v.is_none(),
            (_, None) => false,
            (MatchType::StringEqual, Some(v)) => v == self.value,
            (MatchType::StringNotEqual, Some(v)) => v != self.value,
            (MatchType::CommonPrefix, Some(v)) => v.starts_with(&self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{ContainerId, OwnerId};
    use crate::object::ObjectType;

    fn header() -> Header {
        Header::new(ContainerId::from_hash([1; 32]), OwnerId::from_hash([2; 32]))
            .with_attribute("FileName", "report.pdf")
    }

    fn check(filters: &SearchFilters, header: &Header, physical: bool, root: bool) -> bool {
        let id = ObjectId::from_hash([3; 32]);
        filters.matches(&Candidate {
            id: &id,
            header,
            physical,
            root,
        })
    }

    #[test]
    fn empty_filters_match_everything() {
        assert!(check(&SearchFilters::new(), &header(), true, true));
    }

    #[test]
    fn attribute_operations() {
        let h = header();
        assert!(check(&SearchFilters::new().add_attribute("FileName", "report.pdf"), &h, true, true));
        assert!(!check(&SearchFilters::new().add_attribute("FileName", "other"), &h, true, true));
        let prefix = SearchFilters::new().add(
            FilterKey::Attribute("FileName".into()),
            MatchType::CommonPrefix,
            "rep",
        );
        assert!(check(&prefix, &h, true, true));
        let absent = SearchFilters::new().add(
            FilterKey::Attribute("Missing".into()),
            MatchType::NotPresent,
            "",
        );
        assert!(check(&absent, &h, true, true));
        let not_equal = SearchFilters::new().add(
            FilterKey::Attribute("Missing".into()),
            MatchType::StringNotEqual,
            "x",
        );
        assert!(!check(&not_equal, &h, true, true));
    }

    #[test]
    fn root_and_physical_flags() {
        let h = header();
        let root = SearchFilters::new().add_root();
        assert!(check(&root, &h, false, true));
        assert!(!check(&root, &h, true, false));
        let phy = SearchFilters::new().add_physical();
        assert!(check(&phy, &h, true, false));
        assert!(!check(&phy, &h, false, true));
    }

    #[test]
    fn object_type_and_owner() {
        let h = header().with_type(ObjectType::Tombstone);
        let f = SearchFilters::new()
            .add(FilterKey::ObjectType, MatchType::StringEqual, "TOMBSTONE")
            .add(FilterKey::OwnerId, MatchType::StringEqual, OwnerId::from_hash([2; 32]).to_hex());
        assert!(check(&f, &h, true, true));
    }

    #[test]
    fn conjunction_requires_all() {
        let f = SearchFilters::new()
            .add_attribute("FileName", "report.pdf")
            .add_physical();
        assert!(!check(&f, &header(), false, true));
    }
}
