use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;
use crate::id::ObjectId;

/// Random identifier shared by every child of one split chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SplitId(Uuid);

impl SplitId {
    /// Generate a fresh random split id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SplitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SplitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SplitId({})", self.0)
    }
}

impl fmt::Display for SplitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SplitId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidSplitId(e.to_string()))
    }
}

/// What is known about the chain behind a virtual (split) object.
///
/// Different shards or peers may each know only part of the picture: one
/// holds the last child, another holds the linking object. Partial infos are
/// combined with [`SplitInfo::merge`], which only ever fills in fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitInfo {
    pub split_id: Option<SplitId>,
    /// Tail child of the chain; walk `Split.Previous` from here.
    pub last_part: Option<ObjectId>,
    /// Linking object listing every child in order.
    pub link: Option<ObjectId>,
}

impl SplitInfo {
    pub fn with_last_part(split_id: Option<SplitId>, last_part: ObjectId) -> Self {
        Self {
            split_id,
            last_part: Some(last_part),
            link: None,
        }
    }

    pub fn with_link(split_id: Option<SplitId>, link: ObjectId) -> Self {
        Self {
            split_id,
            last_part: None,
            link: Some(link),
        }
    }

    /// A split info is usable once at least one way into the chain is known.
    pub fn is_well_formed(&self) -> bool {
        self.last_part.is_some() || self.link.is_some()
    }

    /// Both entry points are known; nothing more can be learned from peers.
    pub fn is_complete(&self) -> bool {
        self.last_part.is_some() && self.link.is_some()
    }

    /// Fill every unknown field from `other`. Known fields are never replaced.
    pub fn merge(&mut self, other: &SplitInfo) {
        if self.split_id.is_none() {
            self.split_id = other.split_id;
        }
        if self.last_part.is_none() {
            self.last_part = other.last_part;
        }
        if self.link.is_none() {
            self.link = other.link;
        }
    }

    /// By-value form of [`SplitInfo::merge`].
    pub fn merged(mut self, other: &SplitInfo) -> Self {
        self.merge(other);
        self
    }
}

/// Accumulator for partial split infos collected while visiting several
/// sources. Remembers whether anything was collected at all.
#[derive(Clone, Debug, Default)]
pub struct SplitInfoCollector {
    info: Option<SplitInfo>,
}

impl SplitInfoCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `info` in and report whether the result is complete.
    pub fn add(&mut self, info: &SplitInfo) -> bool {
        match &mut self.info {
            Some(acc) => acc.merge(info),
            None => self.info = Some(info.clone()),
        }
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.info.as_ref().is_some_and(SplitInfo::is_complete)
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_none()
    }

    pub fn into_inner(self) -> Option<SplitInfo> {
        self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn oid(b: u8) -> ObjectId {
        ObjectId::from_hash([b; 32])
    }

    #[test]
    fn merge_combines_link_and_last_part() {
        let mut a = SplitInfo::with_last_part(None, oid(1));
        let b = SplitInfo::with_link(None, oid(2));
        a.merge(&b);
        assert_eq!(a.last_part, Some(oid(1)));
        assert_eq!(a.link, Some(oid(2)));
        assert!(a.is_complete());
    }

    #[test]
    fn merge_never_overwrites_known_fields() {
        let sid = SplitId::new();
        let mut a = SplitInfo {
            split_id: Some(sid),
            last_part: Some(oid(1)),
            link: None,
        };
        let b = SplitInfo {
            split_id: Some(SplitId::new()),
            last_part: Some(oid(9)),
            link: None,
        };
        a.merge(&b);
        assert_eq!(a.split_id, Some(sid));
        assert_eq!(a.last_part, Some(oid(1)));
    }

    #[test]
    fn merge_with_self_is_noop() {
        let a = SplitInfo::with_link(Some(SplitId::new()), oid(3));
        assert_eq!(a.clone().merged(&a), a);
    }

    #[test]
    fn well_formed_requires_an_entry_point() {
        assert!(!SplitInfo::default().is_well_formed());
        assert!(SplitInfo::with_link(None, oid(1)).is_well_formed());
        assert!(SplitInfo::with_last_part(None, oid(1)).is_well_formed());
    }

    #[test]
    fn collector_tracks_completeness() {
        let mut c = SplitInfoCollector::new();
        assert!(c.is_empty());
        assert!(!c.add(&SplitInfo::with_last_part(None, oid(1))));
        assert!(!c.is_empty());
        assert!(c.add(&SplitInfo::with_link(None, oid(2))));
        let info = c.into_inner().unwrap();
        assert_eq!(info.last_part, Some(oid(1)));
        assert_eq!(info.link, Some(oid(2)));
    }

    #[test]
    fn split_id_text_roundtrip() {
        let id = SplitId::new();
        let parsed: SplitId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<SplitId>().is_err());
    }

    fn arb_info() -> impl Strategy<Value = SplitInfo> {
        (
            proptest::option::of(any::<u8>()),
            proptest::option::of(any::<u8>()),
        )
            .prop_map(|(last, link)| SplitInfo {
                split_id: None,
                last_part: last.map(oid),
                link: link.map(oid),
            })
    }

    proptest! {
        #[test]
        fn merge_is_monotonic(a in arb_info(), b in arb_info()) {
            let merged = a.clone().merged(&b);
            if a.last_part.is_some() {
                prop_assert_eq!(merged.last_part, a.last_part);
            }
            if a.link.is_some() {
                prop_assert_eq!(merged.link, a.link);
            }
            prop_assert!(merged.last_part.is_some() == (a.last_part.is_some() || b.last_part.is_some()));
            prop_assert!(merged.link.is_some() == (a.link.is_some() || b.link.is_some()));
        }

        #[test]
        fn merge_is_idempotent(a in arb_info(), b in arb_info()) {
            let once = a.clone().merged(&b);
            let twice = once.clone().merged(&b);
            prop_assert_eq!(once, twice);
        }
    }
}
