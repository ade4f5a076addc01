use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a web object.
///
/// Persisted ids are non-negative; id `0` names the root category (the
/// category of categories). Negative values are *provisional* ids handed to
/// newborn objects so that cross-references among them can be expressed
/// before the store assigns real ids. A provisional id never reaches the
/// store: `insert_many` remaps them right before the commit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ObjectId(pub i64);

impl ObjectId {
    /// The root category: the category that describes categories.
    pub const ROOT_CATEGORY: ObjectId = ObjectId(0);

    pub fn is_provisional(self) -> bool {
        self.0 < 0
    }

    pub fn is_persistent(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ObjectId {
    fn from(raw: i64) -> Self {
        ObjectId(raw)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(ObjectId)
    }
}
