use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Smallest amount a content item may carry
pub const MIN_CONTENT_AMOUNT: u64 = 1;

/// Largest amount a content item may carry (2^53 - 1, exact in every JSON client)
pub const MAX_CONTENT_AMOUNT: u64 = 9_007_199_254_740_991;

/// Generate a fresh ChangeSet identifier
pub fn generate_change_set_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Kind of catalog subject a ChangeSet targets
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, JsonSchema)]
pub enum SubjectType {
    /// Remote-config node; overrides are a config diff
    #[default]
    #[serde(rename = "entity")]
    Entity,
    /// Offer; overrides are limited to icon, price and content
    #[serde(rename = "offer")]
    Offer,
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectType::Entity => f.write_str("entity"),
            SubjectType::Offer => f.write_str("offer"),
        }
    }
}

/// Overridable fields of an offer subject
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum OfferField {
    #[serde(rename = "icon")]
    Icon,
    #[serde(rename = "price")]
    Price,
    #[serde(rename = "content")]
    Content,
}

impl OfferField {
    pub const ALL: [OfferField; 3] = [OfferField::Icon, OfferField::Price, OfferField::Content];

    /// Override map key for this field
    pub fn key(self) -> &'static str {
        match self {
            OfferField::Icon => "icon",
            OfferField::Price => "price",
            OfferField::Content => "content",
        }
    }

    pub fn parse(key: &str) -> Option<OfferField> {
        OfferField::ALL.into_iter().find(|field| field.key() == key)
    }
}

/// One entity/amount pair of an offer's content list
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct ContentItem {
    #[serde(rename = "entityID")]
    pub entity_id: String,

    pub amount: u64,
}

/// Sparse override map of a ChangeSet
///
/// Key presence means "overridden for the test arm", whatever the value:
/// `null`, `""` and `0` are legal overridden values. An absent key inherits
/// the control value unchanged.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(transparent)]
pub struct Overrides(BTreeMap<String, Value>);

impl Overrides {
    pub fn new() -> Self {
        Overrides(BTreeMap::new())
    }

    pub fn is_overridden(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Overridden value, or None when the key inherits the control value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overridden offer content, if present and well-formed
    pub fn content(&self) -> Option<Vec<ContentItem>> {
        self.0
            .get(OfferField::Content.key())
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub(crate) fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<(String, Value)> for Overrides {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Overrides(iter.into_iter().collect())
    }
}

/// ChangeSet is one "thing under test"
///
/// Names a catalog subject and the fields overridden for the test arm.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct ChangeSet {
    #[serde(default = "generate_change_set_id")]
    pub id: String,

    #[serde(rename = "subjectType", default)]
    pub subject_type: SubjectType,

    /// Reference into the external catalog; empty until chosen
    #[serde(rename = "subjectID", default)]
    pub subject_id: String,

    #[serde(default)]
    pub overrides: Overrides,
}

impl ChangeSet {
    /// Empty ChangeSet targeting an unselected subject of the given type
    pub fn new(subject_type: SubjectType) -> Self {
        ChangeSet {
            id: generate_change_set_id(),
            subject_type,
            subject_id: String::new(),
            overrides: Overrides::new(),
        }
    }
}

impl Default for ChangeSet {
    fn default() -> Self {
        ChangeSet::new(SubjectType::Entity)
    }
}
