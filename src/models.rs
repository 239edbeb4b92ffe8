use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Item,
    Property,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Item => "item",
            EntityKind::Property => "property",
        }
    }
}

/// One entity from the dump. Map-valued fields are `None` when the key is
/// absent from the JSON, which is what the missing-data policy checks.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "optional_map")]
    pub labels: Option<BTreeMap<String, LangValue>>,
    #[serde(default, deserialize_with = "optional_map")]
    pub descriptions: Option<BTreeMap<String, LangValue>>,
    #[serde(default, deserialize_with = "optional_map")]
    pub aliases: Option<BTreeMap<String, Vec<LangValue>>>,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default, deserialize_with = "optional_map")]
    pub claims: Option<BTreeMap<String, Vec<Claim>>>,
    #[serde(default, deserialize_with = "optional_map")]
    pub sitelinks: Option<BTreeMap<String, Sitelink>>,
}

impl SourceRecord {
    pub fn from_slice(line: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(line)
    }

    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self.kind.as_str() {
            "item" => Some(EntityKind::Item),
            "property" => Some(EntityKind::Property),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LangValue {
    #[serde(default)]
    pub language: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
    Preferred,
    Normal,
    Deprecated,
}

impl Rank {
    pub fn as_str(self) -> &'static str {
        match self {
            Rank::Preferred => "preferred",
            Rank::Normal => "normal",
            Rank::Deprecated => "deprecated",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Claim {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub claim_type: String,
    pub rank: Rank,
    pub mainsnak: Snak,
    #[serde(default, deserialize_with = "required_map")]
    pub qualifiers: BTreeMap<String, Vec<Snak>>,
}

impl Claim {
    /// Entity ID referenced by the main snak, if it holds one
    pub fn referenced_id(&self) -> Option<&str> {
        self.mainsnak
            .datavalue
            .as_ref()
            .and_then(|dv| dv.value.get("id"))
            .and_then(serde_json::Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnakKind {
    Value,
    SomeValue,
    NoValue,
}

impl SnakKind {
    pub fn parse(snaktype: &str) -> Option<Self> {
        match snaktype {
            "value" => Some(SnakKind::Value),
            "somevalue" => Some(SnakKind::SomeValue),
            "novalue" => Some(SnakKind::NoValue),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SnakKind::Value => "value",
            SnakKind::SomeValue => "somevalue",
            SnakKind::NoValue => "novalue",
        }
    }
}

/// Value-bearing part of a claim or qualifier. `snaktype` stays a string so
/// an unknown kind surfaces as a transform error naming the entity.
#[derive(Debug, Clone, Deserialize)]
pub struct Snak {
    pub snaktype: String,
    #[serde(default)]
    pub property: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub datatype: String,
    #[serde(default)]
    pub datavalue: Option<DataValue>,
}

impl Snak {
    pub fn kind(&self) -> Option<SnakKind> {
        SnakKind::parse(&self.snaktype)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataValue {
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(rename = "type", default)]
    pub value_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sitelink {
    #[serde(default)]
    pub site: String,
    pub title: String,
    #[serde(default)]
    pub badges: Vec<String>,
}

// Wikidata serializes empty maps as `[]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum MapOrList<T> {
    Map(BTreeMap<String, T>),
    List(Vec<IgnoredAny>),
}

fn required_map<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match MapOrList::deserialize(deserializer)? {
        MapOrList::Map(map) => map,
        MapOrList::List(_) => BTreeMap::new(),
    })
}

fn optional_map<'de, D, T>(deserializer: D) -> Result<Option<BTreeMap<String, T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    required_map(deserializer).map(Some)
}
