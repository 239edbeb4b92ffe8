//! Output relations, their fixed column lists, and the row types that feed them.

use crate::config::{
    ADDL_SITELINK_LABEL, ALIAS_LABEL, DATATYPE_LABEL, DESCRIPTION_LABEL, LABEL_LABEL,
    SITELINK_BADGE_LABEL, SITELINK_LABEL, SITELINK_LANGUAGE_LABEL, SITELINK_SITE_LABEL,
    SITELINK_TITLE_LABEL, TYPE_LABEL,
};
use crate::encode::EncodedValue;

const NODE_COLUMNS: &[&str] = &["id", "label", "type", "description", "alias", "datatype"];
const NODE_ID_COLUMNS: &[&str] = &["id"];

const EXPLODED_EDGE_COLUMNS: &[&str] = &[
    "id",
    "node1",
    "label",
    "node2",
    "rank",
    "node2;magnitude",
    "node2;unit",
    "node2;date",
    "node2;item",
    "node2;lower",
    "node2;upper",
    "node2;latitude",
    "node2;longitude",
    "node2;precision",
    "node2;calendar",
    "node2;entity-type",
    "node2;wikidatatype",
    "claim_id",
    "lang",
];

const EXPLODED_QUAL_COLUMNS: &[&str] = &[
    "id",
    "node1",
    "label",
    "node2",
    "node2;magnitude",
    "node2;unit",
    "node2;date",
    "node2;item",
    "node2;lower",
    "node2;upper",
    "node2;latitude",
    "node2;longitude",
    "node2;precision",
    "node2;calendar",
    "node2;entity-type",
    "node2;wikidatatype",
];

const COMPACT_EDGE_COLUMNS: &[&str] = &[
    "id",
    "node1",
    "label",
    "node2",
    "rank",
    "node2;wikidatatype",
    "claim_id",
    "val_type",
    "entity_type",
    "datahash",
    "precision",
    "calendar",
    "lang",
];

const COMPACT_QUAL_COLUMNS: &[&str] = &[
    "id",
    "node1",
    "label",
    "node2",
    "node2;wikidatatype",
    "val_type",
    "entity_type",
    "datahash",
    "precision",
    "calendar",
];

const MINIMAL_EDGE_COLUMNS: &[&str] = &["id", "node1", "label", "node2", "rank", "node2;wikidatatype"];
const MINIMAL_QUAL_COLUMNS: &[&str] = &["id", "node1", "label", "node2", "node2;wikidatatype"];
const LANG_SPLIT_COLUMNS: &[&str] = &["id", "node1", "label", "node2", "lang"];
const PLAIN_SPLIT_COLUMNS: &[&str] = &["id", "node1", "label", "node2"];

/// Column-list switches fixed for the whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub explode_values: bool,
    pub node_id_only: bool,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            explode_values: true,
            node_id_only: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Relation {
    Node,
    DetailedEdge,
    MinimalEdge,
    DetailedQualifier,
    MinimalQualifier,
    Alias,
    EnAlias,
    Datatype,
    Description,
    EnDescription,
    Label,
    EnLabel,
    Sitelink,
    EnSitelink,
    EntityType,
    PropertyEdge,
    PropertyQualifier,
}

impl Relation {
    pub fn name(self) -> &'static str {
        match self {
            Relation::Node => "node",
            Relation::DetailedEdge => "detailed edge",
            Relation::MinimalEdge => "minimal edge",
            Relation::DetailedQualifier => "detailed qualifier",
            Relation::MinimalQualifier => "minimal qualifier",
            Relation::Alias => "alias",
            Relation::EnAlias => "English alias",
            Relation::Datatype => "datatype",
            Relation::Description => "description",
            Relation::EnDescription => "English description",
            Relation::Label => "label",
            Relation::EnLabel => "English label",
            Relation::Sitelink => "sitelink",
            Relation::EnSitelink => "English sitelink",
            Relation::EntityType => "entity type",
            Relation::PropertyEdge => "property edge",
            Relation::PropertyQualifier => "property qualifier",
        }
    }

    pub fn columns(self, layout: ColumnLayout) -> &'static [&'static str] {
        match self {
            Relation::Node if layout.node_id_only => NODE_ID_COLUMNS,
            Relation::Node => NODE_COLUMNS,
            Relation::DetailedEdge if layout.explode_values => EXPLODED_EDGE_COLUMNS,
            Relation::DetailedEdge => COMPACT_EDGE_COLUMNS,
            Relation::DetailedQualifier if layout.explode_values => EXPLODED_QUAL_COLUMNS,
            Relation::DetailedQualifier => COMPACT_QUAL_COLUMNS,
            Relation::MinimalEdge | Relation::PropertyEdge => MINIMAL_EDGE_COLUMNS,
            Relation::MinimalQualifier | Relation::PropertyQualifier => MINIMAL_QUAL_COLUMNS,
            Relation::Alias | Relation::Description | Relation::Label | Relation::Sitelink => {
                LANG_SPLIT_COLUMNS
            }
            Relation::EnAlias
            | Relation::EnDescription
            | Relation::EnLabel
            | Relation::EnSitelink
            | Relation::Datatype
            | Relation::EntityType => PLAIN_SPLIT_COLUMNS,
        }
    }

    /// The transformer stream whose rows this relation is built from
    pub fn stream(self) -> Stream {
        match self {
            Relation::Node => Stream::Node,
            Relation::Description | Relation::EnDescription => Stream::Description,
            Relation::Sitelink | Relation::EnSitelink => Stream::Sitelink,
            Relation::DetailedQualifier
            | Relation::MinimalQualifier
            | Relation::PropertyQualifier => Stream::Qualifier,
            _ => Stream::Edge,
        }
    }
}

/// Logical row streams produced by the record transformer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stream {
    Node,
    Edge,
    Qualifier,
    Description,
    Sitelink,
}

impl Stream {
    pub const ALL: [Stream; 5] = [
        Stream::Node,
        Stream::Edge,
        Stream::Qualifier,
        Stream::Description,
        Stream::Sitelink,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stream::Node => "node",
            Stream::Edge => "edge",
            Stream::Qualifier => "qualifier",
            Stream::Description => "description",
            Stream::Sitelink => "sitelink",
        }
    }
}

/// Semantic class of an edge label, used to route edge rows to split files.
/// `Claim` covers every property label and anything else without a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeLabelKind {
    Alias,
    Datatype,
    Description,
    Label,
    Sitelink,
    EntityType,
    Claim,
}

impl EdgeLabelKind {
    pub fn classify(label: &str) -> Self {
        match label {
            ALIAS_LABEL => EdgeLabelKind::Alias,
            DATATYPE_LABEL => EdgeLabelKind::Datatype,
            DESCRIPTION_LABEL => EdgeLabelKind::Description,
            LABEL_LABEL => EdgeLabelKind::Label,
            TYPE_LABEL => EdgeLabelKind::EntityType,
            SITELINK_LABEL
            | ADDL_SITELINK_LABEL
            | SITELINK_BADGE_LABEL
            | SITELINK_LANGUAGE_LABEL
            | SITELINK_SITE_LABEL
            | SITELINK_TITLE_LABEL => EdgeLabelKind::Sitelink,
            _ => EdgeLabelKind::Claim,
        }
    }

    /// Split relations for this label: (all-language, English-only)
    pub fn split_relations(self) -> Option<(Relation, Option<Relation>)> {
        match self {
            EdgeLabelKind::Alias => Some((Relation::Alias, Some(Relation::EnAlias))),
            EdgeLabelKind::Description => {
                Some((Relation::Description, Some(Relation::EnDescription)))
            }
            EdgeLabelKind::Label => Some((Relation::Label, Some(Relation::EnLabel))),
            EdgeLabelKind::Sitelink => Some((Relation::Sitelink, Some(Relation::EnSitelink))),
            EdgeLabelKind::Datatype => Some((Relation::Datatype, None)),
            EdgeLabelKind::EntityType => Some((Relation::EntityType, None)),
            EdgeLabelKind::Claim => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRow {
    pub id: String,
    pub label: String,
    pub kind: String,
    pub description: String,
    pub alias: String,
    pub datatype: String,
}

impl NodeRow {
    pub fn fields(&self, layout: ColumnLayout) -> Vec<&str> {
        if layout.node_id_only {
            return vec![&self.id];
        }
        vec![
            &self.id,
            &self.label,
            &self.kind,
            &self.description,
            &self.alias,
            &self.datatype,
        ]
    }
}

/// One edge. Claim edges carry the full encoded value; label, alias and
/// sitelink edges only use `node2` and `lang`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeRow {
    pub id: String,
    pub node1: String,
    pub label: String,
    pub node2: String,
    pub rank: String,
    pub value: EncodedValue,
    pub wikidatatype: String,
    pub claim_id: String,
    pub datahash: String,
    pub lang: String,
}

impl EdgeRow {
    pub fn simple(id: String, node1: &str, label: &str, node2: String, lang: &str) -> Self {
        Self {
            id,
            node1: node1.to_string(),
            label: label.to_string(),
            node2,
            lang: lang.to_string(),
            ..Self::default()
        }
    }

    pub fn detailed_fields(&self, layout: ColumnLayout) -> Vec<&str> {
        let v = &self.value;
        if layout.explode_values {
            vec![
                &self.id,
                &self.node1,
                &self.label,
                &self.node2,
                &self.rank,
                opt(&v.magnitude),
                opt(&v.unit),
                opt(&v.date),
                opt(&v.item),
                opt(&v.lower_bound),
                opt(&v.upper_bound),
                opt(&v.latitude),
                opt(&v.longitude),
                opt(&v.precision),
                opt(&v.calendar),
                opt(&v.entity_type),
                &self.wikidatatype,
                &self.claim_id,
                &self.lang,
            ]
        } else {
            vec![
                &self.id,
                &self.node1,
                &self.label,
                &self.node2,
                &self.rank,
                &self.wikidatatype,
                &self.claim_id,
                &v.value_type,
                opt(&v.entity_type),
                &self.datahash,
                opt(&v.precision),
                opt(&v.calendar),
                &self.lang,
            ]
        }
    }

    pub fn minimal_fields(&self) -> Vec<&str> {
        vec![
            &self.id,
            &self.node1,
            &self.label,
            &self.node2,
            &self.rank,
            &self.wikidatatype,
        ]
    }

    pub fn split_fields(&self, with_lang: bool) -> Vec<&str> {
        let mut fields = vec![
            self.id.as_str(),
            self.node1.as_str(),
            self.label.as_str(),
            self.node2.as_str(),
        ];
        if with_lang {
            fields.push(&self.lang);
        }
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualRow {
    pub id: String,
    pub node1: String,
    pub label: String,
    pub node2: String,
    pub value: EncodedValue,
    pub wikidatatype: String,
    pub datahash: String,
}

impl QualRow {
    pub fn detailed_fields(&self, layout: ColumnLayout) -> Vec<&str> {
        let v = &self.value;
        if layout.explode_values {
            vec![
                &self.id,
                &self.node1,
                &self.label,
                &self.node2,
                opt(&v.magnitude),
                opt(&v.unit),
                opt(&v.date),
                opt(&v.item),
                opt(&v.lower_bound),
                opt(&v.upper_bound),
                opt(&v.latitude),
                opt(&v.longitude),
                opt(&v.precision),
                opt(&v.calendar),
                opt(&v.entity_type),
                &self.wikidatatype,
            ]
        } else {
            vec![
                &self.id,
                &self.node1,
                &self.label,
                &self.node2,
                &self.wikidatatype,
                &v.value_type,
                opt(&v.entity_type),
                &self.datahash,
                opt(&v.precision),
                opt(&v.calendar),
            ]
        }
    }

    pub fn minimal_fields(&self) -> Vec<&str> {
        vec![
            &self.id,
            &self.node1,
            &self.label,
            &self.node2,
            &self.wikidatatype,
        ]
    }
}

impl From<&QualRow> for EdgeRow {
    fn from(qual: &QualRow) -> Self {
        EdgeRow {
            id: qual.id.clone(),
            node1: qual.node1.clone(),
            label: qual.label.clone(),
            node2: qual.node2.clone(),
            value: qual.value.clone(),
            wikidatatype: qual.wikidatatype.clone(),
            datahash: qual.datahash.clone(),
            ..EdgeRow::default()
        }
    }
}

fn opt(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or("")
}
