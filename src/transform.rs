//! Per-record transformation: one decoded entity in, rows for every stream out.

use crate::config::{
    EdgeToggles, ImportOptions, LanguageSelection, MissingDataPolicy, ParseToggles,
    ADDL_SITELINK_LABEL, ALIAS_LABEL, DATATYPE_LABEL, DESCRIPTION_LABEL, EXCLUDED_CLASSES,
    INSTANCE_OF, LABEL_LABEL, NON_WIKIPEDIA_SITES, SITELINK_BADGE_LABEL, SITELINK_LABEL,
    SITELINK_LANGUAGE_LABEL, SITELINK_SITE_LABEL, SITELINK_TITLE_LABEL, SUBCLASS_OF, TYPE_LABEL,
};
use crate::encode::{encode_snak, stringify, stringify_lang};
use crate::error::ImportError;
use crate::ids::IdentifierMinter;
use crate::models::{Claim, Rank, Sitelink, Snak, SnakKind, SourceRecord};
use crate::relations::{EdgeRow, NodeRow, QualRow, Relation};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use tracing::warn;

const STATEMENT: &str = "statement";

/// Rows produced for one or more records, grouped by stream.
///
/// Workers reuse one `RecordOutput` as their batch, so the counters
/// accumulate across every record transformed into it.
#[derive(Debug, Default)]
pub struct RecordOutput {
    pub nodes: Vec<NodeRow>,
    pub edges: Vec<EdgeRow>,
    pub qualifiers: Vec<QualRow>,
    pub descriptions: Vec<EdgeRow>,
    pub sitelinks: Vec<EdgeRow>,
    pub filtered: u64,
    pub skipped: u64,
    pub missing_fields: u64,
    pub unexpected_claim_types: u64,
}

impl RecordOutput {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.edges.is_empty()
            && self.qualifiers.is_empty()
            && self.descriptions.is_empty()
            && self.sitelinks.is_empty()
    }
}

/// Primary Wikipedia link or an additional wiki link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteTarget {
    pub label: &'static str,
    pub lang: String,
    pub url: String,
}

/// Builds the link label, language and canonical URL for one sitelink key.
pub fn classify_sitelink(key: &str, title: &str) -> SiteTarget {
    let title = title.split_whitespace().collect::<Vec<_>>().join("_");
    let before_wiki = key.find("wiki").map(|i| &key[..i]);

    if key.ends_with("wiki") && !NON_WIKIPEDIA_SITES.contains(&key) {
        let lang = before_wiki.unwrap_or_default().replace('_', "-");
        let url = format!("http://{}.wikipedia.org/wiki/{}", lang, title);
        return SiteTarget {
            label: SITELINK_LABEL,
            lang,
            url,
        };
    }

    let lang = match before_wiki {
        Some("commons") | Some("simple") => "en".to_string(),
        Some(prefix) => prefix.to_string(),
        None => String::new(),
    };
    SiteTarget {
        label: ADDL_SITELINK_LABEL,
        lang,
        url: format!("http://{}.org/wiki/{}", key, title),
    }
}

pub struct RecordTransformer {
    languages: LanguageSelection,
    include_deprecated: bool,
    edges: EdgeToggles,
    parse: ParseToggles,
    missing: MissingDataPolicy,
    strict_claim_types: bool,
    node_rows: bool,
    entity_data: bool,
    claim_edges: bool,
    qualifiers: bool,
    qualifier_rows: bool,
    interleave: bool,
    excluded: FxHashSet<&'static str>,
    claim_minter: IdentifierMinter,
    qual_minter: IdentifierMinter,
    alias_minter: IdentifierMinter,
    primary_link_minter: IdentifierMinter,
    addl_link_minter: IdentifierMinter,
}

impl RecordTransformer {
    pub fn new(options: &ImportOptions) -> Self {
        Self {
            languages: options.languages.clone(),
            include_deprecated: options.include_deprecated,
            edges: options.edges.clone(),
            parse: options.parse.clone(),
            missing: options.missing,
            strict_claim_types: options.strict_claim_types,
            node_rows: options.wants(Relation::Node),
            entity_data: options.wants_entity_data(),
            claim_edges: options.wants_claim_edges(),
            qualifiers: options.wants_qualifiers(),
            qualifier_rows: options.wants_qualifier_rows(),
            interleave: options.interleave,
            excluded: EXCLUDED_CLASSES.iter().copied().collect(),
            claim_minter: IdentifierMinter::new(),
            qual_minter: IdentifierMinter::new(),
            alias_minter: IdentifierMinter::new(),
            primary_link_minter: IdentifierMinter::new(),
            addl_link_minter: IdentifierMinter::new(),
        }
    }

    pub fn transform(
        &mut self,
        record: &SourceRecord,
        out: &mut RecordOutput,
    ) -> Result<(), ImportError> {
        let Some(kind) = record.entity_kind() else {
            if self.missing.warn {
                warn!(entity = %record.id, kind = %record.kind, "Unknown entity type, skipping");
            }
            out.skipped += 1;
            return Ok(());
        };

        if self.entity_data {
            self.entity_rows(record, kind.as_str(), out)?;
        }

        if !self.parse.claims {
            return self.sitelink_rows(record, out);
        }
        let Some(claims) = &record.claims else {
            self.report_missing(record, "claims", out)?;
            return self.sitelink_rows(record, out);
        };

        if self.is_excluded(claims) {
            out.filtered += 1;
            return Ok(());
        }
        if self.claim_edges || self.qualifiers {
            for (property, group) in claims {
                self.claim_rows(record, property, group, out)?;
            }
        }
        self.sitelink_rows(record, out)
    }

    fn report_missing(
        &self,
        record: &SourceRecord,
        field: &'static str,
        out: &mut RecordOutput,
    ) -> Result<(), ImportError> {
        if self.missing.fail {
            return Err(ImportError::MissingField {
                entity: record.id.clone(),
                field,
            });
        }
        if self.missing.warn {
            warn!(entity = %record.id, "Entity is missing its {}", field);
        }
        out.missing_fields += 1;
        Ok(())
    }

    fn is_excluded(&self, claims: &BTreeMap<String, Vec<Claim>>) -> bool {
        [INSTANCE_OF, SUBCLASS_OF]
            .iter()
            .filter_map(|prop| claims.get(*prop))
            .flatten()
            .filter(|claim| claim.rank != Rank::Deprecated)
            .filter_map(Claim::referenced_id)
            .any(|class| self.excluded.contains(class))
    }

    fn entity_rows(
        &mut self,
        record: &SourceRecord,
        kind: &str,
        out: &mut RecordOutput,
    ) -> Result<(), ImportError> {
        let id = record.id.as_str();
        let mut labels = Vec::new();
        let mut descriptions = Vec::new();
        let mut aliases = Vec::new();

        if self.parse.labels {
            match &record.labels {
                None => self.report_missing(record, "labels", out)?,
                Some(map) => {
                    for (lang, entry) in self.languages.select(map) {
                        let value = stringify_lang(&entry.value, lang);
                        if self.edges.label {
                            out.edges.push(EdgeRow::simple(
                                format!("{}-{}-{}", id, LABEL_LABEL, lang),
                                id,
                                LABEL_LABEL,
                                value.clone(),
                                lang,
                            ));
                        }
                        labels.push(value);
                    }
                }
            }
        }

        if self.edges.entity_type {
            out.edges.push(EdgeRow::simple(
                format!("{}-{}", id, TYPE_LABEL),
                id,
                TYPE_LABEL,
                kind.to_string(),
                "",
            ));
        }

        if self.parse.descriptions {
            match &record.descriptions {
                None => self.report_missing(record, "descriptions", out)?,
                Some(map) => {
                    for (lang, entry) in self.languages.select(map) {
                        let value = stringify_lang(&entry.value, lang);
                        if self.edges.description {
                            out.descriptions.push(EdgeRow::simple(
                                format!("{}-{}-{}", id, DESCRIPTION_LABEL, lang),
                                id,
                                DESCRIPTION_LABEL,
                                value.clone(),
                                lang,
                            ));
                        }
                        descriptions.push(value);
                    }
                }
            }
        }

        if self.parse.aliases {
            match &record.aliases {
                None => self.report_missing(record, "aliases", out)?,
                Some(map) => {
                    for (lang, entries) in self.languages.select(map) {
                        self.alias_minter.reset();
                        let scope = format!("{}-{}", ALIAS_LABEL, lang);
                        for entry in entries {
                            let value = stringify_lang(&entry.value, lang);
                            if self.edges.alias {
                                let minted = self.alias_minter.mint(&value);
                                out.edges.push(EdgeRow::simple(
                                    minted.render(id, &scope),
                                    id,
                                    ALIAS_LABEL,
                                    value.clone(),
                                    lang,
                                ));
                            }
                            aliases.push(value);
                        }
                    }
                }
            }
        }

        let datatype = record.datatype.as_deref().unwrap_or_default();
        if self.edges.datatype && !datatype.is_empty() {
            out.edges.push(EdgeRow::simple(
                format!("{}-{}", id, DATATYPE_LABEL),
                id,
                DATATYPE_LABEL,
                datatype.to_string(),
                "",
            ));
        }

        if self.node_rows {
            out.nodes.push(NodeRow {
                id: id.to_string(),
                label: labels.join("|"),
                kind: kind.to_string(),
                description: descriptions.join("|"),
                alias: aliases.join("|"),
                datatype: datatype.to_string(),
            });
        }
        Ok(())
    }

    fn claim_rows(
        &mut self,
        record: &SourceRecord,
        property: &str,
        group: &[Claim],
        out: &mut RecordOutput,
    ) -> Result<(), ImportError> {
        self.claim_minter.reset();
        for claim in group {
            if claim.rank == Rank::Deprecated && !self.include_deprecated {
                continue;
            }
            if claim.claim_type != STATEMENT {
                if self.strict_claim_types {
                    return Err(ImportError::UnexpectedClaimType {
                        entity: record.id.clone(),
                        claim: claim.id.clone(),
                        claim_type: claim.claim_type.clone(),
                    });
                }
                warn!(entity = %record.id, claim = %claim.id, "Unknown claim type {}", claim.claim_type);
                out.unexpected_claim_types += 1;
            }

            let snak_kind = resolve_kind(record, property, &claim.mainsnak)?;
            let value = encode_snak(snak_kind, &claim.mainsnak);
            let edge_id = self.claim_minter.mint(&value.text).render(&record.id, property);

            if self.qualifiers {
                for (qual_property, snaks) in &claim.qualifiers {
                    self.qual_minter.reset();
                    for snak in snaks {
                        let kind = resolve_kind(record, qual_property, snak)?;
                        let qual_value = encode_snak(kind, snak);
                        let minted = self.qual_minter.mint(&qual_value.text);
                        let row = QualRow {
                            id: minted.render(&edge_id, qual_property),
                            node1: edge_id.clone(),
                            label: qual_property.clone(),
                            node2: qual_value.text.clone(),
                            value: qual_value,
                            wikidatatype: snak.datatype.clone(),
                            datahash: format!("\"{}\"", snak.hash),
                        };
                        self.push_qualifier(row, out);
                    }
                }
            }

            if self.claim_edges {
                out.edges.push(EdgeRow {
                    id: edge_id,
                    node1: record.id.clone(),
                    label: property.to_string(),
                    node2: value.text.clone(),
                    rank: claim.rank.as_str().to_string(),
                    value,
                    wikidatatype: claim.mainsnak.datatype.clone(),
                    claim_id: claim.id.clone(),
                    datahash: String::new(),
                    lang: String::new(),
                });
            }
        }
        Ok(())
    }

    fn push_qualifier(&self, row: QualRow, out: &mut RecordOutput) {
        if self.interleave {
            out.edges.push(EdgeRow::from(&row));
        }
        if self.qualifier_rows {
            out.qualifiers.push(row);
        }
    }

    fn sitelink_rows(
        &mut self,
        record: &SourceRecord,
        out: &mut RecordOutput,
    ) -> Result<(), ImportError> {
        let toggles = &self.edges;
        if !self.parse.sitelinks
            || !(toggles.sitelink || toggles.sitelink_verbose || toggles.sitelink_verbose_qualifiers)
        {
            return Ok(());
        }
        let Some(sitelinks) = &record.sitelinks else {
            return Ok(());
        };

        self.primary_link_minter.reset();
        self.addl_link_minter.reset();
        for (key, link) in sitelinks {
            let target = classify_sitelink(key, &link.title);
            let minter = if target.label == SITELINK_LABEL {
                &mut self.primary_link_minter
            } else {
                &mut self.addl_link_minter
            };
            let sid = minter.mint(&target.url).render(&record.id, target.label);

            if self.edges.sitelink {
                out.sitelinks.push(EdgeRow::simple(
                    sid.clone(),
                    &record.id,
                    target.label,
                    target.url.clone(),
                    &target.lang,
                ));
            }
            if self.edges.sitelink_verbose {
                for (id, label, node2) in sitelink_details(&sid, key, link, &target.lang) {
                    out.sitelinks
                        .push(EdgeRow::simple(id, &sid, label, node2, &target.lang));
                }
            }
            if self.edges.sitelink_verbose_qualifiers {
                for (id, label, node2) in sitelink_details(&sid, key, link, &target.lang) {
                    let row = QualRow {
                        id,
                        node1: sid.clone(),
                        label: label.to_string(),
                        node2,
                        ..QualRow::default()
                    };
                    self.push_qualifier(row, out);
                }
            }
        }
        Ok(())
    }
}

fn resolve_kind(record: &SourceRecord, property: &str, snak: &Snak) -> Result<SnakKind, ImportError> {
    snak.kind().ok_or_else(|| ImportError::UnknownSnakType {
        entity: record.id.clone(),
        property: property.to_string(),
        snaktype: snak.snaktype.clone(),
    })
}

/// (id, label, node2) of the language, site, title and badge sub-rows
fn sitelink_details(
    sid: &str,
    key: &str,
    link: &Sitelink,
    lang: &str,
) -> Vec<(String, &'static str, String)> {
    let mut details = Vec::with_capacity(3 + link.badges.len());
    if !lang.is_empty() {
        details.push((
            format!("{}-language-1", sid),
            SITELINK_LANGUAGE_LABEL,
            lang.to_string(),
        ));
    }
    details.push((format!("{}-site-1", sid), SITELINK_SITE_LABEL, key.to_string()));
    details.push((
        format!("{}-title-1", sid),
        SITELINK_TITLE_LABEL,
        stringify(&link.title),
    ));
    for badge in &link.badges {
        details.push((
            format!("{}-badge-{}", sid, badge),
            SITELINK_BADGE_LABEL,
            badge.clone(),
        ));
    }
    details
}
