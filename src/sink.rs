//! Routes transformer rows to the open table writers.
//!
//! A sink is owned by exactly one thread: a collector (final files) or a
//! worker writing its private fragments. Edge rows go to the split relation
//! for their label when one is open; everything else falls through to the
//! generic edge relations.

use crate::error::ImportError;
use crate::relations::{ColumnLayout, EdgeLabelKind, EdgeRow, NodeRow, QualRow, Relation};
use crate::transform::RecordOutput;
use crate::writer::TableWriter;
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

static PROPERTY_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^P\d+").unwrap());

pub struct RelationSink {
    owner: String,
    layout: ColumnLayout,
    writers: BTreeMap<Relation, TableWriter>,
}

impl RelationSink {
    pub fn new(owner: impl Into<String>, layout: ColumnLayout) -> Self {
        Self {
            owner: owner.into(),
            layout,
            writers: BTreeMap::new(),
        }
    }

    pub fn is_open(&self, relation: Relation) -> bool {
        self.writers.contains_key(&relation)
    }

    /// Opens the final file for `relation`, header first
    pub fn open(&mut self, relation: Relation, columns: &[&str], path: &Path) -> Result<()> {
        self.ensure_unopened(relation)?;
        let writer = TableWriter::open(relation, columns, path)?;
        debug!(owner = %self.owner, relation = relation.name(), path = %path.display(), "Opened output");
        self.writers.insert(relation, writer);
        Ok(())
    }

    /// Opens a headerless fragment for `relation`
    pub fn open_fragment(&mut self, relation: Relation, path: &Path) -> Result<()> {
        self.ensure_unopened(relation)?;
        let columns = relation.columns(self.layout).len();
        let writer = TableWriter::open_fragment(relation, columns, path)?;
        self.writers.insert(relation, writer);
        Ok(())
    }

    fn ensure_unopened(&self, relation: Relation) -> Result<(), ImportError> {
        if self.is_open(relation) {
            return Err(ImportError::DuplicateHeader {
                collector: self.owner.clone(),
                relation: relation.name().to_string(),
            });
        }
        Ok(())
    }

    fn unexpected(&self, what: &str) -> ImportError {
        ImportError::UnexpectedRows {
            collector: self.owner.clone(),
            what: what.to_string(),
        }
    }

    pub fn write_output(&mut self, out: &RecordOutput) -> Result<()> {
        self.write_nodes(&out.nodes)?;
        self.write_edges(&out.edges)?;
        self.write_edges(&out.descriptions)?;
        self.write_edges(&out.sitelinks)?;
        self.write_qualifiers(&out.qualifiers)
    }

    pub fn write_nodes(&mut self, rows: &[NodeRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        if !self.is_open(Relation::Node) {
            return Err(self.unexpected("node").into());
        }
        let layout = self.layout;
        if let Some(writer) = self.writers.get_mut(&Relation::Node) {
            for row in rows {
                writer.write(&row.fields(layout))?;
            }
        }
        Ok(())
    }

    pub fn write_edges(&mut self, rows: &[EdgeRow]) -> Result<()> {
        for row in rows {
            self.write_edge(row)?;
        }
        Ok(())
    }

    fn write_edge(&mut self, row: &EdgeRow) -> Result<()> {
        let layout = self.layout;
        let mut split = false;
        if let Some((all, english)) = EdgeLabelKind::classify(&row.label).split_relations() {
            if let Some(writer) = self.writers.get_mut(&all) {
                writer.write(&split_fields(all, row))?;
                split = true;
            }
            if let Some(english) = english.filter(|_| row.lang == "en") {
                if let Some(writer) = self.writers.get_mut(&english) {
                    writer.write(&split_fields(english, row))?;
                    split = true;
                }
            }
        }
        if split {
            return Ok(());
        }

        if !(self.is_open(Relation::MinimalEdge)
            || self.is_open(Relation::DetailedEdge)
            || self.is_open(Relation::PropertyEdge))
        {
            return Err(self.unexpected(&format!("{} edge", row.label)).into());
        }

        let minimal = if self.is_open(Relation::PropertyEdge) && PROPERTY_ID.is_match(&row.node1) {
            Relation::PropertyEdge
        } else {
            Relation::MinimalEdge
        };
        if let Some(writer) = self.writers.get_mut(&minimal) {
            writer.write(&row.minimal_fields())?;
        }
        if let Some(writer) = self.writers.get_mut(&Relation::DetailedEdge) {
            writer.write(&row.detailed_fields(layout))?;
        }
        Ok(())
    }

    pub fn write_qualifiers(&mut self, rows: &[QualRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        if !(self.is_open(Relation::MinimalQualifier)
            || self.is_open(Relation::DetailedQualifier)
            || self.is_open(Relation::PropertyQualifier))
        {
            return Err(self.unexpected("qualifier").into());
        }
        let layout = self.layout;
        for row in rows {
            let minimal = if self.is_open(Relation::PropertyQualifier) && PROPERTY_ID.is_match(&row.id)
            {
                Relation::PropertyQualifier
            } else {
                Relation::MinimalQualifier
            };
            if let Some(writer) = self.writers.get_mut(&minimal) {
                writer.write(&row.minimal_fields())?;
            }
            if let Some(writer) = self.writers.get_mut(&Relation::DetailedQualifier) {
                writer.write(&row.detailed_fields(layout))?;
            }
        }
        Ok(())
    }

    /// Closes every writer, returning the data row count per relation
    pub fn close(self) -> Result<BTreeMap<Relation, u64>> {
        let mut counts = BTreeMap::new();
        for (relation, writer) in self.writers {
            counts.insert(relation, writer.close()?);
        }
        Ok(counts)
    }
}

fn split_fields(relation: Relation, row: &EdgeRow) -> Vec<&str> {
    let with_lang = matches!(
        relation,
        Relation::Alias | Relation::Description | Relation::Label | Relation::Sitelink
    );
    row.split_fields(with_lang)
}
