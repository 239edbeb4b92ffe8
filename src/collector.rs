//! Collectors: the single writers of the final output files.
//!
//! A collector drains one bounded queue. Header messages open files, row
//! messages are routed through a [`RelationSink`], and a shutdown message
//! closes everything. Because the queue is FIFO, every batch enqueued before
//! the shutdown is written before the files close.

use crate::config::{CollectorMode, ImportOptions};
use crate::error::ImportError;
use crate::relations::{ColumnLayout, EdgeRow, NodeRow, QualRow, Relation, Stream};
use crate::sink::RelationSink;
use anyhow::Result;
use crossbeam_channel::Receiver;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Rows of one stream, sent as a single queue message
#[derive(Debug)]
pub enum StreamRows {
    Node(Vec<NodeRow>),
    Edge(Vec<EdgeRow>),
    Qualifier(Vec<QualRow>),
}

impl StreamRows {
    pub fn len(&self) -> usize {
        match self {
            StreamRows::Node(rows) => rows.len(),
            StreamRows::Edge(rows) => rows.len(),
            StreamRows::Qualifier(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub enum CollectorMessage {
    Header {
        relation: Relation,
        columns: &'static [&'static str],
    },
    Rows(StreamRows),
    Shutdown,
}

/// Which streams and relations one collector owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorPlan {
    pub name: &'static str,
    pub streams: Vec<Stream>,
    pub relations: Vec<Relation>,
}

impl CollectorPlan {
    pub fn owns(&self, relation: Relation) -> bool {
        self.relations.contains(&relation)
    }
}

/// Splits the requested relations between collectors.
///
/// `Shared` puts everything on one "common" collector. `PerRelation` gives
/// node, edge and qualifier streams their own collectors, plus description
/// and sitelink collectors when split files for them are requested.
/// Collectors that would own no file are not created.
pub fn plan_collectors(options: &ImportOptions) -> Vec<CollectorPlan> {
    let wanted: Vec<Relation> = options.outputs.keys().copied().collect();
    match options.collector_mode {
        CollectorMode::None => Vec::new(),
        CollectorMode::Shared => vec![CollectorPlan {
            name: "common",
            streams: Stream::ALL.to_vec(),
            relations: wanted,
        }],
        CollectorMode::PerRelation => {
            let by_stream = |stream: Stream| -> Vec<Relation> {
                wanted
                    .iter()
                    .copied()
                    .filter(|r| r.stream() == stream)
                    .collect()
            };
            [
                ("node", Stream::Node),
                ("edge", Stream::Edge),
                ("qual", Stream::Qualifier),
                ("description", Stream::Description),
                ("sitelink", Stream::Sitelink),
            ]
            .into_iter()
            .map(|(name, stream)| CollectorPlan {
                name,
                streams: vec![stream],
                relations: by_stream(stream),
            })
            .filter(|plan| !plan.relations.is_empty())
            .collect()
        }
    }
}

/// Rows written per relation by one collector
#[derive(Debug)]
pub struct CollectorReport {
    pub name: String,
    pub messages: u64,
    pub rows: BTreeMap<Relation, u64>,
}

pub struct Collector {
    name: String,
    paths: BTreeMap<Relation, PathBuf>,
    sink: RelationSink,
    receiver: Receiver<CollectorMessage>,
    progress_interval: u64,
}

impl Collector {
    pub fn new(
        name: impl Into<String>,
        paths: BTreeMap<Relation, PathBuf>,
        layout: ColumnLayout,
        receiver: Receiver<CollectorMessage>,
        progress_interval: u64,
    ) -> Self {
        let name = name.into();
        Self {
            sink: RelationSink::new(name.clone(), layout),
            name,
            paths,
            receiver,
            progress_interval,
        }
    }

    /// Runs until a shutdown message arrives or every sender is gone
    pub fn run(mut self) -> Result<CollectorReport> {
        info!(collector = %self.name, "Collector started");
        let mut messages = 0u64;
        let mut rows = 0u64;
        loop {
            let message = match self.receiver.recv() {
                Ok(message) => message,
                Err(_) => {
                    warn!(collector = %self.name, "Queue disconnected without a shutdown message");
                    break;
                }
            };
            messages += 1;
            match message {
                CollectorMessage::Header { relation, columns } => self.open(relation, columns)?,
                CollectorMessage::Rows(batch) => {
                    rows += batch.len() as u64;
                    self.write(&batch)?;
                }
                CollectorMessage::Shutdown => {
                    debug!(collector = %self.name, "Shutdown received");
                    break;
                }
            }
            if self.progress_interval > 0 && messages % self.progress_interval == 0 {
                info!(collector = %self.name, messages, rows, "Collector progress");
            }
        }

        let name = self.name;
        let written = self.sink.close()?;
        info!(collector = %name, messages, rows, "Collector finished");
        Ok(CollectorReport {
            name,
            messages,
            rows: written,
        })
    }

    fn open(&mut self, relation: Relation, columns: &[&str]) -> Result<()> {
        let Some(path) = self.paths.get(&relation) else {
            return Err(ImportError::HeaderWithoutPath {
                collector: self.name.clone(),
                relation: relation.name().to_string(),
            }
            .into());
        };
        self.sink.open(relation, columns, path)
    }

    fn write(&mut self, batch: &StreamRows) -> Result<()> {
        match batch {
            StreamRows::Node(rows) => self.sink.write_nodes(rows),
            StreamRows::Edge(rows) => self.sink.write_edges(rows),
            StreamRows::Qualifier(rows) => self.sink.write_qualifiers(rows),
        }
    }
}
