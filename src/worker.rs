//! Worker threads: parse lines, transform records, batch and ship rows.

use crate::collector::{CollectorMessage, CollectorPlan, StreamRows};
use crate::config::ImportOptions;
use crate::error::ImportError;
use crate::merge::fragment_path;
use crate::models::SourceRecord;
use crate::parser::clean_line;
use crate::relations::{EdgeRow, Relation, Stream};
use crate::sink::RelationSink;
use crate::stats::ImportStats;
use crate::transform::{RecordOutput, RecordTransformer};
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Unit of work handed to a worker
#[derive(Debug)]
pub enum Task {
    Lines(Vec<Vec<u8>>),
    EndOfInput,
}

#[derive(Clone)]
struct Route {
    collector: &'static str,
    sender: Sender<CollectorMessage>,
}

impl Route {
    fn send(&self, rows: StreamRows, stats: &ImportStats) -> Result<(), ImportError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.sender
            .send(CollectorMessage::Rows(rows))
            .map_err(|_| ImportError::QueueClosed(format!("{} collector", self.collector)))?;
        stats.inc_batches();
        Ok(())
    }
}

/// Dedicated collector for a split stream, with the rows it accepts
#[derive(Clone)]
struct SplitRoute {
    route: Route,
    all_languages: bool,
    english: bool,
}

impl SplitRoute {
    fn takes(&self, row: &EdgeRow) -> bool {
        self.all_languages || (self.english && row.lang == "en")
    }
}

/// Queue for each transformer stream. Description and sitelink rows that
/// their dedicated collector would not write fall back to the edge queue.
#[derive(Clone, Default)]
pub struct CollectorRoutes {
    node: Option<Route>,
    edge: Option<Route>,
    qualifier: Option<Route>,
    description: Option<SplitRoute>,
    sitelink: Option<SplitRoute>,
}

impl CollectorRoutes {
    /// `senders[i]` feeds the collector described by `plans[i]`
    pub fn new(plans: &[CollectorPlan], senders: &[Sender<CollectorMessage>]) -> Self {
        let route_for = |stream: Stream| {
            plans
                .iter()
                .zip(senders)
                .find(|(plan, _)| plan.streams.contains(&stream))
                .map(|(plan, sender)| {
                    let route = Route {
                        collector: plan.name,
                        sender: sender.clone(),
                    };
                    (plan, route)
                })
        };
        let split_for = |stream: Stream, all: Relation, english: Relation| {
            route_for(stream).map(|(plan, route)| SplitRoute {
                route,
                all_languages: plan.owns(all),
                english: plan.owns(english),
            })
        };
        Self {
            node: route_for(Stream::Node).map(|(_, route)| route),
            edge: route_for(Stream::Edge).map(|(_, route)| route),
            qualifier: route_for(Stream::Qualifier).map(|(_, route)| route),
            description: split_for(Stream::Description, Relation::Description, Relation::EnDescription),
            sitelink: split_for(Stream::Sitelink, Relation::Sitelink, Relation::EnSitelink),
        }
    }

    fn send(&self, batch: &mut RecordOutput, stats: &ImportStats) -> Result<(), ImportError> {
        let nodes = mem::take(&mut batch.nodes);
        let mut edges = mem::take(&mut batch.edges);
        let qualifiers = mem::take(&mut batch.qualifiers);

        for (split, rows) in [
            (&self.description, mem::take(&mut batch.descriptions)),
            (&self.sitelink, mem::take(&mut batch.sitelinks)),
        ] {
            match split {
                Some(split) => {
                    let (dedicated, rest): (Vec<EdgeRow>, Vec<EdgeRow>) =
                        rows.into_iter().partition(|row| split.takes(row));
                    split.route.send(StreamRows::Edge(dedicated), stats)?;
                    edges.extend(rest);
                }
                None => edges.extend(rows),
            }
        }

        send_on(&self.node, Stream::Node, StreamRows::Node(nodes), stats)?;
        send_on(&self.edge, Stream::Edge, StreamRows::Edge(edges), stats)?;
        send_on(&self.qualifier, Stream::Qualifier, StreamRows::Qualifier(qualifiers), stats)
    }
}

fn send_on(
    route: &Option<Route>,
    stream: Stream,
    rows: StreamRows,
    stats: &ImportStats,
) -> Result<(), ImportError> {
    match route {
        Some(route) => route.send(rows, stats),
        None if rows.is_empty() => Ok(()),
        None => Err(ImportError::NoCollector {
            stream: stream.name().to_string(),
        }),
    }
}

/// Where a worker's rows go
pub enum WorkerSink {
    /// Private `<path>_<index>` fragments, merged after the run
    Fragments(RelationSink),
    Collectors(CollectorRoutes),
}

/// Opens this worker's `<path>_<index>` fragment for every requested relation
pub fn open_fragments(index: usize, options: &ImportOptions) -> Result<WorkerSink> {
    let mut sink = RelationSink::new(format!("worker {}", index), options.column_layout());
    for (relation, path) in &options.outputs {
        sink.open_fragment(*relation, &fragment_path(path, index))?;
    }
    Ok(WorkerSink::Fragments(sink))
}

/// Everything one worker owns; nothing in here is shared with other workers.
pub struct WorkerState {
    index: usize,
    transformer: RecordTransformer,
    sink: WorkerSink,
    batch: RecordOutput,
    batch_records: usize,
    batch_size: usize,
    stats: Arc<ImportStats>,
    progress_interval: u64,
    processed: u64,
}

impl WorkerState {
    pub fn new(
        index: usize,
        options: &ImportOptions,
        sink: WorkerSink,
        stats: Arc<ImportStats>,
    ) -> Self {
        // Fragments are written record by record.
        let batch_size = match sink {
            WorkerSink::Fragments(_) => 1,
            WorkerSink::Collectors(_) => options.collector_batch_size,
        };
        Self {
            index,
            transformer: RecordTransformer::new(options),
            sink,
            batch: RecordOutput::default(),
            batch_records: 0,
            batch_size,
            stats,
            progress_interval: options.progress_interval,
            processed: 0,
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn process(&mut self, raw: &[u8]) -> Result<()> {
        let Some(line) = clean_line(raw) else {
            return Ok(());
        };
        let record = SourceRecord::from_slice(line).with_context(|| {
            let preview = String::from_utf8_lossy(&line[..line.len().min(80)]);
            format!("Failed to parse record: {}", preview)
        })?;
        self.transformer.transform(&record, &mut self.batch)?;

        self.stats.inc_records();
        self.processed += 1;
        self.batch_records += 1;
        if self.progress_interval > 0 && self.processed % self.progress_interval == 0 {
            info!(worker = self.index, records = self.processed, "Worker progress");
        }
        if self.batch_records >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Ships the current batch, even if it is not full
    pub fn flush(&mut self) -> Result<()> {
        if self.batch_records == 0 && self.batch.is_empty() {
            return Ok(());
        }
        self.stats.add_output(&self.batch);
        match &mut self.sink {
            WorkerSink::Fragments(sink) => sink.write_output(&self.batch)?,
            WorkerSink::Collectors(routes) => routes.send(&mut self.batch, &self.stats)?,
        }
        self.batch = RecordOutput::default();
        self.batch_records = 0;
        Ok(())
    }

    /// Flushes and closes owned fragments. Returns fragment row counts.
    pub fn finish(mut self) -> Result<BTreeMap<Relation, u64>> {
        self.flush()?;
        match self.sink {
            WorkerSink::Fragments(sink) => sink.close(),
            WorkerSink::Collectors(_) => Ok(BTreeMap::new()),
        }
    }
}

/// What a worker did, returned when its thread ends
#[derive(Debug)]
pub struct WorkerReport {
    pub index: usize,
    pub records: u64,
    /// Fragment rows per relation; empty when rows went to collectors
    pub rows: BTreeMap<Relation, u64>,
}

/// Worker loop: runs tasks until end of input, a closed queue, or abort.
pub fn run_worker(
    mut state: WorkerState,
    tasks: Receiver<Task>,
    abort: Arc<AtomicBool>,
) -> Result<WorkerReport> {
    debug!(worker = state.index, "Worker started");
    while !abort.load(Ordering::Relaxed) {
        match tasks.recv() {
            Ok(Task::Lines(lines)) => {
                for line in &lines {
                    state.process(line)?;
                }
            }
            Ok(Task::EndOfInput) | Err(_) => break,
        }
    }
    let index = state.index;
    let records = state.processed();
    let rows = state.finish()?;
    info!(worker = index, records, "Worker finished");
    Ok(WorkerReport {
        index,
        records,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectorMode;
    use crate::collector::plan_collectors;
    use crossbeam_channel::bounded;

    const ITEM: &str = r#"{"type":"item","id":"Q1","labels":{"en":{"language":"en","value":"one"}},
        "descriptions":{"en":{"language":"en","value":"first"},"fr":{"language":"fr","value":"premier"}},
        "aliases":{},"claims":{}},"#;

    fn options() -> ImportOptions {
        let mut options = ImportOptions::default()
            .with_output(Relation::Node, "n.tsv")
            .with_output(Relation::MinimalEdge, "e.tsv")
            .with_output(Relation::EnDescription, "d.tsv");
        options.collector_mode = CollectorMode::PerRelation;
        options.languages = crate::config::LanguageSelection::All;
        options.edges.description = true;
        options.collector_batch_size = 2;
        options
    }

    fn drain(rx: &Receiver<CollectorMessage>) -> Vec<usize> {
        rx.try_iter()
            .map(|message| match message {
                CollectorMessage::Rows(rows) => rows.len(),
                other => panic!("unexpected message {:?}", other),
            })
            .collect()
    }

    #[test]
    fn batches_flush_at_threshold_and_finish() -> Result<()> {
        let options = options();
        let plans = plan_collectors(&options);
        let channels: Vec<_> = plans.iter().map(|_| bounded(16)).collect();
        let senders: Vec<_> = channels.iter().map(|(tx, _)| tx.clone()).collect();
        let routes = CollectorRoutes::new(&plans, &senders);
        let stats = Arc::new(ImportStats::new());
        let mut state = WorkerState::new(0, &options, WorkerSink::Collectors(routes), stats.clone());

        state.process(ITEM.as_bytes())?;
        assert!(channels.iter().all(|(_, rx)| rx.is_empty()));
        state.process(ITEM.as_bytes())?;
        state.process(b"]")?;
        state.process(ITEM.as_bytes())?;
        state.finish()?;

        let names: Vec<&str> = plans.iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["node", "edge", "description"]);
        // Two flushes: one at the threshold, one at finish.
        assert_eq!(drain(&channels[0].1), vec![2, 1]);
        // French descriptions fall back to the edge collector.
        assert_eq!(drain(&channels[1].1), vec![2, 1]);
        assert_eq!(drain(&channels[2].1), vec![2, 1]);
        assert_eq!(stats.records(), 3);
        Ok(())
    }

    #[test]
    fn missing_collector_is_reported() -> Result<()> {
        let mut options = options();
        options.edges.label = true;
        options.outputs.remove(&Relation::MinimalEdge);
        let plans = plan_collectors(&options);
        let channels: Vec<_> = plans.iter().map(|_| bounded(16)).collect();
        let senders: Vec<_> = channels.iter().map(|(tx, _)| tx.clone()).collect();
        let routes = CollectorRoutes::new(&plans, &senders);
        let mut state = WorkerState::new(
            0,
            &options,
            WorkerSink::Collectors(routes),
            Arc::new(ImportStats::new()),
        );
        state.process(ITEM.as_bytes())?;
        let err = state.process(ITEM.as_bytes()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ImportError>(),
            Some(ImportError::NoCollector { stream }) if stream == "edge"
        ));
        Ok(())
    }

    #[test]
    fn run_worker_stops_at_end_of_input() -> Result<()> {
        let mut options = options();
        options.collector_mode = CollectorMode::Shared;
        let plans = plan_collectors(&options);
        let (tx, rx) = bounded(64);
        let routes = CollectorRoutes::new(&plans, &[tx]);
        let state = WorkerState::new(
            3,
            &options,
            WorkerSink::Collectors(routes),
            Arc::new(ImportStats::new()),
        );

        let (task_tx, task_rx) = bounded(4);
        task_tx.send(Task::Lines(vec![b"[".to_vec(), ITEM.as_bytes().to_vec()]))?;
        task_tx.send(Task::EndOfInput)?;
        task_tx.send(Task::Lines(vec![ITEM.as_bytes().to_vec()]))?;

        let report = run_worker(state, task_rx, Arc::new(AtomicBool::new(false)))?;
        assert_eq!(report.index, 3);
        assert_eq!(report.records, 1);
        assert!(report.rows.is_empty());
        let rows: usize = drain(&rx).into_iter().sum();
        // node + en description + fr description
        assert_eq!(rows, 3);
        Ok(())
    }

    #[test]
    fn parse_errors_name_the_line() {
        let options = options();
        let mut state = WorkerState::new(
            0,
            &options,
            WorkerSink::Collectors(CollectorRoutes::default()),
            Arc::new(ImportStats::new()),
        );
        let err = state.process(b"{\"id\": broken},").unwrap_err();
        assert!(format!("{:#}", err).contains("broken"));
    }
}
