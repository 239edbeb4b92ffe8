//! The dispatcher: reads the dump, feeds workers, and runs the shutdown
//! sequence.
//!
//! Shutdown always runs, whether feeding finished or failed: end-of-input to
//! every worker queue, join workers, shutdown to every collector queue, join
//! collectors. A failing worker raises the shared abort flag so the rest of
//! the pipeline drains instead of hanging. The run then fails with the first
//! collector failure, else the first worker failure, else the feed error.

use crate::collector::{plan_collectors, Collector, CollectorMessage, CollectorPlan, CollectorReport};
use crate::config::{CollectorMode, ImportOptions};
use crate::error::ImportError;
use crate::merge::{header_path, merge_all};
use crate::parser::DumpReader;
use crate::relations::{ColumnLayout, Relation};
use crate::stats::{ImportStats, StatsSnapshot};
use crate::worker::{open_fragments, run_worker, CollectorRoutes, Task, WorkerReport, WorkerSink, WorkerState};
use crate::writer::write_header_file;
use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use indicatif::ProgressBar;
use std::collections::BTreeMap;
use std::mem;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct ImportSummary {
    pub stats: StatsSnapshot,
    /// Data rows in each final output file
    pub rows: BTreeMap<Relation, u64>,
    pub elapsed: Duration,
}

/// Imports the dump at `input` (`-` for stdin) into the requested outputs
pub fn run_import(input: &Path, options: &ImportOptions) -> Result<ImportSummary> {
    let reader = DumpReader::open(input)?;
    info!(input = %input.display(), workers = options.workers, "Starting import");
    import_from_reader(reader, options)
}

/// Same as [`run_import`] over an already opened reader
pub fn import_from_reader(mut reader: DumpReader, options: &ImportOptions) -> Result<ImportSummary> {
    options.validate()?;
    let start = Instant::now();
    let stats = Arc::new(ImportStats::new());

    let mut pipeline = Pipeline::start(options, stats.clone())?;
    let fed = pipeline
        .send_headers()
        .and_then(|()| pipeline.feed(&mut reader, options));
    let shutdown = pipeline.shutdown(fed)?;

    let rows = match options.collector_mode {
        CollectorMode::None if !options.skip_merging => {
            merge_all(&options.outputs, options.workers, !options.keep_temp_files)?
        }
        _ => shutdown,
    };

    let summary = ImportSummary {
        stats: stats.snapshot(),
        rows,
        elapsed: start.elapsed(),
    };
    info!(
        records = summary.stats.records_processed,
        duration_secs = summary.elapsed.as_secs_f64(),
        "Import finished"
    );
    Ok(summary)
}

struct CollectorHandle {
    name: &'static str,
    relations: Vec<Relation>,
    sender: Sender<CollectorMessage>,
    thread: JoinHandle<Result<CollectorReport>>,
}

/// Running worker and collector threads plus the queues that feed them
struct Pipeline {
    layout: ColumnLayout,
    task_senders: Vec<Sender<Task>>,
    workers: Vec<JoinHandle<Result<WorkerReport>>>,
    collectors: Vec<CollectorHandle>,
    abort: Arc<AtomicBool>,
    stats: Arc<ImportStats>,
    next_queue: usize,
}

impl Pipeline {
    fn start(options: &ImportOptions, stats: Arc<ImportStats>) -> Result<Self> {
        let layout = options.column_layout();
        let plans = plan_collectors(options);
        let collectors = spawn_collectors(&plans, options)?;

        let routes = match options.collector_mode {
            CollectorMode::None => {
                for (relation, path) in &options.outputs {
                    write_header_file(&header_path(path), relation.columns(layout))?;
                }
                None
            }
            _ => {
                let senders: Vec<_> = collectors.iter().map(|c| c.sender.clone()).collect();
                Some(CollectorRoutes::new(&plans, &senders))
            }
        };

        let (task_senders, receivers) = task_queues(options);
        let abort = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(options.clone());
        let mut workers = Vec::with_capacity(options.workers);
        for (index, tasks) in receivers.into_iter().enumerate() {
            let options = Arc::clone(&shared);
            let routes = routes.clone();
            let stats = Arc::clone(&stats);
            let abort = Arc::clone(&abort);
            let handle = thread::Builder::new()
                .name(format!("worker-{}", index))
                .spawn(move || {
                    let result = worker_main(index, &options, routes, stats, tasks, &abort);
                    if result.is_err() {
                        abort.store(true, Ordering::Relaxed);
                    }
                    result
                })
                .with_context(|| format!("Failed to spawn worker {}", index))?;
            workers.push(handle);
        }

        Ok(Self {
            layout,
            task_senders,
            workers,
            collectors,
            abort,
            stats,
            next_queue: 0,
        })
    }

    fn send_headers(&self) -> Result<()> {
        for collector in &self.collectors {
            for relation in &collector.relations {
                let message = CollectorMessage::Header {
                    relation: *relation,
                    columns: relation.columns(self.layout),
                };
                collector
                    .sender
                    .send(message)
                    .map_err(|_| ImportError::QueueClosed(format!("{} collector", collector.name)))?;
            }
        }
        Ok(())
    }

    /// Reads lines until end of input, the line limit, or an abort
    fn feed(&mut self, reader: &mut DumpReader, options: &ImportOptions) -> Result<()> {
        let pb = ProgressBar::new_spinner();
        let mut line = Vec::new();
        let mut batch = Vec::with_capacity(options.mapper_batch_size);
        let mut lines = 0u64;

        loop {
            if self.abort.load(Ordering::Relaxed) {
                warn!(lines, "Stopped reading input after a worker failure");
                break;
            }
            if options.limit.is_some_and(|limit| lines >= limit) {
                info!(lines, "Line limit reached");
                break;
            }
            if !reader.next_line(&mut line)? {
                break;
            }
            lines += 1;
            self.stats.add_lines(1);
            batch.push(mem::take(&mut line));
            if batch.len() >= options.mapper_batch_size {
                let full = mem::replace(&mut batch, Vec::with_capacity(options.mapper_batch_size));
                self.dispatch(Task::Lines(full))?;
            }
            if options.progress_interval > 0 && lines % options.progress_interval == 0 {
                pb.set_message(format!("{} lines read", lines));
                pb.tick();
            }
        }
        if !batch.is_empty() && !self.abort.load(Ordering::Relaxed) {
            self.dispatch(Task::Lines(batch))?;
        }
        pb.finish_and_clear();
        debug!(lines, "Input exhausted");
        Ok(())
    }

    /// Hands a task to the shared queue, or to the next worker queue in turn
    fn dispatch(&mut self, task: Task) -> Result<(), ImportError> {
        let queue = self.next_queue % self.task_senders.len();
        self.next_queue += 1;
        self.task_senders[queue]
            .send(task)
            .map_err(|_| ImportError::QueueClosed(format!("worker {}", queue)))
    }

    /// Stops every thread and picks the error to report. Returns the rows
    /// written by collectors, or by worker fragments when there are none.
    fn shutdown(self, fed: Result<()>) -> Result<BTreeMap<Relation, u64>> {
        let workers = self.workers.len();
        for queue in 0..workers {
            // A dead worker has dropped its receiver; nothing to tell it.
            let _ = self.task_senders[queue % self.task_senders.len()].send(Task::EndOfInput);
        }
        drop(self.task_senders);

        let mut rows = BTreeMap::new();
        let mut worker_failure = None;
        for (index, handle) in self.workers.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(report)) => add_rows(&mut rows, report.rows),
                Ok(Err(e)) => {
                    warn!(worker = index, error = %format!("{:#}", e), "Worker failed");
                    worker_failure.get_or_insert(ImportError::WorkerFailed {
                        worker: index,
                        cause: format!("{:#}", e),
                    });
                }
                Err(_) => {
                    worker_failure.get_or_insert(ImportError::WorkerFailed {
                        worker: index,
                        cause: "worker thread panicked".to_string(),
                    });
                }
            }
        }

        for collector in &self.collectors {
            let _ = collector.sender.send(CollectorMessage::Shutdown);
        }
        let mut collector_failure = None;
        for collector in self.collectors {
            drop(collector.sender);
            match collector.thread.join() {
                Ok(Ok(report)) => add_rows(&mut rows, report.rows),
                Ok(Err(e)) => {
                    collector_failure.get_or_insert(ImportError::CollectorFailed {
                        collector: collector.name.to_string(),
                        cause: format!("{:#}", e),
                    });
                }
                Err(_) => {
                    collector_failure.get_or_insert(ImportError::CollectorFailed {
                        collector: collector.name.to_string(),
                        cause: "collector thread panicked".to_string(),
                    });
                }
            }
        }

        if let Some(failure) = collector_failure.or(worker_failure) {
            return Err(failure.into());
        }
        fed?;
        Ok(rows)
    }
}

fn add_rows(total: &mut BTreeMap<Relation, u64>, rows: BTreeMap<Relation, u64>) {
    for (relation, count) in rows {
        *total.entry(relation).or_default() += count;
    }
}

fn spawn_collectors(plans: &[CollectorPlan], options: &ImportOptions) -> Result<Vec<CollectorHandle>> {
    let mut handles = Vec::with_capacity(plans.len());
    for plan in plans {
        let (sender, receiver) = bounded(options.collector_queue_capacity());
        let paths = plan
            .relations
            .iter()
            .filter_map(|relation| options.outputs.get(relation).map(|path| (*relation, path.clone())))
            .collect();
        let collector = Collector::new(
            plan.name,
            paths,
            options.column_layout(),
            receiver,
            options.progress_interval,
        );
        let thread = thread::Builder::new()
            .name(format!("collector-{}", plan.name))
            .spawn(move || collector.run())
            .with_context(|| format!("Failed to spawn the {} collector", plan.name))?;
        handles.push(CollectorHandle {
            name: plan.name,
            relations: plan.relations.clone(),
            sender,
            thread,
        });
    }
    Ok(handles)
}

/// One shared queue, or one queue per worker
fn task_queues(options: &ImportOptions) -> (Vec<Sender<Task>>, Vec<Receiver<Task>>) {
    if options.single_mapper_queue {
        let (sender, receiver) = bounded(options.mapper_queue_depth * options.workers);
        (vec![sender], vec![receiver; options.workers])
    } else {
        (0..options.workers)
            .map(|_| bounded(options.mapper_queue_depth))
            .unzip()
    }
}

fn worker_main(
    index: usize,
    options: &ImportOptions,
    routes: Option<CollectorRoutes>,
    stats: Arc<ImportStats>,
    tasks: Receiver<Task>,
    abort: &Arc<AtomicBool>,
) -> Result<WorkerReport> {
    let sink = match routes {
        Some(routes) => WorkerSink::Collectors(routes),
        None => open_fragments(index, options)?,
    };
    let state = WorkerState::new(index, options, sink, stats);
    run_worker(state, tasks, Arc::clone(abort))
}
