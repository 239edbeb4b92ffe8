//! Ariadne: parallel Wikidata JSON dump to KGTK edge-file importer
//!
//! The importer streams a Wikidata entity dump (one JSON record per line,
//! optionally bz2 or gzip compressed) and turns every entity into tab-separated
//! rows for up to seventeen output files: nodes, detailed and minimal edges,
//! qualifiers, and per-label split files with English-only variants.
//!
//! # Architecture
//!
//! 1. **Dispatcher** -- Reads input lines and hands batches of them to workers
//!    over bounded queues (one shared queue, or one queue per worker)
//! 2. **Workers** -- Decode records, encode values, mint deterministic edge
//!    identifiers and batch the resulting rows
//! 3. **Output** -- Either every worker writes private fragments that are
//!    concatenated afterwards, or collector threads own the final files and
//!    drain row batches from their queues
//!
//! Every output file has exactly one writer. Ownership, not locking, keeps the
//! files consistent; the only shared structures are the queues and the atomic
//! counters in [`stats`].
//!
//! # Key Modules
//!
//! - [`dispatch`] -- Pipeline start-up, input feeding and the shutdown sequence
//! - [`worker`] -- Per-worker state, batching and routing to collectors
//! - [`collector`] -- Single-writer threads for the final files
//! - [`transform`] -- One entity in, node/edge/qualifier rows out
//! - [`encode`] -- Wikidata values to KGTK text (quantities, times, coordinates)
//! - [`ids`] -- Hash-and-sequence identifier minting
//! - [`relations`] -- Output relations, column lists and row types
//! - [`sink`] -- Label-based routing of rows to open table writers
//! - [`writer`] -- Tab-separated table output with optional compression
//! - [`merge`] -- Worker fragment concatenation
//! - [`parser`] -- Dump reading and line cleanup
//! - [`models`] -- Serde model of dump records
//! - [`config`] -- Constants and import options
//!
//! # Example Usage
//!
//! ```bash
//! # Nodes and detailed edges, four workers, one collector per relation
//! ariadne import -i latest-all.json.bz2 --node nodes.tsv --detailed-edge edges.tsv.gz \
//!     --workers 4 --collector-mode per-relation
//!
//! # Re-merge fragments left behind by --skip-merging
//! ariadne merge --output nodes.tsv
//! ```

pub mod collector;
pub mod config;
pub mod dispatch;
pub mod encode;
pub mod error;
pub mod ids;
pub mod merge;
pub mod models;
pub mod parser;
pub mod relations;
pub mod sink;
pub mod stats;
pub mod transform;
pub mod worker;
pub mod writer;
