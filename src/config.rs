use crate::error::ImportError;
use crate::relations::{ColumnLayout, Relation};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Number of worker threads transforming records
pub const DEFAULT_WORKERS: usize = 2;

/// Tasks buffered per worker queue
pub const DEFAULT_MAPPER_QUEUE_DEPTH: usize = 4;

/// Input lines packed into one worker task
pub const DEFAULT_MAPPER_BATCH_SIZE: usize = 5;

/// Records accumulated by a worker before a batch goes to a collector
pub const DEFAULT_COLLECTOR_BATCH_SIZE: usize = 5;

/// Collector queue depth per worker (capacity = workers * this)
pub const DEFAULT_COLLECTOR_QUEUE_PER_WORKER: usize = 2;

/// Progress update interval (log every N lines, records, or messages)
pub const PROGRESS_INTERVAL: u64 = 500_000;

pub const DEFAULT_LANGUAGE: &str = "en";

/// Buffer size for table writers
pub const WRITER_BUFFER_SIZE: usize = 128 * 1024;

/// Buffer size for fragment merging
pub const MERGE_BUFFER_SIZE: usize = 256 * 1024;

pub const ALIAS_LABEL: &str = "alias";
pub const DATATYPE_LABEL: &str = "datatype";
pub const DESCRIPTION_LABEL: &str = "description";
pub const LABEL_LABEL: &str = "label";
pub const TYPE_LABEL: &str = "type";
pub const SITELINK_LABEL: &str = "wikipedia_sitelink";
pub const ADDL_SITELINK_LABEL: &str = "addl_wikipedia_sitelink";
pub const SITELINK_BADGE_LABEL: &str = "sitelink-badge";
pub const SITELINK_LANGUAGE_LABEL: &str = "sitelink-language";
pub const SITELINK_SITE_LABEL: &str = "sitelink-site";
pub const SITELINK_TITLE_LABEL: &str = "sitelink-title";

pub const INSTANCE_OF: &str = "P31";
pub const SUBCLASS_OF: &str = "P279";

/// Classes whose instances and subclasses are not worth importing: Wikimedia
/// meta items, punctuation, letters and similar lexical entities.
pub const EXCLUDED_CLASSES: &[&str] = &[
    "Q163875", "Q191780", "Q224414", "Q4167836", "Q4167410", "Q4663903", "Q11266439",
    "Q13406463", "Q15407973", "Q18616576", "Q19887878", "Q22808320", "Q23894233",
    "Q33120876", "Q42104522", "Q47460393", "Q64875536", "Q66480449",
    // punctuation
    "Q1383557", "Q10617810",
    // letters etc
    "Q188725", "Q19776628", "Q3841820", "Q17907810", "Q9788", "Q9398093",
];

/// `*wiki` site keys that are not language Wikipedias
pub const NON_WIKIPEDIA_SITES: &[&str] = &["commonswiki", "simplewiki"];

/// How worker output reaches the final files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectorMode {
    /// Each worker writes private fragments, merged after the run
    #[default]
    None,
    /// One collector owns every output file
    Shared,
    /// Separate node, edge, qualifier, description and sitelink collectors
    PerRelation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageSelection {
    All,
    Only(Vec<String>),
}

impl LanguageSelection {
    /// Parses a comma separated language list such as `en,fr,de`
    pub fn parse(list: &str) -> Self {
        LanguageSelection::Only(
            list.split(',')
                .map(|lang| lang.trim().to_string())
                .filter(|lang| !lang.is_empty())
                .collect(),
        )
    }

    /// Picks the entries of a per-language map in selection order
    /// (sorted key order for `All`).
    pub fn select<'a, V>(&'a self, map: &'a BTreeMap<String, V>) -> Vec<(&'a str, &'a V)> {
        match self {
            LanguageSelection::All => map.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            LanguageSelection::Only(langs) => langs
                .iter()
                .filter_map(|lang| map.get_key_value(lang))
                .map(|(k, v)| (k.as_str(), v))
                .collect(),
        }
    }
}

impl Default for LanguageSelection {
    fn default() -> Self {
        LanguageSelection::Only(vec![DEFAULT_LANGUAGE.to_string()])
    }
}

/// Optional edges beyond the claim edges
#[derive(Debug, Clone, Default)]
pub struct EdgeToggles {
    pub entity_type: bool,
    pub alias: bool,
    pub datatype: bool,
    pub description: bool,
    pub label: bool,
    pub sitelink: bool,
    pub sitelink_verbose: bool,
    pub sitelink_verbose_qualifiers: bool,
}

/// Which parts of a record are read at all
#[derive(Debug, Clone)]
pub struct ParseToggles {
    pub labels: bool,
    pub descriptions: bool,
    pub aliases: bool,
    pub sitelinks: bool,
    pub claims: bool,
}

impl Default for ParseToggles {
    fn default() -> Self {
        Self {
            labels: true,
            descriptions: true,
            aliases: true,
            sitelinks: true,
            claims: true,
        }
    }
}

/// What happens when a record lacks labels, descriptions, aliases or claims.
/// The two flags are independent; `fail` wins when both are set.
#[derive(Debug, Clone, Copy)]
pub struct MissingDataPolicy {
    pub fail: bool,
    pub warn: bool,
}

impl Default for MissingDataPolicy {
    fn default() -> Self {
        Self {
            fail: true,
            warn: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub workers: usize,
    pub mapper_queue_depth: usize,
    pub mapper_batch_size: usize,
    pub single_mapper_queue: bool,
    pub collector_mode: CollectorMode,
    pub collector_batch_size: usize,
    pub collector_queue_per_worker: usize,
    pub outputs: BTreeMap<Relation, PathBuf>,
    pub languages: LanguageSelection,
    pub include_deprecated: bool,
    pub explode_values: bool,
    pub node_id_only: bool,
    pub interleave: bool,
    pub edges: EdgeToggles,
    pub parse: ParseToggles,
    pub missing: MissingDataPolicy,
    pub strict_claim_types: bool,
    pub limit: Option<u64>,
    pub progress_interval: u64,
    pub keep_temp_files: bool,
    pub skip_merging: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            mapper_queue_depth: DEFAULT_MAPPER_QUEUE_DEPTH,
            mapper_batch_size: DEFAULT_MAPPER_BATCH_SIZE,
            single_mapper_queue: false,
            collector_mode: CollectorMode::default(),
            collector_batch_size: DEFAULT_COLLECTOR_BATCH_SIZE,
            collector_queue_per_worker: DEFAULT_COLLECTOR_QUEUE_PER_WORKER,
            outputs: BTreeMap::new(),
            languages: LanguageSelection::default(),
            include_deprecated: false,
            explode_values: true,
            node_id_only: false,
            interleave: false,
            edges: EdgeToggles::default(),
            parse: ParseToggles::default(),
            missing: MissingDataPolicy::default(),
            strict_claim_types: false,
            limit: None,
            progress_interval: PROGRESS_INTERVAL,
            keep_temp_files: false,
            skip_merging: false,
        }
    }
}

impl ImportOptions {
    pub fn with_output(mut self, relation: Relation, path: impl Into<PathBuf>) -> Self {
        self.outputs.insert(relation, path.into());
        self
    }

    pub fn wants(&self, relation: Relation) -> bool {
        self.outputs.contains_key(&relation)
    }

    pub fn wants_claim_edges(&self) -> bool {
        self.wants(Relation::DetailedEdge)
            || self.wants(Relation::MinimalEdge)
            || self.wants(Relation::PropertyEdge)
    }

    pub fn wants_qualifier_rows(&self) -> bool {
        self.wants(Relation::DetailedQualifier)
            || self.wants(Relation::MinimalQualifier)
            || self.wants(Relation::PropertyQualifier)
    }

    /// Qualifiers are traversed when they feed a qualifier file or are interleaved into edges
    pub fn wants_qualifiers(&self) -> bool {
        self.interleave || self.wants_qualifier_rows()
    }

    /// True when labels, descriptions, aliases or the entity type feed any output
    pub fn wants_entity_data(&self) -> bool {
        self.wants(Relation::Node)
            || self.edges.entity_type
            || self.edges.label
            || self.edges.alias
            || self.edges.description
            || self.edges.datatype
    }

    pub fn column_layout(&self) -> ColumnLayout {
        ColumnLayout {
            explode_values: self.explode_values,
            node_id_only: self.node_id_only,
        }
    }

    pub fn collector_queue_capacity(&self) -> usize {
        self.workers * self.collector_queue_per_worker
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        let invalid = |reason: &str| Err(ImportError::InvalidOptions(reason.to_string()));
        if self.workers == 0 {
            return invalid("at least one worker is required");
        }
        if self.mapper_queue_depth == 0 || self.collector_queue_per_worker == 0 {
            return invalid("queue depths must be at least 1");
        }
        if self.mapper_batch_size == 0 || self.collector_batch_size == 0 {
            return invalid("batch sizes must be at least 1");
        }
        if self.outputs.is_empty() {
            return invalid("no output file requested");
        }
        if let LanguageSelection::Only(langs) = &self.languages {
            if langs.is_empty() {
                return invalid("language list is empty");
            }
        }
        Ok(())
    }
}
