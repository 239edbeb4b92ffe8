use anyhow::Result;
use ariadne::config::{self, CollectorMode, ImportOptions, LanguageSelection};
use ariadne::dispatch::{self, ImportSummary};
use ariadne::merge;
use ariadne::relations::Relation;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "ariadne")]
#[command(about = "Convert Wikidata JSON dumps into KGTK node, edge and qualifier files")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a Wikidata JSON dump
    Import(Box<ImportArgs>),
    /// Merge worker fragments left behind by --skip-merging or --keep-temp-files
    Merge(MergeArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum CollectorModeArg {
    /// Workers write fragments that are merged afterwards
    None,
    /// One collector for every output file
    Shared,
    /// Node, edge, qualifier, description and sitelink collectors
    PerRelation,
}

impl From<CollectorModeArg> for CollectorMode {
    fn from(arg: CollectorModeArg) -> Self {
        match arg {
            CollectorModeArg::None => CollectorMode::None,
            CollectorModeArg::Shared => CollectorMode::Shared,
            CollectorModeArg::PerRelation => CollectorMode::PerRelation,
        }
    }
}

#[derive(Args)]
struct ImportArgs {
    /// Path to the dump (.json, .json.bz2, .json.gz, or - for stdin)
    #[arg(short, long)]
    input: PathBuf,

    #[command(flatten)]
    outputs: OutputArgs,

    /// Number of worker threads
    #[arg(long, default_value_t = config::DEFAULT_WORKERS)]
    workers: usize,

    /// Tasks buffered per worker queue
    #[arg(long, default_value_t = config::DEFAULT_MAPPER_QUEUE_DEPTH)]
    mapper_queue_depth: usize,

    /// Input lines per worker task
    #[arg(long, default_value_t = config::DEFAULT_MAPPER_BATCH_SIZE)]
    mapper_batch_size: usize,

    /// Feed all workers from one shared queue
    #[arg(long)]
    single_mapper_queue: bool,

    #[arg(long, value_enum, default_value = "none")]
    collector_mode: CollectorModeArg,

    /// Records per batch sent to a collector
    #[arg(long, default_value_t = config::DEFAULT_COLLECTOR_BATCH_SIZE)]
    collector_batch_size: usize,

    /// Collector queue depth per worker
    #[arg(long, default_value_t = config::DEFAULT_COLLECTOR_QUEUE_PER_WORKER)]
    collector_queue_per_worker: usize,

    /// Comma separated languages for labels, descriptions and aliases
    #[arg(long, default_value = config::DEFAULT_LANGUAGE)]
    languages: String,

    /// Keep every language
    #[arg(long)]
    all_languages: bool,

    /// Emit edges for deprecated statements
    #[arg(long)]
    include_deprecated: bool,

    /// Keep encoded values in one column instead of one column per part
    #[arg(long)]
    compact_values: bool,

    /// Node file with the id column only
    #[arg(long)]
    node_id_only: bool,

    /// Also write qualifier rows to the edge files
    #[arg(long)]
    interleave: bool,

    #[command(flatten)]
    toggles: ToggleArgs,

    /// Stop after this many input lines
    #[arg(long)]
    limit: Option<u64>,

    /// Log progress every N lines, records or messages
    #[arg(long, default_value_t = config::PROGRESS_INTERVAL)]
    progress_interval: u64,

    /// Keep worker fragments after merging
    #[arg(long)]
    keep_temp_files: bool,

    /// Leave worker fragments unmerged
    #[arg(long)]
    skip_merging: bool,
}

#[derive(Args)]
struct OutputArgs {
    #[arg(long)]
    node: Option<PathBuf>,
    #[arg(long)]
    detailed_edge: Option<PathBuf>,
    #[arg(long)]
    minimal_edge: Option<PathBuf>,
    #[arg(long)]
    detailed_qual: Option<PathBuf>,
    #[arg(long)]
    minimal_qual: Option<PathBuf>,
    #[arg(long)]
    split_alias: Option<PathBuf>,
    #[arg(long)]
    split_en_alias: Option<PathBuf>,
    #[arg(long)]
    split_datatype: Option<PathBuf>,
    #[arg(long)]
    split_description: Option<PathBuf>,
    #[arg(long)]
    split_en_description: Option<PathBuf>,
    #[arg(long)]
    split_label: Option<PathBuf>,
    #[arg(long)]
    split_en_label: Option<PathBuf>,
    #[arg(long)]
    split_sitelink: Option<PathBuf>,
    #[arg(long)]
    split_en_sitelink: Option<PathBuf>,
    #[arg(long)]
    split_type: Option<PathBuf>,
    /// Claim edges whose subject is a property
    #[arg(long)]
    split_property_edge: Option<PathBuf>,
    /// Qualifiers on claims whose subject is a property
    #[arg(long)]
    split_property_qual: Option<PathBuf>,
}

impl OutputArgs {
    fn into_pairs(self) -> Vec<(Relation, Option<PathBuf>)> {
        vec![
            (Relation::Node, self.node),
            (Relation::DetailedEdge, self.detailed_edge),
            (Relation::MinimalEdge, self.minimal_edge),
            (Relation::DetailedQualifier, self.detailed_qual),
            (Relation::MinimalQualifier, self.minimal_qual),
            (Relation::Alias, self.split_alias),
            (Relation::EnAlias, self.split_en_alias),
            (Relation::Datatype, self.split_datatype),
            (Relation::Description, self.split_description),
            (Relation::EnDescription, self.split_en_description),
            (Relation::Label, self.split_label),
            (Relation::EnLabel, self.split_en_label),
            (Relation::Sitelink, self.split_sitelink),
            (Relation::EnSitelink, self.split_en_sitelink),
            (Relation::EntityType, self.split_type),
            (Relation::PropertyEdge, self.split_property_edge),
            (Relation::PropertyQualifier, self.split_property_qual),
        ]
    }
}

#[derive(Args)]
struct ToggleArgs {
    /// Emit `type` edges
    #[arg(long)]
    entity_type_edges: bool,
    /// Emit `alias` edges
    #[arg(long)]
    alias_edges: bool,
    /// Emit `datatype` edges for properties
    #[arg(long)]
    datatype_edges: bool,
    /// Emit `description` edges
    #[arg(long)]
    description_edges: bool,
    /// Emit `label` edges
    #[arg(long)]
    label_edges: bool,
    /// Emit sitelink edges
    #[arg(long)]
    sitelink_edges: bool,
    /// Emit language/site/title/badge edges under each sitelink
    #[arg(long)]
    sitelink_verbose_edges: bool,
    /// Emit language/site/title/badge qualifiers under each sitelink
    #[arg(long)]
    sitelink_verbose_qualifiers: bool,

    #[arg(long)]
    skip_labels: bool,
    #[arg(long)]
    skip_descriptions: bool,
    #[arg(long)]
    skip_aliases: bool,
    #[arg(long)]
    skip_sitelinks: bool,
    #[arg(long)]
    skip_claims: bool,

    /// Warn instead of failing when a record lacks labels, descriptions, aliases or claims
    #[arg(long)]
    no_fail_if_missing: bool,
    /// Do not log missing data
    #[arg(long)]
    no_warn_if_missing: bool,
    /// Fail on claims whose type is not "statement"
    #[arg(long)]
    strict_claim_types: bool,
}

#[derive(Args)]
struct MergeArgs {
    /// Final output path; fragments are <output>_header, <output>_0, ...
    #[arg(short, long)]
    output: PathBuf,

    /// Number of worker fragments (detected when omitted)
    #[arg(long)]
    workers: Option<usize>,

    /// Keep the fragments after merging
    #[arg(long)]
    keep: bool,
}

fn import_options(args: ImportArgs) -> ImportOptions {
    let mut options = ImportOptions {
        workers: args.workers,
        mapper_queue_depth: args.mapper_queue_depth,
        mapper_batch_size: args.mapper_batch_size,
        single_mapper_queue: args.single_mapper_queue,
        collector_mode: args.collector_mode.into(),
        collector_batch_size: args.collector_batch_size,
        collector_queue_per_worker: args.collector_queue_per_worker,
        languages: if args.all_languages {
            LanguageSelection::All
        } else {
            LanguageSelection::parse(&args.languages)
        },
        include_deprecated: args.include_deprecated,
        explode_values: !args.compact_values,
        node_id_only: args.node_id_only,
        interleave: args.interleave,
        strict_claim_types: args.toggles.strict_claim_types,
        limit: args.limit,
        progress_interval: args.progress_interval,
        keep_temp_files: args.keep_temp_files,
        skip_merging: args.skip_merging,
        ..ImportOptions::default()
    };

    let toggles = args.toggles;
    options.edges.entity_type = toggles.entity_type_edges;
    options.edges.alias = toggles.alias_edges;
    options.edges.datatype = toggles.datatype_edges;
    options.edges.description = toggles.description_edges;
    options.edges.label = toggles.label_edges;
    options.edges.sitelink = toggles.sitelink_edges;
    options.edges.sitelink_verbose = toggles.sitelink_verbose_edges;
    options.edges.sitelink_verbose_qualifiers = toggles.sitelink_verbose_qualifiers;
    options.parse.labels = !toggles.skip_labels;
    options.parse.descriptions = !toggles.skip_descriptions;
    options.parse.aliases = !toggles.skip_aliases;
    options.parse.sitelinks = !toggles.skip_sitelinks;
    options.parse.claims = !toggles.skip_claims;
    options.missing.fail = !toggles.no_fail_if_missing;
    options.missing.warn = !toggles.no_warn_if_missing;

    for (relation, path) in args.outputs.into_pairs() {
        if let Some(path) = path {
            options.outputs.insert(relation, path);
        }
    }
    options
}

fn run_import(args: ImportArgs) -> Result<()> {
    let input = args.input.clone();
    let options = import_options(args);
    let summary = dispatch::run_import(&input, &options)?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &ImportSummary) {
    let stats = &summary.stats;
    println!();
    println!("=== Summary ===");
    println!("Total time:         {:.2}s", summary.elapsed.as_secs_f64());
    println!();
    println!("Lines read:         {}", stats.lines_read);
    println!("Records processed:  {}", stats.records_processed);
    println!("Records filtered:   {}", stats.records_filtered);
    println!("Records skipped:    {}", stats.records_skipped);
    println!("Node rows:          {}", stats.node_rows);
    println!("Edge rows:          {}", stats.edge_rows);
    println!("Qualifier rows:     {}", stats.qualifier_rows);
    println!("Missing fields:     {}", stats.missing_fields);
    println!("Odd claim types:    {}", stats.unexpected_claim_types);
    println!("Batches sent:       {}", stats.batches_sent);
    if !summary.rows.is_empty() {
        println!();
        for (relation, rows) in &summary.rows {
            println!("{:<20}{}", format!("{}:", relation.name()), rows);
        }
    }
}

fn run_merge(args: MergeArgs) -> Result<()> {
    let start = Instant::now();
    let workers = match args.workers {
        Some(workers) => workers,
        None => merge::detect_fragment_count(&args.output)?,
    };
    info!(workers, path = %args.output.display(), "Merging fragments");
    let rows = merge::merge_fragments(&args.output, workers, !args.keep)?;

    println!();
    println!("=== Summary ===");
    println!("Merge time:         {:.2}s", start.elapsed().as_secs_f64());
    println!("Fragments merged:   {}", workers);
    println!("Rows written:       {}", rows);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Import(args) => run_import(*args),
        Commands::Merge(args) => run_merge(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
