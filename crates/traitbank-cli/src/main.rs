//! TraitBank CLI
//!
//! Command-line interface to the graph trait store:
//! - Term searches (records, page lists, counts)
//! - Aggregates (object-term counts, measurement histograms)
//! - Branch painting (directives, qc, infer, paint, count, clean, load)
//! - Bulk CSV ingestion for a resource's trait and metadata files
//!
//! The store endpoint and token come from `TRAITBANK_SERVER` and
//! `TRAITBANK_TOKEN`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use traitbank_client::{GraphConnector, HttpConnector};
use traitbank_core::{SortDir, SortField, TermFilter};
use traitbank_painter::{Painter, StopPolicy};
use traitbank_query::load::{meta_file_config, trait_file_config, LoadStatement};
use traitbank_query::term_search::term_search_query;
use traitbank_stats::Stats;

#[derive(Parser)]
#[command(name = "traitbank")]
#[command(author, version, about = "TraitBank: graph trait store tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search traits by predicate/object term, with paging and sorting.
    TermSearch(FilterArgs),

    /// Aggregates over term searches.
    Stats {
        #[command(subcommand)]
        command: StatsCommands,
    },

    /// List a resource's start/stop directives.
    Directives(ResourceArgs),

    /// Check directives without changing anything.
    Qc(ResourceArgs),

    /// Dry-run branch painting; reports the net inferred set.
    Infer(PaintArgs),

    /// Branch painting for real: merge and retract inferred-trait edges.
    Paint(PaintArgs),

    /// Count a resource's inferred-trait edges.
    Count(ResourceArgs),

    /// Delete all of a resource's inferred-trait edges.
    Clean(ResourceArgs),

    /// Load a tab-separated directives file (page, stop, start, comment).
    Load {
        #[command(flatten)]
        resource: ResourceArgs,
        /// Directives TSV file
        file: PathBuf,
    },

    /// Ingest a resource's published trait/metadata CSV files.
    Slurp {
        #[command(flatten)]
        resource: ResourceArgs,
        /// Base URL the store fetches the CSV files from
        #[arg(long)]
        base_url: String,
        /// Print the statements instead of running them
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum StatsCommands {
    /// Top object terms for a categorical predicate.
    ObjCounts {
        #[command(flatten)]
        filter: FilterArgs,
        /// Number of terms to return
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Measurement distribution for a numeric predicate.
    Histogram {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Record and page totals for a search.
    Counts {
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Predicate term URI (repeatable)
    #[arg(long)]
    predicate: Vec<String>,
    /// Object term URI (repeatable)
    #[arg(long)]
    object_term: Vec<String>,
    /// Restrict to a page and its descendants
    #[arg(long)]
    clade: Option<i64>,
    /// Lower bound on the normalized measurement
    #[arg(long)]
    min: Option<f64>,
    /// Upper bound on the normalized measurement
    #[arg(long)]
    max: Option<f64>,
    /// Sort by measurement instead of the default keys
    #[arg(long)]
    sort_measurement: bool,
    /// Sort descending
    #[arg(long)]
    desc: bool,
    /// 1-based page number
    #[arg(long)]
    page: Option<u32>,
    /// Page size
    #[arg(long)]
    per: Option<u32>,
    /// Count matches instead of returning them
    #[arg(long)]
    count: bool,
    /// Return distinct pages only
    #[arg(long)]
    page_list: bool,
    /// Include metadata qualifiers
    #[arg(long)]
    meta: bool,
}

impl FilterArgs {
    fn to_filter(&self) -> TermFilter {
        TermFilter {
            predicate: self.predicate.clone(),
            object_term: self.object_term.clone(),
            clade: self.clade,
            min: self.min,
            max: self.max,
            sort: if self.sort_measurement {
                SortField::Measurement
            } else {
                SortField::Default
            },
            sort_dir: if self.desc { SortDir::Desc } else { SortDir::Asc },
            page: self.page,
            per: self.per,
            count: self.count,
            page_list: self.page_list,
            meta: self.meta,
        }
    }
}

#[derive(Args)]
struct ResourceArgs {
    /// Resource id
    #[arg(long)]
    resource: i64,
}

#[derive(Args)]
struct PaintArgs {
    #[command(flatten)]
    resource: ResourceArgs,
    /// Directory for the phase CSV files
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,
    /// Rows per bulk window
    #[arg(long, default_value_t = 10_000)]
    page_size: u32,
    /// Keep the inferred trait on the stop page itself
    #[arg(long)]
    exclusive_stops: bool,
}

impl PaintArgs {
    fn painter<'a>(&self, conn: &'a HttpConnector) -> Painter<'a, HttpConnector> {
        let policy = if self.exclusive_stops {
            StopPolicy::Exclusive
        } else {
            StopPolicy::Inclusive
        };
        Painter::new(conn, self.resource.resource, &self.work_dir)
            .stop_policy(policy)
            .page_size(self.page_size)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let conn = HttpConnector::from_env().context("connecting to the trait store")?;

    match cli.command {
        Commands::TermSearch(args) => cmd_term_search(&conn, &args.to_filter()),
        Commands::Stats { command } => match command {
            StatsCommands::ObjCounts { filter, limit } => {
                cmd_obj_counts(&conn, &filter.to_filter(), limit)
            }
            StatsCommands::Histogram { filter } => cmd_histogram(&conn, &filter.to_filter()),
            StatsCommands::Counts { filter } => cmd_counts(&conn, &filter.to_filter()),
        },
        Commands::Directives(args) => cmd_directives(&conn, args.resource),
        Commands::Qc(args) => cmd_qc(&conn, args.resource),
        Commands::Infer(args) => cmd_paint(&args.painter(&conn), false),
        Commands::Paint(args) => cmd_paint(&args.painter(&conn), true),
        Commands::Count(args) => cmd_edge_count(&conn, args.resource),
        Commands::Clean(args) => cmd_clean(&conn, args.resource),
        Commands::Load { resource, file } => cmd_load(&conn, resource.resource, &file),
        Commands::Slurp { resource, base_url, dry_run } => {
            cmd_slurp(&conn, resource.resource, &base_url, dry_run)
        }
    }
}

fn cmd_term_search(conn: &HttpConnector, filter: &TermFilter) -> Result<()> {
    let query = term_search_query(filter).context("rendering term search")?;
    let results = conn.run(&query)?;

    if filter.count {
        println!("{}", results.single_count().unwrap_or(0));
        return Ok(());
    }
    if filter.page_list {
        for page_id in traitbank_client::normalize::page_ids(&results)? {
            println!("{page_id}");
        }
        return Ok(());
    }
    let records = traitbank_client::normalize::build_trait_records(&results)?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    eprintln!("{} {} records", "found".green().bold(), records.len());
    Ok(())
}

fn cmd_counts(conn: &HttpConnector, filter: &TermFilter) -> Result<()> {
    let counts = Stats::new(conn).term_search_counts(filter)?;
    println!("{counts}");
    Ok(())
}

fn cmd_obj_counts(conn: &HttpConnector, filter: &TermFilter, limit: usize) -> Result<()> {
    let stats = Stats::new(conn);
    let record_count = stats.term_search_counts(filter)?.records;
    let rows = stats.obj_counts(filter, record_count, limit)?;
    for row in &rows {
        println!("{}\t{}\t{}", row.count, row.term.display_name(), row.term.uri);
    }
    eprintln!("{} {} object terms", "found".green().bold(), rows.len());
    Ok(())
}

fn cmd_histogram(conn: &HttpConnector, filter: &TermFilter) -> Result<()> {
    let stats = Stats::new(conn);
    let record_count = stats.term_search_counts(filter)?.records;
    let buckets = stats.histogram(filter, record_count)?;
    let unit = buckets.first().map(|b| b.unit.as_str()).unwrap_or("");
    for b in &buckets {
        println!(
            "{}\t{:.4}\t{:.4}\t{}",
            b.index,
            b.min,
            b.min + b.width,
            b.count
        );
    }
    eprintln!(
        "{} {} buckets ({})",
        "built".green().bold(),
        buckets.len(),
        if unit.is_empty() { "unitless" } else { unit }
    );
    Ok(())
}

fn cmd_directives(conn: &HttpConnector, resource: i64) -> Result<()> {
    let painter = Painter::new(conn, resource, ".");
    for d in painter.directives()? {
        println!("{}\t{}\t{}\t{}", d.kind.tag(), d.page_id, d.trait_pk, d.key);
    }
    Ok(())
}

fn cmd_qc(conn: &HttpConnector, resource: i64) -> Result<()> {
    let painter = Painter::new(conn, resource, ".");
    let findings = painter.qc()?;
    if findings.is_empty() {
        eprintln!("{} directives check out", "ok".green().bold());
        return Ok(());
    }
    for finding in &findings {
        println!("{} {finding}", "finding".yellow().bold());
    }
    Ok(())
}

fn cmd_paint<C: GraphConnector>(painter: &Painter<'_, C>, mutate: bool) -> Result<()> {
    let summary = if mutate { painter.paint()? } else { painter.infer()? };
    for (page_id, trait_pk) in &summary.net {
        println!("{page_id}\t{trait_pk}");
    }
    eprintln!(
        "{} asserted {}, retracted {}, net {}",
        if mutate { "painted" } else { "inferred" }.green().bold(),
        summary.asserted,
        summary.retracted,
        summary.net.len()
    );
    Ok(())
}

fn cmd_edge_count(conn: &HttpConnector, resource: i64) -> Result<()> {
    let painter = Painter::new(conn, resource, ".");
    println!("{}", painter.count()?);
    Ok(())
}

fn cmd_clean(conn: &HttpConnector, resource: i64) -> Result<()> {
    let painter = Painter::new(conn, resource, ".");
    let removed = painter.clean()?;
    eprintln!("{} {} inferred edges", "removed".green().bold(), removed);
    Ok(())
}

fn cmd_load(conn: &HttpConnector, resource: i64, file: &PathBuf) -> Result<()> {
    let painter = Painter::new(conn, resource, ".");
    let report = painter
        .load_directives(file)
        .with_context(|| format!("loading {}", file.display()))?;
    eprintln!("{} {} directives", "merged".green().bold(), report.added);
    for key in &report.failed {
        eprintln!("{} {key}", "skipped".yellow().bold());
    }
    Ok(())
}

fn cmd_slurp(conn: &HttpConnector, resource: i64, base_url: &str, dry_run: bool) -> Result<()> {
    let statements: Vec<LoadStatement> = trait_file_config(resource)
        .statements(base_url)
        .into_iter()
        .chain(meta_file_config(resource).statements(base_url))
        .collect();

    if dry_run {
        for s in &statements {
            println!("{};", s.text());
        }
        return Ok(());
    }

    let mut merges_skipped = 0usize;
    for s in &statements {
        match s {
            LoadStatement::NodeBuild(q) => {
                conn.run(q).context("node build failed")?;
            }
            // Relationship merges reference rows that may not have built a
            // node under this filter clause; those failures are expected.
            LoadStatement::EdgeMerge(q) => {
                if let Err(e) = conn.run(q) {
                    tracing::warn!(%e, "edge merge skipped");
                    merges_skipped += 1;
                }
            }
        }
    }
    eprintln!(
        "{} {} statements ({} merges skipped)",
        "ran".green().bold(),
        statements.len(),
        merges_skipped
    );
    Ok(())
}
