use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};

use calendar_catalog::config::{
    EnvSettings, ExtractConfig, LoadConfig, YearRange, DEFAULT_CONCURRENCY, DEFAULT_OUTPUT_DIR,
    DEFAULT_YEAR,
};
use calendar_catalog::fetcher::{Fetch, HttpFetcher};
use calendar_catalog::{db, extract, loader};

#[derive(Parser)]
#[command(name = "catalog", about = "Academic calendar program/course scraper and loader")]
struct Cli {
    /// Debug-level logging for this crate
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Env file with CATALOG_* settings (default: .env if present)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ExtractArgs {
    /// Website year range iteration
    #[arg(long, default_value = DEFAULT_YEAR)]
    year: YearRange,
    /// Directory path of output destination
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    path: PathBuf,
    /// Calendar domain (overrides CATALOG_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,
    /// Retries for 429/5xx responses (0 = fail on first error)
    #[arg(long, default_value_t = 0)]
    retries: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the programs listing into programs.json
    Programs {
        #[command(flatten)]
        extract: ExtractArgs,
    },
    /// Scrape course categories and details into courses.json
    Courses {
        #[command(flatten)]
        extract: ExtractArgs,
        /// Concurrent course detail requests (1 = sequential)
        #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
    },
    /// Load programs.json and courses.json into the database
    Load {
        /// Directory path of json source files
        #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
        path: PathBuf,
        /// SQLite database path (overrides CATALOG_DATABASE_URL)
        #[arg(long)]
        database: Option<String>,
    },
    /// Scrape programs and courses, then load both
    Run {
        #[command(flatten)]
        extract: ExtractArgs,
        #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
        #[arg(long)]
        database: Option<String>,
    },
    /// Create the catalog tables
    Init {
        #[arg(long)]
        database: Option<String>,
    },
    /// Show row counts
    Stats {
        #[arg(long)]
        database: Option<String>,
    },
    /// Browse loaded programs or courses
    Overview {
        kind: OverviewKind,
        /// Faculty (programs) or category (courses) name
        #[arg(short, long)]
        filter: Option<String>,
        /// Case-insensitive match on name, title or course code
        #[arg(short, long)]
        search: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        #[arg(long)]
        database: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OverviewKind {
    Programs,
    Courses,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,calendar_catalog=debug,catalog=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let t0 = Instant::now();
    let env = EnvSettings::load(cli.env_file.as_deref())?;

    let result = match cli.command {
        Commands::Programs { extract: args } => {
            let cfg = extract_config(&env, args, 1, cli.verbose);
            let fetcher = HttpFetcher::new(&cfg.base_url, cfg.retries)?;
            let path = extract::run_programs(&fetcher, &cfg)
                .await
                .context("program extraction failed")?;
            println!("Programs written to {}", path.display());
            Ok(())
        }
        Commands::Courses { extract: args, concurrency } => {
            let cfg = extract_config(&env, args, concurrency, cli.verbose);
            let fetcher: Arc<dyn Fetch> = Arc::new(HttpFetcher::new(&cfg.base_url, cfg.retries)?);
            let path = extract::run_courses(fetcher, &cfg)
                .await
                .context("course extraction failed")?;
            println!("Courses written to {}", path.display());
            Ok(())
        }
        Commands::Load { path, database } => {
            let cfg = LoadConfig {
                database: env.database(database),
                source_dir: path,
                verbose: cli.verbose,
            };
            let s = loader::run(&cfg).context("catalog load failed")?;
            println!(
                "Loaded {} faculties, {} programs, {} categories, {} courses ({} refreshed) into {}.",
                s.faculties, s.programs, s.categories, s.courses, s.courses_refreshed, cfg.database
            );
            Ok(())
        }
        Commands::Run { extract: args, concurrency, database } => {
            let cfg = extract_config(&env, args, concurrency, cli.verbose);
            let load_cfg = LoadConfig {
                database: env.database(database),
                source_dir: cfg.output_dir.clone(),
                verbose: cli.verbose,
            };
            // Fail on bad credentials before any scraping
            drop(db::connect(&load_cfg.database)?);

            let fetcher: Arc<dyn Fetch> = Arc::new(HttpFetcher::new(&cfg.base_url, cfg.retries)?);

            let t_scrape = Instant::now();
            extract::run_programs(fetcher.as_ref(), &cfg)
                .await
                .context("program extraction failed")?;
            extract::run_courses(Arc::clone(&fetcher), &cfg)
                .await
                .context("course extraction failed")?;
            println!("Scraped in {:.1}s", t_scrape.elapsed().as_secs_f64());

            let s = loader::run(&load_cfg).context("catalog load failed")?;
            println!(
                "Loaded {} faculties, {} programs, {} categories, {} courses ({} refreshed).",
                s.faculties, s.programs, s.categories, s.courses, s.courses_refreshed
            );
            Ok(())
        }
        Commands::Init { database } => {
            let target = env.database(database);
            let conn = db::connect(&target)?;
            db::init_schema(&conn)?;
            println!("Schema ready in {}", target);
            Ok(())
        }
        Commands::Stats { database } => {
            let conn = db::connect(&env.database(database))?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Faculties:  {}", s.faculties);
            println!("Programs:   {}", s.programs);
            println!("Categories: {}", s.categories);
            println!("Courses:    {}", s.courses);
            match s.last_loaded {
                Some(t) => println!("Last load:  {}", t.format("%Y-%m-%d %H:%M")),
                None => println!("Last load:  never"),
            }
            Ok(())
        }
        Commands::Overview { kind, filter, search, limit, database } => {
            let conn = db::connect(&env.database(database))?;
            db::init_schema(&conn)?;
            print_overview(&conn, kind, filter.as_deref(), search.as_deref(), limit)
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", elapsed_label(elapsed));
    }

    result
}

fn extract_config(env: &EnvSettings, args: ExtractArgs, concurrency: usize, verbose: bool) -> ExtractConfig {
    ExtractConfig {
        year: args.year,
        output_dir: args.path,
        base_url: env.base_url(args.base_url),
        retries: args.retries,
        concurrency,
        verbose,
    }
}

fn print_overview(
    conn: &rusqlite::Connection,
    kind: OverviewKind,
    filter: Option<&str>,
    search: Option<&str>,
    limit: usize,
) -> anyhow::Result<()> {
    match kind {
        OverviewKind::Programs => {
            let rows = db::fetch_program_overview(conn, filter, search, limit)?;
            if rows.is_empty() {
                println!("No programs found.");
                return Ok(());
            }
            println!("{:>3} | {:<28} | {:<36} | {}", "#", "Faculty", "Program", "URI");
            println!("{}", "-".repeat(100));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<28} | {:<36} | {}",
                    i + 1,
                    clip(&r.faculty, 28),
                    clip(&r.name, 36),
                    r.uri
                );
            }
            println!("\n{} programs", rows.len());
        }
        OverviewKind::Courses => {
            let rows = db::fetch_course_overview(conn, filter, search, limit)?;
            if rows.is_empty() {
                println!("No courses found.");
                return Ok(());
            }
            println!("{:>3} | {:<10} | {:<40} | {:<24} | {}", "#", "Course", "Title", "Category", "URI");
            println!("{}", "-".repeat(110));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<10} | {:<40} | {:<24} | {}",
                    i + 1,
                    r.course,
                    clip(&r.title, 40),
                    clip(&r.category, 24),
                    r.uri
                );
            }
            println!("\n{} courses", rows.len());
        }
    }
    Ok(())
}

/// Cut to `width` chars, marking the cut with `...`.
fn clip(s: &str, width: usize) -> String {
    match s.char_indices().nth(width) {
        Some((end, _)) => format!("{}...", &s[..end]),
        None => s.to_string(),
    }
}

fn elapsed_label(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, _) => format!("{m}m {s}s"),
        _ => format!("{h}h {m}m {s}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_counts_chars_not_bytes() {
        assert_eq!(clip("Biology", 10), "Biology");
        assert_eq!(clip("Biology", 7), "Biology");
        assert_eq!(clip("Économie politique", 4), "Écon...");
    }

    #[test]
    fn elapsed_label_scales_units() {
        assert_eq!(elapsed_label(Duration::from_millis(2500)), "2.5s");
        assert_eq!(elapsed_label(Duration::from_secs(125)), "2m 5s");
        assert_eq!(elapsed_label(Duration::from_secs(3723)), "1h 2m 3s");
    }
}
