pub mod courses;
pub mod escape;
pub mod programs;
pub mod table;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ExtractConfig;
use crate::error::Result;
use crate::fetcher::Fetch;
use crate::intermediate;

/// Scrape programs and write `programs.json`. Nothing is written on failure.
pub async fn run_programs(fetcher: &dyn Fetch, cfg: &ExtractConfig) -> Result<PathBuf> {
    let programs = programs::extract_programs(fetcher, cfg).await?;
    intermediate::write_programs(&cfg.output_dir, &programs)
}

/// Scrape courses and write `courses.json`. Nothing is written on failure.
pub async fn run_courses(fetcher: Arc<dyn Fetch>, cfg: &ExtractConfig) -> Result<PathBuf> {
    let courses = courses::extract_courses(fetcher, cfg).await?;
    intermediate::write_courses(&cfg.output_dir, &courses)
}
