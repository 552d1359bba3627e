use tracing::{debug, info};

use super::table::{data_rows, tail_segments};
use crate::config::ExtractConfig;
use crate::error::Result;
use crate::fetcher::Fetch;
use crate::models::Program;

const FACULTY_COL: usize = 0;
const PROGRAM_COL: usize = 1;

/// Fetch the programs listing and return one record per table row.
pub async fn extract_programs(fetcher: &dyn Fetch, cfg: &ExtractConfig) -> Result<Vec<Program>> {
    let path = cfg.programs_path();
    info!("Fetching programs listing: {}", path);
    let html = fetcher.fetch_html(&path).await?;
    let programs = parse_programs(&html)?;
    if cfg.verbose {
        for p in &programs {
            info!("[program] {} / {} -> {}", p.faculty, p.name, p.uri);
        }
    }
    info!("Extracted {} programs", programs.len());
    Ok(programs)
}

/// Faculty from column 0, program link from column 1. Any malformed row fails
/// the whole listing.
pub fn parse_programs(html: &str) -> Result<Vec<Program>> {
    data_rows(html)
        .iter()
        .map(|row| {
            let link = row.link(PROGRAM_COL)?;
            let program = Program {
                name: link.text.clone(),
                uri: tail_segments(&link.href, 2),
                faculty: row.text(FACULTY_COL)?.to_string(),
            };
            debug!("[parse] row {}: {} / {}", row.index, program.faculty, program.name);
            Ok(program)
        })
        .collect()
}
