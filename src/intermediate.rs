use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::error::{CatalogError, Result};
use crate::models::{Course, Program};

pub const PROGRAMS_FILE: &str = "programs.json";
pub const COURSES_FILE: &str = "courses.json";

pub fn write_programs(dir: &Path, programs: &[Program]) -> Result<PathBuf> {
    write_records(&dir.join(PROGRAMS_FILE), programs)
}

pub fn write_courses(dir: &Path, courses: &[Course]) -> Result<PathBuf> {
    write_records(&dir.join(COURSES_FILE), courses)
}

pub fn read_programs(dir: &Path) -> Result<Vec<Program>> {
    read_records(&dir.join(PROGRAMS_FILE))
}

pub fn read_courses(dir: &Path) -> Result<Vec<Course>> {
    read_records(&dir.join(COURSES_FILE))
}

/// Serialize to `<path>.tmp` and rename over `path`, so readers never see a
/// half-written file.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
    }

    let json = serde_json::to_vec(records).map_err(|source| CatalogError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| CatalogError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| CatalogError::io(path, e))?;

    info!("[file] {} records written to {}", records.len(), path.display());
    Ok(path.to_path_buf())
}

pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let bytes = fs::read(path).map_err(|e| CatalogError::io(path, e))?;
    let records: Vec<T> = serde_json::from_slice(&bytes).map_err(|source| CatalogError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    info!("[file] loaded {} ({} records)", path.display(), records.len());
    Ok(records)
}
