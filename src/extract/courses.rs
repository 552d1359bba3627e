use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::escape::decode_escapes;
use super::table::{data_rows, tail_segments};
use crate::config::ExtractConfig;
use crate::error::{CatalogError, Result};
use crate::fetcher::Fetch;
use crate::models::{CategoryIndex, Course, CourseDetail, CourseEntry};

const CATEGORY_COL: usize = 0;
const DATA_ENDPOINT: &str = "/jcr:content/content/rescalendarcoursestack.data.1.json";

/// A course category row: display name plus the JSON index endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLink {
    pub name: String,
    pub data_path: String,
}

/// One leaf of the fetch tree.
#[derive(Debug, Clone)]
struct DetailJob {
    category_idx: usize,
    category: String,
    entry: CourseEntry,
}

pub fn parse_categories(html: &str) -> Result<Vec<CategoryLink>> {
    data_rows(html)
        .iter()
        .map(|row| {
            let link = row.link(CATEGORY_COL)?;
            let name = link.text.split('(').next().unwrap_or_default().trim();
            let page = link.href.split(".html").next().unwrap_or_default();
            Ok(CategoryLink {
                name: name.to_string(),
                data_path: format!("{}{}", page, DATA_ENDPOINT),
            })
        })
        .collect()
}

/// Listing → category indexes → course details. The first failure anywhere
/// aborts the cascade and nothing is returned.
pub async fn extract_courses(fetcher: Arc<dyn Fetch>, cfg: &ExtractConfig) -> Result<Vec<Course>> {
    let path = cfg.courses_path();
    info!("Fetching courses listing: {}", path);
    let html = fetcher.fetch_html(&path).await?;
    let categories = parse_categories(&html)?;
    info!("Found {} course categories", categories.len());

    let mut jobs = Vec::new();
    let mut per_category = vec![0usize; categories.len()];
    for (idx, category) in categories.iter().enumerate() {
        let value = fetcher.fetch_json(&category.data_path).await?;
        let index: CategoryIndex = serde_json::from_value(value)
            .map_err(|e| CatalogError::parse(category.data_path.clone(), e.to_string()))?;
        debug!("[application] category {} lists {} courses", category.name, index.data.len());
        per_category[idx] = index.data.len();
        if index.data.is_empty() {
            info!("[application] category {} requests complete", category.name);
        }
        jobs.extend(index.data.into_iter().map(|entry| DetailJob {
            category_idx: idx,
            category: category.name.clone(),
            entry,
        }));
    }

    info!("Fetching {} course details (concurrency {})", jobs.len(), cfg.concurrency.max(1));
    let courses = fetch_details(fetcher, jobs, cfg.concurrency, per_category).await?;
    if cfg.verbose {
        for c in &courses {
            info!("[course] {} {} ({})", c.course_code, c.title, c.category);
        }
    }
    info!("Extracted {} courses", courses.len());
    Ok(courses)
}

async fn fetch_details(
    fetcher: Arc<dyn Fetch>,
    jobs: Vec<DetailJob>,
    concurrency: usize,
    mut remaining: Vec<usize>,
) -> Result<Vec<Course>> {
    let total = jobs.len();
    let pb = progress_bar(total);

    if concurrency <= 1 {
        let mut courses = Vec::with_capacity(total);
        for job in &jobs {
            courses.push(fetch_course(fetcher.as_ref(), job).await?);
            pb.inc(1);
            mark_done(&mut remaining, job);
        }
        pb.finish_and_clear();
        return Ok(courses);
    }

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let cancel = CancellationToken::new();
    let mut set = JoinSet::new();

    for (slot, job) in jobs.iter().cloned().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let sem = Arc::clone(&semaphore);
        let cancel = cancel.clone();

        set.spawn(async move {
            let _permit = tokio::select! {
                permit = sem.acquire_owned() => permit.map_err(|_| CatalogError::Cancelled)?,
                _ = cancel.cancelled() => return Err(CatalogError::Cancelled),
            };
            tokio::select! {
                res = fetch_course(fetcher.as_ref(), &job) => res.map(|course| (slot, course)),
                _ = cancel.cancelled() => Err(CatalogError::Cancelled),
            }
        });
    }

    let mut slots: Vec<Option<Course>> = vec![None; total];
    while let Some(joined) = set.join_next().await {
        let outcome = joined.unwrap_or_else(|e| Err(CatalogError::Task(e.to_string())));
        match outcome {
            Ok((slot, course)) => {
                slots[slot] = Some(course);
                pb.inc(1);
                mark_done(&mut remaining, &jobs[slot]);
            }
            Err(e) => {
                warn!("Course detail fetch failed, cancelling {} pending tasks", set.len());
                cancel.cancel();
                set.abort_all();
                while set.join_next().await.is_some() {}
                pb.abandon();
                return Err(e);
            }
        }
    }

    pb.finish_and_clear();
    Ok(slots.into_iter().flatten().collect())
}

async fn fetch_course(fetcher: &dyn Fetch, job: &DetailJob) -> Result<Course> {
    let url = &job.entry.data_url;
    let value = fetcher.fetch_json(url).await?;
    let detail: CourseDetail =
        serde_json::from_value(value).map_err(|e| CatalogError::parse(url.clone(), e.to_string()))?;

    Ok(Course {
        category: job.category.clone(),
        title: detail.long_title,
        description: decode_escapes(&detail.course_description),
        uri: tail_segments(&job.entry.page, 3),
        course_code: detail.course_code,
        alpha_code: detail.course_alpha_code,
        number_code: detail.course_number_code,
    })
}

fn mark_done(remaining: &mut [usize], job: &DetailJob) {
    let left = &mut remaining[job.category_idx];
    *left = left.saturating_sub(1);
    if *left == 0 {
        info!("[application] category {} requests complete", job.category);
    }
}

fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}
