use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One row of the programs listing. Field names follow `programs.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    #[serde(rename = "program")]
    pub name: String,
    pub uri: String,
    pub faculty: String,
}

/// One course detail payload paired with its listing category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub category: String,
    pub title: String,
    pub description: String,
    pub uri: String,
    #[serde(rename = "course")]
    pub course_code: String,
    #[serde(rename = "alpha")]
    pub alpha_code: Option<String>,
    #[serde(rename = "code")]
    pub number_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Faculty {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CourseCategory {
    pub name: String,
}

/// Distinct faculty names in first-seen order.
pub fn faculties(programs: &[Program]) -> Vec<Faculty> {
    distinct(programs.iter().map(|p| p.faculty.as_str()))
        .map(|name| Faculty { name })
        .collect()
}

/// Distinct category names in first-seen order.
pub fn categories(courses: &[Course]) -> Vec<CourseCategory> {
    distinct(courses.iter().map(|c| c.category.as_str()))
        .map(|name| CourseCategory { name })
        .collect()
}

fn distinct<'a>(names: impl Iterator<Item = &'a str> + 'a) -> impl Iterator<Item = String> + 'a {
    let mut seen = HashSet::new();
    names.filter_map(move |n| seen.insert(n).then(|| n.to_string()))
}

// ── Calendar JSON payloads ──

/// Category index: `{data: [{dataURL, page, ...}]}`.
#[derive(Debug, Deserialize)]
pub struct CategoryIndex {
    pub data: Vec<CourseEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseEntry {
    #[serde(rename = "dataURL")]
    pub data_url: String,
    pub page: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDetail {
    pub long_title: String,
    pub course_description: String,
    pub course_code: String,
    #[serde(default)]
    pub course_alpha_code: Option<String>,
    #[serde(default)]
    pub course_number_code: Option<String>,
}
