use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use tracing::debug;

use crate::error::{CatalogError, Result, Violation};
use crate::models::{Course, CourseCategory, Faculty, Program};

/// Natural key → surrogate id.
pub type IdLookup = HashMap<String, i64>;

pub fn connect(target: &str) -> Result<Connection> {
    let conn_err = |source| CatalogError::Connection {
        target: target.to_string(),
        source,
    };

    if target != ":memory:" {
        if let Some(parent) = Path::new(target).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
        }
    }

    let conn = Connection::open(target).map_err(conn_err)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .map_err(conn_err)?;
    debug!("[database] Connection established to {}", target);
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS faculties (
            id         INTEGER PRIMARY KEY,
            name       TEXT UNIQUE NOT NULL,
            date_added TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS programs (
            id         INTEGER PRIMARY KEY,
            faculty_id INTEGER NOT NULL REFERENCES faculties(id),
            name       TEXT NOT NULL,
            uri        TEXT NOT NULL,
            date_added TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(faculty_id, name, uri)
        );
        CREATE INDEX IF NOT EXISTS idx_programs_faculty ON programs(faculty_id);

        CREATE TABLE IF NOT EXISTS course_categories (
            id         INTEGER PRIMARY KEY,
            name       TEXT UNIQUE NOT NULL,
            date_added TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS courses (
            id          INTEGER PRIMARY KEY,
            category_id INTEGER NOT NULL REFERENCES course_categories(id),
            title       TEXT NOT NULL,
            description TEXT,
            uri         TEXT NOT NULL,
            course      TEXT NOT NULL,
            alpha       TEXT,
            code        TEXT,
            date_added  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(category_id, course)
        );
        CREATE INDEX IF NOT EXISTS idx_courses_category ON courses(category_id);
        CREATE INDEX IF NOT EXISTS idx_courses_course ON courses(course);
        ",
    )?;
    Ok(())
}

// ── Natural keys ──

pub fn upsert_faculties(conn: &Connection, faculties: &[Faculty]) -> Result<IdLookup> {
    upsert_names(conn, "faculties", faculties.iter().map(|f| f.name.as_str()))
}

pub fn upsert_categories(conn: &Connection, categories: &[CourseCategory]) -> Result<IdLookup> {
    upsert_names(conn, "course_categories", categories.iter().map(|c| c.name.as_str()))
}

/// Insert-or-touch each name and collect the id it ended up with, whether the
/// row is new or already existed.
fn upsert_names<'a>(
    conn: &Connection,
    table: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<IdLookup> {
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {table} (name) VALUES (?1)
         ON CONFLICT(name) DO UPDATE SET name = excluded.name
         RETURNING id, name"
    ))?;
    let mut lookup = IdLookup::new();
    for name in names {
        let (id, name): (i64, String) =
            stmt.query_row(rusqlite::params![name], |r| Ok((r.get(0)?, r.get(1)?)))?;
        lookup.insert(name, id);
    }
    Ok(lookup)
}

// ── Dependent rows ──

/// Returns the number of new program rows. Rows already stored by an earlier
/// load are left alone; the same program twice in one batch is an error.
pub fn insert_programs(conn: &Connection, programs: &[Program], faculties: &IdLookup) -> Result<usize> {
    reject_duplicates(programs, |p| (p.faculty.as_str(), p.name.as_str(), p.uri.as_str()), |p| {
        format!("program '{}' ({})", p.name, p.faculty)
    })?;

    let mut stmt = conn.prepare(
        "INSERT INTO programs (faculty_id, name, uri) VALUES (?1, ?2, ?3)
         ON CONFLICT(faculty_id, name, uri) DO NOTHING",
    )?;
    let mut count = 0;
    for p in programs {
        let faculty_id = resolve(faculties, &p.faculty, "faculty", || format!("program '{}'", p.name))?;
        count += stmt.execute(rusqlite::params![faculty_id, p.name, p.uri])?;
    }
    Ok(count)
}

/// Course rows touched by one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CourseWrites {
    pub inserted: usize,
    pub refreshed: usize,
}

/// Insert each course, refreshing rows stored by an earlier load. The same
/// (category, course code) twice in one batch is an error.
pub fn upsert_courses(conn: &Connection, courses: &[Course], categories: &IdLookup) -> Result<CourseWrites> {
    reject_duplicates(courses, |c| (c.category.as_str(), c.course_code.as_str()), |c| {
        format!("course '{}' ({})", c.course_code, c.category)
    })?;

    let mut stmt = conn.prepare(
        "INSERT INTO courses (category_id, title, description, uri, course, alpha, code)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(category_id, course) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            uri = excluded.uri,
            alpha = excluded.alpha,
            code = excluded.code",
    )?;
    let before = count_rows(conn, "courses")?;
    for c in courses {
        let category_id =
            resolve(categories, &c.category, "category", || format!("course '{}'", c.course_code))?;
        stmt.execute(rusqlite::params![
            category_id, c.title, c.description, c.uri, c.course_code, c.alpha_code, c.number_code,
        ])?;
    }
    let inserted = count_rows(conn, "courses")? - before;
    Ok(CourseWrites {
        inserted,
        refreshed: courses.len() - inserted,
    })
}

fn reject_duplicates<'a, T, K: Eq + Hash>(
    rows: &'a [T],
    key: impl Fn(&'a T) -> K,
    entity: impl Fn(&T) -> String,
) -> Result<()> {
    let mut seen = HashSet::with_capacity(rows.len());
    match rows.iter().find(|row| !seen.insert(key(*row))) {
        Some(row) => Err(CatalogError::Integrity {
            entity: entity(row),
            violation: Violation::Duplicate,
        }),
        None => Ok(()),
    }
}

fn resolve(
    lookup: &IdLookup,
    key: &str,
    kind: &'static str,
    entity: impl FnOnce() -> String,
) -> Result<i64> {
    lookup.get(key).copied().ok_or_else(|| CatalogError::Integrity {
        entity: entity(),
        violation: Violation::UnknownKey {
            kind,
            key: key.to_string(),
        },
    })
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
}

// ── Overview ──

pub struct ProgramOverviewRow {
    pub faculty: String,
    pub name: String,
    pub uri: String,
}

pub struct CourseOverviewRow {
    pub category: String,
    pub course: String,
    pub title: String,
    pub uri: String,
}

/// `(conditions, params)` for optional exact-match and case-insensitive search filters.
fn filters(
    exact: Option<(&str, &str)>,
    search: Option<(&[&str], &str)>,
) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    if let Some((column, value)) = exact {
        params.push(value.to_string());
        conditions.push(format!("{} = ?{}", column, params.len()));
    }
    if let Some((columns, value)) = search {
        params.push(format!("%{}%", value.to_lowercase()));
        let idx = params.len();
        let any: Vec<String> = columns
            .iter()
            .map(|c| format!("LOWER({}) LIKE ?{}", c, idx))
            .collect();
        conditions.push(format!("({})", any.join(" OR ")));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    (where_clause, params)
}

pub fn fetch_program_overview(
    conn: &Connection,
    faculty: Option<&str>,
    search: Option<&str>,
    limit: usize,
) -> Result<Vec<ProgramOverviewRow>> {
    let (where_clause, params) = filters(
        faculty.map(|f| ("f.name", f)),
        search.map(|s| (&["p.name"][..], s)),
    );
    let sql = format!(
        "SELECT f.name, p.name, p.uri
         FROM programs p
         JOIN faculties f ON f.id = p.faculty_id{}
         ORDER BY f.name, p.name
         LIMIT {}",
        where_clause, limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(ProgramOverviewRow {
                faculty: row.get(0)?,
                name: row.get(1)?,
                uri: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn fetch_course_overview(
    conn: &Connection,
    category: Option<&str>,
    search: Option<&str>,
    limit: usize,
) -> Result<Vec<CourseOverviewRow>> {
    let (where_clause, params) = filters(
        category.map(|c| ("cc.name", c)),
        search.map(|s| (&["c.title", "c.course"][..], s)),
    );
    let sql = format!(
        "SELECT cc.name, c.course, c.title, c.uri
         FROM courses c
         JOIN course_categories cc ON cc.id = c.category_id{}
         ORDER BY c.course
         LIMIT {}",
        where_clause, limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(CourseOverviewRow {
                category: row.get(0)?,
                course: row.get(1)?,
                title: row.get(2)?,
                uri: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub faculties: usize,
    pub programs: usize,
    pub categories: usize,
    pub courses: usize,
    pub last_loaded: Option<NaiveDateTime>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let last_loaded: Option<NaiveDateTime> = conn.query_row(
        "SELECT MAX(d) FROM (
            SELECT MAX(date_added) AS d FROM programs
            UNION ALL SELECT MAX(date_added) FROM courses
         )",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        faculties: count_rows(conn, "faculties")?,
        programs: count_rows(conn, "programs")?,
        categories: count_rows(conn, "course_categories")?,
        courses: count_rows(conn, "courses")?,
        last_loaded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        let conn = connect(":memory:").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn program(faculty: &str, name: &str) -> Program {
        Program {
            name: name.into(),
            uri: format!("/programs/{}", name.to_lowercase()),
            faculty: faculty.into(),
        }
    }

    fn course(category: &str, code: &str, title: &str) -> Course {
        Course {
            category: category.into(),
            title: title.into(),
            description: String::new(),
            uri: format!("/courses/{}", code.to_lowercase().replace(' ', "")),
            course_code: code.into(),
            alpha_code: None,
            number_code: None,
        }
    }

    #[test]
    fn schema_is_reentrant() {
        let conn = memory();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn upsert_returns_same_id_for_existing_name() {
        let conn = memory();
        let first = upsert_faculties(&conn, &[Faculty { name: "Arts".into() }]).unwrap();
        let second = upsert_faculties(
            &conn,
            &[Faculty { name: "Science".into() }, Faculty { name: "Arts".into() }],
        )
        .unwrap();
        assert_eq!(first["Arts"], second["Arts"]);
        assert_ne!(second["Arts"], second["Science"]);
        assert_eq!(get_stats(&conn).unwrap().faculties, 2);
    }

    #[test]
    fn unknown_faculty_is_integrity_error() {
        let conn = memory();
        let lookup = upsert_faculties(&conn, &[Faculty { name: "Arts".into() }]).unwrap();
        let err = insert_programs(&conn, &[program("Engineering", "Robotics")], &lookup).unwrap_err();
        match err {
            CatalogError::Integrity { violation, .. } => assert_eq!(
                violation,
                Violation::UnknownKey { kind: "faculty", key: "Engineering".into() }
            ),
            other => panic!("expected integrity error, got {other}"),
        }
    }

    #[test]
    fn programs_from_an_earlier_load_are_skipped() {
        let conn = memory();
        let lookup = upsert_faculties(&conn, &[Faculty { name: "Arts".into() }]).unwrap();
        assert_eq!(insert_programs(&conn, &[program("Arts", "History")], &lookup).unwrap(), 1);
        assert_eq!(insert_programs(&conn, &[program("Arts", "History")], &lookup).unwrap(), 0);
        assert_eq!(get_stats(&conn).unwrap().programs, 1);
    }

    #[test]
    fn overview_filters_and_searches() {
        let conn = memory();
        let lookup = upsert_faculties(
            &conn,
            &[Faculty { name: "Arts".into() }, Faculty { name: "Science".into() }],
        )
        .unwrap();
        insert_programs(
            &conn,
            &[
                program("Arts", "History"),
                program("Science", "Biology"),
                program("Science", "Biomedical Science"),
            ],
            &lookup,
        )
        .unwrap();

        let science = fetch_program_overview(&conn, Some("Science"), None, 50).unwrap();
        assert_eq!(science.len(), 2);
        let bio = fetch_program_overview(&conn, None, Some("BIO"), 50).unwrap();
        let names: Vec<_> = bio.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Biology", "Biomedical Science"]);
        assert_eq!(fetch_program_overview(&conn, None, None, 1).unwrap().len(), 1);
    }

    #[test]
    fn repeated_program_in_one_batch_is_integrity_error() {
        let conn = memory();
        let lookup = upsert_faculties(&conn, &[Faculty { name: "Arts".into() }]).unwrap();
        let history = program("Arts", "History");
        let err = insert_programs(&conn, &[history.clone(), history], &lookup).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Integrity { violation: Violation::Duplicate, .. }
        ));
        assert_eq!(get_stats(&conn).unwrap().programs, 0);
    }

    #[test]
    fn course_writes_split_new_and_refreshed_rows() {
        let conn = memory();
        let lookup = upsert_categories(&conn, &[CourseCategory { name: "Biology".into() }]).unwrap();
        let first = upsert_courses(&conn, &[course("Biology", "BLG 143", "Biology I")], &lookup).unwrap();
        assert_eq!(first, CourseWrites { inserted: 1, refreshed: 0 });

        let second = upsert_courses(
            &conn,
            &[course("Biology", "BLG 143", "Biology I"), course("Biology", "BLG 144", "Biology II")],
            &lookup,
        )
        .unwrap();
        assert_eq!(second, CourseWrites { inserted: 1, refreshed: 1 });
        assert_eq!(get_stats(&conn).unwrap().courses, 2);
    }

    #[test]
    fn course_overview_filters_and_searches() {
        let conn = memory();
        let lookup = upsert_categories(
            &conn,
            &[CourseCategory { name: "Biology".into() }, CourseCategory { name: "History".into() }],
        )
        .unwrap();
        upsert_courses(
            &conn,
            &[
                course("History", "HST 110", "World History"),
                course("Biology", "BLG 144", "Cell Biology"),
                course("Biology", "BLG 143", "Marine Ecology"),
                course("History", "HST 200", "Ecology and Empire"),
            ],
            &lookup,
        )
        .unwrap();

        let bio = fetch_course_overview(&conn, Some("Biology"), None, 50).unwrap();
        let codes: Vec<_> = bio.iter().map(|r| r.course.as_str()).collect();
        assert_eq!(codes, vec!["BLG 143", "BLG 144"]);
        assert!(bio.iter().all(|r| r.category == "Biology"));

        // code only: neither title contains "blg"
        let by_code = fetch_course_overview(&conn, None, Some("blg 14"), 50).unwrap();
        assert_eq!(by_code.len(), 2);

        // title only: "ecology" appears in no course code
        let by_title = fetch_course_overview(&conn, None, Some("ECOLOGY"), 50).unwrap();
        let titles: Vec<_> = by_title.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Marine Ecology", "Ecology and Empire"]);

        let scoped = fetch_course_overview(&conn, Some("History"), Some("ecology"), 50).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].course, "HST 200");

        let limited = fetch_course_overview(&conn, None, None, 3).unwrap();
        let codes: Vec<_> = limited.iter().map(|r| r.course.as_str()).collect();
        assert_eq!(codes, vec!["BLG 143", "BLG 144", "HST 110"]);
    }

    #[test]
    fn empty_database_stats() {
        let s = get_stats(&memory()).unwrap();
        assert_eq!((s.faculties, s.programs, s.categories, s.courses), (0, 0, 0, 0));
        assert!(s.last_loaded.is_none());
    }

    #[test]
    fn bad_database_path_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file
        let err = connect(dir.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, CatalogError::Connection { .. }));
    }
}
