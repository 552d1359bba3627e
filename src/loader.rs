use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::LoadConfig;
use crate::db;
use crate::error::Result;
use crate::intermediate;
use crate::models::{self, Course, Program};

/// Rows created by one load. Names and programs already stored are not
/// counted; refreshed courses are reported separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    pub faculties: usize,
    pub programs: usize,
    pub categories: usize,
    pub courses: usize,
    pub courses_refreshed: usize,
}

/// Connect, read both intermediate files, then load them in one transaction.
///
/// The connection is opened first so bad credentials fail before any work.
pub fn run(cfg: &LoadConfig) -> Result<LoadSummary> {
    let conn = db::connect(&cfg.database)?;
    db::init_schema(&conn)?;

    let programs = intermediate::read_programs(&cfg.source_dir)?;
    let courses = intermediate::read_courses(&cfg.source_dir)?;

    let summary = load_catalog(&conn, &programs, &courses)?;
    if cfg.verbose {
        let totals = db::get_stats(&conn)?;
        info!(
            "[database] totals: {} faculties, {} programs, {} categories, {} courses",
            totals.faculties, totals.programs, totals.categories, totals.courses
        );
    }
    info!("[database] connection closed");
    Ok(summary)
}

/// Faculties → programs → categories → courses, all-or-nothing.
///
/// Dropping the transaction on any early return rolls every phase back.
pub fn load_catalog(conn: &Connection, programs: &[Program], courses: &[Course]) -> Result<LoadSummary> {
    let tx = conn.unchecked_transaction()?;
    let before = db::get_stats(&tx)?;

    let faculties = models::faculties(programs);
    let faculty_ids = db::upsert_faculties(&tx, &faculties)?;
    debug!("[database] {} faculties resolved", faculty_ids.len());

    let new_programs = db::insert_programs(&tx, programs, &faculty_ids)?;
    info!(
        "[database] {} programs inserted ({} already present)",
        new_programs,
        programs.len() - new_programs
    );

    let categories = models::categories(courses);
    let category_ids = db::upsert_categories(&tx, &categories)?;
    debug!("[database] {} course categories resolved", category_ids.len());

    let writes = db::upsert_courses(&tx, courses, &category_ids)?;
    info!(
        "[database] {} courses inserted ({} refreshed)",
        writes.inserted, writes.refreshed
    );

    let after = db::get_stats(&tx)?;
    tx.commit()?;
    info!("[database] transaction committed with no issues");

    Ok(LoadSummary {
        faculties: after.faculties - before.faculties,
        programs: new_programs,
        categories: after.categories - before.categories,
        courses: writes.inserted,
        courses_refreshed: writes.refreshed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CatalogError, Violation};

    fn memory() -> Connection {
        let conn = db::connect(":memory:").unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn program(faculty: &str, name: &str, uri: &str) -> Program {
        Program {
            name: name.into(),
            uri: uri.into(),
            faculty: faculty.into(),
        }
    }

    fn course(category: &str, code: &str, title: &str) -> Course {
        Course {
            category: category.into(),
            title: title.into(),
            description: format!("{} description", title),
            uri: format!("/courses/{}", code.to_lowercase().replace(' ', "")),
            course_code: code.into(),
            alpha_code: code.split(' ').next().map(String::from),
            number_code: code.split(' ').nth(1).map(String::from),
        }
    }

    fn sample_programs() -> Vec<Program> {
        vec![
            program("Science", "Biology", "/programs/biology"),
            program("Arts", "History", "/programs/history"),
        ]
    }

    fn sample_courses() -> Vec<Course> {
        vec![
            course("Biology", "BLG 143", "Biology I"),
            course("Biology", "BLG 144", "Biology II"),
            course("History", "HST 110", "World History"),
        ]
    }

    fn table_count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn programs_point_at_their_faculty_rows() {
        let conn = memory();
        let summary = load_catalog(&conn, &sample_programs(), &[]).unwrap();
        assert_eq!(summary.faculties, 2);
        assert_eq!(summary.programs, 2);

        let mut stmt = conn
            .prepare(
                "SELECT f.name, p.name FROM programs p JOIN faculties f ON f.id = p.faculty_id
                 ORDER BY p.id",
            )
            .unwrap();
        let pairs: Vec<(String, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(
            pairs,
            vec![
                ("Science".to_string(), "Biology".to_string()),
                ("Arts".to_string(), "History".to_string()),
            ]
        );
    }

    #[test]
    fn one_faculty_row_per_distinct_name() {
        let conn = memory();
        let programs = vec![
            program("Science", "Biology", "/programs/biology"),
            program("Science", "Chemistry", "/programs/chemistry"),
            program("Science", "Physics", "/programs/physics"),
            program("Arts", "History", "/programs/history"),
        ];
        load_catalog(&conn, &programs, &sample_courses()).unwrap();
        assert_eq!(table_count(&conn, "faculties"), 2);
        assert_eq!(table_count(&conn, "programs"), 4);
        assert_eq!(table_count(&conn, "course_categories"), 2);
        assert_eq!(table_count(&conn, "courses"), 3);
    }

    #[test]
    fn failure_in_course_phase_rolls_back_everything() {
        let conn = memory();
        conn.execute_batch(
            "CREATE TRIGGER reject_course BEFORE INSERT ON courses
             WHEN NEW.course = 'HST 110'
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
        )
        .unwrap();

        let err = load_catalog(&conn, &sample_programs(), &sample_courses()).unwrap_err();
        assert!(matches!(err, CatalogError::Database(_)));
        assert_empty(&conn);
    }

    #[test]
    fn rerun_merges_instead_of_failing() {
        let conn = memory();
        load_catalog(&conn, &sample_programs(), &sample_courses()).unwrap();

        let mut courses = sample_courses();
        courses[0].title = "Biology I (revised)".into();
        let summary = load_catalog(&conn, &sample_programs(), &courses).unwrap();
        assert_eq!(
            summary,
            LoadSummary { faculties: 0, programs: 0, categories: 0, courses: 0, courses_refreshed: 3 }
        );

        assert_eq!(table_count(&conn, "faculties"), 2);
        assert_eq!(table_count(&conn, "programs"), 2);
        assert_eq!(table_count(&conn, "courses"), 3);
        let title: String = conn
            .query_row("SELECT title FROM courses WHERE course = 'BLG 143'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(title, "Biology I (revised)");
    }

    fn assert_empty(conn: &Connection) {
        for table in ["faculties", "programs", "course_categories", "courses"] {
            assert_eq!(table_count(conn, table), 0, "{} should be empty", table);
        }
    }

    #[test]
    fn summary_matches_stored_rows() {
        let conn = memory();
        let summary = load_catalog(&conn, &sample_programs(), &sample_courses()).unwrap();
        let stats = db::get_stats(&conn).unwrap();
        assert_eq!(
            (summary.faculties, summary.programs, summary.categories, summary.courses),
            (stats.faculties, stats.programs, stats.categories, stats.courses)
        );
    }

    #[test]
    fn repeated_program_in_input_rolls_back() {
        let conn = memory();
        let mut programs = sample_programs();
        programs.push(programs[0].clone());

        let err = load_catalog(&conn, &programs, &sample_courses()).unwrap_err();
        match err {
            CatalogError::Integrity { entity, violation } => {
                assert_eq!(violation, Violation::Duplicate);
                assert!(entity.contains("Biology"), "{}", entity);
            }
            other => panic!("expected integrity error, got {other}"),
        }
        assert_empty(&conn);
    }

    #[test]
    fn repeated_course_code_in_input_rolls_back() {
        let conn = memory();
        let mut courses = sample_courses();
        let mut clash = course("Biology", "BLG 143", "Biology I (honours)");
        clash.uri = "/courses/blg/blg143h".into();
        courses.push(clash);

        let err = load_catalog(&conn, &sample_programs(), &courses).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Integrity { violation: Violation::Duplicate, .. }
        ));
        assert_empty(&conn);
    }

    #[test]
    fn run_reads_files_and_commits() {
        let dir = tempfile::tempdir().unwrap();
        intermediate::write_programs(dir.path(), &sample_programs()).unwrap();
        intermediate::write_courses(dir.path(), &sample_courses()).unwrap();
        let db_path = dir.path().join("db/catalog.sqlite");

        let cfg = LoadConfig {
            database: db_path.to_string_lossy().into_owned(),
            source_dir: dir.path().to_path_buf(),
            verbose: true,
        };
        let summary = run(&cfg).unwrap();
        assert_eq!(
            summary,
            LoadSummary { faculties: 2, programs: 2, categories: 2, courses: 3, courses_refreshed: 0 }
        );

        let conn = db::connect(&cfg.database).unwrap();
        assert_eq!(db::get_stats(&conn).unwrap().courses, 3);
    }

    #[test]
    fn missing_courses_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        intermediate::write_programs(dir.path(), &sample_programs()).unwrap();
        let cfg = LoadConfig {
            database: dir.path().join("catalog.sqlite").to_string_lossy().into_owned(),
            source_dir: dir.path().to_path_buf(),
            verbose: false,
        };
        assert!(matches!(run(&cfg), Err(CatalogError::Io { .. })));

        let conn = db::connect(&cfg.database).unwrap();
        assert_eq!(table_count(&conn, "programs"), 0);
    }
}
