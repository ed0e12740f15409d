// ==========================================
// ReferenceImporter 集成测试
// ==========================================
// 测试目标: 附件包 → 解压 → 解析 → 外键解析 → upsert 的完整流程
// ==========================================


use reference_import::importer::{ImportError, ReferenceImporter};
use reference_import::logging;
use reference_import::repository::{DbSession, SqliteSession};
use rusqlite::OptionalExtension;
use std::fs;
use tempfile::TempDir;
use test_helpers::{
    count_rows, create_test_db, sample_config, write_sample_archive, write_zip, COUNTRIES_JSON,
    REGIONS_XML,
};

#[derive(Debug, PartialEq)]
struct CountryRow {
    name: String,
    region_id: Option<i64>,
    founded: Option<String>,
    eu_member: Option<i64>,
    languages: Option<String>,
}

fn find_country(session: &SqliteSession, code: &str) -> Option<CountryRow> {
    session
        .connection()
        .query_row(
            "SELECT name, region_id, founded, eu_member, languages FROM country WHERE code = ?1",
            [code],
            |row| {
                Ok(CountryRow {
                    name: row.get(0)?,
                    region_id: row.get(1)?,
                    founded: row.get(2)?,
                    eu_member: row.get(3)?,
                    languages: row.get(4)?,
                })
            },
        )
        .optional()
        .unwrap()
}

#[test]
fn test_import_archive_end_to_end() {
    logging::init_test();

    let (_db_file, db_path) = create_test_db().unwrap();
    let workspace = TempDir::new().unwrap();
    let archive = workspace.path().join("attachments.zip");
    write_sample_archive(&archive).unwrap();

    let mut session = SqliteSession::open(&db_path).unwrap();
    let mut importer = ReferenceImporter::new(sample_config());
    let outcome = importer
        .import_archive(&archive, &workspace.path().join("run"), "geo", &mut session)
        .unwrap();

    assert_eq!(
        outcome.processed_files,
        vec!["regions.xml".to_string(), "countries.json".to_string()]
    );
    assert!(outcome.skipped_files.is_empty());
    assert_eq!(count_rows(session.connection(), "region"), 2);
    assert_eq!(count_rows(session.connection(), "country"), 3);

    assert_eq!(
        find_country(&session, "AT"),
        Some(CountryRow {
            name: "Austria".to_string(),
            region_id: Some(1),
            founded: Some("1918-11-12".to_string()),
            eu_member: Some(1),
            languages: Some("de".to_string()),
        })
    );

    let japan = find_country(&session, "JP").unwrap();
    assert_eq!(japan.region_id, Some(2));
    assert_eq!(japan.founded.as_deref(), Some("1947-05-03"));
    assert_eq!(japan.eu_member, Some(0));

    // 外键未命中 → 列为 NULL，记录仍写入
    let nowhere = find_country(&session, "XX").unwrap();
    assert_eq!(nowhere.region_id, None);
    assert_eq!(nowhere.founded, None);

    // 时间戳自动补齐
    let modified: Option<String> = session
        .connection()
        .query_row("SELECT modified FROM region WHERE id = 1", [], |row| row.get(0))
        .unwrap();
    assert!(modified.is_some());
    assert!(!session.in_transaction());
}

#[test]
fn test_reimport_updates_existing_rows() {
    logging::init_test();

    let (_db_file, db_path) = create_test_db().unwrap();
    let workspace = TempDir::new().unwrap();
    let first = workspace.path().join("first.zip");
    write_sample_archive(&first).unwrap();

    let mut session = SqliteSession::open(&db_path).unwrap();
    let mut importer = ReferenceImporter::new(sample_config());
    importer
        .import_archive(&first, &workspace.path().join("run1"), "geo", &mut session)
        .unwrap();

    let renamed = COUNTRIES_JSON.replace("\"Austria\"", "\"Österreich\"");
    let second = workspace.path().join("second.zip");
    write_zip(
        &second,
        &[
            ("regions.xml", REGIONS_XML.as_bytes()),
            ("countries.json", renamed.as_bytes()),
        ],
    )
    .unwrap();
    importer
        .import_archive(&second, &workspace.path().join("run2"), "geo", &mut session)
        .unwrap();

    assert_eq!(count_rows(session.connection(), "region"), 2);
    assert_eq!(count_rows(session.connection(), "country"), 3);
    let austria = find_country(&session, "AT").unwrap();
    assert_eq!(austria.name, "Österreich");
    assert_eq!(austria.region_id, Some(1));
}

#[test]
fn test_unchanged_files_skipped_with_change_tracking() {
    logging::init_test();

    let (_db_file, db_path) = create_test_db().unwrap();
    let workspace = TempDir::new().unwrap();
    let cache = workspace.path().join("hashes.json");
    let archive = workspace.path().join("attachments.zip");
    write_sample_archive(&archive).unwrap();

    let mut session = SqliteSession::open(&db_path).unwrap();
    let mut importer = ReferenceImporter::new(sample_config()).with_change_tracking(&cache);

    let first = importer
        .import_archive(&archive, &workspace.path().join("run1"), "geo", &mut session)
        .unwrap();
    assert_eq!(first.processed_files.len(), 2);
    assert!(cache.exists());

    let second = importer
        .import_archive(&archive, &workspace.path().join("run2"), "geo", &mut session)
        .unwrap();
    assert!(second.processed_files.is_empty());
    assert_eq!(
        second.skipped_files,
        vec!["regions.xml".to_string(), "countries.json".to_string()]
    );

    // 只修改国家文件
    let changed = COUNTRIES_JSON.replace("\"Japan\"", "\"Nippon\"");
    let updated = workspace.path().join("updated.zip");
    write_zip(
        &updated,
        &[
            ("regions.xml", REGIONS_XML.as_bytes()),
            ("countries.json", changed.as_bytes()),
        ],
    )
    .unwrap();
    let third = importer
        .import_archive(&updated, &workspace.path().join("run3"), "geo", &mut session)
        .unwrap();
    assert_eq!(third.processed_files, vec!["countries.json".to_string()]);
    assert_eq!(third.skipped_files, vec!["regions.xml".to_string()]);
    assert_eq!(find_country(&session, "JP").unwrap().name, "Nippon");

    // 强制模式忽略摘要
    let mut forced = ReferenceImporter::new(sample_config())
        .with_change_tracking(&cache)
        .with_force(true);
    let fourth = forced
        .import_archive(&updated, &workspace.path().join("run4"), "geo", &mut session)
        .unwrap();
    assert_eq!(fourth.processed_files.len(), 2);
}

#[test]
fn test_failed_file_rolls_back_and_keeps_earlier_files() {
    logging::init_test();

    let (_db_file, db_path) = create_test_db().unwrap();
    let workspace = TempDir::new().unwrap();
    let cache = workspace.path().join("hashes.json");
    let archive = workspace.path().join("broken.zip");
    // 第二条缺少 name（NOT NULL），整个文件回滚
    let countries = r#"[
        {"code": "AT", "name": "Austria", "region": "EU"},
        {"code": "DE", "region": "EU"}
    ]"#;
    write_zip(
        &archive,
        &[
            ("regions.xml", REGIONS_XML.as_bytes()),
            ("countries.json", countries.as_bytes()),
        ],
    )
    .unwrap();

    let mut session = SqliteSession::open(&db_path).unwrap();
    let mut importer = ReferenceImporter::new(sample_config()).with_change_tracking(&cache);
    let err = importer
        .import_archive(&archive, &workspace.path().join("run"), "geo", &mut session)
        .unwrap_err();

    assert!(matches!(err, ImportError::Persistence { ref table, .. } if table == "country"));
    assert_eq!(count_rows(session.connection(), "region"), 2);
    assert_eq!(count_rows(session.connection(), "country"), 0);
    assert!(!session.in_transaction());

    // 失败文件未记录摘要，修复后会重新导入
    let cached = fs::read_to_string(&cache).unwrap();
    assert!(cached.contains("regions.xml"));
    assert!(!cached.contains("countries.json"));
}

#[test]
fn test_malformed_json_reports_parse_error() {
    logging::init_test();

    let (_db_file, db_path) = create_test_db().unwrap();
    let workspace = TempDir::new().unwrap();
    let archive = workspace.path().join("bad.zip");
    write_zip(
        &archive,
        &[
            ("regions.xml", REGIONS_XML.as_bytes()),
            ("countries.json", b"[{\"code\": \"AT\",}]".as_slice()),
        ],
    )
    .unwrap();

    let mut session = SqliteSession::open(&db_path).unwrap();
    let mut importer = ReferenceImporter::new(sample_config());
    let err = importer
        .import_archive(&archive, &workspace.path().join("run"), "geo", &mut session)
        .unwrap_err();

    assert!(matches!(err, ImportError::JsonParseError { .. }));
    assert_eq!(count_rows(session.connection(), "region"), 2);
    assert_eq!(count_rows(session.connection(), "country"), 0);
}

#[test]
fn test_unknown_import_type_is_configuration_error() {
    let (_db_file, db_path) = create_test_db().unwrap();
    let workspace = TempDir::new().unwrap();
    let archive = workspace.path().join("attachments.zip");
    write_sample_archive(&archive).unwrap();

    let mut session = SqliteSession::open(&db_path).unwrap();
    let mut importer = ReferenceImporter::new(sample_config());
    let err = importer
        .import_archive(&archive, &workspace.path().join("run"), "unknown", &mut session)
        .unwrap_err();

    assert!(matches!(err, ImportError::Configuration(_)));
    assert!(!workspace.path().join("run").exists());
}
