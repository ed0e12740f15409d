// ==========================================
// ArchiveValidator 集成测试
// ==========================================
// 测试目标: 压缩包安全策略（压缩炸弹、目录穿越、白名单）
//           以及失败后目标目录无残留
// ==========================================


use reference_import::domain::SecurityPolicy;
use reference_import::importer::{ImportError, ValidationReason};
use reference_import::security::ArchiveValidator;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use test_helpers::write_zip;

/// 伪随机字节（几乎不可压缩）
fn noise(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x1234_5678;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}

fn reason(err: &ImportError) -> ValidationReason {
    err.validation_reason()
        .cloned()
        .unwrap_or_else(|| panic!("expected validation error, got {:?}", err))
}

fn assert_nothing_extracted(dest: &Path) {
    if dest.exists() {
        let leftovers: Vec<_> = fs::read_dir(dest).unwrap().collect();
        assert!(leftovers.is_empty(), "leftover entries: {:?}", leftovers);
    }
}

#[test]
fn test_compression_bomb_rejected() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("bomb.zip");
    let filler = vec![b' '; 1024 * 1024];
    write_zip(&archive, &[("bomb.xml", filler.as_slice())]).unwrap();

    let dest = dir.path().join("out");
    let err = ArchiveValidator::validate_and_extract(&archive, &dest, &SecurityPolicy::default())
        .unwrap_err();

    match reason(&err) {
        ValidationReason::CompressionRatio { ratio, max } => {
            assert!(ratio > max);
            assert_eq!(max, 15.0);
        }
        other => panic!("unexpected reason: {:?}", other),
    }
    assert!(!dest.exists());
}

#[test]
fn test_path_traversal_rejected() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("traversal.zip");
    write_zip(
        &archive,
        &[
            ("regions.xml", b"<regions/>".as_slice()),
            ("../evil.xml", b"<evil/>".as_slice()),
        ],
    )
    .unwrap();

    let dest = dir.path().join("out");
    let err = ArchiveValidator::validate_and_extract(&archive, &dest, &SecurityPolicy::default())
        .unwrap_err();

    assert_eq!(reason(&err), ValidationReason::PathTraversal);
    assert!(matches!(err, ImportError::Validation { ref entry, .. } if entry == "../evil.xml"));
    assert!(!dest.exists());
    assert!(!dir.path().join("evil.xml").exists());
}

#[test]
fn test_absolute_entry_rejected_before_any_write() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("absolute.zip");
    write_zip(
        &archive,
        &[
            ("regions.xml", b"<regions/>".as_slice()),
            ("/abs.xml", b"<abs/>".as_slice()),
        ],
    )
    .unwrap();

    let dest = dir.path().join("out");
    let err = ArchiveValidator::validate_and_extract(&archive, &dest, &SecurityPolicy::default())
        .unwrap_err();

    assert_eq!(reason(&err), ValidationReason::PathTraversal);
    assert!(matches!(err, ImportError::Validation { ref entry, .. } if entry == "/abs.xml"));
    assert!(!dest.exists());
}

#[test]
fn test_failed_extraction_keeps_preexisting_files() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("overlap.zip");
    write_zip(
        &archive,
        &[
            ("regions.xml", b"<regions/>".as_slice()),
            ("countries.json", b"[]".as_slice()),
        ],
    )
    .unwrap();

    let dest = dir.path().join("out");
    fs::create_dir_all(&dest).unwrap();
    fs::write(dest.join("countries.json"), "keep me").unwrap();
    fs::write(dest.join("notes.txt"), "unrelated").unwrap();

    let err = ArchiveValidator::validate_and_extract(&archive, &dest, &SecurityPolicy::default())
        .unwrap_err();

    assert_eq!(reason(&err), ValidationReason::TargetExists);
    assert!(matches!(err, ImportError::Validation { ref entry, .. } if entry == "countries.json"));
    // 本次写出的文件被回滚，原有文件内容不变
    assert!(!dest.join("regions.xml").exists());
    assert_eq!(fs::read_to_string(dest.join("countries.json")).unwrap(), "keep me");
    assert_eq!(fs::read_to_string(dest.join("notes.txt")).unwrap(), "unrelated");
}

#[test]
fn test_extension_not_in_whitelist() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("mixed.zip");
    write_zip(
        &archive,
        &[
            ("regions.xml", b"<regions/>".as_slice()),
            ("payload.exe", b"MZ".as_slice()),
        ],
    )
    .unwrap();

    let err = ArchiveValidator::validate_and_extract(
        &archive,
        &dir.path().join("out"),
        &SecurityPolicy::default(),
    )
    .unwrap_err();
    assert_eq!(reason(&err), ValidationReason::ExtensionNotAllowed);
}

#[test]
fn test_file_count_and_entry_size_limits() {
    let dir = TempDir::new().unwrap();

    let crowded = dir.path().join("crowded.zip");
    write_zip(
        &crowded,
        &[
            ("a.json", b"{}".as_slice()),
            ("b.json", b"{}".as_slice()),
            ("c.json", b"{}".as_slice()),
        ],
    )
    .unwrap();
    let policy = SecurityPolicy {
        max_files: 2,
        ..SecurityPolicy::default()
    };
    let err = ArchiveValidator::inspect(&crowded, &policy).unwrap_err();
    assert_eq!(reason(&err), ValidationReason::TooManyFiles { count: 3, max: 2 });

    let large = dir.path().join("large.zip");
    let data = noise(400);
    write_zip(&large, &[("large.xml", data.as_slice())]).unwrap();
    let policy = SecurityPolicy {
        max_entry_size: 300,
        ..SecurityPolicy::default()
    };
    let err = ArchiveValidator::inspect(&large, &policy).unwrap_err();
    assert_eq!(
        reason(&err),
        ValidationReason::EntryTooLarge { size: 400, max: 300 }
    );
}

#[test]
fn test_empty_archive_file_rejected() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("empty.zip");
    fs::write(&archive, b"").unwrap();

    let err = ArchiveValidator::inspect(&archive, &SecurityPolicy::default()).unwrap_err();
    assert_eq!(reason(&err), ValidationReason::EmptyArchive);
}

#[test]
fn test_content_mismatch_rolls_back_extracted_files() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("fake.zip");
    write_zip(
        &archive,
        &[
            ("nested/", b"".as_slice()),
            ("nested/regions.xml", b"<regions/>".as_slice()),
            ("countries.json", b"not json at all".as_slice()),
        ],
    )
    .unwrap();

    let dest = dir.path().join("out");
    let err = ArchiveValidator::validate_and_extract(&archive, &dest, &SecurityPolicy::default())
        .unwrap_err();

    assert!(matches!(
        reason(&err),
        ValidationReason::ContentTypeMismatch { ref expected, .. } if expected == "application/json"
    ));
    assert_nothing_extracted(&dest);
}

#[test]
fn test_valid_archive_extracts_nested_entries() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("good.zip");
    write_zip(
        &archive,
        &[
            ("data/", b"".as_slice()),
            ("data/regions.xml", b"<regions/>".as_slice()),
            ("countries.json", b"[]".as_slice()),
        ],
    )
    .unwrap();

    let dest = dir.path().join("out");
    let mut files =
        ArchiveValidator::validate_and_extract(&archive, &dest, &SecurityPolicy::default())
            .unwrap();
    files.sort();

    assert_eq!(
        files,
        vec![dest.join("countries.json"), dest.join("data").join("regions.xml")]
    );
    assert_eq!(
        fs::read_to_string(dest.join("data").join("regions.xml")).unwrap(),
        "<regions/>"
    );
}
