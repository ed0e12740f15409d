// ==========================================
// 参考数据导入引擎 - 命令行入口
// ==========================================
// 用法:
//   reference-import <import_type> <archive.zip> [选项]
//
// 选项:
//   --config <path>      导入配置 YAML（缺省按 REFERENCE_IMPORT_CONFIG / 默认位置查找）
//   --db <path>          SQLite 数据库（缺省取配置 database.path，再缺省取用户数据目录）
//   --force              忽略变更跟踪，全部重新导入
//   --no-tracking        不记录文件摘要
//   --hash-cache <path>  摘要缓存文件
//   --log-dir <dir>      额外输出 JSON 文件日志
// ==========================================

use anyhow::{bail, Context};
use reference_import::config::{ImportConfigLoader, ImportConfigProvider};
use reference_import::importer::{ChangeTracker, ReferenceImporter};
use reference_import::repository::SqliteSession;
use reference_import::{db, logging};
use std::path::PathBuf;

#[derive(Debug, Default)]
struct CliArgs {
    import_type: String,
    archive: PathBuf,
    config: Option<PathBuf>,
    db_path: Option<String>,
    force: bool,
    no_tracking: bool,
    hash_cache: Option<PathBuf>,
    log_dir: Option<PathBuf>,
}

fn usage() -> &'static str {
    "用法: reference-import <import_type> <archive.zip> [--config PATH] [--db PATH] \
     [--force] [--no-tracking] [--hash-cache PATH] [--log-dir DIR]"
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut cli = CliArgs::default();
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => cli.config = Some(args.next().context("--config 缺少参数")?.into()),
            "--db" => cli.db_path = Some(args.next().context("--db 缺少参数")?),
            "--force" => cli.force = true,
            "--no-tracking" => cli.no_tracking = true,
            "--hash-cache" => {
                cli.hash_cache = Some(args.next().context("--hash-cache 缺少参数")?.into())
            }
            "--log-dir" => cli.log_dir = Some(args.next().context("--log-dir 缺少参数")?.into()),
            "-h" | "--help" => bail!(usage()),
            other if other.starts_with("--") => bail!("未知选项: {}\n{}", other, usage()),
            _ => positional.push(arg),
        }
    }

    if positional.len() != 2 {
        bail!(usage());
    }
    cli.archive = PathBuf::from(positional.pop().unwrap_or_default());
    cli.import_type = positional.pop().unwrap_or_default();
    Ok(cli)
}

fn main() -> anyhow::Result<()> {
    let cli = parse_args()?;

    // guard 需存活到进程结束
    let _log_guard = match &cli.log_dir {
        Some(dir) => Some(logging::init_with_log_dir(dir)),
        None => {
            logging::init();
            None
        }
    };

    tracing::info!("==================================================");
    tracing::info!("{} v{}", reference_import::APP_NAME, reference_import::VERSION);
    tracing::info!("==================================================");

    let config = match &cli.config {
        Some(path) => ImportConfigLoader::from_path(path),
        None => ImportConfigLoader::from_default_locations(),
    }
    .context("加载导入配置失败")?;

    if !config.import_types().contains(&cli.import_type) {
        bail!(
            "未配置的导入类型: {}（可选: {}）",
            cli.import_type,
            config.import_types().join(", ")
        );
    }

    let db_path = match cli.db_path.clone() {
        Some(path) => path,
        None => config
            .database_path(&cli.import_type)?
            .unwrap_or_else(db::get_default_db_path),
    };
    tracing::info!(db = %db_path, "使用数据库");
    let mut session = SqliteSession::open(&db_path).context("打开数据库失败")?;

    let mut importer = ReferenceImporter::new(config).with_force(cli.force);
    if !cli.no_tracking {
        let cache = cli
            .hash_cache
            .clone()
            .unwrap_or_else(ChangeTracker::default_cache_path);
        importer = importer.with_change_tracking(cache);
    }

    let work_dir = std::env::temp_dir().join(format!("reference-import-{}", uuid::Uuid::new_v4()));
    let result = importer.import_archive(&cli.archive, &work_dir, &cli.import_type, &mut session);

    if let Err(e) = std::fs::remove_dir_all(&work_dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(dir = %work_dir.display(), error = %e, "清理工作目录失败");
        }
    }

    let outcome = result.with_context(|| format!("导入失败: {}", cli.archive.display()))?;

    println!("导入类型: {}", cli.import_type);
    println!("已处理文件 ({}):", outcome.processed_files.len());
    for file in &outcome.processed_files {
        println!("  + {}", file);
    }
    println!("已跳过文件 ({}):", outcome.skipped_files.len());
    for file in &outcome.skipped_files {
        println!("  - {}", file);
    }
    Ok(())
}
