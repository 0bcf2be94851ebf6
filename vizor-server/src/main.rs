//! 纵向影像服务命令行入口

mod context;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use context::AppContext;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vizor_core::{CreatorRole, Settings, UploadSession};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "vizor-server")]
#[command(about = "纵向DICOM影像导入、空间索引与跨检查定位")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,

    /// 未配置 database.url 时使用进程内元数据存储，命令结束即丢失
    #[arg(long)]
    in_memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 创建上传会话
    CreateSession {
        session_id: String,
        user_id: String,
        /// 由医生代为上传
        #[arg(long)]
        provider: bool,
    },
    /// 导入会话源位置下的DICOM文件
    Ingest {
        session_id: String,
        /// gs://bucket/<userId>/<sessionId>/
        source: String,
    },
    /// 为检查建立切片索引
    Index { caller: String, study_id: String },
    /// 查询索引状态
    Status {
        caller: String,
        #[arg(required = true)]
        study_ids: Vec<String>,
    },
    /// 在各次检查中定位解剖点
    Resolve {
        caller: String,
        #[arg(long)]
        frame: String,
        #[arg(long, allow_hyphen_values = true)]
        x: f64,
        #[arg(long, allow_hyphen_values = true)]
        y: f64,
        #[arg(long, allow_hyphen_values = true)]
        z: f64,
        #[arg(required = true)]
        study_ids: Vec<String>,
    },
    /// 列出用户的检查（最新在前）
    Studies { user_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref()).context("加载配置失败")?;

    // 初始化日志
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| settings.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)))
        .init();

    info!("Starting vizor-server, project {}", settings.project_id);
    let ctx = AppContext::build(&settings, args.in_memory).await.context("初始化服务失败")?;

    let output = match run(&ctx, args.command).await {
        Ok(output) => output,
        Err(e) => {
            error!("Command failed: {:#}", e);
            return Err(e);
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(ctx: &AppContext, command: Command) -> anyhow::Result<Value> {
    let value = match command {
        Command::CreateSession {
            session_id,
            user_id,
            provider,
        } => {
            let role = if provider {
                CreatorRole::Provider
            } else {
                CreatorRole::Patient
            };
            let session = UploadSession::new(&session_id, &user_id, role);
            ctx.queries.create_upload_session(&session).await?;
            serde_json::to_value(session)?
        }
        Command::Ingest { session_id, source } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling ingest");
                    on_signal.cancel();
                }
            });
            let studies = ctx.ingest.trigger_ingest(&session_id, &source, &cancel).await?;
            serde_json::to_value(studies)?
        }
        Command::Index { caller, study_id } => {
            let slices = ctx.indexer.trigger_indexing(&caller, &study_id).await?;
            serde_json::json!({ "studyId": study_id, "slices": slices })
        }
        Command::Status { caller, study_ids } => {
            serde_json::to_value(ctx.indexer.index_statuses(&caller, &study_ids).await?)?
        }
        Command::Resolve {
            caller,
            frame,
            x,
            y,
            z,
            study_ids,
        } => serde_json::to_value(
            ctx.indexer
                .resolve_point(&caller, &frame, [x, y, z], &study_ids)
                .await?,
        )?,
        Command::Studies { user_id } => {
            serde_json::to_value(ctx.queries.list_studies_by_user(&user_id).await?)?
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolve() {
        let args = Args::try_parse_from([
            "vizor-server", "resolve", "user-1", "--frame", "1.2.3", "--x", "-12.5", "--y", "0", "--z",
            "40", "STUDY-A", "STUDY-B",
        ])
        .unwrap();
        match args.command {
            Command::Resolve { x, study_ids, .. } => {
                assert_eq!(x, -12.5);
                assert_eq!(study_ids, vec!["STUDY-A", "STUDY-B"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_status_requires_ids() {
        assert!(Args::try_parse_from(["vizor-server", "status", "user-1"]).is_err());
    }

    #[test]
    fn test_in_memory_is_opt_in() {
        let args = Args::try_parse_from(["vizor-server", "studies", "user-1"]).unwrap();
        assert!(!args.in_memory);
        let args = Args::try_parse_from(["vizor-server", "--in-memory", "studies", "user-1"]).unwrap();
        assert!(args.in_memory);
    }
}
