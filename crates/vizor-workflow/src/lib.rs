//! # 导入工作流模块
//!
//! 上传会话从导入到可查看的完整流程：
//! - 会话状态机：约束会话状态的合法转换
//! - 导入任务轮询：定时查询托管存储的长任务，可随时取消
//! - 文件头扫描：读取源位置下的DICOM文件头并按检查分组
//! - 检查汇总：每个 StudyInstanceUID 生成一条检查记录
//! - 导入编排：串联以上步骤并维护会话状态

pub mod assembler;
pub mod ingest;
pub mod poller;
pub mod scanner;
pub mod state_machine;

// 重新导出主要类型
pub use assembler::StudyAssembler;
pub use ingest::IngestOrchestrator;
pub use poller::{wait_for_completion, ImportOperation, PollResult};
pub use scanner::{looks_like_dicom, HeaderScanner};
pub use state_machine::{SessionEvent, SessionStateMachine};
