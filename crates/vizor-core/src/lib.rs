//! # Vizor Core
//!
//! 纵向影像服务的核心模块，提供基础数据结构、错误定义、配置与通用工具。

pub mod config;
pub mod error;
pub mod models;
pub mod utils;

pub use config::Settings;
pub use error::{ErrorKind, Result, VizorError};
pub use models::*;
