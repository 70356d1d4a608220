//! Hybrid 工具集
//!
//! 提供日志初始化等各个 crate 共享的工具。

pub mod init_log;
