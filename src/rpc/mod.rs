//! RPC 服务模块
//!
//! 基于 TCP 的按行分隔 JSON-RPC 2.0 服务

pub mod protocol;
pub mod server;

pub use server::{RpcService, RpcServiceConfig, SERVICE_NAME};
