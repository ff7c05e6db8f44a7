pub mod types;

// 重新导出核心类型，方便外部使用
pub use types::*;
