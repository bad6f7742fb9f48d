//! 故障通道：配置重建失败的最后上报出口。
//!
//! - **意图（Why）**：重建失败不能抛给触发通知的一方，也不能静默丢弃，需要一个独立通道留痕；
//! - **契约（What）**：`publish` 不得 panic，也不应阻塞太久，它运行在配置通知线程上。

use tracing::error;

use crate::error::BridgeError;

/// 内部故障上报通道。
pub trait FaultReporter: Send + Sync + 'static {
    /// 上报一次故障；`context` 为描述发生位置的固定标签。
    fn publish(&self, error: &BridgeError, context: &str);
}

/// 将故障写入 `tracing` 的默认实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingFaultReporter;

impl FaultReporter for TracingFaultReporter {
    fn publish(&self, error: &BridgeError, context: &str) {
        error!(
            target: "spark_log_bridge::fault",
            context,
            error = %error,
            detail = ?error,
            "log bridge fault"
        );
    }
}
