//! 异步测试辅助函数

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// 测试中的等待工具
pub struct TestEnv;

impl TestEnv {
    /// 轮询直到条件成立或超时
    pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        Self::wait_for_with_interval(condition, timeout, Duration::from_millis(20)).await
    }

    pub async fn wait_for_with_interval<F, Fut>(
        mut condition: F,
        timeout: Duration,
        poll_interval: Duration,
    ) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(poll_interval).await;
        }
        condition().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_for() {
        let counter = Arc::new(AtomicU32::new(0));
        let polled = counter.clone();
        let ok = TestEnv::wait_for(
            move || {
                let polled = polled.clone();
                async move { polled.fetch_add(1, Ordering::SeqCst) >= 3 }
            },
            Duration::from_secs(2),
        )
        .await;
        assert!(ok);

        assert!(!TestEnv::wait_for(|| async { false }, Duration::from_millis(50)).await);
    }
}
