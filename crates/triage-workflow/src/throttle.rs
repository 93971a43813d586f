//! 升级调用节流
//!
//! 每次调用生成式模型前等待固定的最小间隔。节流器在所有病例间共享，
//! 持有者依次进入并等待，因此即使并发处理病例，调用起点之间也至少相隔该间隔。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// 升级调用节流器
#[derive(Debug)]
pub struct EscalationThrottle {
    min_delay: Duration,
    gate: Mutex<()>,
    granted: AtomicU64,
}

impl EscalationThrottle {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            gate: Mutex::new(()),
            granted: AtomicU64::new(0),
        }
    }

    /// 等待下一次调用许可
    pub async fn acquire(&self) {
        let _gate = self.gate.lock().await;
        if !self.min_delay.is_zero() {
            debug!("Waiting {:?} before escalation call", self.min_delay);
            tokio::time::sleep(self.min_delay).await;
        }
        self.granted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// 已发放的许可数，即升级调用次数
    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_each_acquire_waits_min_delay() {
        let throttle = EscalationThrottle::new(Duration::from_secs(2));
        let start = Instant::now();

        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));

        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(4));
        assert_eq!(throttle.granted(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_holders_are_spaced() {
        let throttle = Arc::new(EscalationThrottle::new(Duration::from_millis(500)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let throttle = throttle.clone();
            handles.push(tokio::spawn(async move {
                throttle.acquire().await;
                Instant::now()
            }));
        }

        let mut granted_at = Vec::new();
        for handle in handles {
            granted_at.push(handle.await.unwrap());
        }
        granted_at.sort();

        assert!(granted_at[0] - start >= Duration::from_millis(500));
        for pair in granted_at.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
        assert_eq!(throttle.granted(), 4);
    }

    #[tokio::test]
    async fn test_zero_delay_does_not_sleep() {
        let throttle = EscalationThrottle::new(Duration::ZERO);
        throttle.acquire().await;
        assert_eq!(throttle.granted(), 1);
        assert_eq!(throttle.min_delay(), Duration::ZERO);
    }
}
