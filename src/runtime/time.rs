//! Task suspension.

use std::time::Duration;

use super::RealRuntime;

impl RealRuntime {
    pub(crate) async fn sleep_impl(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_real_runtime_sleep_waits() {
        let runtime = RealRuntime;
        let start = Instant::now();
        runtime.sleep(Duration::from_millis(20)).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
