use std::time::Instant;

use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test harness capture.
///
/// Safe to call from many tests; only the first call installs a subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("splitlab=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub struct TestLogger {
    test_name: String,
    start_time: Instant,
}

impl TestLogger {
    pub fn new(test_name: &str) -> Self {
        init_test_tracing();
        let separator = "=".repeat(60);
        println!("\n{}", separator);
        println!("[TEST START] {}", test_name);
        println!("{}", separator);
        Self {
            test_name: test_name.to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn log_input<T: std::fmt::Debug>(&self, name: &str, value: &T) {
        println!("[INPUT] {}: {:?}", name, value);
    }

    pub fn log_actual<T: std::fmt::Debug>(&self, value: &T) {
        println!("[ACTUAL] {:?}", value);
    }

    pub fn pass(&self) {
        let elapsed = self.start_time.elapsed();
        println!("[RESULT] {} PASSED in {:?}", self.test_name, elapsed);
        println!("{}\n", "=".repeat(60));
    }
}
