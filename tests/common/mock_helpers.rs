//! Mock construction helpers

use mockall::mock;
use streamflow::logging::{LogLevel, LogSink};
use streamflow::playback::TimeSource;

mock! {
    pub Sink {}

    impl LogSink for Sink {
        fn log(&self, level: LogLevel, component: &str, message: &str);
    }
}

mock! {
    pub Time {}

    impl TimeSource for Time {
        fn now_ms(&self) -> f64;
    }
}

/// Time source returning `ticks` in order, then repeating the last one
pub fn scripted_time(ticks: Vec<f64>) -> MockTime {
    let mut time = MockTime::new();
    let mut index = 0;
    time.expect_now_ms().returning(move || {
        let value = ticks[index.min(ticks.len() - 1)];
        index += 1;
        value
    });
    time
}
