use std::sync::Once;

use env_logger::Builder;

static SETUP_LOGS: Once = Once::new();

#[cfg(test)]
pub fn setup_logger() {
    SETUP_LOGS.call_once(|| {
        build_logger().is_test(true).init();
    });
}

#[cfg(not(test))]
pub fn setup_logger() {
    SETUP_LOGS.call_once(|| {
        build_logger().is_test(false).init();
    });
}

fn build_logger() -> Builder {
    let mut builder = Builder::new();

    builder.format_timestamp_micros();

    if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(log::LevelFilter::Info);
    }

    builder.parse_env("RUST_LOG");

    builder
}
