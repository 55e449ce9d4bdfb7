use {
    std::panic::PanicInfo,
    time::macros::format_description,
    tracing::level_filters::LevelFilter,
    tracing_subscriber::fmt::{time::UtcTime, writer::MakeWriterExt as _},
};

/// Sets the global subscriber; `stderr_threshold` and worse go to stderr.
pub fn initialize(env_filter: &str, stderr_threshold: LevelFilter) {
    let builder = tracing_subscriber::fmt::fmt()
        .with_timer(UtcTime::new(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        )))
        .with_env_filter(env_filter);
    match stderr_threshold.into_level() {
        Some(threshold) => builder
            .with_writer(
                std::io::stderr
                    .with_max_level(threshold)
                    .or_else(std::io::stdout),
            )
            .init(),
        None => builder.init(),
    }
    std::panic::set_hook(Box::new(log_panic));
}

fn log_panic(panic: &PanicInfo) {
    let thread = std::thread::current();
    let backtrace = std::backtrace::Backtrace::force_capture();
    tracing::error!(
        thread = thread.name().unwrap_or("<unnamed>"),
        "{panic}\nstack backtrace:\n{backtrace}"
    );
}
