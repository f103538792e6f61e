use tracing::Level;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

/// Installs a compact stdout subscriber showing debug output of the store.
pub fn tracing_init() {
    let subscriber = tracing_subscriber::fmt()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(true)
        .with_target(false)
        .with_max_level(Level::DEBUG)
        .with_timer(ShortTime)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("no other subscriber is installed in a demo");
}

/// Wall-clock time with milliseconds, without the date.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortTime;

impl FormatTime for ShortTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}
