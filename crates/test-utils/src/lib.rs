#[doc(hidden)]
pub mod _macro_support;

pub use tracing::Level;
use tracing::{
    Subscriber,
    level_filters::LevelFilter,
    subscriber::{DefaultGuard, set_default},
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};
use tracing_tree::HierarchicalLayer;

/// Asserts `value` against the snapshot stored next to `fixture_path`.
///
/// The snapshot is named after the fixture, so `tests/fixtures/packed.fe`
/// is checked against `tests/fixtures/packed.snap`.
#[macro_export]
macro_rules! snap_test {
    ($value:expr, $fixture_path:expr) => {{
        let fixture_path = ::std::path::Path::new($fixture_path);
        let mut settings = $crate::_macro_support::insta::Settings::clone_current();
        if let Some(dir) = fixture_path.parent() {
            settings.set_snapshot_path(dir);
        }
        settings.set_input_file(fixture_path);
        settings.set_prepend_module_to_snapshot(false);
        let name = $crate::_macro_support::fixture_snapshot_name(fixture_path);
        let value: &str = ::std::convert::AsRef::as_ref(&$value);
        settings.bind(|| {
            $crate::_macro_support::insta::assert_snapshot!(name.as_str(), value);
        });
    }};
}

/// Installs a subscriber honouring a `RUST_LOG`-style filter for the current
/// thread until the guard is dropped.
pub fn setup_tracing_with_filter(filter: &str) -> DefaultGuard {
    let subscriber = default_subscriber().with(EnvFilter::new(filter));
    set_default(subscriber)
}

pub fn setup_tracing(level: Level) -> DefaultGuard {
    let subscriber = default_subscriber().with(LevelFilter::from_level(level));
    set_default(subscriber)
}

fn default_subscriber() -> impl Subscriber + Send + Sync {
    tracing_subscriber::registry().with(
        HierarchicalLayer::new(2)
            .with_targets(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_indent_lines(true)
            .with_bracketed_fields(true)
            .with_ansi(false)
            .with_writer(std::io::stderr),
    )
}
