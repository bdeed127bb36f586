pub use insta;

/// Snapshot name for a fixture: its file name without the final extension.
pub fn fixture_snapshot_name(fixture_path: &std::path::Path) -> String {
    fixture_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("snapshot")
        .to_string()
}
