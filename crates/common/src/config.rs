use std::fmt::Display;

use revm::primitives::hardfork::SpecId;
use smol_str::SmolStr;
use toml::{Table, Value};

/// Version of the packing and hashing rules this compiler implements.
///
/// Data written by a program compiled under one version is only guaranteed to
/// be reachable by programs compiled under the same version.
pub const CURRENT_LAYOUT_VERSION: u32 = 1;

/// Hardfork whose gas schedule prices storage accesses by default.
pub const DEFAULT_COST_SCHEDULE: SpecId = SpecId::CANCUN;

/// Maps a `cost-schedule` name onto a hardfork.
///
/// Only forks with EIP-2929 access lists are accepted: the cost model relies
/// on cold/warm slot pricing.
pub fn parse_cost_schedule(name: &str) -> Option<SpecId> {
    match name {
        "berlin" => Some(SpecId::BERLIN),
        "london" => Some(SpecId::LONDON),
        "merge" | "paris" => Some(SpecId::MERGE),
        "shanghai" => Some(SpecId::SHANGHAI),
        "cancun" => Some(SpecId::CANCUN),
        "prague" => Some(SpecId::PRAGUE),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageConfig {
    pub layout_version: u32,
    pub cost_schedule: SpecId,
    pub diagnostics: Vec<ConfigDiagnostic>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            layout_version: CURRENT_LAYOUT_VERSION,
            cost_schedule: DEFAULT_COST_SCHEDULE,
            diagnostics: Vec::new(),
        }
    }
}

impl StorageConfig {
    /// Parses the `[storage]` table of a project manifest.
    ///
    /// A manifest without a `[storage]` table yields the defaults. Semantic
    /// problems are collected in `diagnostics` in key order; only malformed
    /// TOML is an `Err`.
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut config = Self::default();

        let parsed: Table = content
            .parse()
            .map_err(|e: toml::de::Error| e.to_string())?;

        let Some(storage) = parsed.get("storage") else {
            return Ok(config);
        };
        let Some(table) = storage.as_table() else {
            config.diagnostics.push(ConfigDiagnostic::UnexpectedTomlData {
                field: "storage".into(),
                found: storage.type_str().to_lowercase().into(),
                expected: Some("table".into()),
            });
            return Ok(config);
        };

        for (key, value) in table {
            match key.as_str() {
                "layout-version" => match value {
                    Value::Integer(version) => match u32::try_from(*version) {
                        Ok(version) if version == CURRENT_LAYOUT_VERSION => {
                            config.layout_version = version
                        }
                        _ => config
                            .diagnostics
                            .push(ConfigDiagnostic::UnsupportedLayoutVersion(*version)),
                    },
                    value => config.diagnostics.push(ConfigDiagnostic::UnexpectedTomlData {
                        field: "layout-version".into(),
                        found: value.type_str().to_lowercase().into(),
                        expected: Some("integer".into()),
                    }),
                },
                "cost-schedule" => match value.as_str() {
                    Some(name) => match parse_cost_schedule(name) {
                        Some(schedule) => config.cost_schedule = schedule,
                        None => config
                            .diagnostics
                            .push(ConfigDiagnostic::UnknownCostSchedule(name.into())),
                    },
                    None => config.diagnostics.push(ConfigDiagnostic::UnexpectedTomlData {
                        field: "cost-schedule".into(),
                        found: value.type_str().to_lowercase().into(),
                        expected: Some("string".into()),
                    }),
                },
                other => config.diagnostics.push(ConfigDiagnostic::UnexpectedTomlData {
                    field: other.into(),
                    found: value.type_str().to_lowercase().into(),
                    expected: None,
                }),
            }
        }

        for diagnostic in &config.diagnostics {
            tracing::warn!(target: "config", "{diagnostic}");
        }

        Ok(config)
    }

    pub fn formatted_diagnostics(&self) -> Option<String> {
        if self.diagnostics.is_empty() {
            None
        } else {
            Some(
                self.diagnostics
                    .iter()
                    .map(|diag| format!("  {diag}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigDiagnostic {
    UnsupportedLayoutVersion(i64),
    UnknownCostSchedule(SmolStr),
    UnexpectedTomlData {
        field: SmolStr,
        found: SmolStr,
        expected: Option<SmolStr>,
    },
}

impl Display for ConfigDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLayoutVersion(version) => write!(
                f,
                "Unsupported storage layout version {version} \
                 (this compiler implements version {CURRENT_LAYOUT_VERSION})"
            ),
            Self::UnknownCostSchedule(name) => write!(f, "Unknown cost schedule \"{name}\""),
            Self::UnexpectedTomlData {
                field,
                found,
                expected,
            } => {
                if let Some(expected) = expected {
                    write!(
                        f,
                        "Expected a {expected} in field {field}, but found a {found}"
                    )
                } else {
                    write!(f, "Unexpected field {field}")
                }
            }
        }
    }
}
