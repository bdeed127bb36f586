//! Test harness for compiling storage declarations and exercising the
//! generated accessors on an in-memory storage machine.
use std::fmt;

pub use alloy_primitives::U256;
use common::config::{CURRENT_LAYOUT_VERSION, StorageConfig};
use mir::{
    CostModel, RuntimeFailure, StorageProgram, ValueId, lower_program, parse_field_decls,
    ty::TypeParseError,
};
use thiserror::Error;

mod machine;

pub use machine::StorageMachine;

/// Source name used for inline declarations.
const MEMORY_SOURCE: &str = "<memory>";

/// Selector of `Panic(uint256)`, matching the revert data of compiled code.
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Error type returned by the harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid declarations: {0}")]
    Parse(#[from] TypeParseError),
    #[error("failed to lower storage: {0}")]
    Storage(#[from] mir::StorageError),
    #[error("invalid storage config:\n{0}")]
    Config(String),
    #[error("no accessor named `{0}`")]
    UnknownAccessor(String),
    #[error("`{accessor}` expects {expected} argument(s), got {found}")]
    Arity {
        accessor: String,
        expected: usize,
        found: usize,
    },
    #[error("`{accessor}` reads `{value}` before defining it")]
    UndefinedValue { accessor: String, value: ValueId },
    #[error("runtime halted: {failure}, revert data {data} (gas_used={gas_used})")]
    Halted {
        failure: RuntimeFailure,
        data: RevertData,
        gas_used: u64,
    },
    #[error("out of gas (limit={limit})")]
    OutOfGas { limit: u64 },
}

/// Captures raw revert data and provides a nicer `Display` implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertData(pub Vec<u8>);

impl RevertData {
    /// `Panic(uint256)` payload carrying the code of `failure`.
    pub fn panic(failure: RuntimeFailure) -> Self {
        let mut data = PANIC_SELECTOR.to_vec();
        data.extend_from_slice(&U256::from(failure.panic_code()).to_be_bytes::<32>());
        Self(data)
    }
}

impl fmt::Display for RevertData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

/// Options that control a single accessor call.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionOptions {
    pub gas_limit: u64,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            gas_limit: 30_000_000,
        }
    }
}

/// Output of a successful accessor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    pub returns: Vec<U256>,
    /// Gas charged after the capped refund was applied.
    pub gas_used: u64,
    /// Refund granted at the end of the call.
    pub refund: u64,
}

/// Harness that lowers storage declarations and runs the resulting accessors
/// against one persistent [`StorageMachine`].
pub struct StorageHarness {
    program: StorageProgram,
    machine: StorageMachine,
}

impl StorageHarness {
    /// Convenience helper that uses the default [`StorageConfig`].
    pub fn compile(source: &str) -> Result<Self, HarnessError> {
        Self::compile_with_config(source, &StorageConfig::default())
    }

    /// Lowers one `<type> <name>` declaration per line of `source`, pricing
    /// calls with the schedule selected by `config`.
    pub fn compile_with_config(source: &str, config: &StorageConfig) -> Result<Self, HarnessError> {
        if let Some(diags) = config.formatted_diagnostics() {
            return Err(HarnessError::Config(diags));
        }
        if config.layout_version != CURRENT_LAYOUT_VERSION {
            return Err(HarnessError::Config(format!(
                "  layout version {} is not supported",
                config.layout_version
            )));
        }
        let decls = parse_field_decls(MEMORY_SOURCE, source)?;
        let program = lower_program(&decls)?;
        tracing::debug!(
            target: "harness",
            fields = program.layouts.len(),
            accessors = program.accessors.len(),
            schedule = ?config.cost_schedule,
            "compiled storage program"
        );
        Ok(Self {
            program,
            machine: StorageMachine::new(CostModel::for_spec(config.cost_schedule)),
        })
    }

    pub fn program(&self) -> &StorageProgram {
        &self.program
    }

    pub fn machine(&self) -> &StorageMachine {
        &self.machine
    }

    /// Calls the accessor `name` with default [`ExecutionOptions`].
    pub fn call(&mut self, name: &str, args: &[U256]) -> Result<CallResult, HarnessError> {
        self.call_with_options(name, args, ExecutionOptions::default())
    }

    pub fn call_with_options(
        &mut self,
        name: &str,
        args: &[U256],
        options: ExecutionOptions,
    ) -> Result<CallResult, HarnessError> {
        let accessor = self
            .program
            .accessor(name)
            .ok_or_else(|| HarnessError::UnknownAccessor(name.to_string()))?;
        self.machine.execute(accessor, args, options)
    }

    /// Calls an accessor returning exactly one word and yields that word.
    pub fn call_word(&mut self, name: &str, args: &[U256]) -> Result<U256, HarnessError> {
        let result = self.call(name, args)?;
        Ok(result.returns.first().copied().unwrap_or_default())
    }
}
