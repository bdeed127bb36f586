use std::collections::BTreeSet;

use mir::{Accessor, Operand};

use crate::yul::{doc::YulDoc, errors::YulError, state::BlockState};

/// Emits Yul for a single storage accessor.
pub(super) struct FunctionEmitter<'a> {
    pub(super) accessor: &'a Accessor,
    /// Panic codes raised by checks in this accessor, so the module can
    /// append the matching helper functions.
    pub(super) panic_codes: BTreeSet<u8>,
}

impl<'a> FunctionEmitter<'a> {
    /// Constructs a new emitter for the given accessor.
    pub(super) fn new(accessor: &'a Accessor) -> Self {
        Self {
            accessor,
            panic_codes: BTreeSet::new(),
        }
    }

    /// Produces the Yul `function` block for the accessor.
    ///
    /// Returns the function doc together with the panic codes it raises, or a
    /// [`YulError`] when an operation cannot be rendered.
    pub(super) fn emit_doc(mut self) -> Result<(YulDoc, BTreeSet<u8>), YulError> {
        let accessor = self.accessor;
        let mut state = BlockState::new();
        let params: Vec<String> = accessor
            .params
            .iter()
            .map(|param| state.define(param.value))
            .collect();

        let mut body = self.render_ops(&accessor.body, &mut state)?;
        for (idx, value) in accessor.returns.iter().enumerate() {
            let rendered = self.operand(*value, &state)?;
            body.push(YulDoc::line(format!("ret{idx} := {rendered}")));
        }

        let caption = format!("{} ", self.format_function_signature(&params));
        Ok((YulDoc::block(caption, body), self.panic_codes))
    }

    /// Formats the accessor name, parameters and return variables into a Yul signature.
    fn format_function_signature(&self, params: &[String]) -> String {
        let name = &self.accessor.name;
        let params = params.join(", ");
        if self.accessor.returns.is_empty() {
            format!("function {name}({params})")
        } else {
            let rets: Vec<String> = (0..self.accessor.returns.len())
                .map(|idx| format!("ret{idx}"))
                .collect();
            format!("function {name}({params}) -> {}", rets.join(", "))
        }
    }

    /// Renders an operand as a Yul expression.
    ///
    /// * `operand` - Value or constant to render.
    /// * `state` - Scope used to check that the value is defined.
    ///
    /// Returns the expression text or [`YulError::UndefinedValue`].
    pub(super) fn operand(&self, operand: Operand, state: &BlockState) -> Result<String, YulError> {
        match operand {
            Operand::Value(value) => state.resolve(value).ok_or_else(|| YulError::UndefinedValue {
                function: self.accessor.name.clone(),
                value,
            }),
            Operand::Const(value) if value < alloy_primitives::U256::from(1u64 << 16) => {
                Ok(value.to_string())
            }
            Operand::Const(value) => Ok(format!("0x{value:x}")),
        }
    }
}
