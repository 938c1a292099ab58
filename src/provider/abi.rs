//! ABI fragment and call-parameter construction for execute legs.

use super::Error;
use crate::token::Token;
use alloy_primitives::utils::parse_units;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub internal_type: String,
}

impl AbiParam {
    fn new(name: &str, ty: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.to_string(),
            internal_type: ty.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiFunction {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub inputs: Vec<AbiParam>,
    pub outputs: Vec<AbiParam>,
    pub state_mutability: String,
}

/// Single-function ABI fragment: `name(uint256 amount, address onBehalfOf)`.
#[must_use]
pub fn function_fragment(name: &str, payable: bool) -> Vec<AbiFunction> {
    vec![AbiFunction {
        kind: "function".to_string(),
        name: name.to_string(),
        inputs: vec![
            AbiParam::new("amount", "uint256"),
            AbiParam::new("onBehalfOf", "address"),
        ],
        outputs: vec![],
        state_mutability: if payable { "payable" } else { "nonpayable" }.to_string(),
    }]
}

/// Convert a human decimal amount to base units at `decimals` precision.
pub fn to_base_units(amount: &str, decimals: u8) -> Result<U256, Error> {
    let amount = amount.trim();
    if amount.is_empty() || amount.starts_with('-') {
        return Err(Error::InvalidParams(format!("invalid amount '{amount}'")));
    }
    parse_units(amount, decimals)
        .map(|units| units.get_absolute())
        .map_err(|e| Error::InvalidParams(format!("invalid amount '{amount}': {e}")))
}

/// Arguments produced for the contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionParams {
    pub function_params: Vec<serde_json::Value>,
    /// Call value, set when the native token is supplied.
    pub value: Option<U256>,
}

/// Builds call arguments at call time from the token, amount, chain and user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamBuilder {
    token: Token,
}

impl ParamBuilder {
    #[must_use]
    pub fn new(token: Token) -> Self {
        Self { token }
    }

    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    pub fn build(
        &self,
        token: &str,
        amount: &str,
        chain_id: u64,
        user: Address,
    ) -> Result<FunctionParams, Error> {
        if !token.eq_ignore_ascii_case(self.token.symbol) {
            return Err(Error::InvalidParams(format!(
                "builder for {} called with {token} on chain {chain_id}",
                self.token.symbol
            )));
        }
        let units = to_base_units(amount, self.token.decimals)?;
        Ok(FunctionParams {
            function_params: vec![
                serde_json::Value::String(units.to_string()),
                serde_json::Value::String(user.to_checksum(None)),
            ],
            value: self.token.native.then_some(units),
        })
    }
}
