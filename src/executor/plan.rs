//! Strategy to provider call translation.

use super::ExecuteError;
use crate::chain::{self, Chain};
use crate::provider::abi::{ParamBuilder, function_fragment};
use crate::provider::{
    self, BridgeAndExecuteParams, BridgeParams, ExecuteLeg, ExecuteParams, ExecutionProvider,
    ProviderOutcome, TokenApproval,
};
use crate::strategy::{ContractCall, Strategy, StrategyAction};
use crate::token::{self, Token};
use tracing::warn;

/// Destination and permissible source chains of a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub destination: Chain,
    pub sources: Vec<Chain>,
}

impl Route {
    #[must_use]
    pub fn source_ids(&self) -> Vec<u64> {
        self.sources.iter().map(|c| c.id).collect()
    }
}

/// The first chain is the destination; the rest are sources. With no usable
/// source chains listed, every other known chain is a source.
pub fn route(strategy: &Strategy) -> Result<Route, ExecuteError> {
    let (first, rest) = strategy
        .chains()
        .split_first()
        .ok_or_else(|| ExecuteError::UnknownChain(String::new()))?;
    let destination =
        chain::by_name(first).ok_or_else(|| ExecuteError::UnknownChain(first.clone()))?;

    let mut sources: Vec<Chain> = Vec::new();
    for name in rest {
        match chain::by_name(name) {
            Some(c) if c != destination && !sources.contains(&c) => sources.push(c),
            Some(_) => {}
            None => warn!(strategy = strategy.id(), chain = %name, "Skipping unknown source chain"),
        }
    }
    if sources.is_empty() {
        sources = chain::CHAINS
            .iter()
            .copied()
            .filter(|c| *c != destination)
            .collect();
    }
    Ok(Route {
        destination,
        sources,
    })
}

/// One provider operation, ready to dispatch.
#[derive(Debug, Clone)]
pub enum ProviderCall {
    Bridge(BridgeParams),
    Execute(ExecuteParams),
    BridgeAndExecute(BridgeAndExecuteParams),
}

impl ProviderCall {
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            ProviderCall::Bridge(_) => "bridge",
            ProviderCall::Execute(_) => "execute",
            ProviderCall::BridgeAndExecute(_) => "bridge_and_execute",
        }
    }

    pub async fn dispatch(
        self,
        provider: &dyn ExecutionProvider,
    ) -> Result<ProviderOutcome, provider::Error> {
        match self {
            ProviderCall::Bridge(params) => provider.bridge(params).await,
            ProviderCall::Execute(params) => provider.execute(params).await,
            ProviderCall::BridgeAndExecute(params) => provider.bridge_and_execute(params).await,
        }
    }
}

fn execute_leg(call: &ContractCall, token: Token, amount: &str) -> ExecuteLeg {
    ExecuteLeg {
        contract_address: call.address(),
        contract_abi: function_fragment(call.function(), token.native),
        function_name: call.function().to_string(),
        build_params: ParamBuilder::new(token),
        wait_for_receipt: true,
        token_approval: TokenApproval {
            token: token.symbol.to_string(),
            amount: amount.to_string(),
        },
    }
}

/// Build the provider call for `strategy` moving `amount` of its token.
pub fn plan(strategy: &Strategy, amount: f64) -> Result<ProviderCall, ExecuteError> {
    let token = token::by_symbol(strategy.token())
        .ok_or_else(|| ExecuteError::UnknownToken(strategy.token().to_string()))?;
    let route = route(strategy)?;
    let amount = token::exact_amount(amount, token.decimals)
        .ok_or(ExecuteError::InvalidAmount(amount))?;

    Ok(match strategy.action() {
        StrategyAction::Bridge => ProviderCall::Bridge(BridgeParams {
            token: token.symbol.to_string(),
            amount,
            destination_chain_id: route.destination.id,
            source_chain_ids: route.source_ids(),
        }),
        StrategyAction::Execute(call) => ProviderCall::Execute(ExecuteParams {
            destination_chain_id: route.destination.id,
            leg: execute_leg(call, token, &amount),
        }),
        StrategyAction::BridgeExecute(call) => {
            ProviderCall::BridgeAndExecute(BridgeAndExecuteParams {
                token: token.symbol.to_string(),
                execute: execute_leg(call, token, &amount),
                amount,
                destination_chain_id: route.destination.id,
                source_chain_ids: route.source_ids(),
            })
        }
    })
}
