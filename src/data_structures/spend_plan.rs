//! The spend plan handed to the external signer
//!
//! A [`SpendPlan`] is assembled once per spend attempt and cannot be modified
//! afterwards. Assembly checks that inputs balance outputs plus fee.

use serde::Serialize;

use super::{
    denomination::Denomination,
    output::{Amount, CoinType, KeyRef, Output, OutputId},
};
use crate::{
    accumulator::Witness,
    anonymity::DecoySet,
    errors::{EngineError, EngineResult},
};

/// Proof material the signer needs for one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AnonymityMaterial {
    /// Plain and CT inputs are signed directly
    Direct,
    /// RingCT input hidden in a decoy ring
    Ring(DecoySet),
    /// Zerocoin input proven through accumulator membership
    Witness(Witness),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedInput {
    pub output: Output,
    pub material: AnonymityMaterial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OutputKind {
    Payment,
    Mint {
        denomination: Denomination,
        /// Fresh serial commitment for the minted coin
        serial_commitment: [u8; 32],
    },
    Change,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedOutput {
    pub kind: OutputKind,
    pub coin_type: CoinType,
    pub value: Amount,
    /// Fresh blinding factor for CT/RingCT outputs
    pub blinding: Option<[u8; 32]>,
    /// Destination key for change outputs
    pub key: Option<KeyRef>,
}

impl PlannedOutput {
    pub fn payment(coin_type: CoinType, value: Amount, blinding: Option<[u8; 32]>) -> Self {
        Self {
            kind: OutputKind::Payment,
            coin_type,
            value,
            blinding,
            key: None,
        }
    }

    pub fn mint(denomination: Denomination, serial_commitment: [u8; 32]) -> Self {
        Self {
            kind: OutputKind::Mint {
                denomination,
                serial_commitment,
            },
            coin_type: CoinType::Zerocoin,
            value: denomination.amount(),
            blinding: None,
            key: None,
        }
    }

    pub fn is_change(&self) -> bool {
        self.kind == OutputKind::Change
    }
}

/// Immutable plan for external signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpendPlan {
    id: u64,
    inputs: Vec<PlannedInput>,
    outputs: Vec<PlannedOutput>,
    fee: Amount,
    privacy_warning: bool,
}

impl SpendPlan {
    /// Assemble a plan, rejecting it unless inputs equal outputs plus fee
    pub fn assemble(
        id: u64,
        inputs: Vec<PlannedInput>,
        outputs: Vec<PlannedOutput>,
        fee: Amount,
        privacy_warning: bool,
    ) -> EngineResult<Self> {
        let plan = Self {
            id,
            inputs,
            outputs,
            fee,
            privacy_warning,
        };
        if !plan.is_balanced() {
            return Err(EngineError::PlanImbalance {
                inputs: plan.total_input(),
                outputs: plan.total_output(),
                fee,
            });
        }
        Ok(plan)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn inputs(&self) -> &[PlannedInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PlannedOutput] {
        &self.outputs
    }

    pub fn fee(&self) -> Amount {
        self.fee
    }

    /// Set when the plan spends transparent outputs
    pub fn privacy_warning(&self) -> bool {
        self.privacy_warning
    }

    pub fn input_ids(&self) -> Vec<OutputId> {
        self.inputs.iter().map(|i| i.output.id).collect()
    }

    pub fn total_input(&self) -> Amount {
        self.inputs.iter().map(|i| i.output.value).sum()
    }

    pub fn total_output(&self) -> Amount {
        self.outputs.iter().map(|o| o.value).sum()
    }

    pub fn change_outputs(&self) -> impl Iterator<Item = &PlannedOutput> {
        self.outputs.iter().filter(|o| o.is_change())
    }

    pub fn mint_outputs(&self) -> impl Iterator<Item = &PlannedOutput> {
        self.outputs
            .iter()
            .filter(|o| matches!(o.kind, OutputKind::Mint { .. }))
    }

    pub fn is_balanced(&self) -> bool {
        self.total_output()
            .checked_add(self.fee)
            .map(|spent| spent == self.total_input())
            .unwrap_or(false)
    }
}
