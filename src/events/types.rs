use serde::Serialize;

use crate::data_structures::{Amount, Denomination, SpendPlan};

/// Automint status reported to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AutomintStatus {
    Idle,
    Minting {
        denomination: Denomination,
        amount: Amount,
    },
    Failed {
        reason: String,
    },
}

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EngineEvent {
    Automint(AutomintStatus),
    PlanBuilt {
        plan_id: u64,
        inputs: usize,
        outputs: usize,
        fee: Amount,
        privacy_warning: bool,
    },
    PlanCommitted {
        plan_id: u64,
    },
    PlanAborted {
        plan_id: u64,
    },
}

impl EngineEvent {
    pub fn plan_built(plan: &SpendPlan) -> Self {
        EngineEvent::PlanBuilt {
            plan_id: plan.id(),
            inputs: plan.inputs().len(),
            outputs: plan.outputs().len(),
            fee: plan.fee(),
            privacy_warning: plan.privacy_warning(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::Automint(AutomintStatus::Idle) => "AutomintIdle",
            EngineEvent::Automint(AutomintStatus::Minting { .. }) => "AutomintMinting",
            EngineEvent::Automint(AutomintStatus::Failed { .. }) => "AutomintFailed",
            EngineEvent::PlanBuilt { .. } => "PlanBuilt",
            EngineEvent::PlanCommitted { .. } => "PlanCommitted",
            EngineEvent::PlanAborted { .. } => "PlanAborted",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
