use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ContextStatsParams {
    #[schemars(
        description = "Include project, topic, outcome and technology breakdowns (default: false)"
    )]
    pub breakdown: Option<bool>,
}
