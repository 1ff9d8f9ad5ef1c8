use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ContextInitParams {
    #[schemars(description = "Drop and recreate the database from scratch (default: false)")]
    pub force: Option<bool>,
}
