use super::UserRef;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const LOVE_MIN: f64 = -30.0;
pub const LOVE_MAX: f64 = 100.0;

/// Relationship record between the bot and one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    #[serde(skip)]
    pub doc_id: i64,
    pub user_id: String,
    pub user: UserRef,
    #[serde(default)]
    pub love: f64,
    /// Sub-documents owned by individual modules, keyed by module name
    #[serde(default)]
    pub per_modules_data: Map<String, Value>,
}

impl Friend {
    pub fn new(user: UserRef) -> Self {
        Self {
            doc_id: 0,
            user_id: user.id.clone(),
            user,
            love: 0.0,
            per_modules_data: Map::new(),
        }
    }

    /// Adjust affinity, clamped and rounded to avoid float drift
    pub fn inc_love(&mut self, amount: f64) {
        let next = (self.love + amount).clamp(LOVE_MIN, LOVE_MAX);
        self.love = (next * 1000.0).round() / 1000.0;
    }

    pub fn module_data(&self, module: &str) -> Option<&Value> {
        self.per_modules_data.get(module)
    }

    pub fn name(&self) -> &str {
        self.user.display_name()
    }
}
