//! Built-in conversational modules

pub mod dice;
pub mod reminder;

pub use dice::Dice;
pub use reminder::Reminder;

use crate::kernel::Module;
use std::sync::Arc;

/// Modules in install order, which is also mention-hook priority
pub fn create_default_modules() -> Vec<Arc<dyn Module>> {
    vec![Arc::new(Reminder::new()), Arc::new(Dice)]
}
