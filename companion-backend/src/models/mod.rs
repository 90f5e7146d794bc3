mod context;
mod friend;
mod meta;
mod module_record;
mod timer;
mod user;

pub use context::{ContextSubscription, Scope};
pub use friend::{Friend, LOVE_MAX, LOVE_MIN};
pub use meta::Meta;
pub use module_record::ModuleRecord;
pub use timer::PersistedTimer;
pub use user::UserRef;
