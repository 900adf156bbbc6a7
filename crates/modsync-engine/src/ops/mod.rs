//! Operation plumbing: completions, guards, preconditions and persistence.

mod completion;
mod guard;
mod preconditions;
pub mod storage;
mod validate;

pub use completion::{Completion, CompletionQueue};
pub use guard::OperationGuard;
pub use preconditions::Precheck;
pub use validate::validate_installed_mods;
