//! Long-running pipelines driven by the management loop.

mod install;
mod uninstall;
mod upload;

pub use install::install_or_update_mod;
pub use uninstall::uninstall_mod;
pub use upload::upload_modfile;

#[cfg(test)]
mod tests;
