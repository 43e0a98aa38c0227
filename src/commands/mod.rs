//! Command handlers module.
//!
//! - `simulate.rs`: synthetic workload against the registry and scheduler
//! - `config.rs`: effective configuration display
//! - `stores.rs`: persisted store inspection

mod config;
mod simulate;
mod stores;

use clap::Subcommand;

pub use config::cmd_config;
pub use simulate::cmd_simulate;
pub use stores::cmd_stores;

/// Store subcommands.
#[derive(Subcommand)]
pub enum StoresAction {
    /// Show recently viewed products.
    Recent {
        /// Forget the list instead of printing it.
        #[arg(long)]
        clear: bool,
    },

    /// Show favorite product ids.
    Favorites {
        /// Add or remove a product id first.
        #[arg(long)]
        toggle: Option<String>,
    },

    /// Show the order log.
    Orders,
}
