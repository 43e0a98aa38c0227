//! Stores command handler.

use super::StoresAction;
use reclaim::ReclaimConfig;
use reclaim::stores::{Favorites, JsonStore, OrderLog, RecentlyViewed};

/// Stores command.
pub fn cmd_stores(
    config: &ReclaimConfig,
    action: StoresAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = JsonStore::new(&config.data_dir);

    match action {
        StoresAction::Recent { clear } => {
            let mut recent = RecentlyViewed::open(store);
            if clear {
                recent.clear()?;
                println!("Recently viewed products cleared");
                return Ok(());
            }
            if recent.list().is_empty() {
                println!("No recently viewed products");
            }
            for (i, product) in recent.list().iter().enumerate() {
                println!("{:>2}. {} ({}) {:.2}", i + 1, product.name, product.id, product.price);
            }
        },
        StoresAction::Favorites { toggle } => {
            let mut favorites = Favorites::open(store);
            if let Some(id) = toggle {
                let now_favorite = favorites.toggle(&id)?;
                println!(
                    "{id} {}",
                    if now_favorite {
                        "added to favorites"
                    } else {
                        "removed from favorites"
                    }
                );
            }
            if favorites.is_empty() {
                println!("No favorites");
            }
            for id in favorites.list() {
                println!("  - {id}");
            }
        },
        StoresAction::Orders => {
            let log = OrderLog::open(store);
            if log.list().is_empty() {
                println!("No orders");
            }
            for order in log.list() {
                println!(
                    "{} {} {:?} {} items, total {:.2}",
                    order.id,
                    order.created_at.format("%Y-%m-%d %H:%M"),
                    order.status,
                    order.items.len(),
                    order.total
                );
            }
        },
    }

    Ok(())
}
