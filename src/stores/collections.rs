//! Favorites, recently viewed products and the order log.

use super::models::{OrderRecord, ProductSnapshot};
use super::{FAVORITES_KEY, JsonStore, ORDERS_KEY, RECENTLY_VIEWED_KEY};
use crate::Result;
use std::collections::BTreeSet;

/// Maximum number of recently viewed products kept.
pub const RECENTLY_VIEWED_LIMIT: usize = 10;

/// Set of favorite product ids.
#[derive(Debug)]
pub struct Favorites {
    store: JsonStore,
    ids: BTreeSet<String>,
}

impl Favorites {
    /// Loads favorites from `store`.
    #[must_use]
    pub fn open(store: JsonStore) -> Self {
        let ids = store.load(FAVORITES_KEY);
        Self { store, ids }
    }

    /// Adds or removes `product_id`. Returns whether it is now a favorite.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written; the set is left
    /// unchanged.
    pub fn toggle(&mut self, product_id: &str) -> Result<bool> {
        let now_favorite = if self.ids.remove(product_id) {
            false
        } else {
            self.ids.insert(product_id.to_string());
            true
        };
        if let Err(e) = self.store.save(FAVORITES_KEY, &self.ids) {
            if now_favorite {
                self.ids.remove(product_id);
            } else {
                self.ids.insert(product_id.to_string());
            }
            return Err(e);
        }
        Ok(now_favorite)
    }

    /// Returns `true` if `product_id` is a favorite.
    #[must_use]
    pub fn contains(&self, product_id: &str) -> bool {
        self.ids.contains(product_id)
    }

    /// Favorite ids in sorted order.
    pub fn list(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Number of favorites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if there are no favorites.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Recently viewed products, newest first, at most [`RECENTLY_VIEWED_LIMIT`].
#[derive(Debug)]
pub struct RecentlyViewed {
    store: JsonStore,
    items: Vec<ProductSnapshot>,
}

impl RecentlyViewed {
    /// Loads the list from `store`, trimming it if an older writer overfilled it.
    #[must_use]
    pub fn open(store: JsonStore) -> Self {
        let mut items: Vec<ProductSnapshot> = store.load(RECENTLY_VIEWED_KEY);
        items.truncate(RECENTLY_VIEWED_LIMIT);
        Self { store, items }
    }

    /// Moves `product` to the front, dropping any older view of the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written; the list is left
    /// unchanged.
    pub fn record(&mut self, product: ProductSnapshot) -> Result<()> {
        let older = self
            .items
            .iter()
            .filter(|item| item.id != product.id)
            .take(RECENTLY_VIEWED_LIMIT - 1)
            .cloned()
            .collect::<Vec<_>>();
        let mut items = Vec::with_capacity(RECENTLY_VIEWED_LIMIT);
        items.push(product);
        items.extend(older);
        self.store.save(RECENTLY_VIEWED_KEY, &items)?;
        self.items = items;
        Ok(())
    }

    /// Products, newest first.
    #[must_use]
    pub fn list(&self) -> &[ProductSnapshot] {
        &self.items
    }

    /// Forgets everything.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be removed.
    pub fn clear(&mut self) -> Result<()> {
        self.items.clear();
        self.store.remove(RECENTLY_VIEWED_KEY)
    }
}

/// Append-only order log.
#[derive(Debug)]
pub struct OrderLog {
    store: JsonStore,
    orders: Vec<OrderRecord>,
}

impl OrderLog {
    /// Loads the log from `store`.
    #[must_use]
    pub fn open(store: JsonStore) -> Self {
        let orders = store.load(ORDERS_KEY);
        Self { store, orders }
    }

    /// Appends `order`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written; the order is not kept.
    pub fn append(&mut self, order: OrderRecord) -> Result<()> {
        self.orders.push(order);
        if let Err(e) = self.store.save(ORDERS_KEY, &self.orders) {
            self.orders.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Orders, oldest first.
    #[must_use]
    pub fn list(&self) -> &[OrderRecord] {
        &self.orders
    }

    /// Looks up an order by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&OrderRecord> {
        self.orders.iter().find(|order| order.id == id)
    }
}
