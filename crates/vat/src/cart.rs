//! Carts, cart items and the in-memory cart store.
//!
//! Every item mutation clears the cart's cached VAT before the mutation is
//! applied and bumps the cart's revision. A calculation that read the cart
//! before the commit caches its result under the old revision, which the
//! read path then refuses.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use acted_storage::{StorageError, VatCache};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    #[serde(default)]
    pub product_code: Option<String>,
    pub actual_price: Decimal,
    pub quantity: u32,
    /// Product metadata such as `variationType` or an explicit `product_type`.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub items: Vec<CartItem>,
    /// Bumped by every committed change.
    #[serde(default)]
    pub revision: u64,
}

impl Cart {
    pub fn new(id: impl Into<String>) -> Self {
        Cart {
            id: id.into(),
            user_id: None,
            items: Vec::new(),
            revision: 0,
        }
    }
}

/// Resolves the country of the cart owner's saved address.
pub trait AddressBook: Send + Sync {
    fn country_code_for(&self, cart: &Cart) -> Option<String>;
}

/// Saved countries keyed by user id.
#[derive(Debug, Clone, Default)]
pub struct StaticAddressBook {
    countries: HashMap<String, String>,
}

impl StaticAddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, user_id: impl Into<String>, country_code: impl Into<String>) -> Self {
        self.countries.insert(user_id.into(), country_code.into());
        self
    }
}

impl AddressBook for StaticAddressBook {
    fn country_code_for(&self, cart: &Cart) -> Option<String> {
        cart.user_id
            .as_ref()
            .and_then(|u| self.countries.get(u))
            .cloned()
    }
}

pub struct MemoryCartStore {
    carts: RwLock<BTreeMap<String, Cart>>,
    cache: Arc<dyn VatCache>,
}

impl MemoryCartStore {
    pub fn new(cache: Arc<dyn VatCache>) -> Self {
        MemoryCartStore {
            carts: RwLock::new(BTreeMap::new()),
            cache,
        }
    }

    pub fn insert_cart(&self, mut cart: Cart) -> Result<(), StorageError> {
        for item in &cart.items {
            check_item(&cart.id, item)?;
        }
        let mut carts = self.carts.write().map_err(|_| poisoned())?;
        if let Some(existing) = carts.get(&cart.id) {
            cart.revision = cart.revision.max(existing.revision + 1);
        }
        self.cache.clear(&cart.id)?;
        carts.insert(cart.id.clone(), cart);
        Ok(())
    }

    /// Snapshot of a cart.
    pub fn cart(&self, cart_id: &str) -> Result<Cart, StorageError> {
        self.carts
            .read()
            .map_err(|_| poisoned())?
            .get(cart_id)
            .cloned()
            .ok_or_else(|| StorageError::CartNotFound {
                cart_id: cart_id.to_string(),
            })
    }

    pub fn add_item(&self, cart_id: &str, item: CartItem) -> Result<(), StorageError> {
        check_item(cart_id, &item)?;
        self.mutate(cart_id, |cart| {
            if cart.items.iter().any(|i| i.id == item.id) {
                return Err(StorageError::InvalidRecord {
                    code: item.id.clone(),
                    message: format!("item already in cart {}", cart.id),
                });
            }
            cart.items.push(item);
            Ok(())
        })
    }

    pub fn update_item(&self, cart_id: &str, item: CartItem) -> Result<(), StorageError> {
        check_item(cart_id, &item)?;
        self.mutate(cart_id, |cart| {
            let slot = cart
                .items
                .iter_mut()
                .find(|i| i.id == item.id)
                .ok_or_else(|| StorageError::ItemNotFound {
                    cart_id: cart.id.clone(),
                    item_id: item.id.clone(),
                })?;
            *slot = item;
            Ok(())
        })
    }

    pub fn remove_item(&self, cart_id: &str, item_id: &str) -> Result<(), StorageError> {
        self.mutate(cart_id, |cart| {
            let before = cart.items.len();
            cart.items.retain(|i| i.id != item_id);
            if cart.items.len() == before {
                return Err(StorageError::ItemNotFound {
                    cart_id: cart.id.clone(),
                    item_id: item_id.to_string(),
                });
            }
            Ok(())
        })
    }

    /// Clear the cached VAT of a cart. Runs inside every item mutation and
    /// may be called directly when items change elsewhere.
    pub fn on_cart_item_changed(&self, cart_id: &str) -> Result<(), StorageError> {
        tracing::debug!(cart_id, "cart item changed; clearing cached VAT");
        self.cache.clear(cart_id)
    }

    /// Apply `f` to a copy of the cart, clear the cache, then commit under
    /// the next revision. Nothing is committed when either step fails.
    fn mutate<F>(&self, cart_id: &str, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Cart) -> Result<(), StorageError>,
    {
        let mut carts = self.carts.write().map_err(|_| poisoned())?;
        let current = carts
            .get(cart_id)
            .ok_or_else(|| StorageError::CartNotFound {
                cart_id: cart_id.to_string(),
            })?;
        let mut next = current.clone();
        f(&mut next)?;
        next.revision = current.revision + 1;
        self.on_cart_item_changed(cart_id)?;
        carts.insert(cart_id.to_string(), next);
        Ok(())
    }
}

fn check_item(cart_id: &str, item: &CartItem) -> Result<(), StorageError> {
    if item.quantity == 0 {
        return Err(StorageError::InvalidRecord {
            code: item.id.clone(),
            message: format!("quantity must be at least 1 (cart {})", cart_id),
        });
    }
    if item.actual_price.is_sign_negative() {
        return Err(StorageError::InvalidRecord {
            code: item.id.clone(),
            message: format!("actual_price must not be negative (cart {})", cart_id),
        });
    }
    Ok(())
}

fn poisoned() -> StorageError {
    StorageError::Backend("cart store lock poisoned".to_string())
}
