//! VAT orchestration for carts on top of the acted rules engine.
//!
//! [`VatOrchestrator::execute_vat_calculation`] builds a context per cart
//! item, runs the `cart_calculate_vat` rule family for it, and aggregates
//! the results into a [`VatResult`]. The result is cached on the cart and
//! recorded in the audit log; [`MemoryCartStore`] clears that cache on
//! every item mutation.

pub mod cart;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod result;
pub mod seed;

pub use cart::{AddressBook, Cart, CartItem, MemoryCartStore, StaticAddressBook};
pub use clock::{CancelToken, Clock, FixedClock, SystemClock};
pub use config::VatConfig;
pub use context::{item_context, net_amount, UserContext};
pub use error::VatError;
pub use orchestrator::{VatOrchestrator, VatRequest};
pub use result::{ItemVat, VatResult, VatStatus, VatTotals};
pub use seed::{seed_rules, seed_schemas, seeded_store, CONTEXT_SCHEMA};
