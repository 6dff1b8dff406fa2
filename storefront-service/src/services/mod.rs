pub mod cart_store;
pub mod catalog;
pub mod checkout;
pub mod database;
pub mod error;
pub mod identity;
pub mod memory;
pub mod metrics;
pub mod orders;
pub mod payment;
pub mod repository;

pub use cart_store::{CartStore, CartUpdate};
pub use catalog::{CatalogLookup, HttpCatalog, StaticCatalog};
pub use checkout::{CheckoutManager, FinalizeOutcome, NewCheckout};
pub use database::MongoStore;
pub use error::ServiceError;
pub use identity::TokenService;
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use orders::OrderMaterializer;
pub use payment::{CallerAssertedPayment, PaymentVerifier};
pub use repository::{CartRepository, CheckoutRepository, OrderRepository};
