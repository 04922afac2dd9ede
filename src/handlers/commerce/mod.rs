//! Storefront handlers: catalog, session cart and product reviews.

pub mod carts;
pub mod products;
pub mod reviews;

pub use carts::carts_routes;
pub use products::{admin_products_routes, products_routes};
pub use reviews::reviews_routes;
