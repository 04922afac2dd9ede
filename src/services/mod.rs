// Storefront: catalog, carts, accounts, reviews
pub mod commerce;

// Checkout and order queries
pub mod orders;

// Payment capture and fulfillment
pub mod payments;
