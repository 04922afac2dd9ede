/// Commerce services module - storefront business logic
pub mod cart_service;
pub mod customer_service;
pub mod pricing_service;
pub mod product_catalog_service;
pub mod review_service;

// Re-export services for convenience
pub use cart_service::{CartMutation, CartService};
pub use customer_service::CustomerService;
pub use pricing_service::{PriceBreakdown, PricingService};
pub use product_catalog_service::ProductCatalogService;
pub use review_service::ReviewService;
