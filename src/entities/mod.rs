pub mod cart;
pub mod order;
pub mod order_item;
pub mod product;
pub mod review;
pub mod user;

pub use cart::{CartLines, Entity as Cart, LineItem, Model as CartModel};
pub use order::{Entity as Order, Model as OrderModel, PaymentMethod, PaymentResult};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, ImageList, Model as ProductModel};
pub use review::{Entity as Review, Model as ReviewModel};
pub use user::{Entity as User, Model as UserModel, ShippingAddress, UserRole};
