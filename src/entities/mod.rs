pub mod coupon;
pub mod order;
pub mod plan;
pub mod subscription;

pub use coupon::Entity as Coupon;
pub use order::Entity as Order;
pub use plan::Entity as Plan;
pub use subscription::Entity as Subscription;
