pub mod checkout;
pub mod coupons;
pub mod orders;
pub mod payments;
pub mod plans;
pub mod subscriptions;
