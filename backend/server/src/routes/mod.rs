pub mod admin;
pub mod cart;
pub mod checkout;
pub mod customers;
pub mod products;
pub mod status;
