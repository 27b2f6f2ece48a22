pub mod billing;
pub mod checkout;
pub mod common;
pub mod learning_path;
pub mod profile;
pub mod session;
