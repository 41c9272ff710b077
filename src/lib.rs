pub mod chain;
pub mod error;
pub mod logging;
pub mod price;
pub mod swap;
