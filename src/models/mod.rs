pub mod driver;
pub mod event;
pub mod request;
pub mod tariff;
