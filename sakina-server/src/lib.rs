pub mod http;
pub mod services;

pub use services::AppServices;
