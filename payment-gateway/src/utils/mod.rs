pub mod error;
pub mod html;
pub mod http_client;
pub mod sign;
