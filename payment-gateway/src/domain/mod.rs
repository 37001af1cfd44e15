pub mod enums;
pub mod models;
pub mod money;
