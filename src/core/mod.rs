pub mod config;
mod responses;
pub mod jwt_auth;
mod telementry;
pub mod redis_helper;
pub mod email_service;
pub mod invoice;
pub mod razorpay;
pub mod renewal;

pub use self::config::AppConfig;
pub use responses::*;
pub use telementry::*;
pub use redis_helper::*;
pub use email_service::EmailService;
