pub mod subscription_expiry;
