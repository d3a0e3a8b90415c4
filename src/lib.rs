pub mod core;
pub mod db;
pub mod jobs;
pub mod models;
pub mod routes;
pub mod rupie_times_web_server;
