pub mod anon_cart;
pub mod cart;
pub mod catalog;
pub mod dashboard;
pub mod db;
pub mod events;
pub mod functions;
pub mod order;
pub mod prom_metrics;
pub mod project;
