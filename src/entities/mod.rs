pub mod analytics_daily_rollup;
pub mod audit_log;
pub mod inventory_movement;
pub mod product;
pub mod promotion;
pub mod store;
