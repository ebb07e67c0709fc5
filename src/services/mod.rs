pub mod inventory;
pub mod promotions;
pub mod ranking;

// Read side and cross-cutting
pub mod analytics;
pub mod audit;
pub mod catalog;
