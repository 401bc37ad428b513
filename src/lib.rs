pub mod chart;
pub mod config;
pub mod page;
pub mod scale;
pub mod series;
pub mod store;
pub mod web;
