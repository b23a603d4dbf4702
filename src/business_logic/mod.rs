pub mod accumulation;
pub mod config;
pub mod fvg;
pub mod indicators;
pub mod lifecycle;
pub mod registry;
pub mod session;
pub mod supply_demand;
