//! Domain layer - pools, pricing, routes and positions

pub mod pool;
pub mod position;
pub mod pricing;
pub mod route;
