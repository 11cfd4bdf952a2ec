//! Domain-handler adapters the interaction loop consults for per-domain
//! prompt context and post-response artifact extraction.

pub mod coding;
pub mod health;
pub mod tasks;

pub use coding::CodingHandler;
pub use health::HealthHandler;
pub use tasks::TasksHandler;
