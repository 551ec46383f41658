pub mod fare;
pub mod lifecycle;
pub mod matcher;
pub mod queue;
pub mod registry;
pub mod rematch;
