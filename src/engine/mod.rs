pub mod assignment;
pub mod lifecycle;
pub mod queue;
pub mod relay;
pub mod scoring;
