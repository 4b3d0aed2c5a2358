pub mod clock;
pub mod scheduler;
pub mod session;
pub mod engine;
