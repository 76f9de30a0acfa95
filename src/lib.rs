pub mod clock;
pub mod console;
pub mod error;
pub mod events;
pub mod power;
pub mod scheduler;
pub mod time;

pub use config_model as config;
