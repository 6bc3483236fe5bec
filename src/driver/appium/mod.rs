pub mod capabilities;
pub mod client;
pub mod server;

pub use capabilities::Capabilities;
pub use client::{AppiumSession, AppiumSessionFactory};
pub use server::{AppiumServerLauncher, ServerConfig, ServerHandle, ServerLauncher};
