pub mod controller;
pub mod reaper;
pub mod sweep;

pub use controller::BackgroundTask;
pub use reaper::{ReapReport, SessionReaper};
pub use sweep::RegistrySweeper;
