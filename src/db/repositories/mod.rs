pub mod catalogue;
pub mod organizations;
pub mod sessions;
