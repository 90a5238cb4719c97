pub mod feed;
pub mod loader;
pub mod merger;
pub mod source;
pub mod subscription;
pub mod types;
