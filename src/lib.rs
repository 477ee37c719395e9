pub mod app;
pub mod article;
pub mod logger;
pub mod publisher;
pub mod scheduler;
pub mod server;
pub mod timeline;
pub mod wechat;
