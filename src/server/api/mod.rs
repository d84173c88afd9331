pub mod proxy_controller;

pub use proxy_controller::ProxyController;
