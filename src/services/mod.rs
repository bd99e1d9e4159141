pub mod api_client;
pub mod certificate;
pub mod config_loader;
pub mod join_poller;
pub mod notices;
pub mod registration;
pub mod session;
pub mod team_flow;
