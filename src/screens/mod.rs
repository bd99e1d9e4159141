pub mod certificate_designer;
pub mod event_detail;
pub mod events;
pub mod login;
pub mod register_form;
pub mod team;
pub mod teamless;
