pub mod capacity;
pub mod db;
pub mod event_rules;
pub mod fees;
pub mod models;
pub mod pagination;
pub mod repos;
pub mod rsvp;
