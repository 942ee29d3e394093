pub const MEMBERSHIP_CONFIG: &'static str = include_str!("../membership.toml");

pub mod address;
pub mod codec;
pub mod collaborator;
pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod ext;
pub mod message;
pub mod network;
pub mod runtime;
pub mod selector;
pub mod table;
