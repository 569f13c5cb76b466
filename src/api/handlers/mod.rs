pub mod command;
pub mod entries;
