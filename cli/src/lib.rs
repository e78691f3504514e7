pub mod tags_cmd;

pub use tags_cmd::Cli;
