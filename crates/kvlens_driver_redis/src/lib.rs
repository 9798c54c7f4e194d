#![allow(clippy::result_large_err)]

pub mod command;
pub mod driver;

pub use command::{parse_command, render_reply, split_command};
pub use driver::{RedisDriver, RedisStore, sanitize_uri};
