mod init_config;
mod query;

pub use init_config::cmd_init_config;
pub use query::cmd_query;
