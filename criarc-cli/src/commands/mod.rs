//! Command implementations for the criarc CLI.

pub mod create;
pub mod decompress;
pub mod detect;
pub mod extract;
pub mod info;
pub mod list;
pub mod replace;

pub use create::cmd_create;
pub use decompress::cmd_decompress;
pub use detect::cmd_detect;
pub use extract::cmd_extract;
pub use info::cmd_info;
pub use list::cmd_list;
pub use replace::cmd_replace;
