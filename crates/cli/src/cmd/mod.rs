mod build;
mod show;
mod stages;

pub use build::cmd_build;
pub use show::cmd_show;
pub use stages::cmd_stages;
