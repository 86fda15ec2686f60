//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `run`    | `Run`            |
//! | `ticket` | `Ticket`         |
//! | `config` | `Config`         |

pub mod config;
pub mod run;
pub mod serve;
pub mod ticket;

pub use config::cmd_config;
pub use run::cmd_run;
pub use serve::cmd_serve;
pub use ticket::cmd_ticket;
