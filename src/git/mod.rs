pub mod repo;
pub mod transport;

pub use repo::{count_line_changes, GitRepo};
pub use transport::{remote_url, GitTransport, GixTransport};
