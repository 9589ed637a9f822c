pub mod download;
pub mod plan;
pub mod request;

pub use download::download;
pub use plan::{plan, show_config};
pub use request::request;
