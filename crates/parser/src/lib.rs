mod html;
mod service;

pub use html::HtmlParser;
pub use service::ParseCoordinator;
