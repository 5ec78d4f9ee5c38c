pub mod frontier;
pub mod site;

pub use frontier::Frontier;
pub use site::crawl_site;
