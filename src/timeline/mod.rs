pub mod dashboard;
pub mod fetcher;
pub mod models;
pub mod options;
pub mod page;
pub mod range;
pub mod renderer;
pub mod series;
pub mod svg;
