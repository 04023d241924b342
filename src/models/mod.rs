mod route_history;

pub use route_history::*;
