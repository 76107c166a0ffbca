mod ids;
mod record;

pub use ids::*;
pub use record::*;
