pub mod events;
pub mod models;
pub mod series;
pub mod traits;

pub use events::*;
pub use models::*;
pub use series::*;
pub use traits::*;
