pub mod event;
pub mod market;
pub mod order;
pub mod state;

pub use event::*;
pub use market::*;
pub use order::*;
pub use state::*;
