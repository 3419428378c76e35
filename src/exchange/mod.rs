pub mod factory;
pub mod paper;
mod traits;

pub use factory::{build_paper_venues, PaperVenues};
pub use paper::{PaperActivity, PaperOrder, PaperVenue, PaperVenueConfig};
pub use traits::{with_timeout, EventSink, VenueClient};

#[cfg(test)]
pub use traits::MockVenueClient;
