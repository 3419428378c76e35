use std::sync::Arc;

use crate::config::AppConfig;
use crate::domain::VenueRole;
use crate::error::{Result, XemmError};

use super::{PaperVenue, VenueClient};

/// Both venues of a pair, as concrete paper venues and as trait objects
pub struct PaperVenues {
    pub quote: Arc<PaperVenue>,
    pub reference: Arc<PaperVenue>,
}

impl PaperVenues {
    pub fn quote_client(&self) -> Arc<dyn VenueClient> {
        self.quote.clone()
    }

    pub fn reference_client(&self) -> Arc<dyn VenueClient> {
        self.reference.clone()
    }
}

/// Create the venue pair from `AppConfig`.
///
/// Only dry-run venues ship with this crate; live adapters implement `VenueClient`
/// and are wired by the embedding application.
pub fn build_paper_venues(app_config: &AppConfig) -> Result<PaperVenues> {
    if !app_config.dry_run.enabled {
        return Err(XemmError::InvalidConfig(
            "live venues are not built in; set dry_run.enabled = true or embed a VenueClient"
                .to_string(),
        ));
    }

    if app_config.paper.quote_balances.is_empty() || app_config.paper.reference_balances.is_empty()
    {
        return Err(XemmError::InvalidConfig(
            "paper.quote_balances and paper.reference_balances must list starting balances"
                .to_string(),
        ));
    }

    Ok(PaperVenues {
        quote: Arc::new(PaperVenue::from_config(VenueRole::Quote, app_config)),
        reference: Arc::new(PaperVenue::from_config(VenueRole::Reference, app_config)),
    })
}
